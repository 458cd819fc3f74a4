//! Entry points tying models, the pipeline and the result cache together.

use crate::cache::ResultCache;
use crate::error::{AnalysisError, AnalysisOutcome};
use crate::models::synthetic::{DEMO_FRAME_HEIGHT, DEMO_FRAME_WIDTH};
use crate::models::{
    FrameSource, MediaSource, MediaStore, ModelSet, SyntheticFrameSource, SyntheticModels,
};
use crate::options::AnalysisOptions;
use crate::pipeline::{analyze_frame, frame_selector, DetectionIds};
use crate::seeded::SeededSequence;
use common::crowd::{AnalysisResult, MediaKey, MediaKind};
use common::validation::{validate_id, validate_source_key};
use image::RgbImage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Share of demo-mode runs that fail on purpose
pub const DEFAULT_FAILURE_RATE: f64 = 0.02;

pub struct CrowdAnalyzer {
    models: Option<ModelSet>,
    media_store: Option<Arc<dyn MediaStore>>,
    failure_rate: f64,
    options: AnalysisOptions,
    cancel: CancellationToken,
    cache: ResultCache,
    /// Injected failures so far per key; each retry draws from a fresh stream
    fault_attempts: Mutex<HashMap<MediaKey, u32>>,
}

impl Default for CrowdAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl CrowdAnalyzer {
    pub fn new() -> Self {
        Self {
            models: None,
            media_store: None,
            failure_rate: DEFAULT_FAILURE_RATE,
            options: AnalysisOptions::default(),
            cancel: CancellationToken::new(),
            cache: ResultCache::new(),
            fault_attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_models(mut self, models: ModelSet) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_media_store(mut self, store: Arc<dyn MediaStore>) -> Self {
        self.media_store = Some(store);
        self
    }

    /// Probability in `[0, 1]` of an injected demo-mode failure
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Options used by `analyze_media`
    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    /// Token whose cancellation abandons in-flight media analyses
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn has_models(&self) -> bool {
        self.models.is_some()
    }

    fn configured_models(&self) -> AnalysisOutcome<&ModelSet> {
        self.models
            .as_ref()
            .ok_or_else(|| AnalysisError::ModelUnavailable("no models configured".to_string()))
    }

    /// Analyze one still image with the configured models
    pub async fn analyze_image(
        &self,
        frame: &RgbImage,
        options: &AnalysisOptions,
    ) -> AnalysisOutcome<AnalysisResult> {
        let models = self.configured_models()?;
        self.analyze_image_with(frame, models, options).await
    }

    /// Analyze one still image with caller-supplied models
    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    pub async fn analyze_image_with(
        &self,
        frame: &RgbImage,
        models: &ModelSet,
        options: &AnalysisOptions,
    ) -> AnalysisOutcome<AnalysisResult> {
        let started = Instant::now();
        let outcome = analyze_frame(frame, models, options, &mut DetectionIds::default()).await;
        record_outcome(MediaKind::Image, "image", started, &outcome);
        outcome
    }

    /// Sample a video or live source and return its representative frame
    pub async fn analyze_video(
        &self,
        source: &mut dyn FrameSource,
        options: &AnalysisOptions,
        cancel: &CancellationToken,
    ) -> AnalysisOutcome<AnalysisResult> {
        let models = self.configured_models()?;
        self.analyze_video_with(source, models, options, cancel).await
    }

    #[instrument(skip_all, fields(duration_secs = ?source.duration_secs()))]
    async fn analyze_video_with(
        &self,
        source: &mut dyn FrameSource,
        models: &ModelSet,
        options: &AnalysisOptions,
        cancel: &CancellationToken,
    ) -> AnalysisOutcome<AnalysisResult> {
        let started = Instant::now();
        let kind = if source.duration_secs().is_some() {
            MediaKind::Video
        } else {
            MediaKind::Live
        };

        let outcome = frame_selector::run(source, models, options, cancel)
            .await
            .map(|selected| {
                let mut result = selected.result;
                result.processing_time_ms = started.elapsed().as_millis() as u64;
                result
            });
        record_outcome(kind, "video", started, &outcome);
        outcome
    }

    /// Cache-aware analysis of a stored media item.
    ///
    /// Uses the media store and configured models when both exist and the
    /// store knows the id. Otherwise runs in demo mode, where `source_key`
    /// seeds synthetic model output so repeated runs are identical.
    #[instrument(skip(self, kind), fields(media_kind = %kind))]
    pub async fn analyze_media(
        &self,
        media_id: &str,
        kind: MediaKind,
        source_key: &str,
    ) -> AnalysisOutcome<AnalysisResult> {
        validate_id(media_id, "media_id")
            .map_err(|e| AnalysisError::InvalidSource(e.to_string()))?;
        validate_source_key(source_key)
            .map_err(|e| AnalysisError::InvalidSource(e.to_string()))?;

        let key = MediaKey::new(kind, media_id);
        self.cache
            .get_or_compute(&key, || self.compute_media(&key, source_key))
            .await
    }

    async fn compute_media(
        &self,
        key: &MediaKey,
        source_key: &str,
    ) -> AnalysisOutcome<AnalysisResult> {
        if let (Some(store), Some(models)) = (&self.media_store, &self.models) {
            match store.open(key).await? {
                Some(MediaSource::Image(frame)) => {
                    return self.analyze_image_with(&frame, models, &self.options).await;
                }
                Some(MediaSource::Video(mut source)) => {
                    return self
                        .analyze_video_with(source.as_mut(), models, &self.options, &self.cancel)
                        .await;
                }
                None => info!(%key, "media not in store, using demo mode"),
            }
        }

        self.demo_analysis(key, source_key).await
    }

    /// Decide whether this attempt at `key` fails.
    ///
    /// The first attempt draws from `"{source_key}:fault"`, attempt `n` from
    /// `"{source_key}:fault:{n}"`. Outcomes stay reproducible for a fresh
    /// analyzer while a retry after an injected failure gets a new draw.
    async fn inject_fault(&self, key: &MediaKey, source_key: &str) -> bool {
        let mut attempts = self.fault_attempts.lock().await;
        let attempt = attempts.get(key).copied().unwrap_or(0);
        let stream = if attempt == 0 {
            format!("{}:fault", source_key)
        } else {
            format!("{}:fault:{}", source_key, attempt)
        };
        let failed = SeededSequence::new(&stream).chance(self.failure_rate);
        if failed {
            attempts.insert(key.clone(), attempt.saturating_add(1));
        }
        failed
    }

    async fn demo_analysis(
        &self,
        key: &MediaKey,
        source_key: &str,
    ) -> AnalysisOutcome<AnalysisResult> {
        let kind = key.kind;
        if self.inject_fault(key, source_key).await {
            warn!(source_key, %key, "injecting simulated detection failure");
            let err = AnalysisError::SimulatedDetectionFailure {
                source_key: source_key.to_string(),
            };
            record_failure(kind, &err);
            return Err(err);
        }

        let models = ModelSet::from_combined(Arc::new(SyntheticModels::new(source_key, kind)));
        match kind {
            MediaKind::Image => {
                let frame = SyntheticModels::tagged_frame(DEMO_FRAME_WIDTH, DEMO_FRAME_HEIGHT, 0);
                self.analyze_image_with(&frame, &models, &self.options).await
            }
            MediaKind::Video | MediaKind::Live => {
                let mut source = SyntheticFrameSource::new(kind);
                self.analyze_video_with(&mut source, &models, &self.options, &self.cancel)
                    .await
            }
        }
    }
}

fn record_outcome(
    kind: MediaKind,
    mode: &str,
    started: Instant,
    outcome: &AnalysisOutcome<AnalysisResult>,
) {
    use telemetry::metrics::{CROWD_ANALYSES, CROWD_ANALYSIS_DURATION, CROWD_PEOPLE_DETECTED};

    CROWD_ANALYSIS_DURATION
        .with_label_values(&[mode])
        .observe(started.elapsed().as_secs_f64());

    match outcome {
        Ok(result) => {
            CROWD_ANALYSES
                .with_label_values(&[kind.as_str(), "success"])
                .inc();
            CROWD_PEOPLE_DETECTED.inc_by(result.crowd_count as u64);
            info!(
                media_kind = %kind,
                crowd_count = result.crowd_count,
                hotspots = result.hotspots.len(),
                processing_time_ms = result.processing_time_ms,
                "analysis completed"
            );
        }
        Err(err) => record_failure(kind, err),
    }
}

fn record_failure(kind: MediaKind, err: &AnalysisError) {
    telemetry::metrics::CROWD_ANALYSES
        .with_label_values(&[kind.as_str(), err.kind()])
        .inc();
    warn!(media_kind = %kind, error = %err, "analysis failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FrameSequence, PrecomputedModels};
    use async_trait::async_trait;
    use common::crowd::RawBoxDetection;

    struct OneImageStore;

    #[async_trait]
    impl MediaStore for OneImageStore {
        async fn open(&self, key: &MediaKey) -> AnalysisOutcome<Option<MediaSource>> {
            if key.media_id == "stored" {
                Ok(Some(MediaSource::Image(RgbImage::new(100, 100))))
            } else {
                Ok(None)
            }
        }
    }

    fn precomputed() -> ModelSet {
        ModelSet::from_combined(Arc::new(PrecomputedModels::new(
            vec![RawBoxDetection::person(0.9, [10.0, 10.0, 10.0, 30.0])],
            vec![],
        )))
    }

    #[tokio::test]
    async fn test_demo_mode_is_deterministic() {
        let first = CrowdAnalyzer::new()
            .analyze_media("a", MediaKind::Image, "demo-image-0")
            .await
            .unwrap();
        let second = CrowdAnalyzer::new()
            .analyze_media("b", MediaKind::Image, "demo-image-0")
            .await
            .unwrap();
        assert_eq!(first.crowd_count, second.crowd_count);
        assert_eq!(first.people, second.people);
        assert_eq!(first.hotspots, second.hotspots);
    }

    #[tokio::test]
    async fn test_full_failure_rate_always_fails_and_is_not_cached() {
        let analyzer = CrowdAnalyzer::new().with_failure_rate(1.0);
        let err = analyzer
            .analyze_media("cam", MediaKind::Live, "any-key")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::SimulatedDetectionFailure { .. }));
        assert!(analyzer.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_retry_after_injected_failure_succeeds() {
        // First draw of "camera-120:fault" is ~0.014, the second stream ~0.43
        let analyzer = CrowdAnalyzer::new();
        let err = analyzer
            .analyze_media("cam", MediaKind::Live, "camera-120")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(analyzer.cache().is_empty().await);

        let retried = analyzer
            .analyze_media("cam", MediaKind::Live, "camera-120")
            .await
            .unwrap();
        assert_eq!(retried.crowd_count, retried.people.len());
        assert_eq!(analyzer.cache().len().await, 1);

        // A fresh analyzer replays the same failure first
        assert!(CrowdAnalyzer::new()
            .analyze_media("cam", MediaKind::Live, "camera-120")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_store_path_used_when_media_known() {
        let analyzer = CrowdAnalyzer::new()
            .with_models(precomputed())
            .with_media_store(Arc::new(OneImageStore))
            .with_failure_rate(1.0);

        // The store knows this id, so no demo failure is injected
        let result = analyzer
            .analyze_media("stored", MediaKind::Image, "ignored")
            .await
            .unwrap();
        assert_eq!(result.crowd_count, 1);

        // Unknown ids fall back to demo mode
        assert!(analyzer
            .analyze_media("other", MediaKind::Image, "ignored")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        let analyzer = CrowdAnalyzer::new();
        let err = analyzer
            .analyze_media("", MediaKind::Image, "key")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSource(_)));
    }

    #[tokio::test]
    async fn test_analyze_image_requires_models() {
        let err = CrowdAnalyzer::new()
            .analyze_image(&RgbImage::new(10, 10), &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_analyze_video_with_frame_sequence() {
        let analyzer = CrowdAnalyzer::new().with_models(precomputed());
        let frames = (0..4)
            .map(|i| (f64::from(i), RgbImage::new(100, 100)))
            .collect();
        let mut source = FrameSequence::new(frames, 4.0).unwrap();
        let result = analyzer
            .analyze_video(&mut source, &AnalysisOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.crowd_count, 1);
        assert_eq!(source.position(), 0);
    }
}
