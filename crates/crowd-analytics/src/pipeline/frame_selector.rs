//! Representative-frame selection for video and live sources.

use super::{analyze_frame, DetectionIds};
use crate::error::{AnalysisError, AnalysisOutcome};
use crate::models::{FrameSource, ModelSet};
use crate::options::AnalysisOptions;
use common::crowd::AnalysisResult;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-frame analysis at one sample time
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    pub timestamp_secs: f64,
    pub result: AnalysisResult,
}

impl SampledFrame {
    /// Mean confidence times head count
    pub fn score(&self) -> f32 {
        self.result.mean_confidence() * self.result.crowd_count as f32
    }
}

/// Evenly spaced sample times over the first `min(duration, max_duration)`
/// seconds, excluding both ends of the span.
pub fn sample_timestamps(duration_secs: f64, options: &AnalysisOptions) -> Vec<f64> {
    let span = duration_secs.min(options.max_duration_secs).max(0.0);
    let by_rate = ((span * f64::from(options.frame_rate)).floor() as usize).max(1);
    let count = options.sample_frames.min(by_rate).max(1);

    (1..=count)
        .map(|i| i as f64 * span / (count + 1) as f64)
        .collect()
}

/// Pick the frame with the highest score; the earliest wins ties
pub fn select_frame(frames: Vec<SampledFrame>) -> Option<SampledFrame> {
    frames.into_iter().fold(None, |best, frame| match best {
        Some(current) if frame.score() <= current.score() => Some(current),
        _ => Some(frame),
    })
}

/// Sample `source`, analyze each frame and return the best one.
///
/// Cancellation is checked before every seek; a cancelled run returns
/// `AnalysisError::Cancelled` and nothing partial. Playback is moved back
/// to the start afterwards. Live sources have no timeline and are analyzed
/// once at their current frame.
pub async fn run(
    source: &mut dyn FrameSource,
    models: &ModelSet,
    options: &AnalysisOptions,
    cancel: &CancellationToken,
) -> AnalysisOutcome<SampledFrame> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(AnalysisError::InvalidSource(
            "frame source has no pixels".to_string(),
        ));
    }

    let mut ids = DetectionIds::default();

    let Some(duration) = source.duration_secs() else {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let frame = source.current_frame()?;
        let result = analyze_frame(&frame, models, options, &mut ids).await?;
        telemetry::metrics::CROWD_FRAMES_SAMPLED.inc();
        return Ok(SampledFrame {
            timestamp_secs: 0.0,
            result,
        });
    };

    if !duration.is_finite() || duration < 0.0 {
        return Err(AnalysisError::InvalidSource(format!(
            "invalid clip duration {}",
            duration
        )));
    }

    let timestamps = sample_timestamps(duration, options);
    let sampled = sample_all(source, &timestamps, models, options, cancel, &mut ids).await;
    let rewind = source.seek(0.0).await;
    let frames = sampled?;
    rewind?;

    let selected = select_frame(frames)
        .ok_or_else(|| AnalysisError::InvalidSource("no frames sampled".to_string()))?;
    info!(
        timestamp_secs = selected.timestamp_secs,
        crowd_count = selected.result.crowd_count,
        samples = timestamps.len(),
        "selected representative frame"
    );
    Ok(selected)
}

async fn sample_all(
    source: &mut dyn FrameSource,
    timestamps: &[f64],
    models: &ModelSet,
    options: &AnalysisOptions,
    cancel: &CancellationToken,
    ids: &mut DetectionIds,
) -> AnalysisOutcome<Vec<SampledFrame>> {
    let mut frames = Vec::with_capacity(timestamps.len());
    for &timestamp_secs in timestamps {
        if cancel.is_cancelled() {
            debug!(timestamp_secs, "analysis cancelled between frames");
            return Err(AnalysisError::Cancelled);
        }
        source.seek(timestamp_secs).await?;
        let frame = source.current_frame()?;
        let result = analyze_frame(&frame, models, options, ids).await?;
        telemetry::metrics::CROWD_FRAMES_SAMPLED.inc();
        debug!(timestamp_secs, crowd_count = result.crowd_count, "sampled frame");
        frames.push(SampledFrame {
            timestamp_secs,
            result,
        });
    }
    Ok(frames)
}
