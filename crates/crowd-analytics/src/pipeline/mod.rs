//! Per-frame detection pipeline.
//!
//! Raw model outputs flow through normalization, cross-model fusion, overlap
//! classification, deduplication and hotspot clustering. Every stage is a
//! pure function over data local to one run.

pub mod dedup;
pub mod enhance;
pub mod frame_selector;
pub mod fusion;
pub mod geometry;
pub mod hotspot;
pub mod normalizer;
pub mod overlap;

use crate::error::{AnalysisError, AnalysisOutcome};
use crate::models::ModelSet;
use crate::options::AnalysisOptions;
use common::crowd::{AnalysisResult, Detection, Hotspot, RawBoxDetection, RawPoseDetection};
use common::validation::safe_unix_timestamp_millis;
use image::RgbImage;
use std::time::Instant;
use tracing::debug;

/// Hands out `person-N` ids, never repeating within one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionIds {
    next: u64,
}

impl Default for DetectionIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl DetectionIds {
    /// The first id handed out will be `person-{first}`
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("person-{}", self.next);
        self.next += 1;
        id
    }
}

/// Run every stage after the models on one frame's raw outputs.
///
/// Returns the final people (highest confidence first) and their hotspots.
/// With `use_multiple_models` off, poses are ignored and detector boxes go
/// straight to overlap classification.
pub fn process_detections(
    raw_boxes: &[RawBoxDetection],
    raw_poses: Vec<RawPoseDetection>,
    frame_width: u32,
    frame_height: u32,
    options: &AnalysisOptions,
    ids: &mut DetectionIds,
) -> (Vec<Detection>, Vec<Hotspot>) {
    let candidates =
        normalizer::normalize_boxes(raw_boxes, frame_width, frame_height, options, ids);

    let mut fused = if options.use_multiple_models {
        let poses = normalizer::sanitize_poses(raw_poses, options.max_poses);
        fusion::fuse(candidates, &poses, frame_width, frame_height, options, ids).0
    } else {
        candidates
    };

    let overlapping_pairs = overlap::classify_overlaps(&mut fused, &options.tuning);
    let fused_count = fused.len();
    let people = dedup::deduplicate(fused, options);
    let hotspots = hotspot::cluster_hotspots(&people, &options.tuning);

    debug!(
        raw_boxes = raw_boxes.len(),
        fused = fused_count,
        overlapping_pairs,
        people = people.len(),
        hotspots = hotspots.len(),
        "frame processed"
    );

    (people, hotspots)
}

/// Analyze one decoded frame with the given models
pub async fn analyze_frame(
    frame: &RgbImage,
    models: &ModelSet,
    options: &AnalysisOptions,
    ids: &mut DetectionIds,
) -> AnalysisOutcome<AnalysisResult> {
    let started = Instant::now();
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(AnalysisError::InvalidSource(format!(
            "frame has no pixels ({}x{})",
            width, height
        )));
    }

    let prepared = enhance::prepare_frame(frame, options);
    let raw_boxes = models
        .detector
        .detect(&prepared, options.max_detections)
        .await?;
    let raw_poses = match &models.pose_estimator {
        Some(estimator) if options.use_multiple_models => {
            estimator.estimate_poses(&prepared, options.max_poses).await?
        }
        _ => Vec::new(),
    };

    let (people, hotspots) =
        process_detections(&raw_boxes, raw_poses, width, height, options, ids);

    Ok(AnalysisResult::new(
        people,
        hotspots,
        started.elapsed().as_millis() as u64,
        safe_unix_timestamp_millis(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PrecomputedModels, SyntheticModels};
    use common::crowd::{Keypoint, MediaKind};
    use std::sync::Arc;

    fn frame() -> RgbImage {
        RgbImage::new(1000, 1000)
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut ids = DetectionIds::default();
        assert_eq!(ids.next_id(), "person-1");
        assert_eq!(ids.next_id(), "person-2");
        assert_eq!(DetectionIds::starting_at(7).next_id(), "person-7");
    }

    #[test]
    fn test_empty_input_gives_empty_result() {
        let (people, hotspots) = process_detections(
            &[],
            vec![],
            640,
            480,
            &AnalysisOptions::default(),
            &mut DetectionIds::default(),
        );
        assert!(people.is_empty());
        assert!(hotspots.is_empty());
    }

    #[test]
    fn test_two_keypoint_pose_never_becomes_a_person() {
        let pose = RawPoseDetection {
            score: 0.99,
            keypoints: vec![
                Keypoint::new("nose", 500.0, 100.0, 0.95),
                Keypoint::new("left_shoulder", 480.0, 140.0, 0.95),
                Keypoint::new("right_shoulder", 520.0, 140.0, 0.2),
            ],
            track_id: None,
        };
        let (people, _) = process_detections(
            &[],
            vec![pose],
            1000,
            1000,
            &AnalysisOptions::default(),
            &mut DetectionIds::default(),
        );
        assert!(people.is_empty());
    }

    #[test]
    fn test_single_model_mode_skips_fusion() {
        let options = AnalysisOptions {
            use_multiple_models: false,
            ..AnalysisOptions::default()
        };
        let boxes = vec![RawBoxDetection::person(0.8, [100.0, 100.0, 50.0, 120.0])];
        let (people, hotspots) =
            process_detections(&boxes, vec![], 1000, 1000, &options, &mut DetectionIds::default());
        assert_eq!(people.len(), 1);
        // No unconfirmed penalty without fusion
        assert_eq!(people[0].confidence, 0.8);
        assert_eq!(hotspots.len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_frame_with_precomputed_models() {
        let models = ModelSet::from_combined(Arc::new(PrecomputedModels::new(
            vec![
                RawBoxDetection::person(0.9, [100.0, 100.0, 60.0, 150.0]),
                RawBoxDetection::person(0.85, [102.0, 101.0, 60.0, 150.0]),
                RawBoxDetection::person(0.7, [700.0, 600.0, 60.0, 150.0]),
            ],
            vec![],
        )));
        let result = analyze_frame(
            &frame(),
            &models,
            &AnalysisOptions::default(),
            &mut DetectionIds::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.crowd_count, 2);
        assert_eq!(result.crowd_count, result.people.len());
        assert!(!result.hotspots.is_empty());
        assert!(result.people[0].confidence >= result.people[1].confidence);
    }

    #[tokio::test]
    async fn test_empty_frame_is_invalid() {
        let models = ModelSet::from_combined(Arc::new(PrecomputedModels::default()));
        let err = analyze_frame(
            &RgbImage::new(0, 0),
            &models,
            &AnalysisOptions::default(),
            &mut DetectionIds::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSource(_)));
    }

    #[tokio::test]
    async fn test_synthetic_scene_keeps_invariants() {
        let models = ModelSet::from_combined(Arc::new(SyntheticModels::new(
            "pipeline-invariants",
            MediaKind::Image,
        )));
        let frame = SyntheticModels::tagged_frame(640, 480, 0);
        let result = analyze_frame(
            &frame,
            &models,
            &AnalysisOptions::default(),
            &mut DetectionIds::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.crowd_count, result.people.len());
        assert_eq!(result.hotspots.is_empty(), result.people.is_empty());
        let ids: std::collections::HashSet<_> = result.people.iter().map(|p| &p.id).collect();
        assert_eq!(ids.len(), result.people.len());
        for person in &result.people {
            assert!(person.bounding_box.is_valid());
            assert!((0.0..=1.0).contains(&person.confidence));
        }
    }
}
