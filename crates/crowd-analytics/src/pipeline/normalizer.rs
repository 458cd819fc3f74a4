/// Conversion of raw model outputs into canonical candidate detections
use super::DetectionIds;
use crate::options::AnalysisOptions;
use common::crowd::{BoundingBox, Detection, RawBoxDetection, RawPoseDetection};
use tracing::debug;

pub const PERSON_CLASS: &str = "person";

/// Box keeps at least `margin` from all four frame edges
pub fn is_fully_visible(bbox: &BoundingBox, margin: f32) -> bool {
    bbox.x >= margin
        && bbox.y >= margin
        && bbox.right() <= 1.0 - margin
        && bbox.bottom() <= 1.0 - margin
}

/// Turn detector boxes into candidate people.
///
/// Keeps "person" boxes scoring at least the (looser) intake threshold, so
/// borderline candidates still reach fusion. Malformed boxes are dropped.
pub fn normalize_boxes(
    raw: &[RawBoxDetection],
    frame_width: u32,
    frame_height: u32,
    options: &AnalysisOptions,
    ids: &mut DetectionIds,
) -> Vec<Detection> {
    let intake = options.intake_threshold();
    let margin = options.tuning.visibility_margin;
    let mut candidates = Vec::new();

    let people = raw
        .iter()
        .filter(|item| item.class.eq_ignore_ascii_case(PERSON_CLASS))
        .take(options.max_detections);

    for item in people {
        if !item.score.is_finite() || item.score < intake {
            continue;
        }
        if item.bbox.iter().any(|v| !v.is_finite()) || item.bbox[2] <= 0.0 || item.bbox[3] <= 0.0
        {
            debug!(bbox = ?item.bbox, "dropping malformed detector box");
            continue;
        }

        let Some(bounding_box) =
            BoundingBox::from_pixels(item.bbox, frame_width, frame_height).clamp_to_unit()
        else {
            debug!(bbox = ?item.bbox, "dropping detector box outside the frame");
            continue;
        };

        candidates.push(Detection {
            id: ids.next_id(),
            bounding_box,
            confidence: item.score.clamp(0.0, 1.0),
            keypoints: None,
            is_fully_visible: is_fully_visible(&bounding_box, margin),
            is_overlapping: false,
            track_id: item.track_id.clone(),
        });
    }

    candidates
}

/// Drop non-finite keypoints and clamp scores, keeping at most `max_poses`
pub fn sanitize_poses(raw: Vec<RawPoseDetection>, max_poses: usize) -> Vec<RawPoseDetection> {
    raw.into_iter()
        .take(max_poses)
        .map(|mut pose| {
            pose.score = if pose.score.is_finite() {
                pose.score.clamp(0.0, 1.0)
            } else {
                0.0
            };
            pose.keypoints
                .retain(|kp| kp.x.is_finite() && kp.y.is_finite() && kp.score.is_finite());
            for kp in &mut pose.keypoints {
                kp.score = kp.score.clamp(0.0, 1.0);
            }
            pose
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::crowd::Keypoint;

    fn raw(class: &str, score: f32, bbox: [f32; 4]) -> RawBoxDetection {
        RawBoxDetection {
            class: class.to_string(),
            score,
            bbox,
            track_id: None,
        }
    }

    #[test]
    fn test_filters_class_and_intake_threshold() {
        let options = AnalysisOptions::default(); // intake = 0.28
        let mut ids = DetectionIds::default();
        let boxes = vec![
            raw("person", 0.9, [100.0, 100.0, 50.0, 120.0]),
            raw("car", 0.9, [300.0, 100.0, 80.0, 60.0]),
            raw("person", 0.30, [400.0, 100.0, 50.0, 120.0]),
            raw("person", 0.20, [500.0, 100.0, 50.0, 120.0]),
            raw("Person", 0.5, [200.0, 200.0, 50.0, 120.0]),
        ];

        let candidates = normalize_boxes(&boxes, 1000, 1000, &options, &mut ids);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].id, "person-1");
        assert_eq!(candidates[1].confidence, 0.30);
        assert!(candidates.iter().all(|c| c.keypoints.is_none() && !c.is_overlapping));
    }

    #[test]
    fn test_other_classes_do_not_use_detection_budget() {
        let options = AnalysisOptions {
            max_detections: 2,
            ..AnalysisOptions::default()
        };
        let mut ids = DetectionIds::default();
        let boxes = vec![
            raw("bicycle", 0.9, [10.0, 10.0, 40.0, 40.0]),
            raw("bicycle", 0.9, [60.0, 10.0, 40.0, 40.0]),
            raw("person", 0.9, [100.0, 100.0, 50.0, 120.0]),
            raw("person", 0.8, [300.0, 100.0, 50.0, 120.0]),
            raw("person", 0.7, [500.0, 100.0, 50.0, 120.0]),
        ];
        let candidates = normalize_boxes(&boxes, 1000, 1000, &options, &mut ids);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].confidence, 0.9);
        assert_eq!(candidates[1].confidence, 0.8);
    }

    #[test]
    fn test_normalizes_to_frame() {
        let mut ids = DetectionIds::default();
        let boxes = vec![raw("person", 0.8, [64.0, 48.0, 64.0, 96.0])];
        let candidates =
            normalize_boxes(&boxes, 640, 480, &AnalysisOptions::default(), &mut ids);
        let b = candidates[0].bounding_box;
        assert!((b.x - 0.1).abs() < 1e-6);
        assert!((b.y - 0.1).abs() < 1e-6);
        assert!((b.width - 0.1).abs() < 1e-6);
        assert!((b.height - 0.2).abs() < 1e-6);
        assert!(candidates[0].is_fully_visible);
    }

    #[test]
    fn test_edge_boxes_not_fully_visible() {
        let mut ids = DetectionIds::default();
        let boxes = vec![
            raw("person", 0.8, [5.0, 100.0, 50.0, 100.0]),
            raw("person", 0.8, [950.0, 100.0, 80.0, 100.0]),
        ];
        let candidates =
            normalize_boxes(&boxes, 1000, 1000, &AnalysisOptions::default(), &mut ids);
        assert_eq!(candidates.len(), 2);
        assert!(!candidates[0].is_fully_visible);
        // Clipped to the right edge
        assert!(!candidates[1].is_fully_visible);
        assert!(candidates[1].bounding_box.right() <= 1.0);
    }

    #[test]
    fn test_malformed_boxes_dropped() {
        let mut ids = DetectionIds::default();
        let boxes = vec![
            raw("person", 0.8, [10.0, 10.0, 0.0, 50.0]),
            raw("person", 0.8, [10.0, 10.0, 50.0, -5.0]),
            raw("person", 0.8, [f32::NAN, 10.0, 50.0, 50.0]),
            raw("person", f32::NAN, [10.0, 10.0, 50.0, 50.0]),
            raw("person", 0.8, [2000.0, 10.0, 50.0, 50.0]),
        ];
        let candidates =
            normalize_boxes(&boxes, 1000, 1000, &AnalysisOptions::default(), &mut ids);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_sanitize_poses() {
        let poses = vec![
            RawPoseDetection {
                score: 1.4,
                keypoints: vec![
                    Keypoint::new("nose", 10.0, 10.0, 0.9),
                    Keypoint::new("left_eye", f32::NAN, 10.0, 0.9),
                ],
                track_id: None,
            },
            RawPoseDetection {
                score: 0.5,
                keypoints: vec![],
                track_id: None,
            },
        ];
        let cleaned = sanitize_poses(poses, 1);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].score, 1.0);
        assert_eq!(cleaned[0].keypoints.len(), 1);
    }
}
