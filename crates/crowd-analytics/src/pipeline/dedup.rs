//! Collapse duplicate detections of the same person.

use super::geometry::intersection_over_union;
use crate::options::AnalysisOptions;
use common::crowd::Detection;
use std::cmp::Ordering;

fn by_confidence_desc(a: &Detection, b: &Detection) -> Ordering {
    b.confidence.total_cmp(&a.confidence)
}

/// Should `incoming` take the place of the already accepted `kept`?
fn should_replace(kept: &Detection, incoming: &Detection, margin: f32) -> bool {
    if incoming.confidence > kept.confidence + margin {
        return true;
    }
    (incoming.confidence - kept.confidence).abs() <= margin
        && incoming.keypoint_count() > kept.keypoint_count()
}

/// One greedy walk over `detections` sorted by confidence.
/// Returns the unique detections and whether anything was merged.
fn merge_pass(mut detections: Vec<Detection>, options: &AnalysisOptions) -> (Vec<Detection>, bool) {
    let tuning = &options.tuning;
    detections.sort_by(by_confidence_desc);

    let mut unique: Vec<Detection> = Vec::with_capacity(detections.len());
    let mut merged_any = false;

    for incoming in detections {
        let duplicate_of = unique.iter().position(|kept| {
            intersection_over_union(&kept.bounding_box, &incoming.bounding_box)
                > tuning.duplicate_iou
        });

        let Some(idx) = duplicate_of else {
            unique.push(incoming);
            continue;
        };

        merged_any = true;
        let kept = &mut unique[idx];
        let overlapping = kept.is_overlapping || incoming.is_overlapping;

        if should_replace(kept, &incoming, tuning.replace_margin) {
            *kept = incoming;
        } else if kept.keypoints.is_none() && incoming.keypoints.is_some() {
            kept.keypoints = incoming.keypoints;
        }
        kept.is_overlapping = overlapping;
    }

    (unique, merged_any)
}

/// Reduce fused detections to distinct people above the acceptance threshold.
///
/// Merging repeats until no two survivors exceed the duplicate IoU, so the
/// result is a fixed point: deduplicating it again changes nothing. People
/// flagged as overlapping survive down to the relaxed overlap threshold.
/// Output is ordered by confidence, highest first.
pub fn deduplicate(detections: Vec<Detection>, options: &AnalysisOptions) -> Vec<Detection> {
    let mut current = detections;
    loop {
        let (unique, merged_any) = merge_pass(current, options);
        current = unique;
        if !merged_any {
            break;
        }
    }

    let threshold = options.confidence_threshold;
    let overlap_threshold = options.overlap_threshold();
    current.retain(|d| {
        d.confidence >= threshold || (d.is_overlapping && d.confidence >= overlap_threshold)
    });
    current.sort_by(by_confidence_desc);
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::crowd::{BoundingBox, Keypoint};

    fn person(id: &str, x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Detection {
        Detection {
            id: id.to_string(),
            bounding_box: BoundingBox::new(x, y, w, h),
            confidence,
            keypoints: None,
            is_fully_visible: true,
            is_overlapping: false,
            track_id: None,
        }
    }

    fn keypoints(n: usize) -> Option<Vec<Keypoint>> {
        Some(
            (0..n)
                .map(|i| Keypoint::new("nose", i as f32, i as f32, 0.9))
                .collect(),
        )
    }

    #[test]
    fn test_identical_boxes_collapse_to_one() {
        let people = vec![
            person("person-1", 0.1, 0.1, 0.1, 0.1, 0.8),
            person("person-2", 0.1, 0.1, 0.1, 0.1, 0.7),
        ];
        let unique = deduplicate(people, &AnalysisOptions::default());
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].id, "person-1");
    }

    #[test]
    fn test_high_iou_always_merges() {
        // IoU ~0.9
        let people = vec![
            person("a", 0.1, 0.1, 0.2, 0.2, 0.9),
            person("b", 0.11, 0.1, 0.2, 0.2, 0.85),
        ];
        let unique = deduplicate(people, &AnalysisOptions::default());
        assert_eq!(unique.len(), 1);
    }

    #[test]
    fn test_overlap_band_keeps_both() {
        // IoU = 1/3: distinct people standing close together
        let mut people = vec![
            person("a", 0.0, 0.0, 0.1, 0.1, 0.8),
            person("b", 0.0, 0.05, 0.1, 0.1, 0.8),
        ];
        super::super::overlap::classify_overlaps(&mut people, &AnalysisOptions::default().tuning);
        let unique = deduplicate(people, &AnalysisOptions::default());
        assert_eq!(unique.len(), 2);
        assert!(unique.iter().all(|d| d.is_overlapping));
    }

    #[test]
    fn test_much_more_confident_duplicate_wins() {
        let people = vec![
            person("weak", 0.1, 0.1, 0.1, 0.1, 0.5),
            person("strong", 0.1, 0.1, 0.1, 0.1, 0.9),
        ];
        let unique = deduplicate(people, &AnalysisOptions::default());
        assert_eq!(unique[0].id, "strong");
    }

    #[test]
    fn test_richer_keypoints_break_near_ties() {
        let mut bare = person("bare", 0.1, 0.1, 0.1, 0.1, 0.82);
        bare.is_overlapping = true;
        let mut posed = person("posed", 0.1, 0.1, 0.1, 0.1, 0.78);
        posed.keypoints = keypoints(5);

        let unique = deduplicate(vec![bare, posed], &AnalysisOptions::default());
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].id, "posed");
        assert_eq!(unique[0].keypoint_count(), 5);
        assert!(unique[0].is_overlapping);
    }

    #[test]
    fn test_kept_detection_inherits_keypoints() {
        let strong = person("strong", 0.1, 0.1, 0.1, 0.1, 0.95);
        let mut weak = person("weak", 0.1, 0.1, 0.1, 0.1, 0.6);
        weak.keypoints = keypoints(4);
        weak.is_overlapping = true;

        let unique = deduplicate(vec![strong, weak], &AnalysisOptions::default());
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].id, "strong");
        assert_eq!(unique[0].keypoint_count(), 4);
        assert!(unique[0].is_overlapping);
    }

    #[test]
    fn test_threshold_filter_relaxed_for_overlapping() {
        let options = AnalysisOptions::default(); // 0.35, overlapping 0.315
        let mut crowded = person("crowded", 0.1, 0.1, 0.1, 0.1, 0.33);
        crowded.is_overlapping = true;
        let isolated = person("isolated", 0.6, 0.6, 0.1, 0.1, 0.33);
        let mut too_weak = person("too-weak", 0.3, 0.3, 0.1, 0.1, 0.30);
        too_weak.is_overlapping = true;

        let unique = deduplicate(vec![crowded, isolated, too_weak], &options);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].id, "crowded");
    }

    #[test]
    fn test_deduplicate_is_idempotent() {
        let options = AnalysisOptions::default();
        let mut people = vec![
            person("a", 0.10, 0.10, 0.1, 0.2, 0.9),
            person("b", 0.11, 0.10, 0.1, 0.2, 0.85),
            person("c", 0.15, 0.10, 0.1, 0.2, 0.80),
            person("d", 0.20, 0.12, 0.1, 0.2, 0.60),
            person("e", 0.50, 0.50, 0.1, 0.1, 0.70),
            person("f", 0.50, 0.50, 0.1, 0.1, 0.65),
            person("g", 0.80, 0.10, 0.1, 0.1, 0.20),
        ];
        people[3].keypoints = keypoints(6);
        super::super::overlap::classify_overlaps(&mut people, &options.tuning);

        let once = deduplicate(people, &options);
        let twice = deduplicate(once.clone(), &options);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_output_sorted_by_confidence() {
        let people = vec![
            person("a", 0.1, 0.1, 0.1, 0.1, 0.5),
            person("b", 0.5, 0.5, 0.1, 0.1, 0.9),
            person("c", 0.8, 0.1, 0.1, 0.1, 0.7),
        ];
        let unique = deduplicate(people, &AnalysisOptions::default());
        let ids: Vec<_> = unique.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(vec![], &AnalysisOptions::default()).is_empty());
    }
}
