use super::geometry::intersection_over_union;
use crate::options::PipelineTuning;
use common::crowd::Detection;

/// Flag people standing close together.
///
/// Every pair whose IoU falls strictly inside the overlap band marks both
/// detections `is_overlapping`. Nothing is merged here; the band sits below
/// the duplicate threshold. Returns the number of flagged pairs.
pub fn classify_overlaps(detections: &mut [Detection], tuning: &PipelineTuning) -> usize {
    let mut flagged_pairs = 0;

    for i in 0..detections.len() {
        for j in (i + 1)..detections.len() {
            let iou = intersection_over_union(
                &detections[i].bounding_box,
                &detections[j].bounding_box,
            );
            if iou > tuning.overlap_iou_min && iou < tuning.overlap_iou_max {
                detections[i].is_overlapping = true;
                detections[j].is_overlapping = true;
                flagged_pairs += 1;
            }
        }
    }

    flagged_pairs
}
