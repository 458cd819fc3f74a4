//! Cross-model fusion of detector boxes with pose estimator evidence.
//!
//! A detector box that overlaps one or more accepted poses gets its confidence
//! averaged with theirs and inherits the keypoints of the strongest pose.
//! Boxes no pose confirms take a small penalty. Accepted poses that matched
//! no box become people of their own.

use super::geometry::intersection_over_union;
use super::normalizer::is_fully_visible;
use super::DetectionIds;
use crate::options::AnalysisOptions;
use common::crowd::{BoundingBox, Detection, RawPoseDetection};
use tracing::debug;

/// A pose that passed the keypoint-count and anatomy checks
#[derive(Debug, Clone)]
pub struct PoseEvidence<'a> {
    pub pose: &'a RawPoseDetection,
    /// Normalized box around the qualifying keypoints
    pub keypoint_box: BoundingBox,
    pub qualifying_keypoints: usize,
    pub mean_keypoint_score: f32,
}

impl PoseEvidence<'_> {
    /// Share of the pose's keypoints that qualified
    pub fn coverage(&self) -> f32 {
        if self.pose.keypoints.is_empty() {
            return 0.0;
        }
        self.qualifying_keypoints as f32 / self.pose.keypoints.len() as f32
    }

    /// Confidence for a person seen only by the pose estimator
    pub fn standalone_confidence(&self) -> f32 {
        ((self.pose.score + self.mean_keypoint_score + self.coverage()) / 3.0).clamp(0.0, 1.0)
    }
}

/// Counts of each fusion decision in one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionReport {
    pub confirmed: usize,
    pub unconfirmed: usize,
    pub promoted: usize,
    pub rejected_poses: usize,
}

impl FusionReport {
    fn record_metrics(&self) {
        let outcomes = [
            ("confirmed", self.confirmed),
            ("unconfirmed", self.unconfirmed),
            ("promoted", self.promoted),
            ("rejected_pose", self.rejected_poses),
        ];
        for (outcome, count) in outcomes {
            if count > 0 {
                telemetry::metrics::CROWD_FUSION_OUTCOMES
                    .with_label_values(&[outcome])
                    .inc_by(count as u64);
            }
        }
    }
}

/// Check a pose for minimum keypoint and anatomical evidence.
///
/// Returns `None` when fewer than `min_keypoints` keypoints qualify, or when
/// the pose has neither a confident head keypoint nor a shoulder.
pub fn qualify_pose<'a>(
    pose: &'a RawPoseDetection,
    frame_width: u32,
    frame_height: u32,
    options: &AnalysisOptions,
) -> Option<PoseEvidence<'a>> {
    let tuning = &options.tuning;
    let qualifying: Vec<_> = pose
        .keypoints
        .iter()
        .filter(|kp| kp.score > tuning.keypoint_score)
        .collect();

    if qualifying.len() < options.min_keypoints {
        return None;
    }

    let has_head = pose
        .keypoints
        .iter()
        .any(|kp| kp.is_head() && kp.score > tuning.head_score);
    let has_torso = pose
        .keypoints
        .iter()
        .any(|kp| kp.is_shoulder() && kp.score > tuning.torso_score);
    if !has_head && !has_torso {
        return None;
    }

    let (min_x, min_y, max_x, max_y) = qualifying.iter().fold(
        (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
        |(min_x, min_y, max_x, max_y), kp| {
            (min_x.min(kp.x), min_y.min(kp.y), max_x.max(kp.x), max_y.max(kp.y))
        },
    );

    // At least one pixel of extent so collinear keypoints still form a box
    let px = [min_x, min_y, (max_x - min_x).max(1.0), (max_y - min_y).max(1.0)];
    let keypoint_box = BoundingBox::from_pixels(px, frame_width, frame_height).clamp_to_unit()?;

    let mean_keypoint_score =
        qualifying.iter().map(|kp| kp.score).sum::<f32>() / qualifying.len() as f32;

    Some(PoseEvidence {
        pose,
        keypoint_box,
        qualifying_keypoints: qualifying.len(),
        mean_keypoint_score,
    })
}

/// Reconcile candidate boxes with pose evidence.
///
/// Output is the validated candidates, in input order, followed by people
/// promoted from unmatched poses.
pub fn fuse(
    candidates: Vec<Detection>,
    poses: &[RawPoseDetection],
    frame_width: u32,
    frame_height: u32,
    options: &AnalysisOptions,
    ids: &mut DetectionIds,
) -> (Vec<Detection>, FusionReport) {
    let tuning = &options.tuning;
    let mut report = FusionReport::default();

    let evidence: Vec<PoseEvidence> = poses
        .iter()
        .filter_map(|pose| {
            let qualified = qualify_pose(pose, frame_width, frame_height, options);
            if qualified.is_none() {
                report.rejected_poses += 1;
            }
            qualified
        })
        .collect();

    let mut matched = vec![false; evidence.len()];
    let mut fused = Vec::with_capacity(candidates.len() + evidence.len());

    for mut candidate in candidates {
        let matches: Vec<usize> = evidence
            .iter()
            .enumerate()
            .filter(|(_, ev)| {
                intersection_over_union(&candidate.bounding_box, &ev.keypoint_box)
                    > tuning.pose_match_iou
            })
            .map(|(idx, _)| idx)
            .collect();

        if matches.is_empty() {
            candidate.confidence *= tuning.unconfirmed_penalty;
            report.unconfirmed += 1;
            fused.push(candidate);
            continue;
        }

        let mean_pose_score =
            matches.iter().map(|&i| evidence[i].pose.score).sum::<f32>() / matches.len() as f32;
        candidate.confidence = ((candidate.confidence + mean_pose_score) / 2.0).clamp(0.0, 1.0);

        // First of equal scores wins
        let strongest = matches.iter().copied().fold(matches[0], |best, i| {
            if evidence[i].pose.score > evidence[best].pose.score {
                i
            } else {
                best
            }
        });
        candidate.keypoints = Some(evidence[strongest].pose.keypoints.clone());
        if candidate.track_id.is_none() {
            candidate.track_id = evidence[strongest].pose.track_id.clone();
        }

        for &i in &matches {
            matched[i] = true;
        }
        report.confirmed += 1;
        fused.push(candidate);
    }

    for (ev, _) in evidence
        .iter()
        .zip(&matched)
        .filter(|(_, is_matched)| !**is_matched)
    {
        let bounding_box = ev.keypoint_box.expand(tuning.pose_box_expansion);
        fused.push(Detection {
            id: ids.next_id(),
            bounding_box,
            confidence: ev.standalone_confidence(),
            keypoints: Some(ev.pose.keypoints.clone()),
            is_fully_visible: is_fully_visible(&bounding_box, tuning.visibility_margin),
            is_overlapping: false,
            track_id: ev.pose.track_id.clone(),
        });
        report.promoted += 1;
    }

    debug!(
        confirmed = report.confirmed,
        unconfirmed = report.unconfirmed,
        promoted = report.promoted,
        rejected_poses = report.rejected_poses,
        "fused detector and pose evidence"
    );
    report.record_metrics();

    (fused, report)
}
