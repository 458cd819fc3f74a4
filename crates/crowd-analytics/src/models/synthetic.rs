//! Demo-mode models that fabricate a plausible crowd from a source key.
//!
//! Every frame's scene is seeded by `"{source_key}:{frame_tag}"`, where the
//! tag is the gray level of the frame's first pixel. `SyntheticFrameSource`
//! renders uniform frames whose gray level is the frame number, so the same
//! key and sample time always produce the same raw detections. Uniform frames
//! also pass through low-light enhancement untouched.

use super::{FrameSource, ObjectDetector, PoseEstimator};
use crate::error::{AnalysisError, AnalysisOutcome};
use crate::seeded::SeededSequence;
use async_trait::async_trait;
use common::crowd::{Keypoint, MediaKind, RawBoxDetection, RawPoseDetection, COCO_KEYPOINTS};
use image::{Rgb, RgbImage};

pub const DEMO_FRAME_WIDTH: u32 = 640;
pub const DEMO_FRAME_HEIGHT: u32 = 480;
/// Length of the synthetic clip in seconds
pub const CLIP_SECS: f64 = 10.0;
const CLIP_FPS: f64 = 10.0;

const POSE_RATE: f64 = 0.7;
const POSE_ONLY_RATE: f64 = 0.08;
const DUPLICATE_RATE: f64 = 0.12;
const OCCLUSION_RATE: f64 = 0.2;
const DISTRACTOR_RATE: f64 = 0.3;

/// Keypoint positions as fractions of the person box, in `COCO_KEYPOINTS` order
const KEYPOINT_LAYOUT: [(f32, f32); 17] = [
    (0.50, 0.06),
    (0.45, 0.04),
    (0.55, 0.04),
    (0.40, 0.05),
    (0.60, 0.05),
    (0.30, 0.20),
    (0.70, 0.20),
    (0.22, 0.35),
    (0.78, 0.35),
    (0.20, 0.48),
    (0.80, 0.48),
    (0.38, 0.52),
    (0.62, 0.52),
    (0.38, 0.72),
    (0.62, 0.72),
    (0.38, 0.95),
    (0.62, 0.95),
];

/// Range of people placed in one scene
fn crowd_size(kind: MediaKind) -> (usize, usize) {
    match kind {
        MediaKind::Image => (5, 40),
        MediaKind::Video => (8, 50),
        MediaKind::Live => (3, 30),
    }
}

/// Raw outputs of both models for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntheticScene {
    pub boxes: Vec<RawBoxDetection>,
    pub poses: Vec<RawPoseDetection>,
}

/// Seeded stand-in for the object detector and pose estimator
#[derive(Debug, Clone)]
pub struct SyntheticModels {
    source_key: String,
    kind: MediaKind,
}

impl SyntheticModels {
    pub fn new(source_key: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            source_key: source_key.into(),
            kind,
        }
    }

    /// Uniform frame carrying `tag` as its gray level
    pub fn tagged_frame(width: u32, height: u32, tag: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([tag, tag, tag]))
    }

    fn frame_tag(frame: &RgbImage) -> u8 {
        frame.get_pixel_checked(0, 0).map(|p| p[0]).unwrap_or(0)
    }

    /// Scene for `frame`; both model traits draw from this
    pub fn scene(&self, frame: &RgbImage) -> SyntheticScene {
        let (width, height) = frame.dimensions();
        let (w, h) = (width as f32, height as f32);
        let tag = Self::frame_tag(frame);
        let mut rng = SeededSequence::new(&format!("{}:{}", self.source_key, tag));

        let (low, high) = crowd_size(self.kind);
        let people = rng.range_inclusive(low, high);
        let group_count = rng.range_inclusive(1, 4);
        let groups: Vec<(f32, f32)> = (0..group_count)
            .map(|_| (rng.range(0.15, 0.85), rng.range(0.25, 0.75)))
            .collect();

        let mut scene = SyntheticScene::default();
        for i in 0..people {
            let (gx, gy) = groups[i % groups.len()];
            let bw = rng.range(0.03, 0.07);
            let bh = (bw * rng.range(2.0, 2.8)).min(0.5);
            let cx = gx + rng.range(-0.12, 0.12);
            let cy = gy + rng.range(-0.1, 0.1);
            let x = (cx - bw / 2.0).clamp(0.0, 1.0 - bw);
            let y = (cy - bh / 2.0).clamp(0.0, 1.0 - bh);
            let bbox = [x * w, y * h, bw * w, bh * h];
            let track_id = Some(format!("track-{}", i));

            let pose_only = rng.chance(POSE_ONLY_RATE);
            let has_pose = pose_only || rng.chance(POSE_RATE);

            if !pose_only {
                let score = rng.range(0.45, 0.95);
                scene.boxes.push(RawBoxDetection {
                    class: "person".to_string(),
                    score,
                    bbox,
                    track_id: track_id.clone(),
                });

                if rng.chance(DUPLICATE_RATE) {
                    let dx = rng.range(-0.01, 0.01) * w;
                    let dy = rng.range(-0.01, 0.01) * h;
                    let dup_score = (score - rng.range(0.0, 0.15)).max(0.45);
                    scene.boxes.push(RawBoxDetection {
                        class: "person".to_string(),
                        score: dup_score,
                        bbox: [bbox[0] + dx, bbox[1] + dy, bbox[2], bbox[3]],
                        track_id: None,
                    });
                }
            }

            if has_pose {
                scene.poses.push(synthesize_pose(&mut rng, bbox, track_id));
            }
        }

        if rng.chance(DISTRACTOR_RATE) {
            let bw = rng.range(0.08, 0.2);
            scene.boxes.push(RawBoxDetection {
                class: "bicycle".to_string(),
                score: rng.range(0.5, 0.9),
                bbox: [rng.range(0.0, 1.0 - bw) * w, rng.range(0.0, 0.8) * h, bw * w, 0.1 * h],
                track_id: None,
            });
        }

        scene
    }
}

fn synthesize_pose(
    rng: &mut SeededSequence,
    bbox: [f32; 4],
    track_id: Option<String>,
) -> RawPoseDetection {
    let [x, y, bw, bh] = bbox;
    let keypoints = COCO_KEYPOINTS
        .iter()
        .zip(KEYPOINT_LAYOUT)
        .map(|(name, (fx, fy))| {
            let kx = x + (fx + rng.range(-0.03, 0.03)) * bw;
            let ky = y + (fy + rng.range(-0.02, 0.02)) * bh;
            let score = if rng.chance(OCCLUSION_RATE) {
                rng.range(0.05, 0.25)
            } else {
                rng.range(0.4, 0.95)
            };
            Keypoint::new(*name, kx, ky, score)
        })
        .collect();

    RawPoseDetection {
        score: rng.range(0.5, 0.95),
        keypoints,
        track_id,
    }
}

#[async_trait]
impl ObjectDetector for SyntheticModels {
    fn id(&self) -> &'static str {
        "synthetic"
    }

    async fn detect(
        &self,
        frame: &RgbImage,
        max_detections: usize,
    ) -> AnalysisOutcome<Vec<RawBoxDetection>> {
        let mut boxes = self.scene(frame).boxes;
        boxes.truncate(max_detections);
        Ok(boxes)
    }
}

#[async_trait]
impl PoseEstimator for SyntheticModels {
    fn id(&self) -> &'static str {
        "synthetic"
    }

    async fn estimate_poses(
        &self,
        frame: &RgbImage,
        max_poses: usize,
    ) -> AnalysisOutcome<Vec<RawPoseDetection>> {
        let mut poses = self.scene(frame).poses;
        poses.truncate(max_poses);
        Ok(poses)
    }
}

/// Seekable demo clip paired with `SyntheticModels`
#[derive(Debug, Clone)]
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    live: bool,
    frame_number: u8,
}

impl SyntheticFrameSource {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            width: DEMO_FRAME_WIDTH,
            height: DEMO_FRAME_HEIGHT,
            live: kind == MediaKind::Live,
            frame_number: 0,
        }
    }

    pub fn frame_number(&self) -> u8 {
        self.frame_number
    }
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn duration_secs(&self) -> Option<f64> {
        (!self.live).then_some(CLIP_SECS)
    }

    async fn seek(&mut self, secs: f64) -> AnalysisOutcome<()> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(AnalysisError::InvalidSource(format!("cannot seek to {}", secs)));
        }
        if !self.live {
            self.frame_number = (secs.min(CLIP_SECS) * CLIP_FPS).floor() as u8;
        }
        Ok(())
    }

    fn current_frame(&self) -> AnalysisOutcome<RgbImage> {
        Ok(SyntheticModels::tagged_frame(
            self.width,
            self.height,
            self.frame_number,
        ))
    }
}
