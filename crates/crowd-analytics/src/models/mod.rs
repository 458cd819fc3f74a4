//! Seams to the external inference models and media sources.
//!
//! The object detector and pose estimator run elsewhere; this crate only
//! consumes their raw outputs through these traits.

pub mod precomputed;
pub mod synthetic;

use crate::error::AnalysisOutcome;
use async_trait::async_trait;
use common::crowd::{MediaKey, RawBoxDetection, RawPoseDetection};
use image::RgbImage;
use std::sync::Arc;

pub use precomputed::{FrameSequence, PrecomputedModels};
pub use synthetic::{SyntheticFrameSource, SyntheticModels};

/// Bounding-box object detector
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Stable identifier used in logs
    fn id(&self) -> &'static str;

    /// Raw boxes in pixel space, at most `max_detections`
    async fn detect(
        &self,
        frame: &RgbImage,
        max_detections: usize,
    ) -> AnalysisOutcome<Vec<RawBoxDetection>>;
}

/// Keypoint-based pose estimator
#[async_trait]
pub trait PoseEstimator: Send + Sync {
    fn id(&self) -> &'static str;

    async fn estimate_poses(
        &self,
        frame: &RgbImage,
        max_poses: usize,
    ) -> AnalysisOutcome<Vec<RawPoseDetection>>;
}

/// Seekable source of decoded frames (video file or live stream)
#[async_trait]
pub trait FrameSource: Send {
    /// Frame width and height in pixels
    fn dimensions(&self) -> (u32, u32);

    /// Clip length in seconds, `None` for live sources
    fn duration_secs(&self) -> Option<f64>;

    /// Move the playback position; resolves once the frame at `secs` is ready
    async fn seek(&mut self, secs: f64) -> AnalysisOutcome<()>;

    /// Frame at the current playback position
    fn current_frame(&self) -> AnalysisOutcome<RgbImage>;
}

/// Media resolved from a media id
pub enum MediaSource {
    Image(RgbImage),
    Video(Box<dyn FrameSource>),
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaSource::Image(frame) => f
                .debug_tuple("Image")
                .field(&frame.dimensions())
                .finish(),
            MediaSource::Video(source) => f
                .debug_struct("Video")
                .field("dimensions", &source.dimensions())
                .field("duration_secs", &source.duration_secs())
                .finish(),
        }
    }
}

/// Resolves media ids to decodable sources
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// `Ok(None)` when the store does not know the id
    async fn open(&self, key: &MediaKey) -> AnalysisOutcome<Option<MediaSource>>;
}

/// Detector plus optional pose estimator used for one analysis
#[derive(Clone)]
pub struct ModelSet {
    pub detector: Arc<dyn ObjectDetector>,
    pub pose_estimator: Option<Arc<dyn PoseEstimator>>,
}

impl ModelSet {
    pub fn new(detector: Arc<dyn ObjectDetector>) -> Self {
        Self {
            detector,
            pose_estimator: None,
        }
    }

    pub fn with_pose_estimator(mut self, estimator: Arc<dyn PoseEstimator>) -> Self {
        self.pose_estimator = Some(estimator);
        self
    }

    /// Use one value implementing both model traits
    pub fn from_combined<M>(models: Arc<M>) -> Self
    where
        M: ObjectDetector + PoseEstimator + 'static,
    {
        Self {
            detector: models.clone(),
            pose_estimator: Some(models),
        }
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet")
            .field("detector", &self.detector.id())
            .field(
                "pose_estimator",
                &self.pose_estimator.as_ref().map(|p| p.id()),
            )
            .finish()
    }
}
