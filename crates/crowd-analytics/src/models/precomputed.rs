/// Model outputs and frames supplied up front by the caller
use super::{FrameSource, ObjectDetector, PoseEstimator};
use crate::error::{AnalysisError, AnalysisOutcome};
use async_trait::async_trait;
use common::crowd::{RawBoxDetection, RawPoseDetection};
use image::RgbImage;

/// Replays raw detector and pose outputs computed out of process
#[derive(Debug, Clone, Default)]
pub struct PrecomputedModels {
    boxes: Vec<RawBoxDetection>,
    poses: Vec<RawPoseDetection>,
}

impl PrecomputedModels {
    pub fn new(boxes: Vec<RawBoxDetection>, poses: Vec<RawPoseDetection>) -> Self {
        Self { boxes, poses }
    }
}

#[async_trait]
impl ObjectDetector for PrecomputedModels {
    fn id(&self) -> &'static str {
        "precomputed"
    }

    async fn detect(
        &self,
        _frame: &RgbImage,
        max_detections: usize,
    ) -> AnalysisOutcome<Vec<RawBoxDetection>> {
        Ok(self.boxes.iter().take(max_detections).cloned().collect())
    }
}

#[async_trait]
impl PoseEstimator for PrecomputedModels {
    fn id(&self) -> &'static str {
        "precomputed"
    }

    async fn estimate_poses(
        &self,
        _frame: &RgbImage,
        max_poses: usize,
    ) -> AnalysisOutcome<Vec<RawPoseDetection>> {
        Ok(self.poses.iter().take(max_poses).cloned().collect())
    }
}

/// In-memory clip of timestamped frames.
///
/// Seeking lands on the last frame at or before the requested time.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<(f64, RgbImage)>,
    duration_secs: Option<f64>,
    position: usize,
}

impl FrameSequence {
    /// Frames must share one size; they are ordered by timestamp
    pub fn new(mut frames: Vec<(f64, RgbImage)>, duration_secs: f64) -> AnalysisOutcome<Self> {
        let Some((_, first)) = frames.first() else {
            return Err(AnalysisError::InvalidSource("frame sequence is empty".to_string()));
        };
        let dims = first.dimensions();
        if frames.iter().any(|(_, f)| f.dimensions() != dims) {
            return Err(AnalysisError::InvalidSource(
                "frames differ in size".to_string(),
            ));
        }
        if !(duration_secs.is_finite() && duration_secs >= 0.0) {
            return Err(AnalysisError::InvalidSource(format!(
                "invalid duration {}",
                duration_secs
            )));
        }
        frames.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self {
            frames,
            duration_secs: Some(duration_secs),
            position: 0,
        })
    }

    /// A live source: no duration, always shows its latest frame
    pub fn live(frame: RgbImage) -> Self {
        Self {
            frames: vec![(0.0, frame)],
            duration_secs: None,
            position: 0,
        }
    }

    /// Index of the frame currently shown
    pub fn position(&self) -> usize {
        self.position
    }
}

#[async_trait]
impl FrameSource for FrameSequence {
    fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(|(_, frame)| frame.dimensions())
            .unwrap_or((0, 0))
    }

    fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    async fn seek(&mut self, secs: f64) -> AnalysisOutcome<()> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(AnalysisError::InvalidSource(format!("cannot seek to {}", secs)));
        }
        self.position = self
            .frames
            .iter()
            .rposition(|(ts, _)| *ts <= secs)
            .unwrap_or(0);
        Ok(())
    }

    fn current_frame(&self) -> AnalysisOutcome<RgbImage> {
        self.frames
            .get(self.position)
            .map(|(_, frame)| frame.clone())
            .ok_or_else(|| AnalysisError::InvalidSource("no frame at position".to_string()))
    }
}
