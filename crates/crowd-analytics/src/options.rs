/// Analysis options and pipeline tuning constants
use anyhow::{anyhow, Context, Result};
use common::validation::validate_range;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// IoU above which two detections are the same person
pub const DUPLICATE_IOU: f32 = 0.4;
/// Lower (exclusive) bound of the distinct-but-overlapping band
pub const OVERLAP_IOU_MIN: f32 = 0.1;
/// Upper (exclusive) bound of the distinct-but-overlapping band
pub const OVERLAP_IOU_MAX: f32 = 0.5;
/// IoU above which a pose confirms a detector box
pub const POSE_MATCH_IOU: f32 = 0.2;
/// Keypoints must score above this to count
pub const KEYPOINT_SCORE: f32 = 0.3;
/// Head keypoints must score above this to count as anatomical evidence
pub const HEAD_SCORE: f32 = 0.5;
/// Shoulder keypoints must score above this to count as anatomical evidence
pub const TORSO_SCORE: f32 = 0.3;
/// Max minus min intensity (0-255) at or below which a frame is treated as
/// low-light. Arbitrary: kept for behavioral parity, never calibrated.
pub const LOW_LIGHT_SPREAD: u8 = 100;
pub const LOW_LIGHT_GAMMA: f32 = 0.8;
/// Margin each box edge must keep from the frame edge to be fully visible
pub const VISIBILITY_MARGIN: f32 = 0.02;
/// Radius (normalized) within which a center joins a cluster
pub const CLUSTER_RADIUS: f32 = 0.15;
/// Clusters closer than `CLUSTER_RADIUS * CLUSTER_MERGE_FACTOR` are merged
pub const CLUSTER_MERGE_FACTOR: f32 = 1.5;
/// Confidence multiplier for detector boxes no pose confirmed
pub const UNCONFIRMED_PENALTY: f32 = 0.95;
/// Fraction of the confidence threshold used when admitting raw boxes
pub const INTAKE_FACTOR: f32 = 0.8;
/// Fraction of the confidence threshold overlapping people must reach
pub const OVERLAP_SURVIVAL_FACTOR: f32 = 0.9;
/// Per-side growth applied to keypoint boxes of promoted poses
pub const POSE_BOX_EXPANSION: f32 = 0.1;
/// Confidence gap beyond which a duplicate replaces the accepted detection
pub const REPLACE_MARGIN: f32 = 0.1;

/// Tunable thresholds of the fusion, dedup and clustering stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineTuning {
    pub duplicate_iou: f32,
    pub overlap_iou_min: f32,
    pub overlap_iou_max: f32,
    pub pose_match_iou: f32,
    pub keypoint_score: f32,
    pub head_score: f32,
    pub torso_score: f32,
    pub low_light_spread: u8,
    pub low_light_gamma: f32,
    pub visibility_margin: f32,
    pub cluster_radius: f32,
    pub cluster_merge_factor: f32,
    pub unconfirmed_penalty: f32,
    pub intake_factor: f32,
    pub overlap_survival_factor: f32,
    pub pose_box_expansion: f32,
    pub replace_margin: f32,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            duplicate_iou: DUPLICATE_IOU,
            overlap_iou_min: OVERLAP_IOU_MIN,
            overlap_iou_max: OVERLAP_IOU_MAX,
            pose_match_iou: POSE_MATCH_IOU,
            keypoint_score: KEYPOINT_SCORE,
            head_score: HEAD_SCORE,
            torso_score: TORSO_SCORE,
            low_light_spread: LOW_LIGHT_SPREAD,
            low_light_gamma: LOW_LIGHT_GAMMA,
            visibility_margin: VISIBILITY_MARGIN,
            cluster_radius: CLUSTER_RADIUS,
            cluster_merge_factor: CLUSTER_MERGE_FACTOR,
            unconfirmed_penalty: UNCONFIRMED_PENALTY,
            intake_factor: INTAKE_FACTOR,
            overlap_survival_factor: OVERLAP_SURVIVAL_FACTOR,
            pose_box_expansion: POSE_BOX_EXPANSION,
            replace_margin: REPLACE_MARGIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Final acceptance threshold for people (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// Stretch and gamma-correct flat, dark frames before detection
    #[serde(default = "default_true")]
    pub enhance_low_light: bool,

    /// Maximum number of boxes requested from the object detector
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Maximum number of poses requested from the pose estimator
    #[serde(default = "default_max_poses")]
    pub max_poses: usize,

    /// Fuse pose estimator output with detector boxes
    #[serde(default = "default_true")]
    pub use_multiple_models: bool,

    /// Minimum qualifying keypoints for a pose to count as a person
    #[serde(default = "default_min_keypoints")]
    pub min_keypoints: usize,

    /// Sampling rate cap (frames per second of video) for the frame selector
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,

    /// Longest span of video sampled, in seconds
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f64,

    /// Number of frames sampled from a video (1 to 10)
    #[serde(default = "default_sample_frames")]
    pub sample_frames: usize,

    #[serde(default)]
    pub tuning: PipelineTuning,
}

fn default_confidence() -> f32 {
    0.35
}

fn default_true() -> bool {
    true
}

fn default_max_detections() -> usize {
    200
}

fn default_max_poses() -> usize {
    50
}

fn default_min_keypoints() -> usize {
    3
}

fn default_frame_rate() -> f32 {
    1.0
}

fn default_max_duration() -> f64 {
    30.0
}

fn default_sample_frames() -> usize {
    5
}

pub const MAX_SAMPLE_FRAMES: usize = 10;

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence(),
            enhance_low_light: true,
            max_detections: default_max_detections(),
            max_poses: default_max_poses(),
            use_multiple_models: true,
            min_keypoints: default_min_keypoints(),
            frame_rate: default_frame_rate(),
            max_duration_secs: default_max_duration(),
            sample_frames: default_sample_frames(),
            tuning: PipelineTuning::default(),
        }
    }
}

impl AnalysisOptions {
    /// Parse a JSON options object, `null` meaning all defaults
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let options: Self = if value.is_null() {
            Self::default()
        } else {
            serde_json::from_value(value).context("Invalid analysis options")?
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        validate_range(self.confidence_threshold, 0.0, 1.0, "confidence_threshold")?;
        validate_range(self.max_detections, 1, 10_000, "max_detections")?;
        validate_range(self.max_poses, 1, 10_000, "max_poses")?;
        validate_range(self.min_keypoints, 1, 17, "min_keypoints")?;
        validate_range(self.sample_frames, 1, MAX_SAMPLE_FRAMES, "sample_frames")?;
        if !(self.frame_rate > 0.0 && self.frame_rate.is_finite()) {
            return Err(anyhow!("frame_rate must be positive, got {}", self.frame_rate));
        }
        if !(self.max_duration_secs > 0.0 && self.max_duration_secs.is_finite()) {
            return Err(anyhow!(
                "max_duration_secs must be positive, got {}",
                self.max_duration_secs
            ));
        }

        let t = &self.tuning;
        validate_range(t.duplicate_iou, 0.0, 1.0, "tuning.duplicate_iou")?;
        validate_range(t.overlap_iou_min, 0.0, 1.0, "tuning.overlap_iou_min")?;
        validate_range(t.overlap_iou_max, t.overlap_iou_min, 1.0, "tuning.overlap_iou_max")?;
        validate_range(t.pose_match_iou, 0.0, 1.0, "tuning.pose_match_iou")?;
        validate_range(t.low_light_gamma, 0.05, 5.0, "tuning.low_light_gamma")?;
        validate_range(t.cluster_radius, 0.0, 1.5, "tuning.cluster_radius")?;
        validate_range(t.unconfirmed_penalty, 0.0, 1.0, "tuning.unconfirmed_penalty")?;
        Ok(())
    }

    /// Apply `CROWD_*` environment overrides on top of the current values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        override_from_env("CROWD_CONFIDENCE_THRESHOLD", &mut self.confidence_threshold)?;
        override_from_env("CROWD_ENHANCE_LOW_LIGHT", &mut self.enhance_low_light)?;
        override_from_env("CROWD_MAX_DETECTIONS", &mut self.max_detections)?;
        override_from_env("CROWD_USE_MULTIPLE_MODELS", &mut self.use_multiple_models)?;
        override_from_env("CROWD_MIN_KEYPOINTS", &mut self.min_keypoints)?;
        override_from_env("CROWD_FRAME_RATE", &mut self.frame_rate)?;
        override_from_env("CROWD_MAX_DURATION_SECS", &mut self.max_duration_secs)?;
        override_from_env("CROWD_SAMPLE_FRAMES", &mut self.sample_frames)?;
        self.validate()
    }

    /// Intake threshold for raw detector boxes
    pub fn intake_threshold(&self) -> f32 {
        self.confidence_threshold * self.tuning.intake_factor
    }

    /// Acceptance threshold for people flagged as overlapping
    pub fn overlap_threshold(&self) -> f32 {
        self.confidence_threshold * self.tuning.overlap_survival_factor
    }
}

fn override_from_env<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {} '{}': {}", name, raw, e))?;
    }
    Ok(())
}

/// JSON Schema for `AnalysisOptions`
pub fn config_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "confidence_threshold": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0,
                "default": 0.35,
                "description": "Final acceptance threshold for detected people"
            },
            "enhance_low_light": {
                "type": "boolean",
                "default": true,
                "description": "Auto-levels and gamma correction for flat, dark frames"
            },
            "max_detections": {
                "type": "integer",
                "minimum": 1,
                "default": 200,
                "description": "Maximum boxes requested from the object detector"
            },
            "max_poses": {
                "type": "integer",
                "minimum": 1,
                "default": 50,
                "description": "Maximum poses requested from the pose estimator"
            },
            "use_multiple_models": {
                "type": "boolean",
                "default": true,
                "description": "Fuse pose estimator evidence with detector boxes"
            },
            "min_keypoints": {
                "type": "integer",
                "minimum": 1,
                "maximum": 17,
                "default": 3,
                "description": "Minimum qualifying keypoints for a pose to count"
            },
            "frame_rate": {
                "type": "number",
                "exclusiveMinimum": 0.0,
                "default": 1.0,
                "description": "Maximum sampled frames per second of video"
            },
            "max_duration_secs": {
                "type": "number",
                "exclusiveMinimum": 0.0,
                "default": 30.0,
                "description": "Longest span of video sampled, in seconds"
            },
            "sample_frames": {
                "type": "integer",
                "minimum": 1,
                "maximum": 10,
                "default": 5,
                "description": "Number of frames sampled from a video"
            },
            "tuning": {
                "type": "object",
                "description": "Fusion, dedup and clustering thresholds"
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let options = AnalysisOptions::default();
        assert_eq!(options.confidence_threshold, 0.35);
        assert!(options.enhance_low_light);
        assert_eq!(options.max_detections, 200);
        assert!(options.use_multiple_models);
        assert_eq!(options.min_keypoints, 3);
        assert_eq!(options.sample_frames, 5);
        assert_eq!(options.max_duration_secs, 30.0);
        assert_eq!(options.tuning.duplicate_iou, 0.4);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let options = AnalysisOptions::from_json(serde_json::json!({
            "confidence_threshold": 0.5,
            "tuning": { "duplicate_iou": 0.6 }
        }))
        .unwrap();
        assert_eq!(options.confidence_threshold, 0.5);
        assert_eq!(options.max_detections, 200);
        assert_eq!(options.tuning.duplicate_iou, 0.6);
        assert_eq!(options.tuning.pose_match_iou, 0.2);
    }

    #[test]
    fn test_null_json_is_default() {
        let options = AnalysisOptions::from_json(serde_json::Value::Null).unwrap();
        assert_eq!(options, AnalysisOptions::default());
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(AnalysisOptions::from_json(serde_json::json!({ "confidence_threshold": 1.5 })).is_err());
        assert!(AnalysisOptions::from_json(serde_json::json!({ "sample_frames": 0 })).is_err());
        assert!(AnalysisOptions::from_json(serde_json::json!({ "sample_frames": 11 })).is_err());
        assert!(AnalysisOptions::from_json(serde_json::json!({ "frame_rate": 0.0 })).is_err());
    }

    #[test]
    fn test_derived_thresholds() {
        let options = AnalysisOptions::default();
        assert!((options.intake_threshold() - 0.28).abs() < 1e-6);
        assert!((options.overlap_threshold() - 0.315).abs() < 1e-6);
    }

    #[test]
    fn test_schema_lists_every_option() {
        let schema = config_schema();
        let properties = schema["properties"].as_object().unwrap();
        for key in [
            "confidence_threshold",
            "enhance_low_light",
            "max_detections",
            "use_multiple_models",
            "min_keypoints",
            "frame_rate",
            "max_duration_secs",
            "sample_frames",
        ] {
            assert!(properties.contains_key(key), "missing {}", key);
        }
    }
}
