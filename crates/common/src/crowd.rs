//! Crowd analysis contracts shared between the analysis pipeline and its callers.
//!
//! This module defines the detection data model (boxes, keypoints, people,
//! hotspots), the typed raw outputs of the external model collaborators, and
//! the request/response shapes of the analysis API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance allowed past the frame edge after box expansion.
pub const BOX_EDGE_TOLERANCE: f32 = 1e-3;

/// Axis-aligned box, normalized to `[0, 1]` relative to the frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a normalized box from pixel-space `[x, y, w, h]`.
    pub fn from_pixels(px: [f32; 4], frame_width: u32, frame_height: u32) -> Self {
        let fw = frame_width.max(1) as f32;
        let fh = frame_height.max(1) as f32;
        Self {
            x: px[0] / fw,
            y: px[1] / fh,
            width: px[2] / fw,
            height: px[3] / fh,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Positive extent and inside the unit square (with edge tolerance).
    pub fn is_valid(&self) -> bool {
        self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
            && self.x >= -BOX_EDGE_TOLERANCE
            && self.y >= -BOX_EDGE_TOLERANCE
            && self.right() <= 1.0 + BOX_EDGE_TOLERANCE
            && self.bottom() <= 1.0 + BOX_EDGE_TOLERANCE
    }

    /// Clip the box to the unit square. Returns `None` when nothing is left.
    pub fn clamp_to_unit(&self) -> Option<Self> {
        let x1 = self.x.clamp(0.0, 1.0);
        let y1 = self.y.clamp(0.0, 1.0);
        let x2 = self.right().clamp(0.0, 1.0);
        let y2 = self.bottom().clamp(0.0, 1.0);

        if x2 > x1 && y2 > y1 {
            Some(Self::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Grow the box by `fraction` of its extent on every side, clipped to the frame.
    pub fn expand(&self, fraction: f32) -> Self {
        let pad_x = self.width * fraction;
        let pad_y = self.height * fraction;
        let grown = Self::new(
            self.x - pad_x,
            self.y - pad_y,
            self.width + 2.0 * pad_x,
            self.height + 2.0 * pad_y,
        );
        grown.clamp_to_unit().unwrap_or(*self)
    }
}

/// Standard COCO pose keypoint names (17 keypoints)
pub const COCO_KEYPOINTS: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Pose keypoint in the pixel space of the analyzed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Keypoint name (e.g., "nose", "left_shoulder")
    pub name: String,

    /// X coordinate in image space (pixels)
    pub x: f32,

    /// Y coordinate in image space (pixels)
    pub y: f32,

    /// Confidence score (0.0 to 1.0)
    pub score: f32,
}

impl Keypoint {
    pub fn new(name: impl Into<String>, x: f32, y: f32, score: f32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            score,
        }
    }

    pub fn is_head(&self) -> bool {
        matches!(
            self.name.as_str(),
            "nose" | "left_eye" | "right_eye" | "left_ear" | "right_ear"
        )
    }

    pub fn is_shoulder(&self) -> bool {
        matches!(self.name.as_str(), "left_shoulder" | "right_shoulder")
    }
}

/// A single inferred person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Identifier assigned at creation, unique within one analysis run
    pub id: String,

    pub bounding_box: BoundingBox,

    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,

    /// Pose evidence attached by cross-model fusion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<Keypoint>>,

    /// Box lies inside the frame with a margin on all four edges
    pub is_fully_visible: bool,

    /// Moderately overlaps another distinct person
    pub is_overlapping: bool,

    /// Soft cross-frame correlation hint, not guaranteed stable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

impl Detection {
    pub fn keypoint_count(&self) -> usize {
        self.keypoints.as_ref().map_or(0, Vec::len)
    }
}

/// Derived circular density region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub intensity: f32,
}

/// Outcome of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Always equal to `people.len()`
    pub crowd_count: usize,

    pub people: Vec<Detection>,

    /// Empty exactly when `people` is empty
    pub hotspots: Vec<Hotspot>,

    /// Processing latency in milliseconds
    pub processing_time_ms: u64,

    /// Completion time (Unix timestamp in milliseconds)
    pub timestamp: u64,
}

impl AnalysisResult {
    pub fn new(
        people: Vec<Detection>,
        hotspots: Vec<Hotspot>,
        processing_time_ms: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            crowd_count: people.len(),
            people,
            hotspots,
            processing_time_ms,
            timestamp,
        }
    }

    pub fn empty(timestamp: u64) -> Self {
        Self::new(Vec::new(), Vec::new(), 0, timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn mean_confidence(&self) -> f32 {
        if self.people.is_empty() {
            return 0.0;
        }
        self.people.iter().map(|p| p.confidence).sum::<f32>() / self.people.len() as f32
    }
}

/// Kind of media an analysis was requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Live,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Live => "live",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "live" => Ok(MediaKind::Live),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// Composite cache key for a media item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaKey {
    pub kind: MediaKind,
    pub media_id: String,
}

impl MediaKey {
    pub fn new(kind: MediaKind, media_id: impl Into<String>) -> Self {
        Self {
            kind,
            media_id: media_id.into(),
        }
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.media_id)
    }
}

/// Raw output of the object detector for one box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBoxDetection {
    /// Object class/label
    pub class: String,

    /// Detector score (0.0 to 1.0)
    pub score: f32,

    /// Pixel-space box `[x, y, width, height]`
    pub bbox: [f32; 4],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

impl RawBoxDetection {
    pub fn person(score: f32, bbox: [f32; 4]) -> Self {
        Self {
            class: "person".to_string(),
            score,
            bbox,
            track_id: None,
        }
    }
}

/// Raw output of the pose estimator for one person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoseDetection {
    /// Overall pose score (0.0 to 1.0)
    pub score: f32,

    pub keypoints: Vec<Keypoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

/// Request body for the cache-aware media analysis endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeMediaRequest {
    /// Key feeding the seeded generator in demo mode
    pub source_key: String,
}

/// Request body for analyzing a single uploaded image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeImageRequest {
    /// Image data (base64 encoded for JSON transport)
    pub data: String,

    /// Object detector output for this image
    #[serde(default)]
    pub boxes: Vec<RawBoxDetection>,

    /// Pose estimator output for this image
    #[serde(default)]
    pub poses: Vec<RawPoseDetection>,

    /// Per-request analysis options (JSON object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// Error body returned by the analysis API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisErrorResponse {
    pub error: String,
    pub kind: String,
    pub retryable: bool,
}

/// Snapshot of result cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}
