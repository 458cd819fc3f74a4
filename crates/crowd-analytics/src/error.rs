use thiserror::Error;

/// Failures an analysis run can surface to its caller.
///
/// An analysis that finds nobody is not an error; it yields an empty
/// `AnalysisResult`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// An underlying model failed to initialize or respond
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Injected detector fault from the seeded stream (demo mode)
    #[error("simulated detection failure for source '{source_key}'")]
    SimulatedDetectionFailure { source_key: String },

    /// Frame source has no usable pixels or failed to load
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// Caller abandoned the run between frames
    #[error("analysis cancelled")]
    Cancelled,

    /// Request payload could not be decoded into a frame or options
    #[error("decode error: {0}")]
    Decode(String),
}

impl AnalysisError {
    /// Whether a caller-side retry policy may reasonably try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::SimulatedDetectionFailure { .. })
    }

    /// Stable label for metrics and API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::ModelUnavailable(_) => "model_unavailable",
            AnalysisError::SimulatedDetectionFailure { .. } => "simulated_detection_failure",
            AnalysisError::InvalidSource(_) => "invalid_source",
            AnalysisError::Cancelled => "cancelled",
            AnalysisError::Decode(_) => "decode",
        }
    }
}

pub type AnalysisOutcome<T> = std::result::Result<T, AnalysisError>;
