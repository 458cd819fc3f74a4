pub mod analyzer;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod options;
pub mod pipeline;
pub mod seeded;
pub mod state;

pub use analyzer::CrowdAnalyzer;
pub use cache::ResultCache;
pub use config::ServiceConfig;
pub use error::{AnalysisError, AnalysisOutcome};
pub use options::{AnalysisOptions, PipelineTuning};
pub use state::CrowdServiceState;
