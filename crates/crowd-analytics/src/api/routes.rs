use crate::error::AnalysisError;
use crate::models::{ModelSet, PrecomputedModels};
use crate::options::{config_schema as options_schema, AnalysisOptions};
use crate::state::CrowdServiceState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use common::crowd::{
    AnalysisErrorResponse, AnalysisResult, AnalyzeImageRequest, AnalyzeMediaRequest, MediaKind,
};
use serde_json::json;
use std::sync::Arc;

/// HTTP status for an analysis failure
pub fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::InvalidSource(_) | AnalysisError::Decode(_) => StatusCode::BAD_REQUEST,
        AnalysisError::SimulatedDetectionFailure { .. } | AnalysisError::ModelUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AnalysisError::Cancelled => StatusCode::CONFLICT,
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "Analysis failed: {}", self);
        } else {
            tracing::warn!(kind = self.kind(), "Analysis rejected: {}", self);
        }
        let body = AnalysisErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

/// Analyze a stored media item, served from the result cache when possible
pub async fn analyze_media(
    State(state): State<CrowdServiceState>,
    Path((kind, media_id)): Path<(String, String)>,
    Json(request): Json<AnalyzeMediaRequest>,
) -> Result<Json<AnalysisResult>, AnalysisError> {
    let kind: MediaKind = kind.parse().map_err(AnalysisError::InvalidSource)?;

    let result = state
        .analyzer()
        .analyze_media(&media_id, kind, &request.source_key)
        .await?;
    Ok(Json(result))
}

/// Analyze one uploaded image against model outputs computed by the caller
pub async fn analyze_image(
    State(state): State<CrowdServiceState>,
    Json(request): Json<AnalyzeImageRequest>,
) -> Result<Json<AnalysisResult>, AnalysisError> {
    let options = AnalysisOptions::from_json(request.options.unwrap_or_default())
        .map_err(|e| AnalysisError::Decode(format!("{:#}", e)))?;

    let bytes = base64::prelude::BASE64_STANDARD
        .decode(&request.data)
        .map_err(|e| AnalysisError::Decode(format!("Invalid base64 image data: {}", e)))?;

    let frame = image::load_from_memory(&bytes)
        .map_err(|e| AnalysisError::Decode(format!("Invalid image format: {}", e)))?
        .to_rgb8();

    let models = ModelSet::from_combined(Arc::new(PrecomputedModels::new(
        request.boxes,
        request.poses,
    )));

    let result = state
        .analyzer()
        .analyze_image_with(&frame, &models, &options)
        .await?;
    Ok(Json(result))
}

/// JSON Schema of the analysis options
pub async fn config_schema() -> impl IntoResponse {
    (StatusCode::OK, Json(options_schema()))
}

/// Result cache counters
pub async fn cache_stats(State(state): State<CrowdServiceState>) -> impl IntoResponse {
    let stats = state.analyzer().cache().stats().await;
    (StatusCode::OK, Json(stats))
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "crowd-analytics"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<CrowdServiceState>) -> impl IntoResponse {
    let mode = if state.analyzer().has_models() {
        "models"
    } else {
        "demo"
    };

    if state.is_shutting_down() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "shutting down",
                "node_id": state.node_id()
            })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "node_id": state.node_id(),
                "mode": mode
            })),
        )
    }
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> Response {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&AnalysisError::InvalidSource("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AnalysisError::Decode("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AnalysisError::SimulatedDetectionFailure {
                source_key: "k".to_string()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&AnalysisError::ModelUnavailable("x".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&AnalysisError::Cancelled), StatusCode::CONFLICT);
    }
}
