//! HTTP surface: routes, CORS and error mapping.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::pipeline::{Pipeline, PipelineError, ResponseEnvelope};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// Inbound body. Both fields are optional at the wire level so a missing
/// message maps to the same 400 as an empty one.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Builds the router with permissive CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/medical-query", post(query_handler))
        .route("/v1/query", post(query_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn query_handler(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    let Json(request) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    let message = request.message.unwrap_or_default();
    state
        .pipeline
        .answer(&message, request.context.as_deref())
        .await
        .map(Json)
        .map_err(pipeline_error)
}

fn pipeline_error(err: PipelineError) -> ApiError {
    match err {
        PipelineError::Input(message) => bad_request(message),
        PipelineError::Configuration(message) => {
            warn!(%message, "rejecting request: pipeline misconfigured");
            internal_error(message)
        }
        PipelineError::Model(message) => internal_error(message),
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}
