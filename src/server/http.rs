//! HTTP handlers, one per exposed operation

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::ForgeError;
use crate::server::ServerState;
use crate::types::*;

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub matching_enabled: bool,
}

/// Body of an outcome report
#[derive(Debug, Deserialize)]
pub struct OutcomeRequest {
    pub outcome: Outcome,
}

/// Map a pattern error onto an HTTP status and JSON body
fn error_response(err: ForgeError) -> Response {
    let status = match &err {
        ForgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ForgeError::NotFound { .. } => StatusCode::NOT_FOUND,
        ForgeError::Generation(_) => StatusCode::BAD_GATEWAY,
        ForgeError::Match(_) | ForgeError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", err);
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn respond<T: Serialize>(result: crate::error::Result<T>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let response = StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
        matching_enabled: state.forge.matching_enabled(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

pub async fn docs_handler(State(state): State<ServerState>, Json(req): Json<DocsRequest>) -> Response {
    respond(state.forge.generate_docs(req).await)
}

pub async fn code_handler(State(state): State<ServerState>, Json(req): Json<CodeRequest>) -> Response {
    respond(state.forge.generate_code(req).await)
}

pub async fn fix_handler(State(state): State<ServerState>, Json(req): Json<FixRequest>) -> Response {
    respond(state.forge.fix_code(req).await)
}

pub async fn features_handler(State(state): State<ServerState>, Json(req): Json<FeatureRequest>) -> Response {
    (StatusCode::OK, Json(state.forge.add_features(req).await)).into_response()
}

pub async fn ideas_handler(State(state): State<ServerState>, Json(req): Json<IdeasRequest>) -> Response {
    respond(state.forge.generate_ideas(req).await)
}

pub async fn expand_handler(State(state): State<ServerState>, Json(req): Json<ExpandRequest>) -> Response {
    respond(state.forge.expand_idea(req).await)
}

pub async fn metrics_handler(State(state): State<ServerState>) -> Response {
    (StatusCode::OK, Json(state.forge.usage_metrics())).into_response()
}

pub async fn patterns_handler(State(state): State<ServerState>) -> Response {
    respond(state.forge.pattern_summary().await)
}

pub async fn outcome_handler(
    State(state): State<ServerState>,
    Path((kind, id)): Path<(String, String)>,
    Json(req): Json<OutcomeRequest>,
) -> Response {
    let kind: PatternKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return error_response(e),
    };
    respond(state.forge.report_outcome(kind, &id, req.outcome).await)
}
