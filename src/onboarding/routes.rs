//! REST endpoints the wizard UI drives the flow through.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use super::controller::FlowController;
use super::model::FieldPatch;
use crate::error::FlowError;

/// Shared state for setup routes.
#[derive(Clone)]
pub struct SetupRouteState {
    pub controller: Arc<FlowController>,
}

/// Map a flow error onto the wire: validation and conflicts keep their
/// specific message, transient failures say "try again", and an expired
/// session tells the client to redirect to login.
fn error_response(err: FlowError) -> Response {
    let status = match &err {
        FlowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlowError::Conflict { .. } => StatusCode::CONFLICT,
        FlowError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        FlowError::AuthExpired => StatusCode::UNAUTHORIZED,
        FlowError::Completed | FlowError::FinalStep => StatusCode::CONFLICT,
    };
    let body = match &err {
        FlowError::Validation(r) => serde_json::json!({
            "error": r.message,
            "field": r.field,
        }),
        FlowError::Conflict { field } => serde_json::json!({
            "error": err.to_string(),
            "field": field,
        }),
        FlowError::AuthExpired => serde_json::json!({
            "error": err.to_string(),
            "redirect": "/login",
        }),
        _ => serde_json::json!({ "error": err.to_string() }),
    };
    (status, Json(body)).into_response()
}

/// GET /api/setup/status
async fn get_status(State(state): State<SetupRouteState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// PATCH /api/setup/fields
///
/// Merges a partial update; persistence happens via the debounced auto-save.
async fn patch_fields(
    State(state): State<SetupRouteState>,
    Json(body): Json<FieldPatch>,
) -> impl IntoResponse {
    state.controller.update_fields(body).await;
    StatusCode::NO_CONTENT
}

/// POST /api/setup/advance
///
/// Optionally merges fields, then validates and moves forward one step.
async fn post_advance(
    State(state): State<SetupRouteState>,
    Json(body): Json<FieldPatch>,
) -> Response {
    let patch = if body.is_empty() { None } else { Some(body) };
    match state.controller.advance(patch).await {
        Ok(step) => Json(serde_json::json!({ "step": step })).into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /api/setup/back
async fn post_back(State(state): State<SetupRouteState>) -> impl IntoResponse {
    let step = state.controller.retreat().await;
    match step {
        Some(step) => Json(serde_json::json!({ "step": step })).into_response(),
        None => Json(serde_json::json!({ "step": "basic_info" })).into_response(),
    }
}

/// POST /api/setup/complete
async fn post_complete(State(state): State<SetupRouteState>) -> Response {
    match state.controller.complete().await {
        Ok(()) => Json(state.controller.status().await).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/setup/username/{candidate}
///
/// Schedules the debounced availability probe for `candidate` and returns
/// the latest settled verdict, which may still belong to earlier input —
/// the UI polls until the candidate in the response matches what it sent.
async fn get_username_probe(
    State(state): State<SetupRouteState>,
    Path(candidate): Path<String>,
) -> impl IntoResponse {
    state.controller.check_username(candidate).await;
    Json(serde_json::json!({ "probe": state.controller.username_probe().await }))
}

/// Build the setup REST routes.
pub fn setup_routes(state: SetupRouteState) -> Router {
    Router::new()
        .route("/api/setup/status", get(get_status))
        .route("/api/setup/fields", patch(patch_fields))
        .route("/api/setup/advance", post(post_advance))
        .route("/api/setup/back", post(post_back))
        .route("/api/setup/complete", post(post_complete))
        .route("/api/setup/username/{candidate}", get(get_username_probe))
        .with_state(state)
}
