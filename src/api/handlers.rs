//! HTTP handlers for the Intake API and its supplemented surfaces (health,
//! readiness, metrics, Shame List, admin moderation).

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::auth::middleware::extract_claims;
use crate::domain::Tier;
use crate::error::IntakeError;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub query: String,
    #[serde(default = "default_query_type")]
    pub query_type: String,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_query_type() -> String {
    "product".to_string()
}

fn default_platform() -> String {
    "web".to_string()
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis_id: Uuid,
}

/// POST /api/analyze (spec §4.J `analyze`). Authenticated callers are
/// billed against their tier's quota; unauthenticated callers are billed
/// against PUBLIC, which defaults to 0 (spec §4.D).
pub async fn analyze(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<AnalyzeResponse>, IntakeError> {
    let claims = extract_claims(&req).cloned();

    let bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|e| IntakeError::InvalidInput(e.to_string()))?;
    let payload: AnalyzeRequest = serde_json::from_slice(&bytes)
        .map_err(|e| IntakeError::InvalidInput(e.to_string()))?;

    let (user_id, tier) = match claims {
        Some(c) => (
            Uuid::parse_str(&c.sub).ok(),
            c.tier,
        ),
        None => (None, Tier::Public),
    };

    let outcome = state
        .intake
        .analyze(user_id, tier, &payload.query, payload.query_type, payload.platform)
        .await?;

    Ok(Json(AnalyzeResponse {
        analysis_id: outcome.analysis_id,
    }))
}

/// GET /api/analyses/:id
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, StatusCode> {
    let analysis = state
        .store
        .find_analysis(id)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    match analysis {
        Some(analysis) => Ok(Json(analysis).into_response()),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/analyses — public feed of completed analyses.
pub async fn list_analyses(
    State(state): State<AppState>,
    axum::extract::Query(q): axum::extract::Query<ListQuery>,
) -> Result<Response, StatusCode> {
    let analyses = state
        .store
        .list_public_analyses(q.limit)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(analyses).into_response())
}

/// GET /api/shame (spec §4.I `topN`).
pub async fn list_shame(
    State(state): State<AppState>,
    axum::extract::Query(q): axum::extract::Query<ListQuery>,
) -> Result<Response, StatusCode> {
    let entries = state
        .shame_list
        .top_n(q.limit)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(entries).into_response())
}

/// Constant-time comparison of the admin bearer credential, so a mismatch
/// doesn't leak how many leading bytes matched via response timing.
fn admin_token_matches(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// POST /api/admin/shame/:id/deactivate — admin-only moderation (spec.md §3:
/// entries are "deactivated administratively").
pub async fn deactivate_shame_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    req: Request,
) -> Result<StatusCode, StatusCode> {
    let provided = req
        .headers()
        .get("X-Admin-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !admin_token_matches(provided, &state.admin_token) {
        return Err(StatusCode::FORBIDDEN);
    }
    state
        .shame_list
        .deactivate(id)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health() -> &'static str {
    "ok"
}

/// GET /ready — reports broker connectivity so operators can see the
/// `healthGrace` state the Orchestrator relies on (spec §4.F).
pub async fn ready(State(state): State<AppState>) -> Response {
    if state.broker.is_connected() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "broker unavailable").into_response()
    }
}

pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
