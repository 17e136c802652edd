//! REST handlers for the run trigger, campaign administration and
//! operational endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use campaign_core::{
    Analysis, AppliedAction, CampaignError, CampaignTracking, Decision, Recommendation, StoreError,
};
use campaign_scheduler::{AnalysisOrchestrator, CampaignSummary, RunReport};
use campaign_store::AnalysisStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Maximum length of a campaign id or name accepted from the admin API.
const MAX_FIELD_LEN: usize = 256;

const DEFAULT_ANALYSES_LIMIT: usize = 20;
const MAX_ANALYSES_LIMIT: usize = 100;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub store: Arc<dyn AnalysisStore>,
    pub node_id: String,
    pub start_time: Instant,
    pub trigger_secret: Option<Arc<str>>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(what) => api_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        StoreError::AlreadyTracked(id) => api_error(
            StatusCode::CONFLICT,
            "already_tracked",
            format!("campaign {id} is already tracked"),
        ),
        e @ StoreError::InvalidStatusTransition { .. } => {
            api_error(StatusCode::CONFLICT, "not_pending", e.to_string())
        }
        e @ StoreError::VersionConflict { .. } => api_error(StatusCode::CONFLICT, "version_conflict", e.to_string()),
        e => {
            error!(error = %e, "Store operation failed");
            metrics::counter!("api.errors").increment(1);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "Storage backend error")
        }
    }
}

fn campaign_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::NotTracked(id) => api_error(
            StatusCode::NOT_FOUND,
            "not_tracked",
            format!("campaign {id} is not tracked"),
        ),
        CampaignError::Discovery(source) => {
            error!(error = %source, "Campaign discovery failed");
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "discovery_failed",
                "Could not load due campaigns; no campaign was processed",
            )
        }
        CampaignError::Store(e) => store_error(e),
        e @ CampaignError::UncommittedActions { .. } => {
            error!(error = %e, actions = e.uncommitted_actions().len(), "Analysis commit failed after auto-apply");
            metrics::counter!("api.errors").increment(1);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "commit_failed",
                format!(
                    "{e}; {} auto-apply attempt(s) kept in the campaign action log",
                    e.uncommitted_actions().len()
                ),
            )
        }
        e => {
            error!(error = %e, "Analysis failed");
            metrics::counter!("api.errors").increment(1);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "analysis_failed", e.to_string())
        }
    }
}

fn validate_field(name: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("'{name}' must not be empty"),
        ));
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("'{name}' exceeds maximum length"),
        ));
    }
    Ok(())
}

// ─── Run triggers ───────────────────────────────────────────────────────────

/// POST /v1/analysis/run: analyze every due campaign.
pub async fn run_due(State(state): State<AppState>) -> ApiResult<Json<RunReport>> {
    info!(node_id = %state.node_id, "Analysis run triggered");
    state
        .orchestrator
        .run_due(Utc::now())
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// POST /v1/analysis/campaigns/:campaign_id/run: manual trigger.
pub async fn run_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> ApiResult<Json<CampaignSummary>> {
    validate_field("campaignId", &campaign_id)?;
    info!(campaign_id = %campaign_id, "Manual analysis triggered");
    state
        .orchestrator
        .analyze_campaign(&campaign_id, Utc::now())
        .await
        .map(Json)
        .map_err(campaign_error)
}

// ─── Campaigns ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCampaignRequest {
    pub campaign_id: String,
    pub campaign_name: String,
}

/// GET /v1/campaigns
pub async fn list_campaigns(State(state): State<AppState>) -> ApiResult<Json<Vec<CampaignTracking>>> {
    state.store.list_campaigns().await.map(Json).map_err(store_error)
}

/// POST /v1/campaigns: start tracking a campaign; it is due immediately.
pub async fn track_campaign(
    State(state): State<AppState>,
    Json(request): Json<TrackCampaignRequest>,
) -> ApiResult<(StatusCode, Json<CampaignTracking>)> {
    validate_field("campaignId", &request.campaign_id)?;
    validate_field("campaignName", &request.campaign_name)?;

    let tracking = CampaignTracking::new(request.campaign_id.trim(), request.campaign_name.trim(), Utc::now());
    let created = state.store.track_campaign(tracking).await.map_err(store_error)?;
    info!(campaign_id = %created.campaign_id, "Campaign registered for tracking");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct AnalysesQuery {
    pub limit: Option<usize>,
}

/// GET /v1/campaigns/:campaign_id/analyses?limit=N
pub async fn list_analyses(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Query(query): Query<AnalysesQuery>,
) -> ApiResult<Json<Vec<Analysis>>> {
    let limit = query.limit.unwrap_or(DEFAULT_ANALYSES_LIMIT).min(MAX_ANALYSES_LIMIT);
    state
        .store
        .list_analyses(&campaign_id, limit)
        .await
        .map(Json)
        .map_err(store_error)
}

/// GET /v1/campaigns/:campaign_id/actions: every auto-apply attempt, oldest first.
pub async fn list_actions(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> ApiResult<Json<Vec<AppliedAction>>> {
    state
        .store
        .applied_actions(&campaign_id)
        .await
        .map(Json)
        .map_err(store_error)
}

// ─── Recommendations ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuery {
    pub campaign_id: Option<String>,
}

/// GET /v1/recommendations/pending?campaignId=...
pub async fn pending_recommendations(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Json<Vec<Recommendation>>> {
    state
        .store
        .pending_recommendations(query.campaign_id.as_deref())
        .await
        .map(Json)
        .map_err(store_error)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub decided_by: String,
}

async fn decide(state: AppState, id: Uuid, decision: Decision, request: DecisionRequest) -> ApiResult<Json<Recommendation>> {
    validate_field("decidedBy", &request.decided_by)?;
    let rec = state
        .store
        .decide_recommendation(id, decision, request.decided_by.trim(), Utc::now())
        .await
        .map_err(|e| {
            warn!(recommendation_id = %id, decision = ?decision, error = %e, "Decision rejected");
            store_error(e)
        })?;
    info!(
        recommendation_id = %id,
        campaign_id = %rec.campaign_id,
        decision = ?decision,
        decided_by = %request.decided_by,
        "Recommendation decided"
    );
    Ok(Json(rec))
}

/// POST /v1/recommendations/:id/approve
pub async fn approve_recommendation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<DecisionRequest>,
) -> ApiResult<Json<Recommendation>> {
    decide(state, id, Decision::Approved, request).await
}

/// POST /v1/recommendations/:id/reject
pub async fn reject_recommendation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<DecisionRequest>,
) -> ApiResult<Json<Recommendation>> {
    decide(state, id, Decision::Rejected, request).await
}

// ─── Operational ────────────────────────────────────────────────────────────

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: Ready once the store answers.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live: Liveness check.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
