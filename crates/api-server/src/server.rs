//! API server: HTTP routes plus the Prometheus exporter.

use crate::auth;
use crate::rest::{self, AppState};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use campaign_core::config::AppConfig;
use campaign_scheduler::AnalysisOrchestrator;
use campaign_store::AnalysisStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// All `/v1` routes require the shared secret; health endpoints do not.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/analysis/run", post(rest::run_due))
        .route("/v1/analysis/campaigns/:campaign_id/run", post(rest::run_campaign))
        .route("/v1/campaigns", get(rest::list_campaigns).post(rest::track_campaign))
        .route("/v1/campaigns/:campaign_id/analyses", get(rest::list_analyses))
        .route("/v1/campaigns/:campaign_id/actions", get(rest::list_actions))
        .route("/v1/recommendations/pending", get(rest::pending_recommendations))
        .route("/v1/recommendations/:id/approve", post(rest::approve_recommendation))
        .route("/v1/recommendations/:id/reject", post(rest::reject_recommendation))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_secret));

    let operational = Router::new()
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness));

    Router::new()
        .merge(protected)
        .merge(operational)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    orchestrator: Arc<AnalysisOrchestrator>,
    store: Arc<dyn AnalysisStore>,
}

impl ApiServer {
    pub fn new(config: AppConfig, orchestrator: Arc<AnalysisOrchestrator>, store: Arc<dyn AnalysisStore>) -> Self {
        Self {
            config,
            orchestrator,
            store,
        }
    }

    fn state(&self) -> AppState {
        AppState {
            orchestrator: self.orchestrator.clone(),
            store: self.store.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
            trigger_secret: self.config.api.trigger_secret.as_deref().map(Arc::from),
        }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        if self.config.api.trigger_secret.is_none() {
            warn!("No trigger secret configured; /v1 routes will refuse every request");
        }
        let app = build_router(self.state());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use campaign_advisor::{ActionExecutor, RecommendationTypeRegistry};
    use campaign_core::{
        ActionOutcome, Analysis, AnalysisType, AppliedAction, CampaignPhase, CampaignTracking,
        DataSources, MetricsComparison, Priority, Recommendation, RecommendationReason,
        RecommendationType,
    };
    use campaign_metrics::MetricsAggregator;
    use campaign_store::{AnalysisCommit, MemoryStore};
    use chrono::Utc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "cron-secret";

    fn app_with(store: Arc<MemoryStore>, secret: Option<&str>) -> Router {
        let config = AppConfig::default();
        let orchestrator = AnalysisOrchestrator::new(
            store.clone(),
            Arc::new(MetricsAggregator::new(config.sources.clone())),
            Arc::new(RecommendationTypeRegistry::builtin()),
            Arc::new(ActionExecutor::new()),
            &config,
        );
        build_router(AppState {
            orchestrator: Arc::new(orchestrator),
            store,
            node_id: "test-node".into(),
            start_time: Instant::now(),
            trigger_secret: secret.map(Arc::from),
        })
    }

    fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (app_with(store.clone(), Some(SECRET)), store)
    }

    fn authed(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {SECRET}"));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn seed_pending(store: &MemoryStore) -> Uuid {
        let tracking = store
            .track_campaign(CampaignTracking::new("cmp-1", "Brand", Utc::now()))
            .await
            .unwrap();
        let rec = Recommendation::new(
            "cmp-1",
            Priority::Medium,
            "Bounce rate 60%; review landing pages",
            RecommendationReason::LandingPageReview {
                page_path: None,
                bounce_rate: 0.6,
                avg_session_duration_secs: 30.0,
                conversion_rate: None,
            },
            false,
            Utc::now(),
        );
        let id = rec.id;
        store
            .commit_analysis(AnalysisCommit {
                analysis: Analysis {
                    id: Uuid::new_v4(),
                    campaign_tracking_id: tracking.id,
                    campaign_id: "cmp-1".into(),
                    analysis_type: AnalysisType::Manual,
                    data_sources: DataSources::default(),
                    metrics: MetricsComparison::default(),
                    phase: CampaignPhase::New,
                    health_score: 40,
                    recommendations: vec![rec],
                    ai_insights_summary: String::new(),
                    applied_actions: Vec::new(),
                    created_at: Utc::now(),
                },
                tracking,
                expected_version: 0,
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_health_endpoints_need_no_auth() {
        let (app, _) = app();
        for uri in ["/health", "/ready", "/live"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_trigger_rejects_missing_and_wrong_secret() {
        let (app, _) = app();
        let missing = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/analysis/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/analysis/run")
                    .header(header::AUTHORIZATION, "Bearer guess")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(wrong).await["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_unset_secret_refuses_trigger() {
        let app = app_with(Arc::new(MemoryStore::new()), None);
        let response = app
            .oneshot(authed("POST", "/v1/analysis/run", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_run_with_nothing_due() {
        let (app, _) = app();
        let response = app.oneshot(authed("POST", "/v1/analysis/run", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "no_campaigns_due");
        assert_eq!(body["analyzed"], 0);
    }

    #[tokio::test]
    async fn test_track_then_run_degrades_without_sources() {
        let (app, store) = app();
        let created = app
            .clone()
            .oneshot(authed(
                "POST",
                "/v1/campaigns",
                Some(serde_json::json!({ "campaignId": "cmp-9", "campaignName": "Spring sale" })),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);

        let duplicate = app
            .clone()
            .oneshot(authed(
                "POST",
                "/v1/campaigns",
                Some(serde_json::json!({ "campaignId": "cmp-9", "campaignName": "Again" })),
            ))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let response = app.oneshot(authed("POST", "/v1/analysis/run", None)).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["analyzed"], 1);
        assert_eq!(body["results"][0]["campaignId"], "cmp-9");
        assert_eq!(body["results"][0]["lowConfidence"], true);

        let row = store.find_campaign("cmp-9").await.unwrap().unwrap();
        assert_eq!(row.analysis_count, 1);
    }

    #[tokio::test]
    async fn test_manual_trigger_for_unknown_campaign() {
        let (app, _) = app();
        let response = app
            .oneshot(authed("POST", "/v1/analysis/campaigns/nope/run", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "not_tracked");
    }

    #[tokio::test]
    async fn test_pending_queue_and_decisions() {
        let (app, store) = app();
        let id = seed_pending(&store).await;

        let listed = app
            .clone()
            .oneshot(authed("GET", "/v1/recommendations/pending?campaignId=cmp-1", None))
            .await
            .unwrap();
        let body = json_body(listed).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["type"], "landing_page_review");

        let approve = app
            .clone()
            .oneshot(authed(
                "POST",
                &format!("/v1/recommendations/{id}/approve"),
                Some(serde_json::json!({ "decidedBy": "ops@example.com" })),
            ))
            .await
            .unwrap();
        assert_eq!(approve.status(), StatusCode::OK);
        assert_eq!(json_body(approve).await["status"], "approved");

        let again = app
            .oneshot(authed(
                "POST",
                &format!("/v1/recommendations/{id}/reject"),
                Some(serde_json::json!({ "decidedBy": "ops@example.com" })),
            ))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_list_analyses() {
        let (app, store) = app();
        seed_pending(&store).await;
        let response = app
            .oneshot(authed("GET", "/v1/campaigns/cmp-1/analyses?limit=5", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["analysisType"], "manual");
    }

    #[tokio::test]
    async fn test_action_log_is_listed() {
        let (app, store) = app();
        store
            .record_applied_actions(
                "cmp-1",
                &[AppliedAction {
                    recommendation_id: Uuid::new_v4(),
                    kind: RecommendationType::KeywordNegative,
                    outcome: ActionOutcome::Applied {
                        detail: "neg-42".into(),
                    },
                    executed_at: Utc::now(),
                }],
            )
            .await
            .unwrap();
        let response = app
            .oneshot(authed("GET", "/v1/campaigns/cmp-1/actions", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["type"], "keyword_negative");
        assert_eq!(body[0]["outcome"]["result"], "applied");
    }
}
