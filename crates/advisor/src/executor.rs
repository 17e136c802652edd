//! Action executor.
//!
//! Maps recommendation types to handlers that mutate the upstream platform.
//! A type with no registered handler fails with `ActionError::Unsupported`;
//! nothing is ever treated as applied unless a handler said so.

use async_trait::async_trait;
use campaign_core::{ActionError, Recommendation, RecommendationReason, RecommendationType};
use campaign_metrics::NegativeKeywordWriter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Applies one recommendation type upstream. Returns a short detail string
/// describing what changed.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn apply(&self, rec: &Recommendation) -> Result<String, ActionError>;
}

#[derive(Default, Clone)]
pub struct ActionExecutor {
    handlers: HashMap<RecommendationType, Arc<dyn ActionHandler>>,
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, kind: RecommendationType, handler: Arc<dyn ActionHandler>) -> Self {
        info!(kind = %kind, "Action handler registered");
        self.handlers.insert(kind, handler);
        self
    }

    /// Register the negative keyword handler backed by the ad platform.
    pub fn with_negative_keywords(self, writer: Arc<dyn NegativeKeywordWriter>) -> Self {
        self.with_handler(
            RecommendationType::KeywordNegative,
            Arc::new(NegativeKeywordAction::new(writer)),
        )
    }

    pub fn supports(&self, kind: RecommendationType) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub async fn execute(&self, rec: &Recommendation) -> Result<String, ActionError> {
        let kind = rec.kind();
        let Some(handler) = self.handlers.get(&kind) else {
            warn!(recommendation_id = %rec.id, kind = %kind, "No action handler registered");
            return Err(ActionError::Unsupported(kind));
        };
        handler.apply(rec).await
    }
}

/// Adds a wasteful search term as an exact-match negative keyword.
pub struct NegativeKeywordAction {
    writer: Arc<dyn NegativeKeywordWriter>,
}

impl NegativeKeywordAction {
    pub fn new(writer: Arc<dyn NegativeKeywordWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl ActionHandler for NegativeKeywordAction {
    async fn apply(&self, rec: &Recommendation) -> Result<String, ActionError> {
        let RecommendationReason::KeywordNegative { search_term, .. } = &rec.reason else {
            return Err(ActionError::PayloadMismatch(rec.kind()));
        };
        let criterion_id = self
            .writer
            .add_negative_keyword(&rec.campaign_id, search_term)
            .await
            .map_err(|e| ActionError::Upstream(e.to_string()))?;

        info!(
            campaign_id = %rec.campaign_id,
            search_term = %search_term,
            criterion_id = %criterion_id,
            "Negative keyword added"
        );
        Ok(format!("added negative keyword \"{search_term}\" ({criterion_id})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::{DataSource, Priority, SourceError};
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl NegativeKeywordWriter for RecordingWriter {
        async fn add_negative_keyword(&self, campaign_id: &str, text: &str) -> Result<String, SourceError> {
            if self.fail {
                return Err(SourceError::Request {
                    origin: DataSource::AdPlatform,
                    message: "HTTP 403".into(),
                });
            }
            self.calls
                .lock()
                .unwrap()
                .push((campaign_id.to_string(), text.to_string()));
            Ok("crit-1".into())
        }
    }

    fn negative() -> Recommendation {
        Recommendation::new(
            "cmp-1",
            Priority::High,
            "negative",
            RecommendationReason::KeywordNegative {
                search_term: "free crm".into(),
                impressions: 400,
                clicks: 30,
                cost: 60.0,
                conversions: 0.0,
            },
            true,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_unregistered_type_fails_closed() {
        let executor = ActionExecutor::new();
        assert!(!executor.supports(RecommendationType::KeywordNegative));
        let err = executor.execute(&negative()).await.unwrap_err();
        assert!(matches!(err, ActionError::Unsupported(RecommendationType::KeywordNegative)));
    }

    #[tokio::test]
    async fn test_negative_keyword_calls_writer() {
        let writer = Arc::new(RecordingWriter::default());
        let executor = ActionExecutor::new().with_negative_keywords(writer.clone());
        let detail = executor.execute(&negative()).await.unwrap();
        assert!(detail.contains("free crm"));
        assert_eq!(
            writer.calls.lock().unwrap().as_slice(),
            &[("cmp-1".to_string(), "free crm".to_string())]
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_is_reported() {
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..RecordingWriter::default()
        });
        let executor = ActionExecutor::new().with_negative_keywords(writer);
        let err = executor.execute(&negative()).await.unwrap_err();
        assert!(matches!(err, ActionError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_mismatched_payload_is_rejected() {
        let action = NegativeKeywordAction::new(Arc::new(RecordingWriter::default()));
        let rec = Recommendation::new(
            "cmp-1",
            Priority::Low,
            "landing page",
            RecommendationReason::LandingPageReview {
                page_path: None,
                bounce_rate: 0.8,
                avg_session_duration_secs: 10.0,
                conversion_rate: None,
            },
            false,
            Utc::now(),
        );
        assert!(matches!(
            action.apply(&rec).await,
            Err(ActionError::PayloadMismatch(RecommendationType::LandingPageReview))
        ));
    }
}
