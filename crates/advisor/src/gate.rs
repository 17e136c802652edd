//! Auto-apply gate.
//!
//! A recommendation is applied without a human only when the instance is
//! flagged auto-applicable and its registry entry is auto-applicable with
//! `low` risk. Passing the gate means the executor is invoked; the item is
//! marked `auto_applied` only if the executor succeeds. A failed attempt
//! leaves the item pending and is recorded in the applied-actions log.

use campaign_core::{
    ActionOutcome, AppliedAction, Recommendation, RecommendationRef, RecommendationStatus,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::executor::ActionExecutor;
use crate::registry::RecommendationTypeRegistry;

#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    /// All recommendations with their final status.
    pub recommendations: Vec<Recommendation>,
    /// Every attempted execution, in order.
    pub applied_actions: Vec<AppliedAction>,
}

impl GateOutcome {
    pub fn auto_applied(&self) -> Vec<RecommendationRef> {
        self.with_status(RecommendationStatus::AutoApplied)
    }

    pub fn pending(&self) -> Vec<RecommendationRef> {
        self.with_status(RecommendationStatus::Pending)
    }

    fn with_status(&self, status: RecommendationStatus) -> Vec<RecommendationRef> {
        self.recommendations
            .iter()
            .filter(|r| r.status == status)
            .map(RecommendationRef::from)
            .collect()
    }
}

pub async fn apply_gate(
    recommendations: Vec<Recommendation>,
    registry: &RecommendationTypeRegistry,
    executor: &ActionExecutor,
    now: DateTime<Utc>,
) -> GateOutcome {
    let mut outcome = GateOutcome {
        recommendations: Vec::with_capacity(recommendations.len()),
        applied_actions: Vec::new(),
    };

    for mut rec in recommendations {
        if !registry.permits_auto_apply(&rec) {
            outcome.recommendations.push(rec);
            continue;
        }

        let result = executor.execute(&rec).await;
        let action_outcome = match result {
            Ok(detail) => {
                rec.status = RecommendationStatus::AutoApplied;
                metrics::counter!("optimizer.recommendations.auto_applied", "type" => rec.kind().as_str())
                    .increment(1);
                info!(
                    campaign_id = %rec.campaign_id,
                    recommendation_id = %rec.id,
                    kind = %rec.kind(),
                    "Recommendation auto-applied"
                );
                ActionOutcome::Applied { detail }
            }
            Err(e) => {
                warn!(
                    campaign_id = %rec.campaign_id,
                    recommendation_id = %rec.id,
                    kind = %rec.kind(),
                    error = %e,
                    "Auto-apply failed, leaving recommendation pending"
                );
                ActionOutcome::Failed { error: e.to_string() }
            }
        };

        outcome.applied_actions.push(AppliedAction {
            recommendation_id: rec.id,
            kind: rec.kind(),
            outcome: action_outcome,
            executed_at: now,
        });
        outcome.recommendations.push(rec);
    }

    let pending = outcome
        .recommendations
        .iter()
        .filter(|r| r.status == RecommendationStatus::Pending)
        .count();
    metrics::counter!("optimizer.recommendations.pending").increment(pending as u64);

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use campaign_core::{
        ActionError, Priority, RecommendationReason, RecommendationType, RegistryEntry, RiskLevel,
    };
    use campaign_core::config::RegistryConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::executor::ActionHandler;

    struct CountingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingHandler {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ActionHandler for CountingHandler {
        async fn apply(&self, _: &Recommendation) -> Result<String, ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ActionError::Upstream("rate limited".into()))
            } else {
                Ok("done".into())
            }
        }
    }

    fn negative(term: &str, auto_applicable: bool) -> Recommendation {
        Recommendation::new(
            "cmp-1",
            Priority::High,
            format!("negative {term}"),
            RecommendationReason::KeywordNegative {
                search_term: term.into(),
                impressions: 400,
                clicks: 30,
                cost: 60.0,
                conversions: 0.0,
            },
            auto_applicable,
            Utc::now(),
        )
    }

    fn budget() -> Recommendation {
        Recommendation::new(
            "cmp-1",
            Priority::Critical,
            "budget",
            RecommendationReason::BudgetChange {
                direction: campaign_core::Direction::Decrease,
                suggested_change_pct: -25.0,
                current_cost: 1_000.0,
                current_conversion_rate: 0.01,
                baseline_conversion_rate: 0.03,
                current_cost_per_conversion: 200.0,
                baseline_cost_per_conversion: 66.0,
            },
            true,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_low_risk_auto_item_is_applied() {
        let handler = CountingHandler::new(false);
        let executor = ActionExecutor::new().with_handler(RecommendationType::KeywordNegative, handler.clone());
        let outcome = apply_gate(
            vec![negative("free", true), negative("cheap", false)],
            &RecommendationTypeRegistry::builtin(),
            &executor,
            Utc::now(),
        )
        .await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.auto_applied().len(), 1);
        assert_eq!(outcome.pending().len(), 1);
        assert_eq!(outcome.applied_actions.len(), 1);
        assert!(outcome.applied_actions[0].outcome.is_applied());
    }

    #[tokio::test]
    async fn test_high_risk_is_never_executed() {
        let handler = CountingHandler::new(false);
        let executor = ActionExecutor::new().with_handler(RecommendationType::BudgetChange, handler.clone());
        let outcome = apply_gate(vec![budget()], &RecommendationTypeRegistry::builtin(), &executor, Utc::now()).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.auto_applied().is_empty());
        assert!(outcome.applied_actions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_execution_stays_pending() {
        let executor =
            ActionExecutor::new().with_handler(RecommendationType::KeywordNegative, CountingHandler::new(true));
        let outcome = apply_gate(
            vec![negative("free", true)],
            &RecommendationTypeRegistry::builtin(),
            &executor,
            Utc::now(),
        )
        .await;
        assert!(outcome.auto_applied().is_empty());
        assert_eq!(outcome.pending().len(), 1);
        assert!(matches!(outcome.applied_actions[0].outcome, ActionOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_handler_fails_closed() {
        let outcome = apply_gate(
            vec![negative("free", true)],
            &RecommendationTypeRegistry::builtin(),
            &ActionExecutor::new(),
            Utc::now(),
        )
        .await;
        assert!(outcome.auto_applied().is_empty());
        assert_eq!(outcome.recommendations[0].status, RecommendationStatus::Pending);
    }

    #[tokio::test]
    async fn test_registry_override_can_disable_auto_apply() {
        let mut config = RegistryConfig::default();
        config.overrides.insert(
            RecommendationType::KeywordNegative,
            RegistryEntry {
                auto_applicable: true,
                risk_level: RiskLevel::Medium,
            },
        );
        let handler = CountingHandler::new(false);
        let executor = ActionExecutor::new().with_handler(RecommendationType::KeywordNegative, handler.clone());
        let outcome = apply_gate(
            vec![negative("free", true)],
            &RecommendationTypeRegistry::from_config(&config),
            &executor,
            Utc::now(),
        )
        .await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.pending().len(), 1);
    }
}
