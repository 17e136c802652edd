//! Per-campaign analysis pipeline and the batch loop around it.

use campaign_advisor::{
    apply_gate, derive_phase, health_score, next_analysis_date, summarize, ActionExecutor,
    GeneratorInput, InsightInput, RecommendationGenerator, RecommendationTypeRegistry,
};
use campaign_core::config::{HealthConfig, PhaseThresholds};
use campaign_core::{
    Analysis, AnalysisType, AppConfig, AppliedAction, CampaignError, CampaignResult, CampaignTracking,
    MetricsComparison, StoreError,
};
use campaign_metrics::MetricsAggregator;
use campaign_store::{AnalysisCommit, AnalysisStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::report::{CampaignSummary, RunReport};

pub struct AnalysisOrchestrator {
    store: Arc<dyn AnalysisStore>,
    aggregator: Arc<MetricsAggregator>,
    registry: Arc<RecommendationTypeRegistry>,
    executor: Arc<ActionExecutor>,
    generator: RecommendationGenerator,
    phase: PhaseThresholds,
    health: HealthConfig,
    batch_budget: Option<Duration>,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        aggregator: Arc<MetricsAggregator>,
        registry: Arc<RecommendationTypeRegistry>,
        executor: Arc<ActionExecutor>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            registry,
            executor,
            generator: RecommendationGenerator::new(
                config.rules.clone(),
                config.phase.clone(),
                config.health.clone(),
            ),
            phase: config.phase.clone(),
            health: config.health.clone(),
            batch_budget: config.scheduler.batch_budget(),
        }
    }

    pub fn with_batch_budget(mut self, budget: Option<Duration>) -> Self {
        self.batch_budget = budget;
        self
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    /// Analyze every campaign due at `now`, strictly one at a time.
    ///
    /// Only discovery failure is returned as an error. Per-campaign failures
    /// are logged and listed in the report; campaigns not started before the
    /// batch budget expires are counted as deferred and remain due.
    pub async fn run_due(&self, now: DateTime<Utc>) -> CampaignResult<RunReport> {
        let started = Instant::now();
        let due = self
            .store
            .due_campaigns(now)
            .await
            .map_err(CampaignError::Discovery)?;

        let mut report = RunReport::new(due.len(), now);
        if due.is_empty() {
            info!("No campaigns due for analysis");
            return Ok(report.finish(Utc::now()));
        }
        info!(due = due.len(), "Starting analysis batch");

        for (index, tracking) in due.iter().enumerate() {
            if let Some(budget) = self.batch_budget {
                if started.elapsed() >= budget {
                    report.deferred = due.len() - index;
                    warn!(
                        deferred = report.deferred,
                        budget_secs = budget.as_secs(),
                        "Batch budget exhausted, leaving remaining campaigns due"
                    );
                    break;
                }
            }

            match self.process(tracking, AnalysisType::Scheduled, now).await {
                Ok(summary) => report.record_success(summary),
                Err(e) => {
                    error!(
                        campaign_id = %tracking.campaign_id,
                        campaign_name = %tracking.campaign_name,
                        scope = ?e.scope(),
                        error = %e,
                        "Campaign analysis failed"
                    );
                    metrics::counter!("optimizer.campaigns.failed").increment(1);
                    report.record_failure(&tracking.campaign_id, &tracking.campaign_name, &e);
                }
            }
        }

        let report = report.finish(Utc::now());
        info!(
            status = ?report.status,
            analyzed = report.analyzed,
            failed = report.failed,
            deferred = report.deferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis batch finished"
        );
        Ok(report)
    }

    /// Analyze one campaign now, whether or not it is due.
    pub async fn analyze_campaign(&self, campaign_id: &str, now: DateTime<Utc>) -> CampaignResult<CampaignSummary> {
        let tracking = self
            .store
            .find_campaign(campaign_id)
            .await?
            .ok_or_else(|| CampaignError::NotTracked(campaign_id.to_string()))?;
        self.process(&tracking, AnalysisType::Manual, now).await
    }

    /// Upstream changes already made by the gate must survive a failed
    /// commit, so they go to the action log on their own.
    async fn uncommitted(&self, campaign_id: &str, error: StoreError, attempts: Vec<AppliedAction>) -> CampaignError {
        if !attempts.iter().any(|a| a.outcome.is_applied()) {
            return CampaignError::Store(error);
        }
        metrics::counter!("optimizer.actions.uncommitted").increment(attempts.len() as u64);
        match self.store.record_applied_actions(campaign_id, &attempts).await {
            Ok(()) => warn!(
                campaign_id = %campaign_id,
                actions = attempts.len(),
                error = %error,
                "Analysis commit failed after auto-apply; actions written to the action log"
            ),
            Err(log_error) => error!(
                campaign_id = %campaign_id,
                actions = ?attempts,
                error = %error,
                log_error = %log_error,
                "Analysis commit failed after auto-apply and the action log write failed"
            ),
        }
        CampaignError::UncommittedActions {
            source: error,
            actions: attempts,
        }
    }

    async fn process(
        &self,
        prior: &CampaignTracking,
        analysis_type: AnalysisType,
        now: DateTime<Utc>,
    ) -> CampaignResult<CampaignSummary> {
        let campaign_id = prior.campaign_id.as_str();
        let aggregate = self.aggregator.aggregate(campaign_id, now).await;
        let current = aggregate.snapshot.as_ref();

        let phase = derive_phase(prior, current, &self.phase);
        let health = health_score(prior, current, &aggregate.data_sources, &self.health);

        let recommendations = self.generator.generate(&GeneratorInput {
            campaign_id,
            current,
            baseline: prior.baseline_metrics.as_ref(),
            keywords: &aggregate.keywords,
            search_terms: &aggregate.search_terms,
            analytics: aggregate.analytics.as_ref(),
            search_console: aggregate.search_console.as_ref(),
            now,
        });
        let gate = apply_gate(recommendations, &self.registry, &self.executor, now).await;

        let mut tracking = prior.clone();
        tracking.phase = phase;
        tracking.health_score = health.score;
        tracking.last_analysis_date = Some(now);
        tracking.next_analysis_date = next_analysis_date(phase, now);
        tracking.analysis_count = tracking.analysis_count.saturating_add(1);
        tracking.current_metrics = current.copied();
        tracking.updated_at = now;
        if let Some(snapshot) = current {
            if tracking.baseline_metrics.is_none() {
                tracking.baseline_metrics = Some(*snapshot);
            }
            tracking.recent_metrics.push(*snapshot);
            let keep = self.phase.stability_window.max(1);
            if tracking.recent_metrics.len() > keep {
                let excess = tracking.recent_metrics.len() - keep;
                tracking.recent_metrics.drain(..excess);
            }
        }

        let summary_text = summarize(&InsightInput {
            campaign_name: &prior.campaign_name,
            phase,
            prior_phase: prior.phase,
            health: &health,
            current,
            data_sources: &aggregate.data_sources,
            recommendations: &gate.recommendations,
        });

        let auto_applied = gate.auto_applied();
        let pending_approval = gate.pending();
        let analysis = Analysis {
            id: Uuid::new_v4(),
            campaign_tracking_id: prior.id,
            campaign_id: prior.campaign_id.clone(),
            analysis_type,
            data_sources: aggregate.data_sources,
            metrics: MetricsComparison {
                before: prior.current_metrics,
                after: current.copied(),
            },
            phase,
            health_score: health.score,
            recommendations: gate.recommendations,
            ai_insights_summary: summary_text,
            applied_actions: gate.applied_actions,
            created_at: now,
        };
        let analysis_id = analysis.id;
        let recommendation_count = analysis.recommendations.len();
        let next = tracking.next_analysis_date;

        let attempts = analysis.applied_actions.clone();
        if let Err(e) = self
            .store
            .commit_analysis(AnalysisCommit {
                tracking,
                expected_version: prior.version,
                analysis,
            })
            .await
        {
            return Err(self.uncommitted(campaign_id, e, attempts).await);
        }

        metrics::counter!("optimizer.campaigns.analyzed", "phase" => phase.as_str()).increment(1);
        info!(
            campaign_id = %campaign_id,
            phase = %phase,
            health_score = health.score,
            low_confidence = health.low_confidence,
            sources = aggregate.data_sources.count(),
            recommendations = recommendation_count,
            auto_applied = auto_applied.len(),
            pending = pending_approval.len(),
            "Campaign analyzed"
        );

        Ok(CampaignSummary {
            campaign_id: prior.campaign_id.clone(),
            campaign_name: prior.campaign_name.clone(),
            analysis_id,
            recommendation_count,
            auto_applied_count: auto_applied.len(),
            pending_count: pending_approval.len(),
            health_score: health.score,
            low_confidence: health.low_confidence,
            phase,
            next_analysis_date: next,
            auto_applied,
            pending_approval,
        })
    }
}
