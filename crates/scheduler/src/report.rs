use campaign_core::{AppliedAction, CampaignError, CampaignPhase, RecommendationRef};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Discovery found nothing to do.
    NoCampaignsDue,
    /// Every due campaign was analyzed.
    Completed,
    /// Every due campaign was attempted; some failed.
    CompletedWithErrors,
    /// The batch budget ran out; the remaining campaigns stay due.
    BudgetExhausted,
}

/// Outcome of one successfully analyzed campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    pub campaign_id: String,
    pub campaign_name: String,
    pub analysis_id: Uuid,
    pub recommendation_count: usize,
    pub auto_applied_count: usize,
    pub pending_count: usize,
    pub health_score: u8,
    pub low_confidence: bool,
    pub phase: CampaignPhase,
    pub next_analysis_date: DateTime<Utc>,
    pub auto_applied: Vec<RecommendationRef>,
    pub pending_approval: Vec<RecommendationRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignFailure {
    pub campaign_id: String,
    pub campaign_name: String,
    pub error: String,
    /// Auto-apply attempts made before the failure that no committed
    /// analysis records.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uncommitted_actions: Vec<AppliedAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub status: RunStatus,
    pub due: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub deferred: usize,
    pub results: Vec<CampaignSummary>,
    pub errors: Vec<CampaignFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub(crate) fn new(due: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::NoCampaignsDue,
            due,
            analyzed: 0,
            failed: 0,
            deferred: 0,
            results: Vec::new(),
            errors: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    pub(crate) fn record_success(&mut self, summary: CampaignSummary) {
        self.analyzed += 1;
        self.results.push(summary);
    }

    pub(crate) fn record_failure(&mut self, campaign_id: &str, campaign_name: &str, error: &CampaignError) {
        self.failed += 1;
        self.errors.push(CampaignFailure {
            campaign_id: campaign_id.to_string(),
            campaign_name: campaign_name.to_string(),
            error: error.to_string(),
            uncommitted_actions: error.uncommitted_actions().to_vec(),
        });
    }

    pub(crate) fn finish(mut self, finished_at: DateTime<Utc>) -> Self {
        self.status = if self.due == 0 {
            RunStatus::NoCampaignsDue
        } else if self.deferred > 0 {
            RunStatus::BudgetExhausted
        } else if self.failed > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };
        self.finished_at = finished_at;
        self
    }
}
