//! Campaign tracking state and the append-only analysis history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::metrics::{DataSources, MetricsSnapshot};
use crate::recommendation::{Recommendation, RecommendationType};

/// Derived lifecycle classification, recomputed on every analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignPhase {
    #[default]
    New,
    Learning,
    Optimizing,
    Mature,
    Declining,
}

impl CampaignPhase {
    /// Days until the next scheduled analysis. Depends on nothing but the phase.
    pub fn analysis_interval_days(&self) -> i64 {
        match self {
            CampaignPhase::New | CampaignPhase::Learning => 7,
            CampaignPhase::Declining => 3,
            CampaignPhase::Optimizing | CampaignPhase::Mature => 14,
        }
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::days(self.analysis_interval_days())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignPhase::New => "new",
            CampaignPhase::Learning => "learning",
            CampaignPhase::Optimizing => "optimizing",
            CampaignPhase::Mature => "mature",
            CampaignPhase::Declining => "declining",
        }
    }
}

impl fmt::Display for CampaignPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracking row for one advertising campaign under management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignTracking {
    pub id: Uuid,
    /// External platform identifier; unique key.
    pub campaign_id: String,
    pub campaign_name: String,
    pub phase: CampaignPhase,
    pub health_score: u8,
    /// Set on the first analysis, never overwritten.
    pub baseline_metrics: Option<MetricsSnapshot>,
    pub current_metrics: Option<MetricsSnapshot>,
    /// Most recent snapshots, oldest first, bounded by the stability window.
    #[serde(default)]
    pub recent_metrics: Vec<MetricsSnapshot>,
    pub last_analysis_date: Option<DateTime<Utc>>,
    pub next_analysis_date: DateTime<Utc>,
    pub analysis_count: u32,
    /// Optimistic concurrency token, bumped on every committed update.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignTracking {
    /// A freshly registered campaign, due for analysis immediately.
    pub fn new(campaign_id: impl Into<String>, campaign_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id: campaign_id.into(),
            campaign_name: campaign_name.into(),
            phase: CampaignPhase::New,
            health_score: 0,
            baseline_metrics: None,
            current_metrics: None,
            recent_metrics: Vec::new(),
            last_analysis_date: None,
            next_analysis_date: now,
            analysis_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_analysis_date <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Scheduled,
    Manual,
}

/// Snapshots for delta reporting.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsComparison {
    pub before: Option<MetricsSnapshot>,
    pub after: Option<MetricsSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied { detail: String },
    Failed { error: String },
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied { .. })
    }
}

/// One attempted automatic application, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedAction {
    pub recommendation_id: Uuid,
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub outcome: ActionOutcome,
    pub executed_at: DateTime<Utc>,
}

/// Append-only history record, one per run per campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: Uuid,
    pub campaign_tracking_id: Uuid,
    pub campaign_id: String,
    pub analysis_type: AnalysisType,
    pub data_sources: DataSources,
    pub metrics: MetricsComparison,
    pub phase: CampaignPhase,
    pub health_score: u8,
    pub recommendations: Vec<Recommendation>,
    pub ai_insights_summary: String,
    pub applied_actions: Vec<AppliedAction>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_table() {
        assert_eq!(CampaignPhase::New.analysis_interval_days(), 7);
        assert_eq!(CampaignPhase::Learning.analysis_interval_days(), 7);
        assert_eq!(CampaignPhase::Declining.analysis_interval_days(), 3);
        assert_eq!(CampaignPhase::Optimizing.analysis_interval_days(), 14);
        assert_eq!(CampaignPhase::Mature.analysis_interval_days(), 14);
    }

    #[test]
    fn test_new_tracking_is_due_immediately() {
        let now = Utc::now();
        let tracking = CampaignTracking::new("123", "Brand", now);
        assert!(tracking.is_due(now));
        assert!(!tracking.is_due(now - Duration::seconds(1)));
        assert_eq!(tracking.analysis_count, 0);
        assert!(tracking.baseline_metrics.is_none());
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&CampaignPhase::Declining).unwrap(), "\"declining\"");
    }
}
