//! Optimization recommendations and the closed set of recommendation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::metrics::MatchType;

/// Closed set of recommendation types. Each has exactly one entry in the
/// type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    KeywordNegative,
    KeywordRemove,
    BidAdjustment,
    BudgetChange,
    AdCopyRefresh,
    LandingPageReview,
    ContentOpportunity,
    KeywordExpansion,
}

impl RecommendationType {
    pub const ALL: [RecommendationType; 8] = [
        RecommendationType::KeywordNegative,
        RecommendationType::KeywordRemove,
        RecommendationType::BidAdjustment,
        RecommendationType::BudgetChange,
        RecommendationType::AdCopyRefresh,
        RecommendationType::LandingPageReview,
        RecommendationType::ContentOpportunity,
        RecommendationType::KeywordExpansion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::KeywordNegative => "keyword_negative",
            RecommendationType::KeywordRemove => "keyword_remove",
            RecommendationType::BidAdjustment => "bid_adjustment",
            RecommendationType::BudgetChange => "budget_change",
            RecommendationType::AdCopyRefresh => "ad_copy_refresh",
            RecommendationType::LandingPageReview => "landing_page_review",
            RecommendationType::ContentOpportunity => "content_opportunity",
            RecommendationType::KeywordExpansion => "keyword_expansion",
        }
    }
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering is significant: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    #[default]
    Pending,
    AutoApplied,
    Approved,
    Rejected,
}

/// A human decision on a pending recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for RecommendationStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => RecommendationStatus::Approved,
            Decision::Rejected => RecommendationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// Why a recommendation was produced. The variant fixes the recommendation
/// type; each carries the inputs of the rule that fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "reasonData", rename_all = "snake_case")]
pub enum RecommendationReason {
    #[serde(rename_all = "camelCase")]
    KeywordNegative {
        search_term: String,
        impressions: u64,
        clicks: u64,
        cost: f64,
        conversions: f64,
    },
    #[serde(rename_all = "camelCase")]
    KeywordRemove {
        keyword: String,
        match_type: MatchType,
        clicks: u64,
        cost: f64,
        conversions: f64,
        quality_score: Option<u8>,
    },
    #[serde(rename_all = "camelCase")]
    BidAdjustment {
        keyword: String,
        direction: Direction,
        suggested_change_pct: f64,
        keyword_cost_per_conversion: f64,
        campaign_cost_per_conversion: f64,
        keyword_conversion_rate: f64,
    },
    #[serde(rename_all = "camelCase")]
    BudgetChange {
        direction: Direction,
        suggested_change_pct: f64,
        current_cost: f64,
        current_conversion_rate: f64,
        baseline_conversion_rate: f64,
        current_cost_per_conversion: f64,
        baseline_cost_per_conversion: f64,
    },
    #[serde(rename_all = "camelCase")]
    AdCopyRefresh {
        current_ctr: f64,
        reference_ctr: f64,
        impressions: u64,
    },
    #[serde(rename_all = "camelCase")]
    LandingPageReview {
        page_path: Option<String>,
        bounce_rate: f64,
        avg_session_duration_secs: f64,
        conversion_rate: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    ContentOpportunity {
        query: String,
        impressions: u64,
        clicks: u64,
        ctr: f64,
        position: f64,
    },
    #[serde(rename_all = "camelCase")]
    KeywordExpansion {
        query: String,
        clicks: u64,
        impressions: u64,
        position: f64,
    },
}

impl RecommendationReason {
    pub fn kind(&self) -> RecommendationType {
        match self {
            RecommendationReason::KeywordNegative { .. } => RecommendationType::KeywordNegative,
            RecommendationReason::KeywordRemove { .. } => RecommendationType::KeywordRemove,
            RecommendationReason::BidAdjustment { .. } => RecommendationType::BidAdjustment,
            RecommendationReason::BudgetChange { .. } => RecommendationType::BudgetChange,
            RecommendationReason::AdCopyRefresh { .. } => RecommendationType::AdCopyRefresh,
            RecommendationReason::LandingPageReview { .. } => RecommendationType::LandingPageReview,
            RecommendationReason::ContentOpportunity { .. } => RecommendationType::ContentOpportunity,
            RecommendationReason::KeywordExpansion { .. } => RecommendationType::KeywordExpansion,
        }
    }
}

/// A single optimization recommendation.
///
/// Only `status`, `decided_at` and `decided_by` change after creation, and
/// only through a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: Uuid,
    pub campaign_id: String,
    pub priority: Priority,
    pub title: String,
    #[serde(flatten)]
    pub reason: RecommendationReason,
    pub auto_applicable: bool,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decided_by: Option<String>,
}

impl Recommendation {
    pub fn new(
        campaign_id: &str,
        priority: Priority,
        title: impl Into<String>,
        reason: RecommendationReason,
        auto_applicable: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id: campaign_id.to_string(),
            priority,
            title: title.into(),
            reason,
            auto_applicable,
            status: RecommendationStatus::Pending,
            created_at,
            decided_at: None,
            decided_by: None,
        }
    }

    pub fn kind(&self) -> RecommendationType {
        self.reason.kind()
    }

    pub fn is_pending(&self) -> bool {
        self.status == RecommendationStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Registry metadata for one recommendation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub auto_applicable: bool,
    pub risk_level: RiskLevel,
}

/// Compact reference used in run summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRef {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub title: String,
}

impl From<&Recommendation> for RecommendationRef {
    fn from(rec: &Recommendation) -> Self {
        Self {
            id: rec.id,
            kind: rec.kind(),
            priority: rec.priority,
            title: rec.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_orders_critical_first() {
        let mut priorities = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_reason_serializes_as_type_and_reason_data() {
        let rec = Recommendation::new(
            "cmp-1",
            Priority::High,
            "Add negative keyword \"free\"",
            RecommendationReason::KeywordNegative {
                search_term: "free".into(),
                impressions: 900,
                clicks: 40,
                cost: 80.0,
                conversions: 0.0,
            },
            true,
            Utc::now(),
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "keyword_negative");
        assert_eq!(json["reasonData"]["searchTerm"], "free");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["autoApplicable"], true);

        let back: Recommendation = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), RecommendationType::KeywordNegative);
    }

    #[test]
    fn test_every_type_has_a_distinct_name() {
        let mut names: Vec<&str> = RecommendationType::ALL.iter().map(|t| t.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RecommendationType::ALL.len());
    }
}
