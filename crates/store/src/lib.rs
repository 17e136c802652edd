#![warn(clippy::unwrap_used)]

//! Storage for tracked campaigns, analysis history and recommendations.
//!
//! Every write produced by one campaign's analysis goes through
//! [`AnalysisStore::commit_analysis`], which applies the tracking update,
//! the analysis record and the recommendations together or not at all.
//! Tracking rows carry a version; a commit whose expected version no longer
//! matches is rejected with `StoreError::VersionConflict`.
//!
//! Each campaign also has an append-only action log holding every auto-apply
//! attempt. Commits append their analysis' attempts; when a commit fails after
//! upstream changes were made, the orchestrator appends them on their own.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use campaign_core::{
    Analysis, AppliedAction, CampaignTracking, Decision, Recommendation, StoreResult,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use crate::memory::MemoryStore;
pub use crate::redis_store::RedisStore;

/// Everything one campaign pipeline writes.
#[derive(Debug, Clone)]
pub struct AnalysisCommit {
    /// Updated tracking row. Its `version` is ignored; the store assigns
    /// `expected_version + 1`.
    pub tracking: CampaignTracking,
    /// Version the pipeline read at the start of the run.
    pub expected_version: u64,
    /// History record; its recommendations are stored individually and the
    /// pending ones are queued for review.
    pub analysis: Analysis,
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Tracking rows with `next_analysis_date <= now`, oldest due first.
    async fn due_campaigns(&self, now: DateTime<Utc>) -> StoreResult<Vec<CampaignTracking>>;

    async fn find_campaign(&self, campaign_id: &str) -> StoreResult<Option<CampaignTracking>>;

    async fn list_campaigns(&self) -> StoreResult<Vec<CampaignTracking>>;

    /// Register a new campaign. Fails with `AlreadyTracked` on a duplicate id.
    async fn track_campaign(&self, tracking: CampaignTracking) -> StoreResult<CampaignTracking>;

    /// Atomically persist one analysis and append its applied actions to the
    /// action log. Returns the new tracking version.
    async fn commit_analysis(&self, commit: AnalysisCommit) -> StoreResult<u64>;

    /// Append auto-apply attempts to a campaign's action log in one write.
    async fn record_applied_actions(&self, campaign_id: &str, actions: &[AppliedAction]) -> StoreResult<()>;

    /// The campaign's action log, oldest first.
    async fn applied_actions(&self, campaign_id: &str) -> StoreResult<Vec<AppliedAction>>;

    /// Most recent analyses for a campaign, newest first.
    async fn list_analyses(&self, campaign_id: &str, limit: usize) -> StoreResult<Vec<Analysis>>;

    /// Pending recommendations, optionally for one campaign, most urgent first.
    async fn pending_recommendations(&self, campaign_id: Option<&str>) -> StoreResult<Vec<Recommendation>>;

    /// Record a human decision on a pending recommendation.
    async fn decide_recommendation(
        &self,
        id: Uuid,
        decision: Decision,
        actor: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Recommendation>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Apply a decision to a recommendation that is known to be pending.
pub(crate) fn decided(mut rec: Recommendation, decision: Decision, actor: &str, at: DateTime<Utc>) -> Recommendation {
    rec.status = decision.into();
    rec.decided_at = Some(at);
    rec.decided_by = Some(actor.to_string());
    rec
}

/// Review queue order: priority, then creation time.
pub(crate) fn sort_queue(recs: &mut [Recommendation]) {
    recs.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
}
