//! In-process store backed by DashMap. Used for tests and single-node runs.

use async_trait::async_trait;
use campaign_core::{
    Analysis, AppliedAction, CampaignTracking, Decision, Recommendation, StoreError, StoreResult,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::{decided, sort_queue, AnalysisCommit, AnalysisStore};

#[derive(Default)]
pub struct MemoryStore {
    campaigns: DashMap<String, CampaignTracking>,
    /// Per campaign, oldest first.
    analyses: DashMap<String, Vec<Analysis>>,
    recommendations: DashMap<Uuid, Recommendation>,
    /// Per campaign, oldest first.
    actions: DashMap<String, Vec<AppliedAction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn commit(&self, commit: AnalysisCommit) -> StoreResult<u64> {
        let campaign_id = commit.tracking.campaign_id.clone();

        // The row guard is held until every part is written, so a concurrent
        // commit for the same campaign observes either all of it or none.
        let mut row = self
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| StoreError::NotFound(campaign_id.clone()))?;
        if row.version != commit.expected_version {
            metrics::counter!("store.version_conflicts", "backend" => "memory").increment(1);
            return Err(StoreError::VersionConflict {
                campaign_id,
                expected: commit.expected_version,
                found: row.version,
            });
        }

        for rec in &commit.analysis.recommendations {
            self.recommendations.insert(rec.id, rec.clone());
        }
        if !commit.analysis.applied_actions.is_empty() {
            self.actions
                .entry(campaign_id.clone())
                .or_default()
                .extend(commit.analysis.applied_actions.iter().cloned());
        }
        self.analyses
            .entry(campaign_id.clone())
            .or_default()
            .push(commit.analysis);

        let version = commit.expected_version + 1;
        *row = CampaignTracking {
            version,
            ..commit.tracking
        };
        debug!(campaign_id = %campaign_id, version = version, "Analysis committed");
        Ok(version)
    }

    fn decide(&self, id: Uuid, decision: Decision, actor: &str, at: DateTime<Utc>) -> StoreResult<Recommendation> {
        let mut entry = self
            .recommendations
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !entry.is_pending() {
            return Err(StoreError::InvalidStatusTransition { id, from: entry.status });
        }
        let updated = decided(entry.clone(), decision, actor, at);
        *entry = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn due_campaigns(&self, now: DateTime<Utc>) -> StoreResult<Vec<CampaignTracking>> {
        let mut due: Vec<CampaignTracking> = self
            .campaigns
            .iter()
            .filter(|row| row.is_due(now))
            .map(|row| row.value().clone())
            .collect();
        due.sort_by(|a, b| {
            a.next_analysis_date
                .cmp(&b.next_analysis_date)
                .then_with(|| a.campaign_id.cmp(&b.campaign_id))
        });
        Ok(due)
    }

    async fn find_campaign(&self, campaign_id: &str) -> StoreResult<Option<CampaignTracking>> {
        Ok(self.campaigns.get(campaign_id).map(|row| row.value().clone()))
    }

    async fn list_campaigns(&self) -> StoreResult<Vec<CampaignTracking>> {
        let mut all: Vec<CampaignTracking> = self.campaigns.iter().map(|row| row.value().clone()).collect();
        all.sort_by(|a, b| a.campaign_id.cmp(&b.campaign_id));
        Ok(all)
    }

    async fn track_campaign(&self, tracking: CampaignTracking) -> StoreResult<CampaignTracking> {
        match self.campaigns.entry(tracking.campaign_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::AlreadyTracked(tracking.campaign_id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tracking.clone());
                Ok(tracking)
            }
        }
    }

    async fn commit_analysis(&self, commit: AnalysisCommit) -> StoreResult<u64> {
        self.commit(commit)
    }

    async fn record_applied_actions(&self, campaign_id: &str, actions: &[AppliedAction]) -> StoreResult<()> {
        if actions.is_empty() {
            return Ok(());
        }
        self.actions
            .entry(campaign_id.to_string())
            .or_default()
            .extend_from_slice(actions);
        debug!(campaign_id = %campaign_id, count = actions.len(), "Applied actions logged");
        Ok(())
    }

    async fn applied_actions(&self, campaign_id: &str) -> StoreResult<Vec<AppliedAction>> {
        Ok(self
            .actions
            .get(campaign_id)
            .map(|log| log.value().clone())
            .unwrap_or_default())
    }

    async fn list_analyses(&self, campaign_id: &str, limit: usize) -> StoreResult<Vec<Analysis>> {
        Ok(self
            .analyses
            .get(campaign_id)
            .map(|list| list.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn pending_recommendations(&self, campaign_id: Option<&str>) -> StoreResult<Vec<Recommendation>> {
        let mut pending: Vec<Recommendation> = self
            .recommendations
            .iter()
            .filter(|rec| rec.is_pending())
            .filter(|rec| campaign_id.map_or(true, |cid| rec.campaign_id == cid))
            .map(|rec| rec.value().clone())
            .collect();
        sort_queue(&mut pending);
        Ok(pending)
    }

    async fn decide_recommendation(
        &self,
        id: Uuid,
        decision: Decision,
        actor: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Recommendation> {
        self.decide(id, decision, actor, at)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
