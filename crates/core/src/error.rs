use std::time::Duration;
use thiserror::Error;

use crate::metrics::DataSource;
use crate::recommendation::{RecommendationStatus, RecommendationType};
use crate::tracking::AppliedAction;

pub type CampaignResult<T> = Result<T, CampaignError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// How far an error is allowed to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// One upstream source failed; the campaign continues with partial data.
    Source,
    /// The pipeline for one campaign is abandoned; the batch continues.
    Campaign,
    /// Nothing can be processed in this run.
    Batch,
}

/// Failure of a single upstream metrics source. Always recoverable.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("{origin} timed out after {after:?}")]
    Timeout { origin: DataSource, after: Duration },

    #[error("{0} is not configured")]
    NotConfigured(DataSource),

    #[error("campaign {0} not present in ad platform report")]
    CampaignNotFound(String),

    #[error("{origin} request failed: {message}")]
    Request { origin: DataSource, message: String },

    #[error("{origin} returned an undecodable payload: {message}")]
    Decode { origin: DataSource, message: String },
}

/// Failure of the action executor while auto-applying a recommendation.
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    #[error("no executor implementation for {0}")]
    Unsupported(RecommendationType),

    #[error("recommendation payload does not match {0}")]
    PayloadMismatch(RecommendationType),

    #[error("upstream mutation failed: {0}")]
    Upstream(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("tracking for {campaign_id} changed concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        campaign_id: String,
        expected: u64,
        found: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("campaign {0} is already tracked")]
    AlreadyTracked(String),

    #[error("recommendation {id} is {from:?}, only pending recommendations can be decided")]
    InvalidStatusTransition {
        id: uuid::Uuid,
        from: RecommendationStatus,
    },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics source error: {0}")]
    Source(#[from] SourceError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The analysis commit failed after upstream changes were already made.
    /// `actions` lists every auto-apply attempt of that run.
    #[error("Store error after upstream changes were applied: {source}")]
    UncommittedActions {
        source: StoreError,
        actions: Vec<AppliedAction>,
    },

    #[error("Campaign {0} is not tracked")]
    NotTracked(String),

    #[error("Campaign discovery failed: {0}")]
    Discovery(#[source] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CampaignError {
    /// Auto-apply attempts that no committed analysis records.
    pub fn uncommitted_actions(&self) -> &[AppliedAction] {
        match self {
            CampaignError::UncommittedActions { actions, .. } => actions,
            _ => &[],
        }
    }

    pub fn scope(&self) -> ErrorScope {
        match self {
            CampaignError::Source(_) => ErrorScope::Source,
            CampaignError::Discovery(_) | CampaignError::Config(_) => ErrorScope::Batch,
            CampaignError::Action(_)
            | CampaignError::Store(_)
            | CampaignError::UncommittedActions { .. }
            | CampaignError::NotTracked(_)
            | CampaignError::Serialization(_)
            | CampaignError::Internal(_) => ErrorScope::Campaign,
        }
    }
}
