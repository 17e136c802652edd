pub mod config;
pub mod error;
pub mod metrics;
pub mod recommendation;
pub mod tracking;

pub use config::AppConfig;
pub use error::{
    ActionError, CampaignError, CampaignResult, ErrorScope, SourceError, StoreError, StoreResult,
};
pub use metrics::{
    AnalyticsOverview, AnalyticsSummary, CampaignPerformance, DataSource, DataSources, DateWindow,
    KeywordPerformance, MatchType, MetricsSnapshot, PageMetrics, QueryMetrics,
    SearchConsoleSummary, SearchTermPerformance,
};
pub use recommendation::{
    Decision, Direction, Priority, Recommendation, RecommendationReason, RecommendationRef,
    RecommendationStatus, RecommendationType, RegistryEntry, RiskLevel,
};
pub use tracking::{
    ActionOutcome, Analysis, AnalysisType, AppliedAction, CampaignPhase, CampaignTracking,
    MetricsComparison,
};
