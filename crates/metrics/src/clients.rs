//! Source traits, one per upstream provider.
//! Implementations translate the provider's API into the records in
//! `campaign_core::metrics`.

use async_trait::async_trait;
use campaign_core::metrics::{
    AnalyticsOverview, CampaignPerformance, DateWindow, KeywordPerformance, PageMetrics,
    QueryMetrics, SearchTermPerformance,
};
use campaign_core::SourceError;

/// Advertising platform performance reports.
#[async_trait]
pub trait AdPlatformSource: Send + Sync {
    async fn campaign_performance(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<CampaignPerformance>, SourceError>;

    async fn keyword_performance(
        &self,
        campaign_id: &str,
        window: &DateWindow,
    ) -> Result<Vec<KeywordPerformance>, SourceError>;

    async fn search_terms(
        &self,
        campaign_id: &str,
        window: &DateWindow,
    ) -> Result<Vec<SearchTermPerformance>, SourceError>;
}

/// Write-back used by the negative keyword action.
#[async_trait]
pub trait NegativeKeywordWriter: Send + Sync {
    /// Add `text` as an exact-match negative keyword. Returns the platform's
    /// identifier for the created criterion.
    async fn add_negative_keyword(&self, campaign_id: &str, text: &str) -> Result<String, SourceError>;
}

/// Web analytics property for the marketing site.
#[async_trait]
pub trait WebAnalyticsSource: Send + Sync {
    async fn overview(&self, window: &DateWindow) -> Result<AnalyticsOverview, SourceError>;

    async fn top_pages(&self, window: &DateWindow, limit: usize) -> Result<Vec<PageMetrics>, SourceError>;
}

/// Organic search queries for the marketing site.
#[async_trait]
pub trait SearchConsoleSource: Send + Sync {
    async fn top_queries(
        &self,
        site_url: &str,
        window: &DateWindow,
        limit: usize,
    ) -> Result<Vec<QueryMetrics>, SourceError>;
}
