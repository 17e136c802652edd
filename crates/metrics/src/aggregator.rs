//! Metrics aggregator: fans out to every configured source for one campaign
//! and merges whatever came back.

use campaign_core::config::SourcesConfig;
use campaign_core::metrics::{
    AnalyticsSummary, DataSource, DataSources, DateWindow, KeywordPerformance, MetricsSnapshot,
    SearchConsoleSummary, SearchTermPerformance,
};
use campaign_core::SourceError;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clients::{AdPlatformSource, SearchConsoleSource, WebAnalyticsSource};
use crate::http::{HttpAdPlatform, HttpSearchConsole, HttpWebAnalytics};

/// A source that did not contribute to an aggregate, and why.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: DataSource,
    pub error: SourceError,
}

/// Best-effort view of one campaign across all sources.
#[derive(Debug, Clone)]
pub struct AggregatedMetrics {
    pub campaign_id: String,
    pub window: DateWindow,
    pub data_sources: DataSources,
    /// Campaign totals; `None` whenever the ad platform did not answer.
    pub snapshot: Option<MetricsSnapshot>,
    pub keywords: Vec<KeywordPerformance>,
    pub search_terms: Vec<SearchTermPerformance>,
    pub analytics: Option<AnalyticsSummary>,
    pub search_console: Option<SearchConsoleSummary>,
    pub failures: Vec<SourceFailure>,
}

impl AggregatedMetrics {
    fn empty(campaign_id: &str, window: DateWindow) -> Self {
        Self {
            campaign_id: campaign_id.to_string(),
            window,
            data_sources: DataSources::default(),
            snapshot: None,
            keywords: Vec::new(),
            search_terms: Vec::new(),
            analytics: None,
            search_console: None,
            failures: Vec::new(),
        }
    }

    fn record_failure(&mut self, source: DataSource, error: SourceError) {
        match &error {
            SourceError::NotConfigured(_) => {
                debug!(campaign_id = %self.campaign_id, source = %source, "Source not configured, skipping")
            }
            _ => {
                warn!(campaign_id = %self.campaign_id, source = %source, error = %error, "Source failed, continuing with partial data");
                metrics::counter!("optimizer.source.failures", "source" => source.as_str()).increment(1);
            }
        }
        self.failures.push(SourceFailure { source, error });
    }
}

struct AdPlatformData {
    snapshot: MetricsSnapshot,
    keywords: Vec<KeywordPerformance>,
    search_terms: Vec<SearchTermPerformance>,
    detail_failures: Vec<SourceError>,
}

/// Queries the three sources concurrently. Each source is optional and
/// bounded by the configured timeout; no source error escapes `aggregate`.
pub struct MetricsAggregator {
    ad_platform: Option<Arc<dyn AdPlatformSource>>,
    web_analytics: Option<Arc<dyn WebAnalyticsSource>>,
    search_console: Option<Arc<dyn SearchConsoleSource>>,
    config: SourcesConfig,
}

impl MetricsAggregator {
    pub fn new(config: SourcesConfig) -> Self {
        Self {
            ad_platform: None,
            web_analytics: None,
            search_console: None,
            config,
        }
    }

    /// Build HTTP clients for every endpoint present in the config.
    /// Returns the ad platform client separately so it can also back the
    /// negative keyword action.
    pub fn from_config(config: &SourcesConfig) -> Result<(Self, Option<Arc<HttpAdPlatform>>), SourceError> {
        let timeout = config.timeout();
        let mut aggregator = Self::new(config.clone());

        let ad_platform = match &config.ad_platform {
            Some(endpoint) => Some(Arc::new(HttpAdPlatform::new(endpoint, timeout)?)),
            None => None,
        };
        if let Some(client) = &ad_platform {
            aggregator.ad_platform = Some(client.clone());
        }
        if let Some(endpoint) = &config.web_analytics {
            aggregator.web_analytics = Some(Arc::new(HttpWebAnalytics::new(endpoint, timeout)?));
        }
        if let Some(endpoint) = &config.search_console {
            aggregator.search_console = Some(Arc::new(HttpSearchConsole::new(endpoint, timeout)?));
        }

        info!(
            ad_platform = aggregator.ad_platform.is_some(),
            web_analytics = aggregator.web_analytics.is_some(),
            search_console = aggregator.search_console.is_some(),
            "Metrics aggregator initialized"
        );
        Ok((aggregator, ad_platform))
    }

    pub fn with_ad_platform(mut self, source: Arc<dyn AdPlatformSource>) -> Self {
        self.ad_platform = Some(source);
        self
    }

    pub fn with_web_analytics(mut self, source: Arc<dyn WebAnalyticsSource>) -> Self {
        self.web_analytics = Some(source);
        self
    }

    pub fn with_search_console(mut self, source: Arc<dyn SearchConsoleSource>) -> Self {
        self.search_console = Some(source);
        self
    }

    /// Aggregate the lookback window ending at `now` for one campaign.
    /// Completes even when every source fails.
    pub async fn aggregate(&self, campaign_id: &str, now: DateTime<Utc>) -> AggregatedMetrics {
        let window = DateWindow::lookback(now, self.config.lookback_days);
        let timeout = self.config.timeout();

        let (ad, analytics, console) = tokio::join!(
            bounded(DataSource::AdPlatform, timeout, self.fetch_ad_platform(campaign_id, &window)),
            bounded(DataSource::WebAnalytics, timeout, self.fetch_web_analytics(&window)),
            bounded(DataSource::SearchConsole, timeout, self.fetch_search_console(&window)),
        );

        let mut aggregate = AggregatedMetrics::empty(campaign_id, window);

        match ad {
            Ok(data) => {
                aggregate.data_sources.mark(DataSource::AdPlatform);
                aggregate.snapshot = Some(data.snapshot);
                aggregate.keywords = data.keywords;
                aggregate.search_terms = data.search_terms;
                for error in data.detail_failures {
                    aggregate.record_failure(DataSource::AdPlatform, error);
                }
            }
            Err(e) => aggregate.record_failure(DataSource::AdPlatform, e),
        }

        match analytics {
            Ok(summary) => {
                aggregate.data_sources.mark(DataSource::WebAnalytics);
                aggregate.analytics = Some(summary);
            }
            Err(e) => aggregate.record_failure(DataSource::WebAnalytics, e),
        }

        match console {
            Ok(summary) => {
                aggregate.data_sources.mark(DataSource::SearchConsole);
                aggregate.search_console = Some(summary);
            }
            Err(e) => aggregate.record_failure(DataSource::SearchConsole, e),
        }

        debug!(
            campaign_id = campaign_id,
            sources = aggregate.data_sources.count(),
            "Metrics aggregated"
        );
        aggregate
    }

    async fn fetch_ad_platform(&self, campaign_id: &str, window: &DateWindow) -> Result<AdPlatformData, SourceError> {
        let source = self
            .ad_platform
            .as_ref()
            .ok_or(SourceError::NotConfigured(DataSource::AdPlatform))?;

        let performance = source.campaign_performance(window).await?;
        let row = performance
            .iter()
            .find(|row| row.id == campaign_id)
            .ok_or_else(|| SourceError::CampaignNotFound(campaign_id.to_string()))?;

        // Keyword and search-term detail only enrich the recommendations;
        // losing either keeps the campaign totals.
        let (keywords, search_terms) = tokio::join!(
            source.keyword_performance(campaign_id, window),
            source.search_terms(campaign_id, window),
        );
        let mut detail_failures = Vec::new();
        let keywords = keywords.unwrap_or_else(|e| {
            detail_failures.push(e);
            Vec::new()
        });
        let search_terms = search_terms.unwrap_or_else(|e| {
            detail_failures.push(e);
            Vec::new()
        });

        Ok(AdPlatformData {
            snapshot: row.snapshot(),
            keywords,
            search_terms,
            detail_failures,
        })
    }

    async fn fetch_web_analytics(&self, window: &DateWindow) -> Result<AnalyticsSummary, SourceError> {
        let source = self
            .web_analytics
            .as_ref()
            .ok_or(SourceError::NotConfigured(DataSource::WebAnalytics))?;
        let (overview, top_pages) = tokio::try_join!(
            source.overview(window),
            source.top_pages(window, self.config.top_pages_limit),
        )?;
        Ok(AnalyticsSummary { overview, top_pages })
    }

    async fn fetch_search_console(&self, window: &DateWindow) -> Result<SearchConsoleSummary, SourceError> {
        let source = self
            .search_console
            .as_ref()
            .ok_or(SourceError::NotConfigured(DataSource::SearchConsole))?;
        let queries = source
            .top_queries(&self.config.site_url, window, self.config.top_queries_limit)
            .await?;
        Ok(SearchConsoleSummary {
            site_url: self.config.site_url.clone(),
            queries,
        })
    }
}

/// Run one source branch under a deadline, recording its latency.
async fn bounded<T, F>(origin: DataSource, timeout: Duration, fut: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout { origin, after: timeout }),
    };
    metrics::histogram!("optimizer.source.latency_ms", "source" => origin.as_str())
        .record(start.elapsed().as_millis() as f64);
    result
}
