//! HTTP/JSON clients for the three providers.
//!
//! Each provider is reached through a reporting gateway that already speaks
//! the record shapes in `campaign_core::metrics`; provider-specific wire
//! formats stay behind that gateway.

use async_trait::async_trait;
use campaign_core::config::EndpointConfig;
use campaign_core::metrics::{
    AnalyticsOverview, CampaignPerformance, DataSource, DateWindow, KeywordPerformance,
    PageMetrics, QueryMetrics, SearchTermPerformance,
};
use campaign_core::SourceError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::clients::{AdPlatformSource, NegativeKeywordWriter, SearchConsoleSource, WebAnalyticsSource};

/// Shared request plumbing for one provider endpoint.
struct JsonEndpoint {
    origin: DataSource,
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl JsonEndpoint {
    fn new(origin: DataSource, config: &EndpointConfig, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request {
                origin,
                message: e.to_string(),
            })?;
        Ok(Self {
            origin,
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Request {
                origin: self.origin,
                message: format!("base url {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = self.url(segments)?;
        debug!(source = %self.origin, url = %url, "Fetching source report");
        let request = self.authorize(self.client.get(url).query(query));
        self.send(request).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &serde_json::Value,
    ) -> Result<T, SourceError> {
        let url = self.url(segments)?;
        let request = self.authorize(self.client.post(url).json(body));
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, SourceError> {
        let response = request.send().await.map_err(|e| self.request_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Request {
                origin: self.origin,
                message: format!("HTTP {status}"),
            });
        }
        response.json::<T>().await.map_err(|e| SourceError::Decode {
            origin: self.origin,
            message: e.to_string(),
        })
    }

    fn request_error(&self, error: reqwest::Error) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout {
                origin: self.origin,
                after: self.timeout,
            }
        } else {
            SourceError::Request {
                origin: self.origin,
                message: error.to_string(),
            }
        }
    }
}

fn window_query(window: &DateWindow) -> Vec<(&'static str, String)> {
    vec![
        ("startDate", window.start.to_string()),
        ("endDate", window.end.to_string()),
    ]
}

// ─── Ad platform ────────────────────────────────────────────────────────────

pub struct HttpAdPlatform {
    endpoint: JsonEndpoint,
}

impl HttpAdPlatform {
    pub fn new(config: &EndpointConfig, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            endpoint: JsonEndpoint::new(DataSource::AdPlatform, config, timeout)?,
        })
    }
}

#[derive(Deserialize)]
struct CreatedCriterion {
    id: String,
}

#[async_trait]
impl AdPlatformSource for HttpAdPlatform {
    async fn campaign_performance(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<CampaignPerformance>, SourceError> {
        self.endpoint
            .get(&["campaigns", "performance"], &window_query(window))
            .await
    }

    async fn keyword_performance(
        &self,
        campaign_id: &str,
        window: &DateWindow,
    ) -> Result<Vec<KeywordPerformance>, SourceError> {
        self.endpoint
            .get(&["campaigns", campaign_id, "keywords"], &window_query(window))
            .await
    }

    async fn search_terms(
        &self,
        campaign_id: &str,
        window: &DateWindow,
    ) -> Result<Vec<SearchTermPerformance>, SourceError> {
        self.endpoint
            .get(&["campaigns", campaign_id, "search-terms"], &window_query(window))
            .await
    }
}

#[async_trait]
impl NegativeKeywordWriter for HttpAdPlatform {
    async fn add_negative_keyword(&self, campaign_id: &str, text: &str) -> Result<String, SourceError> {
        let body = serde_json::json!({ "text": text, "matchType": "exact" });
        let created: CreatedCriterion = self
            .endpoint
            .post(&["campaigns", campaign_id, "negative-keywords"], &body)
            .await?;
        Ok(created.id)
    }
}

// ─── Web analytics ──────────────────────────────────────────────────────────

pub struct HttpWebAnalytics {
    endpoint: JsonEndpoint,
}

impl HttpWebAnalytics {
    pub fn new(config: &EndpointConfig, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            endpoint: JsonEndpoint::new(DataSource::WebAnalytics, config, timeout)?,
        })
    }
}

#[async_trait]
impl WebAnalyticsSource for HttpWebAnalytics {
    async fn overview(&self, window: &DateWindow) -> Result<AnalyticsOverview, SourceError> {
        self.endpoint.get(&["overview"], &window_query(window)).await
    }

    async fn top_pages(&self, window: &DateWindow, limit: usize) -> Result<Vec<PageMetrics>, SourceError> {
        let mut query = window_query(window);
        query.push(("limit", limit.to_string()));
        self.endpoint.get(&["pages", "top"], &query).await
    }
}

// ─── Search console ─────────────────────────────────────────────────────────

pub struct HttpSearchConsole {
    endpoint: JsonEndpoint,
}

impl HttpSearchConsole {
    pub fn new(config: &EndpointConfig, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            endpoint: JsonEndpoint::new(DataSource::SearchConsole, config, timeout)?,
        })
    }
}

#[async_trait]
impl SearchConsoleSource for HttpSearchConsole {
    async fn top_queries(
        &self,
        site_url: &str,
        window: &DateWindow,
        limit: usize,
    ) -> Result<Vec<QueryMetrics>, SourceError> {
        let mut query = window_query(window);
        query.push(("siteUrl", site_url.to_string()));
        query.push(("limit", limit.to_string()));
        self.endpoint.get(&["queries", "top"], &query).await
    }
}
