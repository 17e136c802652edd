use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::recommendation::{RecommendationType, RegistryEntry};

/// Root application configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_OPTIMIZER__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub phase: PhaseThresholds,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub rules: RuleThresholds,
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Shared secret for the run trigger and admin routes. Unset disables them.
    #[serde(default)]
    pub trigger_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Connection details for one upstream metrics provider.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: Url,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Upper bound on each individual source call.
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_top_pages_limit")]
    pub top_pages_limit: usize,
    #[serde(default = "default_top_queries_limit")]
    pub top_queries_limit: usize,
    #[serde(default)]
    pub ad_platform: Option<EndpointConfig>,
    #[serde(default)]
    pub web_analytics: Option<EndpointConfig>,
    #[serde(default)]
    pub search_console: Option<EndpointConfig>,
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Wall-clock budget for one batch. Zero means unbounded.
    #[serde(default = "default_batch_budget_secs")]
    pub batch_budget_secs: u64,
}

impl SchedulerConfig {
    pub fn batch_budget(&self) -> Option<Duration> {
        (self.batch_budget_secs > 0).then(|| Duration::from_secs(self.batch_budget_secs))
    }
}

// Default functions
fn default_node_id() -> String {
    "optimizer-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_key_prefix() -> String {
    "optimizer".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_lookback_days() -> u32 {
    30
}
fn default_source_timeout_ms() -> u64 {
    10_000
}
fn default_site_url() -> String {
    "sc-domain:example.com".to_string()
}
fn default_top_pages_limit() -> usize {
    10
}
fn default_top_queries_limit() -> usize {
    50
}
fn default_batch_budget_secs() -> u64 {
    540
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            trigger_secret: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            timeout_ms: default_source_timeout_ms(),
            site_url: default_site_url(),
            top_pages_limit: default_top_pages_limit(),
            top_queries_limit: default_top_queries_limit(),
            ad_platform: None,
            web_analytics: None,
            search_console: None,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_budget_secs: default_batch_budget_secs(),
        }
    }
}

// ─── Analysis tunables ──────────────────────────────────────────────────────

/// Thresholds for phase derivation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhaseThresholds {
    /// Campaigns with fewer completed analyses than this are `learning`.
    pub learning_analyses: u32,
    /// Relative drop of conversion rate or CTR versus baseline that counts as decline.
    pub decline_relative_drop: f64,
    /// Number of snapshots (including the current one) that must agree for `mature`.
    pub stability_window: usize,
    /// Max relative deviation from the window mean still considered stable.
    pub stability_tolerance: f64,
    /// Minimum clicks on both sides before conversion rates are compared.
    pub min_clicks: u64,
    /// Minimum impressions on both sides before CTRs are compared.
    pub min_impressions: u64,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            learning_analyses: 3,
            decline_relative_drop: 0.30,
            stability_window: 3,
            stability_tolerance: 0.10,
            min_clicks: 20,
            min_impressions: 500,
        }
    }
}

/// Benchmarks and weights for the health score.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub ctr_benchmark: f64,
    pub conversion_rate_benchmark: f64,
    pub ctr_weight: f64,
    pub conversion_weight: f64,
    pub efficiency_weight: f64,
    pub completeness_weight: f64,
    /// Ceiling for scores computed without usable metrics.
    pub low_confidence_cap: u8,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ctr_benchmark: 0.02,
            conversion_rate_benchmark: 0.03,
            ctr_weight: 0.30,
            conversion_weight: 0.35,
            efficiency_weight: 0.20,
            completeness_weight: 0.15,
            low_confidence_cap: 40,
        }
    }
}

/// Thresholds for the recommendation rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    pub negative_min_cost: f64,
    pub negative_min_clicks: u64,
    pub keyword_poor_quality_score: u8,
    pub bid_increase_conversion_multiple: f64,
    pub bid_decrease_cpa_multiple: f64,
    pub budget_increase_cpa_improvement: f64,
    pub ctr_floor_fraction: f64,
    pub bounce_rate_high: f64,
    pub bounce_rate_medium: f64,
    pub query_min_impressions: u64,
    pub query_ctr_floor: f64,
    pub query_max_position: f64,
    pub expansion_min_clicks: u64,
    pub max_search_console_recommendations: usize,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            negative_min_cost: 25.0,
            negative_min_clicks: 10,
            keyword_poor_quality_score: 3,
            bid_increase_conversion_multiple: 1.5,
            bid_decrease_cpa_multiple: 2.0,
            budget_increase_cpa_improvement: 0.20,
            ctr_floor_fraction: 0.5,
            bounce_rate_high: 0.70,
            bounce_rate_medium: 0.55,
            query_min_impressions: 500,
            query_ctr_floor: 0.01,
            query_max_position: 10.0,
            expansion_min_clicks: 20,
            max_search_console_recommendations: 5,
        }
    }
}

/// Versioned overrides applied to the built-in recommendation type registry
/// once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_version")]
    pub version: String,
    #[serde(default)]
    pub overrides: HashMap<RecommendationType, RegistryEntry>,
}

fn default_registry_version() -> String {
    "builtin-1".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            version: default_registry_version(),
            overrides: HashMap::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            store: StoreConfig::default(),
            redis: RedisConfig::default(),
            sources: SourcesConfig::default(),
            scheduler: SchedulerConfig::default(),
            phase: PhaseThresholds::default(),
            health: HealthConfig::default(),
            rules: RuleThresholds::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file, then environment
    /// variables (which take precedence).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_OPTIMIZER")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
