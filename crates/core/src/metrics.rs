//! Metrics snapshot and the raw records returned by the three upstream sources.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized performance of one campaign over the lookback window.
///
/// All numeric fields are non-negative; `ctr` and `conversion_rate` are
/// fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
    pub cost: f64,
    pub conversions: f64,
    pub conversion_rate: f64,
    pub cpc: f64,
    pub cost_per_conversion: f64,
}

impl MetricsSnapshot {
    /// Build a snapshot from raw totals, deriving every ratio.
    ///
    /// Negative or non-finite inputs are clamped to zero; clicks are capped at
    /// impressions and conversions at clicks so the rates stay in `[0, 1]`.
    pub fn from_totals(impressions: u64, clicks: u64, cost: f64, conversions: f64) -> Self {
        let clicks = clicks.min(impressions);
        let cost = non_negative(cost);
        let conversions = non_negative(conversions).min(clicks as f64);

        Self {
            impressions,
            clicks,
            ctr: ratio(clicks as f64, impressions as f64),
            cost,
            conversions,
            conversion_rate: ratio(conversions, clicks as f64),
            cpc: ratio(cost, clicks as f64),
            cost_per_conversion: ratio(cost, conversions),
        }
    }

    /// Whether any conversion was recorded in the window.
    pub fn has_conversions(&self) -> bool {
        self.conversions > 0.0
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        non_negative(numerator / denominator)
    } else {
        0.0
    }
}

// ─── Data sources ───────────────────────────────────────────────────────────

/// One of the three independent upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    AdPlatform,
    WebAnalytics,
    SearchConsole,
}

impl DataSource {
    pub const ALL: [DataSource; 3] = [
        DataSource::AdPlatform,
        DataSource::WebAnalytics,
        DataSource::SearchConsole,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::AdPlatform => "ad_platform",
            DataSource::WebAnalytics => "web_analytics",
            DataSource::SearchConsole => "search_console",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sources succeeded for one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSources {
    pub ad_platform: bool,
    pub web_analytics: bool,
    pub search_console: bool,
}

impl DataSources {
    pub fn mark(&mut self, source: DataSource) {
        match source {
            DataSource::AdPlatform => self.ad_platform = true,
            DataSource::WebAnalytics => self.web_analytics = true,
            DataSource::SearchConsole => self.search_console = true,
        }
    }

    pub fn succeeded(&self, source: DataSource) -> bool {
        match source {
            DataSource::AdPlatform => self.ad_platform,
            DataSource::WebAnalytics => self.web_analytics,
            DataSource::SearchConsole => self.search_console,
        }
    }

    pub fn count(&self) -> usize {
        DataSource::ALL
            .iter()
            .filter(|source| self.succeeded(**source))
            .count()
    }

    pub fn none(&self) -> bool {
        self.count() == 0
    }
}

/// Inclusive date range queried from every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// The `days` full days ending at `now`.
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Self {
        let end = now.date_naive();
        let start = end - Duration::days(i64::from(days.saturating_sub(1)));
        Self { start, end }
    }
}

// ─── Ad platform records ────────────────────────────────────────────────────

/// Row of `getCampaignPerformance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPerformance {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub impressions: u64,
    pub clicks: u64,
    #[serde(default)]
    pub ctr: f64,
    pub cost: f64,
    pub conversions: f64,
    #[serde(default)]
    pub avg_cpc: f64,
    #[serde(default)]
    pub cost_per_conversion: f64,
}

impl CampaignPerformance {
    /// Ratios are re-derived from totals rather than trusted from upstream.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_totals(self.impressions, self.clicks, self.cost, self.conversions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Phrase,
    Broad,
}

/// Row of `getKeywordPerformance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordPerformance {
    pub keyword: String,
    pub match_type: MatchType,
    pub impressions: u64,
    pub clicks: u64,
    pub cost: f64,
    pub conversions: f64,
    #[serde(default)]
    pub quality_score: Option<u8>,
}

impl KeywordPerformance {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_totals(self.impressions, self.clicks, self.cost, self.conversions)
    }
}

/// Row of the search-term report: what users actually typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTermPerformance {
    pub search_term: String,
    pub impressions: u64,
    pub clicks: u64,
    pub cost: f64,
    pub conversions: f64,
}

// ─── Web analytics records ──────────────────────────────────────────────────

/// Result of `getOverview`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub sessions: u64,
    pub users: u64,
    /// Fraction in `[0, 1]`.
    pub avg_bounce_rate: f64,
    pub avg_session_duration_secs: f64,
    #[serde(default)]
    pub conversions: f64,
}

/// Row of `getTopPages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub path: String,
    pub sessions: u64,
    pub bounce_rate: f64,
    pub avg_session_duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub overview: AnalyticsOverview,
    pub top_pages: Vec<PageMetrics>,
}

// ─── Search console records ─────────────────────────────────────────────────

/// Row of `getTopQueries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetrics {
    pub query: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConsoleSummary {
    pub site_url: String,
    pub queries: Vec<QueryMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_snapshot_derives_ratios() {
        let m = MetricsSnapshot::from_totals(10_000, 200, 300.0, 6.0);
        assert!((m.ctr - 0.02).abs() < 1e-12);
        assert!((m.conversion_rate - 0.03).abs() < 1e-12);
        assert!((m.cpc - 1.5).abs() < 1e-12);
        assert!((m.cost_per_conversion - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_zero_clicks_has_zero_rates() {
        let m = MetricsSnapshot::from_totals(500, 0, 0.0, 0.0);
        assert_eq!(m.conversion_rate, 0.0);
        assert_eq!(m.cpc, 0.0);
        assert_eq!(m.cost_per_conversion, 0.0);
        assert!(!m.has_conversions());
    }

    #[test]
    fn test_snapshot_clamps_inconsistent_inputs() {
        let m = MetricsSnapshot::from_totals(10, 50, -3.0, f64::NAN);
        assert_eq!(m.clicks, 10);
        assert_eq!(m.cost, 0.0);
        assert_eq!(m.conversions, 0.0);
        assert!(m.ctr <= 1.0);
    }

    #[test]
    fn test_data_sources_count() {
        let mut sources = DataSources::default();
        assert!(sources.none());
        sources.mark(DataSource::WebAnalytics);
        sources.mark(DataSource::SearchConsole);
        assert_eq!(sources.count(), 2);
        assert!(!sources.succeeded(DataSource::AdPlatform));
    }

    #[test]
    fn test_lookback_window_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let window = DateWindow::lookback(now, 30);
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }
}
