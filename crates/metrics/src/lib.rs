//! Metrics sources and aggregation.
//!
//! Three independent upstream providers (ad platform, web analytics, search
//! console) sit behind their own traits. The [`MetricsAggregator`] queries
//! them concurrently for one campaign and returns a best-effort aggregate in
//! which every source may be missing.

pub mod aggregator;
pub mod clients;
pub mod http;

pub use aggregator::{AggregatedMetrics, MetricsAggregator, SourceFailure};
pub use clients::{AdPlatformSource, NegativeKeywordWriter, SearchConsoleSource, WebAnalyticsSource};
pub use http::{HttpAdPlatform, HttpSearchConsole, HttpWebAnalytics};
