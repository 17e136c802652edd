//! Health score: a 0–100 synthesis of normalized component scores.

use campaign_core::config::HealthConfig;
use campaign_core::{CampaignTracking, DataSource, DataSources, MetricsSnapshot};
use serde::Serialize;

/// Component scores, each in `[0, 1]`; higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponents {
    pub ctr: f64,
    pub conversion: f64,
    pub efficiency: f64,
    pub completeness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAssessment {
    pub score: u8,
    /// Set when no campaign metrics were available. The score is then capped
    /// at `HealthConfig::low_confidence_cap`.
    pub low_confidence: bool,
    pub components: HealthComponents,
}

/// Score a campaign for this analysis.
///
/// Each component is non-decreasing in its own "good" direction, so the
/// weighted score is too. The result is always within `[0, 100]`.
pub fn health_score(
    prior: &CampaignTracking,
    current: Option<&MetricsSnapshot>,
    sources: &DataSources,
    config: &HealthConfig,
) -> HealthAssessment {
    let completeness = sources.count() as f64 / DataSource::ALL.len() as f64;

    let Some(current) = current else {
        return HealthAssessment {
            score: prior.health_score.min(config.low_confidence_cap),
            low_confidence: true,
            components: HealthComponents {
                completeness,
                ..HealthComponents::default()
            },
        };
    };

    let components = HealthComponents {
        ctr: benchmark_ratio(current.ctr, config.ctr_benchmark),
        conversion: benchmark_ratio(current.conversion_rate, config.conversion_rate_benchmark),
        efficiency: efficiency(prior.baseline_metrics.as_ref(), current),
        completeness,
    };

    let weights = [
        (components.ctr, config.ctr_weight),
        (components.conversion, config.conversion_weight),
        (components.efficiency, config.efficiency_weight),
        (components.completeness, config.completeness_weight),
    ];
    let total_weight: f64 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
    let weighted = if total_weight > 0.0 {
        weights.iter().map(|(c, w)| c * w.max(0.0)).sum::<f64>() / total_weight
    } else {
        0.0
    };

    HealthAssessment {
        score: to_score(weighted),
        low_confidence: false,
        components,
    }
}

/// `value / benchmark`, saturating at 1.
fn benchmark_ratio(value: f64, benchmark: f64) -> f64 {
    if benchmark <= 0.0 {
        return 1.0;
    }
    (value / benchmark).clamp(0.0, 1.0)
}

/// Cost per conversion against the baseline. Spend without conversions
/// scores zero, conversions without spend score full, and no activity at
/// all is neutral.
fn efficiency(baseline: Option<&MetricsSnapshot>, current: &MetricsSnapshot) -> f64 {
    if current.cost <= 0.0 {
        return if current.has_conversions() { 1.0 } else { 0.5 };
    }
    if !current.has_conversions() {
        return 0.0;
    }
    match baseline {
        Some(b) if b.cost_per_conversion > 0.0 => {
            (b.cost_per_conversion / current.cost_per_conversion).clamp(0.0, 1.0)
        }
        // first analysis: current is its own reference
        _ => 1.0,
    }
}

fn to_score(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn all_sources() -> DataSources {
        DataSources {
            ad_platform: true,
            web_analytics: true,
            search_console: true,
        }
    }

    fn with_baseline(baseline: MetricsSnapshot) -> CampaignTracking {
        let mut t = CampaignTracking::new("cmp-1", "Brand", Utc::now());
        t.analysis_count = 5;
        t.baseline_metrics = Some(baseline);
        t
    }

    #[test]
    fn test_healthy_campaign_scores_high() {
        let baseline = MetricsSnapshot::from_totals(10_000, 200, 400.0, 6.0);
        let current = MetricsSnapshot::from_totals(10_000, 210, 410.0, 6.3);
        let h = health_score(&with_baseline(baseline), Some(&current), &all_sources(), &HealthConfig::default());
        assert!(h.score >= 70, "score was {}", h.score);
        assert!(!h.low_confidence);
    }

    #[test]
    fn test_score_is_monotonic_in_conversions() {
        let baseline = MetricsSnapshot::from_totals(10_000, 200, 400.0, 6.0);
        let tracking = with_baseline(baseline);
        let config = HealthConfig::default();
        let mut last = 0;
        for conversions in [0.0, 1.0, 2.0, 4.0, 6.0, 8.0] {
            let current = MetricsSnapshot::from_totals(10_000, 200, 400.0, conversions);
            let score = health_score(&tracking, Some(&current), &all_sources(), &config).score;
            assert!(score >= last, "{score} < {last} at {conversions} conversions");
            last = score;
        }
    }

    #[test]
    fn test_score_never_drops_as_cost_falls() {
        let baseline = MetricsSnapshot::from_totals(10_000, 200, 400.0, 6.0);
        let tracking = with_baseline(baseline);
        let config = HealthConfig::default();
        for conversions in [0.0, 6.0] {
            let mut last = 0;
            for cost in [800.0, 400.0, 200.0, 1.0, 0.0] {
                let current = MetricsSnapshot::from_totals(10_000, 200, cost, conversions);
                let score = health_score(&tracking, Some(&current), &all_sources(), &config).score;
                assert!(score >= last, "{score} < {last} at cost {cost}, {conversions} conversions");
                last = score;
            }
        }
    }

    #[test]
    fn test_missing_sources_lower_the_score() {
        let baseline = MetricsSnapshot::from_totals(10_000, 200, 400.0, 6.0);
        let tracking = with_baseline(baseline);
        let config = HealthConfig::default();
        let full = health_score(&tracking, Some(&baseline), &all_sources(), &config).score;
        let partial = DataSources {
            ad_platform: true,
            ..DataSources::default()
        };
        let reduced = health_score(&tracking, Some(&baseline), &partial, &config).score;
        assert!(reduced < full);
    }

    #[test]
    fn test_no_data_is_low_confidence_and_capped() {
        let mut tracking = with_baseline(MetricsSnapshot::default());
        tracking.health_score = 95;
        let config = HealthConfig::default();
        let h = health_score(&tracking, None, &DataSources::default(), &config);
        assert!(h.low_confidence);
        assert!(h.score <= config.low_confidence_cap);
    }

    #[test]
    fn test_score_stays_in_range_for_extreme_inputs() {
        let tracking = with_baseline(MetricsSnapshot::from_totals(10, 1, 0.01, 1.0));
        let current = MetricsSnapshot::from_totals(u64::MAX, u64::MAX, f64::MAX, f64::MAX);
        let h = health_score(&tracking, Some(&current), &all_sources(), &HealthConfig::default());
        assert!(h.score <= 100);
    }
}
