//! Lifecycle phase derivation.
//!
//! The phase is recomputed from scratch on every analysis; there is no
//! transition table. A declining campaign returns to `optimizing` as soon as
//! its rates recover.

use campaign_core::config::PhaseThresholds;
use campaign_core::{CampaignPhase, CampaignTracking, MetricsSnapshot};
use chrono::{DateTime, Utc};

/// Current metrics relative to baseline. Each ratio is `current / baseline`;
/// a rate ratio is `None` when either side lacks the volume to compare it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendAssessment {
    pub conversion_ratio: Option<f64>,
    pub ctr_ratio: Option<f64>,
    pub cost_ratio: f64,
}

impl TrendAssessment {
    pub fn new(baseline: &MetricsSnapshot, current: &MetricsSnapshot, th: &PhaseThresholds) -> Self {
        let conversion_ratio = (baseline.clicks >= th.min_clicks
            && current.clicks >= th.min_clicks
            && baseline.conversion_rate > 0.0)
            .then(|| current.conversion_rate / baseline.conversion_rate);

        let ctr_ratio = (baseline.impressions >= th.min_impressions
            && current.impressions >= th.min_impressions
            && baseline.ctr > 0.0)
            .then(|| current.ctr / baseline.ctr);

        let cost_ratio = if baseline.cost > 0.0 {
            current.cost / baseline.cost
        } else {
            1.0
        };

        Self {
            conversion_ratio,
            ctr_ratio,
            cost_ratio,
        }
    }

    /// The lower of the comparable rate ratios.
    pub fn worst_ratio(&self) -> Option<f64> {
        match (self.conversion_ratio, self.ctr_ratio) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Relative drop of a ratio, zero when it improved.
    pub fn drop(ratio: f64) -> f64 {
        (1.0 - ratio).max(0.0)
    }

    /// A rate fell by more than the threshold and spend did not fall with it.
    pub fn is_declining(&self, th: &PhaseThresholds) -> bool {
        match self.worst_ratio() {
            Some(worst) => Self::drop(worst) > th.decline_relative_drop && self.cost_ratio > worst,
            None => false,
        }
    }
}

/// Derive the phase for this analysis.
///
/// Without current metrics the stored phase is kept unchanged.
pub fn derive_phase(
    prior: &CampaignTracking,
    current: Option<&MetricsSnapshot>,
    th: &PhaseThresholds,
) -> CampaignPhase {
    let Some(current) = current else {
        return prior.phase;
    };

    if prior.analysis_count == 0 {
        return CampaignPhase::New;
    }
    if prior.analysis_count < th.learning_analyses {
        return CampaignPhase::Learning;
    }
    if let Some(baseline) = &prior.baseline_metrics {
        if TrendAssessment::new(baseline, current, th).is_declining(th) {
            return CampaignPhase::Declining;
        }
    }
    if is_stable(&prior.recent_metrics, current, th) {
        return CampaignPhase::Mature;
    }
    CampaignPhase::Optimizing
}

/// Whether the last `stability_window` snapshots, ending with `current`, all
/// sit within the tolerance band around their mean CTR and conversion rate.
fn is_stable(history: &[MetricsSnapshot], current: &MetricsSnapshot, th: &PhaseThresholds) -> bool {
    if th.stability_window < 2 {
        return false;
    }
    let needed = th.stability_window - 1;
    if history.len() < needed {
        return false;
    }

    let mut window: Vec<&MetricsSnapshot> = history[history.len() - needed..].iter().collect();
    window.push(current);

    within_band(window.iter().map(|m| m.ctr), th.stability_tolerance)
        && within_band(window.iter().map(|m| m.conversion_rate), th.stability_tolerance)
}

fn within_band(values: impl Iterator<Item = f64> + Clone, tolerance: f64) -> bool {
    let count = values.clone().count();
    if count == 0 {
        return false;
    }
    let mean = values.clone().sum::<f64>() / count as f64;
    if mean == 0.0 {
        return values.into_iter().all(|v| v == 0.0);
    }
    values.into_iter().all(|v| ((v - mean) / mean).abs() <= tolerance)
}

pub fn next_analysis_date(phase: CampaignPhase, analyzed_at: DateTime<Utc>) -> DateTime<Utc> {
    analyzed_at + phase.analysis_interval()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ctr_bp: u64, conversions: f64, cost: f64) -> MetricsSnapshot {
        // 10k impressions; ctr in basis points of impressions
        MetricsSnapshot::from_totals(10_000, ctr_bp, cost, conversions)
    }

    fn tracked(count: u32, baseline: MetricsSnapshot, history: Vec<MetricsSnapshot>) -> CampaignTracking {
        let mut t = CampaignTracking::new("cmp-1", "Brand", Utc::now());
        t.analysis_count = count;
        t.phase = CampaignPhase::Optimizing;
        t.baseline_metrics = Some(baseline);
        t.recent_metrics = history;
        t
    }

    #[test]
    fn test_first_analysis_is_new() {
        let t = CampaignTracking::new("cmp-1", "Brand", Utc::now());
        let m = snapshot(200, 6.0, 400.0);
        assert_eq!(derive_phase(&t, Some(&m), &PhaseThresholds::default()), CampaignPhase::New);
    }

    #[test]
    fn test_early_analyses_are_learning() {
        let base = snapshot(200, 6.0, 400.0);
        let t = tracked(2, base, vec![base]);
        assert_eq!(
            derive_phase(&t, Some(&base), &PhaseThresholds::default()),
            CampaignPhase::Learning
        );
    }

    #[test]
    fn test_conversion_collapse_with_flat_cost_is_declining() {
        // 3% -> 1% conversion rate on 500 clicks, same spend
        let base = MetricsSnapshot::from_totals(10_000, 500, 1_000.0, 15.0);
        let now = MetricsSnapshot::from_totals(10_000, 500, 1_000.0, 5.0);
        let t = tracked(5, base, vec![base, base]);
        assert_eq!(
            derive_phase(&t, Some(&now), &PhaseThresholds::default()),
            CampaignPhase::Declining
        );
    }

    #[test]
    fn test_drop_matched_by_cost_drop_is_not_declining() {
        let base = MetricsSnapshot::from_totals(10_000, 500, 1_000.0, 15.0);
        // rate halves but spend fell to a quarter
        let now = MetricsSnapshot::from_totals(10_000, 500, 250.0, 7.5);
        let trend = TrendAssessment::new(&base, &now, &PhaseThresholds::default());
        assert!(!trend.is_declining(&PhaseThresholds::default()));
    }

    #[test]
    fn test_stable_history_is_mature() {
        let base = snapshot(200, 6.0, 400.0);
        let near = snapshot(205, 6.0, 410.0);
        let t = tracked(6, base, vec![base, near]);
        assert_eq!(
            derive_phase(&t, Some(&snapshot(210, 6.0, 400.0)), &PhaseThresholds::default()),
            CampaignPhase::Mature
        );
    }

    #[test]
    fn test_volatile_history_is_optimizing() {
        let base = snapshot(200, 6.0, 400.0);
        let t = tracked(6, base, vec![snapshot(120, 6.0, 400.0), snapshot(300, 6.0, 400.0)]);
        assert_eq!(
            derive_phase(&t, Some(&base), &PhaseThresholds::default()),
            CampaignPhase::Optimizing
        );
    }

    #[test]
    fn test_declining_recovers_when_rates_return() {
        let base = MetricsSnapshot::from_totals(10_000, 500, 1_000.0, 15.0);
        let mut t = tracked(6, base, vec![MetricsSnapshot::from_totals(10_000, 500, 1_000.0, 5.0)]);
        t.phase = CampaignPhase::Declining;
        assert_eq!(
            derive_phase(&t, Some(&base), &PhaseThresholds::default()),
            CampaignPhase::Optimizing
        );
    }

    #[test]
    fn test_missing_metrics_keeps_prior_phase() {
        let base = snapshot(200, 6.0, 400.0);
        let mut t = tracked(6, base, vec![]);
        t.phase = CampaignPhase::Declining;
        assert_eq!(derive_phase(&t, None, &PhaseThresholds::default()), CampaignPhase::Declining);
    }

    #[test]
    fn test_low_volume_is_never_declining() {
        let base = MetricsSnapshot::from_totals(100, 10, 50.0, 3.0);
        let now = MetricsSnapshot::from_totals(100, 10, 50.0, 0.0);
        let trend = TrendAssessment::new(&base, &now, &PhaseThresholds::default());
        assert!(trend.worst_ratio().is_none());
        assert!(!trend.is_declining(&PhaseThresholds::default()));
    }

    #[test]
    fn test_next_analysis_follows_cadence() {
        let at = Utc::now();
        assert_eq!(
            next_analysis_date(CampaignPhase::Declining, at) - at,
            chrono::Duration::days(3)
        );
        assert_eq!(
            next_analysis_date(CampaignPhase::Mature, at) - at,
            chrono::Duration::days(14)
        );
    }
}
