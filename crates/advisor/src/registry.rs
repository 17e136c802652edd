//! Recommendation type registry.
//!
//! Static metadata per recommendation type: whether the type may ever be
//! applied automatically and how risky it is. Built once at startup from the
//! built-in table plus configured overrides; never mutated afterwards.

use campaign_core::config::RegistryConfig;
use campaign_core::{Recommendation, RecommendationType, RegistryEntry, RiskLevel};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RecommendationTypeRegistry {
    version: String,
    entries: HashMap<RecommendationType, RegistryEntry>,
}

const fn entry(auto_applicable: bool, risk_level: RiskLevel) -> RegistryEntry {
    RegistryEntry {
        auto_applicable,
        risk_level,
    }
}

fn builtin_entry(kind: RecommendationType) -> RegistryEntry {
    match kind {
        RecommendationType::KeywordNegative => entry(true, RiskLevel::Low),
        RecommendationType::KeywordRemove => entry(false, RiskLevel::Medium),
        RecommendationType::BidAdjustment => entry(true, RiskLevel::Medium),
        RecommendationType::BudgetChange => entry(false, RiskLevel::High),
        RecommendationType::AdCopyRefresh => entry(false, RiskLevel::Medium),
        RecommendationType::LandingPageReview => entry(false, RiskLevel::Low),
        RecommendationType::ContentOpportunity => entry(false, RiskLevel::Low),
        RecommendationType::KeywordExpansion => entry(false, RiskLevel::Medium),
    }
}

impl RecommendationTypeRegistry {
    pub fn builtin() -> Self {
        Self::from_config(&RegistryConfig::default())
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        let mut entries: HashMap<RecommendationType, RegistryEntry> = RecommendationType::ALL
            .iter()
            .map(|kind| (*kind, builtin_entry(*kind)))
            .collect();
        for (kind, overridden) in &config.overrides {
            entries.insert(*kind, *overridden);
        }

        let auto: Vec<&str> = RecommendationType::ALL
            .iter()
            .filter(|k| entries.get(*k).is_some_and(|e| e.auto_applicable && e.risk_level == RiskLevel::Low))
            .map(|k| k.as_str())
            .collect();
        info!(
            version = %config.version,
            overrides = config.overrides.len(),
            auto_apply_types = ?auto,
            "Recommendation type registry loaded"
        );

        Self {
            version: config.version.clone(),
            entries,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn entry(&self, kind: RecommendationType) -> RegistryEntry {
        self.entries
            .get(&kind)
            .copied()
            .unwrap_or_else(|| builtin_entry(kind))
    }

    /// Registry half of the auto-apply gate: the type must be marked
    /// auto-applicable and low risk, and the instance must agree.
    pub fn permits_auto_apply(&self, rec: &Recommendation) -> bool {
        let entry = self.entry(rec.kind());
        rec.auto_applicable && entry.auto_applicable && entry.risk_level == RiskLevel::Low
    }
}

impl Default for RecommendationTypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::{Priority, RecommendationReason};
    use chrono::Utc;

    fn negative(auto_applicable: bool) -> Recommendation {
        Recommendation::new(
            "cmp-1",
            Priority::High,
            "negative",
            RecommendationReason::KeywordNegative {
                search_term: "free".into(),
                impressions: 100,
                clicks: 20,
                cost: 40.0,
                conversions: 0.0,
            },
            auto_applicable,
            Utc::now(),
        )
    }

    #[test]
    fn test_builtin_covers_every_type() {
        let registry = RecommendationTypeRegistry::builtin();
        for kind in RecommendationType::ALL {
            let _ = registry.entry(kind);
        }
        assert_eq!(registry.version(), "builtin-1");
        assert_eq!(
            registry.entry(RecommendationType::BudgetChange).risk_level,
            RiskLevel::High
        );
    }

    #[test]
    fn test_only_low_risk_auto_types_pass() {
        let registry = RecommendationTypeRegistry::builtin();
        assert!(registry.permits_auto_apply(&negative(true)));
        assert!(!registry.permits_auto_apply(&negative(false)));

        let bid = Recommendation::new(
            "cmp-1",
            Priority::Low,
            "bid",
            RecommendationReason::BidAdjustment {
                keyword: "crm".into(),
                direction: campaign_core::Direction::Increase,
                suggested_change_pct: 15.0,
                keyword_cost_per_conversion: 10.0,
                campaign_cost_per_conversion: 50.0,
                keyword_conversion_rate: 0.1,
            },
            true,
            Utc::now(),
        );
        // auto_applicable but medium risk
        assert!(!registry.permits_auto_apply(&bid));
    }

    #[test]
    fn test_overrides_replace_builtin_entries() {
        let mut config = RegistryConfig {
            version: "2026-10-ops".into(),
            ..RegistryConfig::default()
        };
        config
            .overrides
            .insert(RecommendationType::KeywordNegative, entry(false, RiskLevel::Low));
        let registry = RecommendationTypeRegistry::from_config(&config);
        assert_eq!(registry.version(), "2026-10-ops");
        assert!(!registry.permits_auto_apply(&negative(true)));
        assert!(!registry.entry(RecommendationType::KeywordRemove).auto_applicable);
    }
}
