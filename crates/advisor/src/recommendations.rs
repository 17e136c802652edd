//! Rule-based recommendation generator.
//!
//! Every rule looks at one signal category and decides its own priority and
//! whether the instance is a candidate for automatic application. Rules whose
//! inputs are missing are skipped. Output is sorted by priority, keeping rule
//! evaluation order within a priority.

use campaign_core::config::{HealthConfig, PhaseThresholds, RuleThresholds};
use campaign_core::{
    AnalyticsSummary, Direction, KeywordPerformance, MetricsSnapshot, Priority, Recommendation,
    RecommendationReason, SearchConsoleSummary, SearchTermPerformance,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::phase::TrendAssessment;

/// Everything the rules may look at for one campaign.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorInput<'a> {
    pub campaign_id: &'a str,
    pub current: Option<&'a MetricsSnapshot>,
    pub baseline: Option<&'a MetricsSnapshot>,
    pub keywords: &'a [KeywordPerformance],
    pub search_terms: &'a [SearchTermPerformance],
    pub analytics: Option<&'a AnalyticsSummary>,
    pub search_console: Option<&'a SearchConsoleSummary>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationGenerator {
    rules: RuleThresholds,
    phase: PhaseThresholds,
    health: HealthConfig,
}

impl RecommendationGenerator {
    pub fn new(rules: RuleThresholds, phase: PhaseThresholds, health: HealthConfig) -> Self {
        Self { rules, phase, health }
    }

    pub fn generate(&self, input: &GeneratorInput<'_>) -> Vec<Recommendation> {
        let mut out = Vec::new();

        self.campaign_trend(input, &mut out);
        self.negative_keywords(input, &mut out);
        self.keyword_performance(input, &mut out);
        self.landing_page(input, &mut out);
        self.search_console(input, &mut out);

        // stable: equal priorities keep rule order
        out.sort_by_key(|r| r.priority);
        out
    }

    fn push(
        &self,
        out: &mut Vec<Recommendation>,
        input: &GeneratorInput<'_>,
        priority: Priority,
        title: String,
        reason: RecommendationReason,
        auto_applicable: bool,
    ) {
        out.push(Recommendation::new(
            input.campaign_id,
            priority,
            title,
            reason,
            auto_applicable,
            input.now,
        ));
    }

    // ─── Campaign totals vs baseline ────────────────────────────────────────

    fn campaign_trend(&self, input: &GeneratorInput<'_>, out: &mut Vec<Recommendation>) {
        let Some(current) = input.current else {
            return;
        };

        let mut ctr_flagged = false;

        if let Some(baseline) = input.baseline {
            let trend = TrendAssessment::new(baseline, current, &self.phase);

            if let Some(ratio) = trend.conversion_ratio {
                let drop = TrendAssessment::drop(ratio);
                if drop > self.phase.decline_relative_drop && trend.cost_ratio > ratio {
                    let (priority, change) = if drop >= 0.5 {
                        (Priority::Critical, -25.0)
                    } else {
                        (Priority::High, -15.0)
                    };
                    self.push(
                        out,
                        input,
                        priority,
                        format!(
                            "Conversion rate down {:.0}% vs baseline at unchanged spend; reduce budget",
                            drop * 100.0
                        ),
                        RecommendationReason::BudgetChange {
                            direction: Direction::Decrease,
                            suggested_change_pct: change,
                            current_cost: current.cost,
                            current_conversion_rate: current.conversion_rate,
                            baseline_conversion_rate: baseline.conversion_rate,
                            current_cost_per_conversion: current.cost_per_conversion,
                            baseline_cost_per_conversion: baseline.cost_per_conversion,
                        },
                        false,
                    );
                } else if baseline.cost_per_conversion > 0.0
                    && current.has_conversions()
                    && current.cost_per_conversion
                        <= baseline.cost_per_conversion * (1.0 - self.rules.budget_increase_cpa_improvement)
                    && ratio >= 1.0 - self.phase.stability_tolerance
                {
                    self.push(
                        out,
                        input,
                        Priority::Low,
                        "Cost per conversion improved vs baseline; consider raising budget".to_string(),
                        RecommendationReason::BudgetChange {
                            direction: Direction::Increase,
                            suggested_change_pct: 20.0,
                            current_cost: current.cost,
                            current_conversion_rate: current.conversion_rate,
                            baseline_conversion_rate: baseline.conversion_rate,
                            current_cost_per_conversion: current.cost_per_conversion,
                            baseline_cost_per_conversion: baseline.cost_per_conversion,
                        },
                        false,
                    );
                }
            }

            if let Some(ratio) = trend.ctr_ratio {
                let drop = TrendAssessment::drop(ratio);
                if drop > self.phase.decline_relative_drop {
                    ctr_flagged = true;
                    self.push(
                        out,
                        input,
                        Priority::High,
                        format!("CTR down {:.0}% vs baseline; refresh ad copy", drop * 100.0),
                        RecommendationReason::AdCopyRefresh {
                            current_ctr: current.ctr,
                            reference_ctr: baseline.ctr,
                            impressions: current.impressions,
                        },
                        false,
                    );
                }
            }
        }

        let ctr_floor = self.health.ctr_benchmark * self.rules.ctr_floor_fraction;
        if !ctr_flagged && current.impressions >= self.phase.min_impressions && current.ctr < ctr_floor {
            self.push(
                out,
                input,
                Priority::Medium,
                format!("CTR {:.2}% is well below benchmark; refresh ad copy", current.ctr * 100.0),
                RecommendationReason::AdCopyRefresh {
                    current_ctr: current.ctr,
                    reference_ctr: self.health.ctr_benchmark,
                    impressions: current.impressions,
                },
                false,
            );
        }
    }

    // ─── Search terms ───────────────────────────────────────────────────────

    fn negative_keywords(&self, input: &GeneratorInput<'_>, out: &mut Vec<Recommendation>) {
        let bidded: HashSet<String> = input.keywords.iter().map(|k| k.keyword.to_lowercase()).collect();
        let min_cost = self.rules.negative_min_cost;

        for term in input.search_terms {
            if term.conversions > 0.0 || bidded.contains(&term.search_term.to_lowercase()) {
                continue;
            }

            let (priority, auto_applicable) =
                if term.cost >= min_cost && term.clicks >= self.rules.negative_min_clicks {
                    let priority = if term.cost >= min_cost * 4.0 {
                        Priority::Critical
                    } else {
                        Priority::High
                    };
                    (priority, true)
                } else if term.cost >= min_cost / 2.0 {
                    (Priority::Medium, false)
                } else {
                    continue;
                };

            self.push(
                out,
                input,
                priority,
                format!(
                    "Add \"{}\" as a negative keyword ({:.2} spent, no conversions)",
                    term.search_term, term.cost
                ),
                RecommendationReason::KeywordNegative {
                    search_term: term.search_term.clone(),
                    impressions: term.impressions,
                    clicks: term.clicks,
                    cost: term.cost,
                    conversions: term.conversions,
                },
                auto_applicable,
            );
        }
    }

    // ─── Keywords ───────────────────────────────────────────────────────────

    fn keyword_performance(&self, input: &GeneratorInput<'_>, out: &mut Vec<Recommendation>) {
        let remove_cost = self.rules.negative_min_cost * 2.0;

        for kw in input.keywords {
            let wasted = kw.conversions <= 0.0
                && kw.cost >= remove_cost
                && kw.clicks >= self.rules.negative_min_clicks;
            let poor_quality = kw
                .quality_score
                .is_some_and(|q| q <= self.rules.keyword_poor_quality_score)
                && kw.clicks > 0
                && kw.conversions <= 0.0;

            if wasted || poor_quality {
                let priority = if wasted { Priority::High } else { Priority::Medium };
                self.push(
                    out,
                    input,
                    priority,
                    format!("Pause keyword \"{}\"", kw.keyword),
                    RecommendationReason::KeywordRemove {
                        keyword: kw.keyword.clone(),
                        match_type: kw.match_type,
                        clicks: kw.clicks,
                        cost: kw.cost,
                        conversions: kw.conversions,
                        quality_score: kw.quality_score,
                    },
                    false,
                );
                continue;
            }

            let Some(campaign) = input.current.filter(|c| c.has_conversions()) else {
                continue;
            };
            if kw.conversions <= 0.0 || kw.clicks < self.rules.negative_min_clicks {
                continue;
            }
            let m = kw.snapshot();

            if m.cost_per_conversion >= campaign.cost_per_conversion * self.rules.bid_decrease_cpa_multiple {
                self.push(
                    out,
                    input,
                    Priority::Medium,
                    format!("Lower bid on \"{}\"; cost per conversion far above campaign", kw.keyword),
                    RecommendationReason::BidAdjustment {
                        keyword: kw.keyword.clone(),
                        direction: Direction::Decrease,
                        suggested_change_pct: -20.0,
                        keyword_cost_per_conversion: m.cost_per_conversion,
                        campaign_cost_per_conversion: campaign.cost_per_conversion,
                        keyword_conversion_rate: m.conversion_rate,
                    },
                    false,
                );
            } else if m.conversion_rate >= campaign.conversion_rate * self.rules.bid_increase_conversion_multiple
                && m.cost_per_conversion < campaign.cost_per_conversion
            {
                self.push(
                    out,
                    input,
                    Priority::Low,
                    format!("Raise bid on \"{}\"; converts well below campaign cost", kw.keyword),
                    RecommendationReason::BidAdjustment {
                        keyword: kw.keyword.clone(),
                        direction: Direction::Increase,
                        suggested_change_pct: 15.0,
                        keyword_cost_per_conversion: m.cost_per_conversion,
                        campaign_cost_per_conversion: campaign.cost_per_conversion,
                        keyword_conversion_rate: m.conversion_rate,
                    },
                    true,
                );
            }
        }
    }

    // ─── Web analytics ──────────────────────────────────────────────────────

    fn landing_page(&self, input: &GeneratorInput<'_>, out: &mut Vec<Recommendation>) {
        let Some(analytics) = input.analytics else {
            return;
        };
        let bounce = analytics.overview.avg_bounce_rate;
        let priority = if bounce >= self.rules.bounce_rate_high {
            Priority::High
        } else if bounce >= self.rules.bounce_rate_medium {
            Priority::Medium
        } else {
            return;
        };

        let worst_page = analytics
            .top_pages
            .iter()
            .filter(|p| p.sessions > 0)
            .max_by(|a, b| a.bounce_rate.total_cmp(&b.bounce_rate));

        let title = match worst_page {
            Some(page) => format!(
                "Bounce rate {:.0}%; review landing page {}",
                bounce * 100.0,
                page.path
            ),
            None => format!("Bounce rate {:.0}%; review landing pages", bounce * 100.0),
        };

        self.push(
            out,
            input,
            priority,
            title,
            RecommendationReason::LandingPageReview {
                page_path: worst_page.map(|p| p.path.clone()),
                bounce_rate: bounce,
                avg_session_duration_secs: analytics.overview.avg_session_duration_secs,
                conversion_rate: input.current.map(|c| c.conversion_rate),
            },
            false,
        );
    }

    // ─── Search console ─────────────────────────────────────────────────────

    fn search_console(&self, input: &GeneratorInput<'_>, out: &mut Vec<Recommendation>) {
        let Some(console) = input.search_console else {
            return;
        };
        let limit = self.rules.max_search_console_recommendations;

        let mut queries: Vec<_> = console.queries.iter().collect();
        queries.sort_by(|a, b| b.impressions.cmp(&a.impressions));

        let opportunities = queries
            .iter()
            .filter(|q| {
                q.impressions >= self.rules.query_min_impressions
                    && q.ctr < self.rules.query_ctr_floor
                    && q.position <= self.rules.query_max_position
            })
            .take(limit);
        for q in opportunities {
            self.push(
                out,
                input,
                Priority::Low,
                format!(
                    "\"{}\" ranks at {:.1} but earns few clicks; improve page title and snippet",
                    q.query, q.position
                ),
                RecommendationReason::ContentOpportunity {
                    query: q.query.clone(),
                    impressions: q.impressions,
                    clicks: q.clicks,
                    ctr: q.ctr,
                    position: q.position,
                },
                false,
            );
        }

        let covered: HashSet<String> = input
            .keywords
            .iter()
            .map(|k| k.keyword.to_lowercase())
            .chain(input.search_terms.iter().map(|t| t.search_term.to_lowercase()))
            .collect();
        let expansions = queries
            .iter()
            .filter(|q| q.clicks >= self.rules.expansion_min_clicks && !covered.contains(&q.query.to_lowercase()))
            .take(limit);
        for q in expansions {
            self.push(
                out,
                input,
                Priority::Low,
                format!("Organic query \"{}\" drives clicks; add it as a paid keyword", q.query),
                RecommendationReason::KeywordExpansion {
                    query: q.query.clone(),
                    clicks: q.clicks,
                    impressions: q.impressions,
                    position: q.position,
                },
                false,
            );
        }
    }
}
