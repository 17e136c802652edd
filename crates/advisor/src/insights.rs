//! Plain-text summary stored on each analysis record.

use campaign_core::{
    CampaignPhase, DataSource, DataSources, MetricsSnapshot, Priority, Recommendation,
    RecommendationStatus,
};
use std::fmt::Write;

use crate::health::HealthAssessment;

pub struct InsightInput<'a> {
    pub campaign_name: &'a str,
    pub phase: CampaignPhase,
    pub prior_phase: CampaignPhase,
    pub health: &'a HealthAssessment,
    pub current: Option<&'a MetricsSnapshot>,
    pub data_sources: &'a DataSources,
    pub recommendations: &'a [Recommendation],
}

pub fn summarize(input: &InsightInput<'_>) -> String {
    let mut out = String::new();

    let _ = write!(out, "{} is {}", input.campaign_name, input.phase);
    if input.phase != input.prior_phase {
        let _ = write!(out, " (was {})", input.prior_phase);
    }
    let _ = write!(out, " with health {}/100", input.health.score);
    if input.health.low_confidence {
        out.push_str(" (low confidence: no campaign metrics this run)");
    }
    out.push('.');

    if let Some(m) = input.current {
        let _ = write!(
            out,
            " Last window: {} clicks, CTR {:.2}%, {:.1} conversions at {:.2} each.",
            m.clicks,
            m.ctr * 100.0,
            m.conversions,
            m.cost_per_conversion
        );
    }

    let recs = input.recommendations;
    if recs.is_empty() {
        out.push_str(" No recommendations.");
    } else {
        let by_priority: Vec<String> = [Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
            .iter()
            .filter_map(|p| {
                let n = recs.iter().filter(|r| r.priority == *p).count();
                (n > 0).then(|| format!("{n} {}", priority_label(*p)))
            })
            .collect();
        let applied = recs
            .iter()
            .filter(|r| r.status == RecommendationStatus::AutoApplied)
            .count();
        let pending = recs.iter().filter(|r| r.is_pending()).count();
        let _ = write!(
            out,
            " {} recommendations ({}); {} applied automatically, {} awaiting review.",
            recs.len(),
            by_priority.join(", "),
            applied,
            pending
        );
        if let Some(top) = recs.first() {
            let _ = write!(out, " Top: {}.", top.title);
        }
    }

    let missing: Vec<&str> = DataSource::ALL
        .iter()
        .filter(|s| !input.data_sources.succeeded(**s))
        .map(|s| s.as_str())
        .collect();
    if !missing.is_empty() {
        let _ = write!(out, " Missing data: {}.", missing.join(", "));
    }

    out
}

fn priority_label(p: Priority) -> &'static str {
    match p {
        Priority::Critical => "critical",
        Priority::High => "high",
        Priority::Medium => "medium",
        Priority::Low => "low",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthComponents;
    use campaign_core::RecommendationReason;
    use chrono::Utc;

    fn health(score: u8, low_confidence: bool) -> HealthAssessment {
        HealthAssessment {
            score,
            low_confidence,
            components: HealthComponents::default(),
        }
    }

    #[test]
    fn test_summary_mentions_transition_and_counts() {
        let mut applied = Recommendation::new(
            "cmp-1",
            Priority::High,
            "Add \"free\" as a negative keyword",
            RecommendationReason::KeywordNegative {
                search_term: "free".into(),
                impressions: 100,
                clicks: 20,
                cost: 40.0,
                conversions: 0.0,
            },
            true,
            Utc::now(),
        );
        applied.status = RecommendationStatus::AutoApplied;
        let sources = DataSources {
            ad_platform: true,
            ..DataSources::default()
        };
        let h = health(62, false);
        let text = summarize(&InsightInput {
            campaign_name: "Brand",
            phase: CampaignPhase::Declining,
            prior_phase: CampaignPhase::Optimizing,
            health: &h,
            current: None,
            data_sources: &sources,
            recommendations: &[applied],
        });
        assert!(text.starts_with("Brand is declining (was optimizing) with health 62/100."));
        assert!(text.contains("1 recommendations (1 high); 1 applied automatically, 0 awaiting review."));
        assert!(text.contains("Missing data: web_analytics, search_console."));
    }

    #[test]
    fn test_low_confidence_is_flagged() {
        let h = health(40, true);
        let text = summarize(&InsightInput {
            campaign_name: "Brand",
            phase: CampaignPhase::Mature,
            prior_phase: CampaignPhase::Mature,
            health: &h,
            current: None,
            data_sources: &DataSources::default(),
            recommendations: &[],
        });
        assert!(text.contains("low confidence"));
        assert!(text.contains("No recommendations."));
    }
}
