//! Campaign advisor
//!
//! Pure analysis over aggregated metrics plus the guarded path that lets a
//! small set of recommendations be applied without a human.
//!
//! # Modules
//!
//! - [`phase`]: lifecycle phase derivation and analysis cadence
//! - [`health`]: 0–100 health score
//! - [`recommendations`]: rule-based recommendation generator
//! - [`registry`]: static per-type risk registry
//! - [`executor`]: per-type action handlers; unknown types fail closed
//! - [`gate`]: auto-apply decision and execution
//! - [`insights`]: human-readable analysis summary

pub mod executor;
pub mod gate;
pub mod health;
pub mod insights;
pub mod phase;
pub mod recommendations;
pub mod registry;

pub use executor::{ActionExecutor, ActionHandler, NegativeKeywordAction};
pub use gate::{apply_gate, GateOutcome};
pub use health::{health_score, HealthAssessment, HealthComponents};
pub use insights::{summarize, InsightInput};
pub use phase::{derive_phase, next_analysis_date, TrendAssessment};
pub use recommendations::{GeneratorInput, RecommendationGenerator};
pub use registry::RecommendationTypeRegistry;
