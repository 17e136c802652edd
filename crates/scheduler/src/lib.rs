//! Run orchestration.
//!
//! [`AnalysisOrchestrator::run_due`] processes every due campaign one at a
//! time; [`AnalysisOrchestrator::analyze_campaign`] runs the same pipeline for
//! a single campaign regardless of schedule. A failing campaign is logged and
//! reported, never allowed to stop the batch.

pub mod orchestrator;
pub mod report;

pub use orchestrator::AnalysisOrchestrator;
pub use report::{CampaignFailure, CampaignSummary, RunReport, RunStatus};
