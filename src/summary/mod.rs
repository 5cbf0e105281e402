//! Summaries and failure taxonomy
//!
//! Every run writes one run_summary.json plus one plan_summary.json
//! per target plan, with stable exit codes per failure kind.

mod failure;
mod plan_summary;
mod run_summary;

pub use failure::{ExitCode, ExitCodeAggregator, FailureKind, Status};
pub use plan_summary::{PlanSummary, PLAN_SUMMARY_SCHEMA_ID, PLAN_SUMMARY_SCHEMA_VERSION};
pub use run_summary::{RunSummary, RUN_SUMMARY_SCHEMA_ID, RUN_SUMMARY_SCHEMA_VERSION};
