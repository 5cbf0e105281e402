//! Run summary (run_summary.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use super::failure::{ExitCode, ExitCodeAggregator, Status};
use super::plan_summary::PlanSummary;

/// Schema version for run_summary.json
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for run_summary.json
pub const RUN_SUMMARY_SCHEMA_ID: &str = "xbuild/run_summary@1";

/// Run summary (run_summary.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// When the summary was created
    pub created_at: DateTime<Utc>,

    /// Aggregated status
    pub status: Status,

    /// Aggregated exit code
    pub exit_code: i32,

    /// Total plans in the run
    pub plan_count: usize,

    /// Count of plans with status=success
    pub plans_succeeded: usize,

    /// Count of plans with status=failed
    pub plans_failed: usize,

    /// Count of plans with status=skipped
    pub plans_skipped: usize,

    /// Whether the run was interrupted
    pub interrupted: bool,

    /// Wall-clock duration of the entire run in milliseconds
    pub duration_ms: u64,

    /// Human-readable summary
    pub human_summary: String,
}

impl RunSummary {
    /// Create a new run summary by aggregating plan summaries
    pub fn from_plan_summaries(
        run_id: String,
        summaries: &[PlanSummary],
        interrupted: bool,
        duration_ms: u64,
    ) -> Self {
        let mut aggregator = ExitCodeAggregator::new();
        let mut plans_succeeded = 0;
        let mut plans_failed = 0;
        let mut plans_skipped = 0;

        for summary in summaries {
            let exit_code = ExitCode::from_i32(summary.exit_code).unwrap_or(ExitCode::Io);
            aggregator.add(summary.status, exit_code);

            match summary.status {
                Status::Success => plans_succeeded += 1,
                Status::Failed => plans_failed += 1,
                Status::Skipped => plans_skipped += 1,
            }
        }

        if interrupted {
            aggregator.add(Status::Failed, ExitCode::Interrupted);
        }

        let status = aggregator.status();
        let exit_code = aggregator.exit_code();
        let plan_count = summaries.len();

        let human_summary = Self::generate_human_summary(
            status,
            interrupted,
            plan_count,
            plans_succeeded,
            plans_failed,
            plans_skipped,
        );

        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            created_at: Utc::now(),
            status,
            exit_code: exit_code.as_i32(),
            plan_count,
            plans_succeeded,
            plans_failed,
            plans_skipped,
            interrupted,
            duration_ms,
            human_summary,
        }
    }

    /// Create an empty run summary for runs that expanded to no plans
    pub fn empty(run_id: String) -> Self {
        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            created_at: Utc::now(),
            status: Status::Success,
            exit_code: ExitCode::Success.as_i32(),
            plan_count: 0,
            plans_succeeded: 0,
            plans_failed: 0,
            plans_skipped: 0,
            interrupted: false,
            duration_ms: 0,
            human_summary: "No plans executed".to_string(),
        }
    }

    /// Generate a human-readable summary
    fn generate_human_summary(
        status: Status,
        interrupted: bool,
        plan_count: usize,
        plans_succeeded: usize,
        plans_failed: usize,
        plans_skipped: usize,
    ) -> String {
        if interrupted {
            return format!(
                "Run interrupted: {} succeeded, {} failed, {} skipped",
                plans_succeeded, plans_failed, plans_skipped
            );
        }
        match status {
            Status::Success => {
                if plan_count == 1 {
                    "Run succeeded".to_string()
                } else {
                    format!("Run succeeded: {}/{} plans built", plans_succeeded, plan_count)
                }
            }
            Status::Failed => format!(
                "Run failed: {} succeeded, {} failed, {} skipped",
                plans_succeeded, plans_failed, plans_skipped
            ),
            Status::Skipped => "Run skipped".to_string(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        fs::write(path, json)
    }

    /// Load from file
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }

    /// Get the exit code as ExitCode enum
    pub fn exit_code_enum(&self) -> Option<ExitCode> {
        ExitCode::from_i32(self.exit_code)
    }
}
