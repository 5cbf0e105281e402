//! Per-plan summary (plan_summary.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::failure::{ExitCode, FailureKind, Status};
use crate::spec::{Arch, OsName, PlatformFamily};

/// Schema version for plan_summary.json
pub const PLAN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for plan_summary.json
pub const PLAN_SUMMARY_SCHEMA_ID: &str = "xbuild/plan_summary@1";

/// Summary of one target plan (plan_summary.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Parent run identifier
    pub run_id: String,

    /// Plan identifier (absent when the plan never existed, e.g. the
    /// whole OS target failed before expansion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    /// Deterministic plan key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_key: Option<String>,

    /// Project the plan belongs to
    pub project: String,

    /// Platform family
    pub family: PlatformFamily,

    /// Target operating system
    pub os: OsName,

    /// Target architecture; absent for failures that predate expansion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<Arch>,

    /// Project-name chain from the root description, for sub-builds
    pub subdirectory_chain: Vec<String>,

    /// When the summary was created
    pub created_at: DateTime<Utc>,

    /// Plan status
    pub status: Status,

    /// Failure kind (when status is not success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    /// Failure detail (when status is not success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,

    /// Stable exit code
    pub exit_code: i32,

    /// Wall-clock plan duration in milliseconds
    pub duration_ms: u64,

    /// Destination paths written or verified by the collector
    pub artifacts: Vec<PathBuf>,

    /// Human-readable summary
    pub human_summary: String,
}

impl PlanSummary {
    /// Create a new success summary
    #[allow(clippy::too_many_arguments)]
    pub fn success(
        run_id: String,
        plan_id: String,
        plan_key: String,
        project: String,
        family: PlatformFamily,
        os: OsName,
        arch: Arch,
        duration_ms: u64,
        artifacts: Vec<PathBuf>,
    ) -> Self {
        let human_summary = format!("{}/{}/{}/{} built", project, family, os, arch);
        Self {
            schema_version: PLAN_SUMMARY_SCHEMA_VERSION,
            schema_id: PLAN_SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            plan_id: Some(plan_id),
            plan_key: Some(plan_key),
            project,
            family,
            os,
            arch: Some(arch),
            subdirectory_chain: Vec::new(),
            created_at: Utc::now(),
            status: Status::Success,
            failure_kind: None,
            failure_detail: None,
            exit_code: ExitCode::Success.as_i32(),
            duration_ms,
            artifacts,
            human_summary,
        }
    }

    /// Create a new failure summary
    #[allow(clippy::too_many_arguments)]
    pub fn failure(
        run_id: String,
        project: String,
        family: PlatformFamily,
        os: OsName,
        arch: Option<Arch>,
        failure_kind: FailureKind,
        failure_detail: String,
        duration_ms: u64,
    ) -> Self {
        let exit_code = failure_kind.exit_code();
        let human_summary = match arch {
            Some(arch) => format!(
                "{}/{}/{}/{} failed: {}",
                project,
                family,
                os,
                arch,
                failure_kind.description()
            ),
            None => format!(
                "{}/{}/{} failed: {}",
                project,
                family,
                os,
                failure_kind.description()
            ),
        };
        Self {
            schema_version: PLAN_SUMMARY_SCHEMA_VERSION,
            schema_id: PLAN_SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            plan_id: None,
            plan_key: None,
            project,
            family,
            os,
            arch,
            subdirectory_chain: Vec::new(),
            created_at: Utc::now(),
            status: Status::Failed,
            failure_kind: Some(failure_kind),
            failure_detail: Some(failure_detail),
            exit_code: exit_code.as_i32(),
            duration_ms,
            artifacts: Vec::new(),
            human_summary,
        }
    }

    /// Create a skipped summary for a plan that never started
    pub fn skipped(
        run_id: String,
        project: String,
        family: PlatformFamily,
        os: OsName,
        arch: Arch,
        reason: String,
    ) -> Self {
        let human_summary = format!("{}/{}/{}/{} skipped: {}", project, family, os, arch, reason);
        Self {
            schema_version: PLAN_SUMMARY_SCHEMA_VERSION,
            schema_id: PLAN_SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            plan_id: None,
            plan_key: None,
            project,
            family,
            os,
            arch: Some(arch),
            subdirectory_chain: Vec::new(),
            created_at: Utc::now(),
            status: Status::Skipped,
            failure_kind: None,
            failure_detail: Some(reason),
            exit_code: ExitCode::Success.as_i32(),
            duration_ms: 0,
            artifacts: Vec::new(),
            human_summary,
        }
    }

    /// Set the plan identity
    pub fn with_plan(mut self, plan_id: String, plan_key: String) -> Self {
        self.plan_id = Some(plan_id);
        self.plan_key = Some(plan_key);
        self
    }

    /// Set the subdirectory chain
    pub fn with_chain(mut self, chain: Vec<String>) -> Self {
        self.subdirectory_chain = chain;
        self
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_summary() {
        let summary = PlanSummary::success(
            "run-1".to_string(),
            "plan-1".to_string(),
            "key-1".to_string(),
            "libpng".to_string(),
            PlatformFamily::Linux,
            OsName::Linux,
            Arch::X64,
            5000,
            vec![PathBuf::from("/out/static/libpng.a")],
        );

        assert_eq!(summary.status, Status::Success);
        assert_eq!(summary.exit_code, 0);
        assert!(summary.failure_kind.is_none());
        assert_eq!(summary.human_summary, "libpng/linux/linux/x64 built");
    }

    #[test]
    fn test_failure_summary() {
        let summary = PlanSummary::failure(
            "run-1".to_string(),
            "libpng".to_string(),
            PlatformFamily::Win32,
            OsName::Android,
            Some(Arch::Arm64V8a),
            FailureKind::GeneratorFailed,
            "build step exited 2".to_string(),
            30000,
        );

        assert_eq!(summary.status, Status::Failed);
        assert_eq!(summary.exit_code, 30);
        assert_eq!(summary.failure_kind, Some(FailureKind::GeneratorFailed));
        assert!(summary.human_summary.contains("arm64-v8a"));
    }

    #[test]
    fn test_failure_before_expansion_has_no_arch() {
        let summary = PlanSummary::failure(
            "run-1".to_string(),
            "libpng".to_string(),
            PlatformFamily::Linux,
            OsName::Linux,
            None,
            FailureKind::EmptyArchitectureList,
            "override archs = []".to_string(),
            0,
        );

        assert_eq!(summary.exit_code, 12);
        assert!(summary.arch.is_none());
        let json = summary.to_json().unwrap();
        assert!(!json.contains(r#""arch""#));
    }

    #[test]
    fn test_skipped_summary() {
        let summary = PlanSummary::skipped(
            "run-1".to_string(),
            "libpng".to_string(),
            PlatformFamily::Darwin,
            OsName::Macos,
            Arch::Arm64,
            "platform aborted after earlier failure".to_string(),
        );

        assert_eq!(summary.status, Status::Skipped);
        assert_eq!(summary.exit_code, 0);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let summary = PlanSummary::success(
            "run-1".to_string(),
            "plan-1".to_string(),
            "key-1".to_string(),
            "zlib".to_string(),
            PlatformFamily::Linux,
            OsName::Linux,
            Arch::X64,
            100,
            vec![],
        )
        .with_chain(vec!["libpng".to_string(), "zlib".to_string()]);

        let json = summary.to_json().unwrap();
        assert!(json.contains(r#""schema_id": "xbuild/plan_summary@1""#));

        let parsed = PlanSummary::from_json(&json).unwrap();
        assert_eq!(parsed.subdirectory_chain, summary.subdirectory_chain);
        assert_eq!(parsed.status, summary.status);
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let summary = PlanSummary::success(
            "run-1".to_string(),
            "plan-1".to_string(),
            "key-1".to_string(),
            "zlib".to_string(),
            PlatformFamily::Linux,
            OsName::Linux,
            Arch::X64,
            100,
            vec![],
        );

        let path = dir.path().join("plan_summary.json");
        summary.write_to_file(&path).unwrap();

        let loaded = PlanSummary::from_file(&path).unwrap();
        assert_eq!(loaded.run_id, summary.run_id);
        assert_eq!(loaded.plan_id, summary.plan_id);
    }
}
