//! Matrix expander
//!
//! Expands one resolved [`EffectiveConfig`] into one [`TargetPlan`] per
//! architecture, in list order. Each plan is independent and carries
//! the full effective configuration; nothing downstream consults the
//! build description again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::merge::EffectiveConfig;
use crate::spec::{Arch, OsName, PlatformFamily};

/// Errors expanding a target matrix
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// The resolved architecture list is empty. A platform entry must
    /// always resolve to at least one architecture.
    #[error("architecture list resolved empty for {family}.{os}")]
    EmptyArchitectureList { family: PlatformFamily, os: OsName },

    #[error("failed to compute plan key: {0}")]
    PlanKey(String),
}

/// Inputs hashed into the deterministic plan key
#[derive(Debug, Serialize)]
struct PlanKeyInputs<'a> {
    project: &'a str,
    family: PlatformFamily,
    os: OsName,
    arch: Arch,
    spec_digest: &'a str,
}

/// One (OsTarget, architecture) build unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetPlan {
    /// Unique plan identifier (ULID)
    pub plan_id: String,

    /// Deterministic key: SHA-256 of the JCS form of the key inputs
    pub plan_key: String,

    /// When this plan was created
    pub created_at: DateTime<Utc>,

    pub family: PlatformFamily,
    pub os: OsName,
    pub arch: Arch,

    /// Digest of the build description this plan was derived from
    pub spec_digest: String,

    /// Fully resolved configuration; `arch` is always a member of
    /// `effective.archs`
    pub effective: EffectiveConfig,
}

impl TargetPlan {
    fn new(
        family: PlatformFamily,
        os: OsName,
        arch: Arch,
        spec_digest: &str,
        effective: &EffectiveConfig,
    ) -> Result<Self, MatrixError> {
        let inputs = PlanKeyInputs {
            project: &effective.project,
            family,
            os,
            arch,
            spec_digest,
        };
        let jcs = serde_json_canonicalizer::to_vec(&inputs)
            .map_err(|e| MatrixError::PlanKey(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&jcs);
        let plan_key = hex::encode(hasher.finalize());

        Ok(TargetPlan {
            plan_id: ulid::Ulid::new().to_string().to_lowercase(),
            plan_key,
            created_at: Utc::now(),
            family,
            os,
            arch,
            spec_digest: spec_digest.to_string(),
            effective: effective.clone(),
        })
    }

    /// Short label naming the plan for diagnostics
    pub fn label(&self) -> String {
        format!("{}/{}/{}/{}", self.effective.project, self.family, self.os, self.arch)
    }
}

/// Expand an effective configuration into its architecture matrix.
pub fn expand(
    family: PlatformFamily,
    os: OsName,
    spec_digest: &str,
    effective: &EffectiveConfig,
) -> Result<Vec<TargetPlan>, MatrixError> {
    if effective.archs.is_empty() {
        return Err(MatrixError::EmptyArchitectureList { family, os });
    }

    effective
        .archs
        .iter()
        .map(|arch| TargetPlan::new(family, os, *arch, spec_digest, effective))
        .collect()
}

/// Build the single plan a subdirectory contributes to its consumer:
/// same family, os, and architecture as the consuming plan.
pub fn plan_for_arch(
    family: PlatformFamily,
    os: OsName,
    arch: Arch,
    spec_digest: &str,
    effective: &EffectiveConfig,
) -> Result<TargetPlan, MatrixError> {
    TargetPlan::new(family, os, arch, spec_digest, effective)
}
