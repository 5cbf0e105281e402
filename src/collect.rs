//! Artifact collector
//!
//! Applies a plan's copy rules after its invocation succeeds: each
//! source pattern is matched against the build directory and the
//! matches are relocated under the build output directory. Distinct
//! destinations are independent; a destination claimed by two
//! different plans is a collision and fatal to the later plan.
//! Re-running over an already-populated output directory is
//! idempotent: a destination whose content already matches is skipped.

use globset::Glob;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::matrix::TargetPlan;

/// Errors applying copy rules
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// A declared source pattern matched no files in the build
    /// directory.
    #[error("copy rule `{pattern}` matched no files under {build_dir}")]
    CopyFailed { pattern: String, build_dir: PathBuf },

    #[error("invalid copy pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Two plans declared the same destination path.
    #[error("destination `{dest}` already written by another plan")]
    DestinationCollision { dest: PathBuf },

    #[error("failed to copy `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Shared registry of destination paths claimed during one run
///
/// Distinct destinations need no coordination; the registry only
/// serializes the claim itself so a double-claim is detected
/// deterministically.
#[derive(Default)]
pub struct DestinationRegistry {
    claimed: Mutex<HashMap<PathBuf, String>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a destination for a plan. Re-claiming by the same plan is
    /// allowed; a claim held by any other plan is a collision.
    pub fn claim(&self, dest: &Path, plan_key: &str) -> Result<(), CollectError> {
        let mut claimed = self.claimed.lock().expect("destination registry poisoned");
        match claimed.get(dest) {
            Some(owner) if owner != plan_key => Err(CollectError::DestinationCollision {
                dest: dest.to_path_buf(),
            }),
            _ => {
                claimed.insert(dest.to_path_buf(), plan_key.to_string());
                Ok(())
            }
        }
    }
}

/// Apply every copy rule of a plan. Returns the destination paths
/// written or verified, in rule order.
pub fn collect(
    plan: &TargetPlan,
    build_dir: &Path,
    out_dir: &Path,
    registry: &DestinationRegistry,
) -> Result<Vec<PathBuf>, CollectError> {
    let mut written = Vec::new();

    for (pattern, dest) in &plan.effective.copy {
        let matcher = Glob::new(pattern)
            .map_err(|source| CollectError::Pattern {
                pattern: pattern.clone(),
                source,
            })?
            .compile_matcher();

        let mut matched = false;
        for entry in walkdir::WalkDir::new(build_dir)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(build_dir) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            if !matcher.is_match(relative) {
                continue;
            }
            matched = true;

            let file_name = entry.file_name();
            let dest_path = out_dir.join(dest).join(file_name);
            registry.claim(&dest_path, &plan.plan_key)?;
            copy_if_changed(entry.path(), &dest_path)?;
            written.push(dest_path);
        }

        if !matched {
            return Err(CollectError::CopyFailed {
                pattern: pattern.clone(),
                build_dir: build_dir.to_path_buf(),
            });
        }
    }

    Ok(written)
}

/// Copy `src` to `dest`, skipping the write when identical content is
/// already present.
fn copy_if_changed(src: &Path, dest: &Path) -> Result<(), CollectError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| CollectError::Io { path, source }
    };

    if dest.exists() {
        let existing = file_sha256(dest).map_err(io_err(dest))?;
        let incoming = file_sha256(src).map_err(io_err(src))?;
        if existing == incoming {
            return Ok(());
        }
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::copy(src, dest).map_err(io_err(dest))?;
    Ok(())
}

fn file_sha256(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge;
    use crate::spec::{BuildSpec, OsName, PlatformFamily};

    fn plan_with_copy(rules: &str) -> TargetPlan {
        let doc = format!(
            "project = \"p\"\n[common]\narchs = [\"x64\"]\n[common.copy]\n{}\n[platforms.linux.linux]\n",
            rules
        );
        let spec =
            BuildSpec::from_toml_str(&doc, Path::new("xbuild.toml"), "d".to_string()).unwrap();
        let effective = merge::resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        crate::matrix::expand(PlatformFamily::Linux, OsName::Linux, "d", &effective)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_copy_rule_relocates_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let build = tmp.path().join("build");
        let out = tmp.path().join("out");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("libz.a"), b"z").unwrap();
        fs::write(build.join("notes.txt"), b"n").unwrap();

        let plan = plan_with_copy("\"*.a\" = \"static\"");
        let registry = DestinationRegistry::new();
        let written = collect(&plan, &build, &out, &registry).unwrap();

        assert_eq!(written, vec![out.join("static/libz.a")]);
        assert!(out.join("static/libz.a").exists());
        assert!(!out.join("static/notes.txt").exists());
    }

    #[test]
    fn test_zero_matches_is_copy_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let build = tmp.path().join("build");
        fs::create_dir_all(&build).unwrap();

        let plan = plan_with_copy("\"*.dylib\" = \"shared\"");
        let registry = DestinationRegistry::new();
        let err = collect(&plan, &build, tmp.path(), &registry).unwrap_err();
        assert!(matches!(err, CollectError::CopyFailed { .. }));
    }

    #[test]
    fn test_recollect_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let build = tmp.path().join("build");
        let out = tmp.path().join("out");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("libz.a"), b"z").unwrap();

        let plan = plan_with_copy("\"*.a\" = \"static\"");
        let registry = DestinationRegistry::new();
        collect(&plan, &build, &out, &registry).unwrap();

        // Second run over the populated output directory, fresh
        // registry as in a new process.
        let registry = DestinationRegistry::new();
        let written = collect(&plan, &build, &out, &registry).unwrap();
        assert_eq!(written.len(), 1);
    }

    #[test]
    fn test_destination_collision() {
        let registry = DestinationRegistry::new();
        let dest = Path::new("/out/static/libz.a");

        registry.claim(dest, "plan-a").unwrap();
        registry.claim(dest, "plan-a").unwrap();
        let err = registry.claim(dest, "plan-b").unwrap_err();
        assert!(matches!(err, CollectError::DestinationCollision { .. }));
    }

    #[test]
    fn test_nested_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        let build = tmp.path().join("build");
        let out = tmp.path().join("out");
        fs::create_dir_all(build.join("lib")).unwrap();
        fs::write(build.join("lib/libpng.so"), b"png").unwrap();

        let plan = plan_with_copy("\"lib/*.so\" = \"shared\"");
        let registry = DestinationRegistry::new();
        let written = collect(&plan, &build, &out, &registry).unwrap();
        assert_eq!(written, vec![out.join("shared/libpng.so")]);
    }
}
