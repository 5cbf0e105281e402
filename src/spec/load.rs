//! Build description loading and validation
//!
//! Parses a TOML build description into a [`BuildSpec`]. Platform and
//! OS keys arrive as strings and are converted to their typed forms
//! here so that an unknown name is reported as a malformed description
//! rather than a bare deserializer error. Validation produces the
//! in-memory tree only; no process or build-directory work happens at
//! this stage.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::arch::{OsName, PlatformFamily};
use super::model::{BuildSpec, CommonConfig, OverrideFragment};

/// Default file name for a build description inside a directory
pub const SPEC_FILE_NAME: &str = "xbuild.toml";

/// Errors producing a [`BuildSpec`]
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("failed to read build description {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("malformed build description {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Raw document shape as it appears on disk, before key typing
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildDoc {
    project: String,
    common: CommonConfig,
    #[serde(default)]
    platforms: BTreeMap<String, BTreeMap<String, OverrideFragment>>,
}

impl BuildSpec {
    /// Load and validate a build description from a file or a
    /// directory containing one.
    pub fn from_file(path: &Path) -> Result<Self, SpecError> {
        let file = if path.is_dir() {
            path.join(SPEC_FILE_NAME)
        } else {
            path.to_path_buf()
        };

        let bytes = fs::read(&file).map_err(|source| SpecError::Io {
            path: file.clone(),
            source,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes).map_err(|e| SpecError::Malformed {
            path: file.clone(),
            reason: format!("not valid UTF-8: {}", e),
        })?;

        Self::from_toml_str(&contents, &file, digest)
    }

    /// Parse and validate a build description from a TOML string.
    ///
    /// `source_path` is recorded as provenance and used to resolve the
    /// description's relative paths.
    pub fn from_toml_str(
        contents: &str,
        source_path: &Path,
        digest: String,
    ) -> Result<Self, SpecError> {
        let doc: BuildDoc = toml::from_str(contents).map_err(|source| SpecError::Parse {
            path: source_path.to_path_buf(),
            source: Box::new(source),
        })?;

        let mut platforms = BTreeMap::new();
        for (family_key, targets) in doc.platforms {
            let family: PlatformFamily =
                family_key.parse().map_err(|reason| SpecError::Malformed {
                    path: source_path.to_path_buf(),
                    reason,
                })?;

            let mut typed_targets = BTreeMap::new();
            for (os_key, fragment) in targets {
                let os: OsName = os_key.parse().map_err(|reason| SpecError::Malformed {
                    path: source_path.to_path_buf(),
                    reason,
                })?;
                typed_targets.insert(os, fragment);
            }
            platforms.insert(family, typed_targets);
        }

        let spec = BuildSpec {
            project: doc.project,
            common: doc.common,
            platforms,
            source_path: source_path.to_path_buf(),
            digest,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Structural validation of the loaded tree
    fn validate(&self) -> Result<(), SpecError> {
        let malformed = |reason: String| SpecError::Malformed {
            path: self.source_path.clone(),
            reason,
        };

        if self.project.trim().is_empty() {
            return Err(malformed("project name must not be empty".to_string()));
        }

        if self.common.archs.is_empty() {
            return Err(malformed("common architecture list must not be empty".to_string()));
        }

        check_unique_options(&self.common.options, "common")
            .map_err(&malformed)?;
        check_libraries(&self.common.libraries, "common").map_err(&malformed)?;

        for (family, targets) in &self.platforms {
            for (os, fragment) in targets {
                let level = format!("{}.{}", family, os);

                if let Some(options) = &fragment.options {
                    check_unique_options(options, &level).map_err(&malformed)?;
                }
                if let Some(libraries) = &fragment.libraries {
                    check_libraries(libraries, &level).map_err(&malformed)?;
                }

                // The matrix this OsTarget resolves to, checked against
                // its own allowed architecture set.
                let archs = fragment.archs.as_ref().unwrap_or(&self.common.archs);
                for arch in archs {
                    if !arch.allowed_for(*os) {
                        return Err(malformed(format!(
                            "architecture `{}` is not valid for target os `{}` (under {})",
                            arch, os, level
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn check_unique_options(
    options: &[super::model::OptionBinding],
    level: &str,
) -> Result<(), String> {
    let mut seen = BTreeSet::new();
    for binding in options {
        if binding.name.trim().is_empty() {
            return Err(format!("option with empty name in {}", level));
        }
        if !seen.insert(binding.name.as_str()) {
            return Err(format!(
                "option `{}` declared more than once in {}",
                binding.name, level
            ));
        }
    }
    Ok(())
}

fn check_libraries(
    libraries: &BTreeMap<String, super::model::LibraryRef>,
    level: &str,
) -> Result<(), String> {
    for (logical, library) in libraries {
        if logical.trim().is_empty() {
            return Err(format!("library reference with empty logical name in {}", level));
        }
        if library.name.trim().is_empty() {
            return Err(format!(
                "library reference `{}` has an empty declared name in {}",
                logical, level
            ));
        }
    }
    Ok(())
}
