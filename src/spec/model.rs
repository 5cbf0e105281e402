//! Typed build description model
//!
//! `BuildSpec` is the root entity: one project name, a fully-populated
//! common configuration, and per-platform-family override fragments.
//! It is built once by the loader and read-only afterwards; every
//! downstream stage (merge, matrix, compose) borrows it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::arch::{Arch, OsName, PlatformFamily};

/// Scalar value bound to a generator option
///
/// Options carry either a boolean toggle or a pass-through scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    /// Render the value the way the build generator expects it:
    /// booleans as ON/OFF, scalars verbatim.
    pub fn render(&self) -> String {
        match self {
            OptionValue::Bool(true) => "ON".to_string(),
            OptionValue::Bool(false) => "OFF".to_string(),
            OptionValue::Int(i) => i.to_string(),
            OptionValue::Str(s) => s.clone(),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One named generator option
///
/// Options are an ordered sequence, not a map: generator arguments are
/// positional, so declaration order is preserved end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionBinding {
    pub name: String,
    pub value: OptionValue,
}

/// A library the project links against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRef {
    /// Declared library name (non-empty)
    pub name: String,

    /// Explicit path fallback, relative to the build description,
    /// used when no subdirectory build produced the library
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Fully-populated configuration shared by every target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommonConfig {
    /// Architecture matrix (ordered, non-empty)
    pub archs: Vec<Arch>,

    /// Generator variable bindings (name -> value)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Copy rules: source pattern (relative to the build directory)
    /// -> destination (relative to the build output directory)
    #[serde(default)]
    pub copy: BTreeMap<String, String>,

    /// Preprocessor defines (ordered)
    #[serde(default)]
    pub defines: Vec<String>,

    /// Generator options (ordered, names unique within this level)
    #[serde(default)]
    pub options: Vec<OptionBinding>,

    /// Nested build descriptions, relative to this description
    #[serde(default)]
    pub subdirectories: Vec<PathBuf>,

    /// Libraries to link, keyed by logical name
    #[serde(default)]
    pub libraries: BTreeMap<String, LibraryRef>,

    /// Build directory, relative to this description
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Build output directory, relative to this description
    #[serde(default = "default_build_out_dir")]
    pub build_out_dir: PathBuf,

    /// Extra generator flags, appended verbatim
    #[serde(default)]
    pub build_flags: Vec<String>,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_build_out_dir() -> PathBuf {
    PathBuf::from("out")
}

/// Per-OsTarget override fragment
///
/// Same shape as [`CommonConfig`] with every field optional. The
/// tri-state is deliberate: `None` means absent (inherit the common
/// value), `Some(empty)` means explicitly empty (replace with nothing),
/// `Some(values)` means present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideFragment {
    pub archs: Option<Vec<Arch>>,
    pub variables: Option<BTreeMap<String, String>>,
    pub copy: Option<BTreeMap<String, String>>,
    pub defines: Option<Vec<String>>,
    pub options: Option<Vec<OptionBinding>>,
    pub subdirectories: Option<Vec<PathBuf>>,
    pub libraries: Option<BTreeMap<String, LibraryRef>>,
    pub build_dir: Option<PathBuf>,
    pub build_out_dir: Option<PathBuf>,
    pub build_flags: Option<Vec<String>>,
}

/// The root build description entity
///
/// Parsed once at load time and immutable thereafter. Carries
/// provenance (source path + content digest) the same way the engine
/// records every input it consumed.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    /// Project name (non-empty)
    pub project: String,

    /// Settings shared by every target
    pub common: CommonConfig,

    /// Override fragments grouped by host family, then target OS
    pub platforms: BTreeMap<PlatformFamily, BTreeMap<OsName, OverrideFragment>>,

    /// Path the description was loaded from
    pub source_path: PathBuf,

    /// SHA-256 hex digest of the raw description bytes
    pub digest: String,
}

impl BuildSpec {
    /// Directory containing the build description; relative paths in
    /// the description resolve against it.
    pub fn dir(&self) -> PathBuf {
        self.source_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// OsTargets declared under a family, in key order
    pub fn os_targets(&self, family: PlatformFamily) -> Vec<OsName> {
        self.platforms
            .get(&family)
            .map(|targets| targets.keys().copied().collect())
            .unwrap_or_default()
    }

    /// The override fragment for a (family, os) pair, if declared
    pub fn fragment(&self, family: PlatformFamily, os: OsName) -> Option<&OverrideFragment> {
        self.platforms.get(&family).and_then(|targets| targets.get(&os))
    }

    /// Subdirectory list in effect for a (family, os) pair. List
    /// fields replace entirely: an override list, even an empty one,
    /// supersedes the common list.
    pub fn subdirectories_for(&self, family: PlatformFamily, os: OsName) -> Vec<PathBuf> {
        self.fragment(family, os)
            .and_then(|fragment| fragment.subdirectories.clone())
            .unwrap_or_else(|| self.common.subdirectories.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_value_render() {
        assert_eq!(OptionValue::Bool(true).render(), "ON");
        assert_eq!(OptionValue::Bool(false).render(), "OFF");
        assert_eq!(OptionValue::Int(3).render(), "3");
        assert_eq!(OptionValue::Str("Release".to_string()).render(), "Release");
    }

    #[test]
    fn test_option_value_untagged_parse() {
        let bindings: Vec<OptionBinding> = serde_json::from_str(
            r#"[{"name": "ZLIB_BUILD_SHARED", "value": false},
                {"name": "LEVEL", "value": 9},
                {"name": "MODE", "value": "static"}]"#,
        )
        .unwrap();
        assert_eq!(bindings[0].value, OptionValue::Bool(false));
        assert_eq!(bindings[1].value, OptionValue::Int(9));
        assert_eq!(bindings[2].value, OptionValue::Str("static".to_string()));
    }

    #[test]
    fn test_fragment_tri_state() {
        let absent: OverrideFragment = toml::from_str("").unwrap();
        assert!(absent.archs.is_none());

        let empty: OverrideFragment = toml::from_str("archs = []").unwrap();
        assert_eq!(empty.archs, Some(vec![]));

        let present: OverrideFragment = toml::from_str(r#"archs = ["x64"]"#).unwrap();
        assert_eq!(present.archs, Some(vec![Arch::X64]));
    }
}
