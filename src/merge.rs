//! Merge resolver
//!
//! Combines a description's common configuration with the override
//! fragment selected for one (family, os) pair, producing a fully
//! resolved [`EffectiveConfig`]. Field semantics:
//!
//! - scalar and list fields (archs, build_dir, build_out_dir,
//!   build_flags, subdirectories): override replaces entirely when present
//! - map fields (variables, copy, libraries): union with override
//!   precedence per key
//! - defines: concatenated, common first; a repeated define name across
//!   the two levels is a conflict (defines are positional, so nothing
//!   can be dropped silently)
//! - options: ordered by common declaration; an override binding whose
//!   name exists in common replaces that binding in place, new names
//!   are appended
//!
//! Pure function of the description plus the selection; no side
//! effects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::spec::{
    Arch, BuildSpec, LibraryRef, OptionBinding, OsName, OverrideFragment, PlatformFamily,
};

/// Errors resolving an effective configuration
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A define name appears in both the common configuration and the
    /// override fragment.
    #[error("conflicting define `{name}` for {family}.{os}: declared in both common and override")]
    ConflictingOption {
        name: String,
        family: PlatformFamily,
        os: OsName,
    },

    /// The requested (family, os) pair is not declared by the
    /// description.
    #[error("target {family}.{os} is not declared by project `{project}`")]
    UnknownTarget {
        project: String,
        family: PlatformFamily,
        os: OsName,
    },
}

/// Fully resolved configuration for one OsTarget
///
/// Every field is concrete; nothing downstream needs to consult the
/// common configuration again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: String,
    pub archs: Vec<Arch>,
    pub variables: BTreeMap<String, String>,
    pub copy: BTreeMap<String, String>,
    pub defines: Vec<String>,
    pub options: Vec<OptionBinding>,
    pub subdirectories: Vec<PathBuf>,
    pub libraries: BTreeMap<String, LibraryRef>,
    pub build_dir: PathBuf,
    pub build_out_dir: PathBuf,
    pub build_flags: Vec<String>,
}

/// Resolve the effective configuration for a declared (family, os)
/// pair. Fails with `UnknownTarget` when the description does not
/// declare it.
pub fn resolve(
    spec: &BuildSpec,
    family: PlatformFamily,
    os: OsName,
) -> Result<EffectiveConfig, MergeError> {
    let fragment = spec
        .fragment(family, os)
        .ok_or_else(|| MergeError::UnknownTarget {
            project: spec.project.clone(),
            family,
            os,
        })?;
    merge(spec, family, os, fragment)
}

/// Resolve for a subdirectory build: a spec that does not declare the
/// requested target inherits its common configuration unchanged.
pub fn resolve_or_common(
    spec: &BuildSpec,
    family: PlatformFamily,
    os: OsName,
) -> Result<EffectiveConfig, MergeError> {
    match spec.fragment(family, os) {
        Some(fragment) => merge(spec, family, os, fragment),
        None => merge(spec, family, os, &OverrideFragment::default()),
    }
}

fn merge(
    spec: &BuildSpec,
    family: PlatformFamily,
    os: OsName,
    fragment: &OverrideFragment,
) -> Result<EffectiveConfig, MergeError> {
    let common = &spec.common;

    let defines = merge_defines(&common.defines, fragment.defines.as_deref()).map_err(|name| {
        MergeError::ConflictingOption { name, family, os }
    })?;

    Ok(EffectiveConfig {
        project: spec.project.clone(),
        archs: fragment.archs.clone().unwrap_or_else(|| common.archs.clone()),
        variables: merge_map(&common.variables, fragment.variables.as_ref()),
        copy: merge_map(&common.copy, fragment.copy.as_ref()),
        defines,
        options: merge_options(&common.options, fragment.options.as_deref()),
        subdirectories: spec.subdirectories_for(family, os),
        libraries: merge_map(&common.libraries, fragment.libraries.as_ref()),
        build_dir: fragment
            .build_dir
            .clone()
            .unwrap_or_else(|| common.build_dir.clone()),
        build_out_dir: fragment
            .build_out_dir
            .clone()
            .unwrap_or_else(|| common.build_out_dir.clone()),
        build_flags: fragment
            .build_flags
            .clone()
            .unwrap_or_else(|| common.build_flags.clone()),
    })
}

/// Union with override precedence: override keys win, common-only keys
/// are retained, override-only keys are added.
fn merge_map<V: Clone>(
    common: &BTreeMap<String, V>,
    overlay: Option<&BTreeMap<String, V>>,
) -> BTreeMap<String, V> {
    let mut merged = common.clone();
    if let Some(overlay) = overlay {
        for (key, value) in overlay {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Concatenate defines, common first. Only a name appearing in both
/// levels is a conflict; repeats within one level pass through
/// untouched (defines are never deduplicated implicitly).
fn merge_defines(common: &[String], overlay: Option<&[String]>) -> Result<Vec<String>, String> {
    let mut merged: Vec<String> = common.to_vec();
    if let Some(overlay) = overlay {
        let common_names: std::collections::BTreeSet<&str> =
            common.iter().map(|define| define_name(define)).collect();
        for define in overlay {
            let name = define_name(define);
            if common_names.contains(name) {
                return Err(name.to_string());
            }
        }
        merged.extend(overlay.iter().cloned());
    }
    Ok(merged)
}

fn define_name(define: &str) -> &str {
    define.split('=').next().unwrap_or(define)
}

/// Ordered option merge: common order is preserved, an override
/// binding with a known name replaces the common binding in place,
/// new names are appended in override order.
fn merge_options(
    common: &[OptionBinding],
    overlay: Option<&[OptionBinding]>,
) -> Vec<OptionBinding> {
    let mut merged: Vec<OptionBinding> = common.to_vec();
    if let Some(overlay) = overlay {
        for binding in overlay {
            match merged.iter_mut().find(|b| b.name == binding.name) {
                Some(existing) => *existing = binding.clone(),
                None => merged.push(binding.clone()),
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::OptionValue;
    use std::path::Path;

    fn spec(doc: &str) -> BuildSpec {
        BuildSpec::from_toml_str(doc, Path::new("xbuild.toml"), "digest".to_string()).unwrap()
    }

    const BASE: &str = r#"
project = "libpng"

[common]
archs = ["x64"]
defines = ["PNG_DEBUG"]
build_dir = "build"
build_out_dir = "../libs"

[common.variables]
PNG_SHARED = "OFF"
PNG_TESTS = "OFF"

[[common.options]]
name = "ZLIB_BUILD_SHARED"
value = false

[platforms.win32.windows]

[platforms.win32.android]
archs = ["x86", "x86_64", "armeabi-v7a", "arm64-v8a"]

[platforms.linux.linux]
build_flags = ["-G", "Ninja"]

[platforms.linux.linux.variables]
PNG_SHARED = "ON"
"#;

    #[test]
    fn test_list_fields_replace() {
        let spec = spec(BASE);
        let android = resolve(&spec, PlatformFamily::Win32, OsName::Android).unwrap();
        assert_eq!(android.archs.len(), 4);

        let windows = resolve(&spec, PlatformFamily::Win32, OsName::Windows).unwrap();
        assert_eq!(windows.archs, vec![Arch::X64]);
    }

    #[test]
    fn test_map_union_override_precedence() {
        let spec = spec(BASE);
        let linux = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        // Override key wins, common-only key retained.
        assert_eq!(linux.variables["PNG_SHARED"], "ON");
        assert_eq!(linux.variables["PNG_TESTS"], "OFF");
        assert_eq!(linux.build_flags, vec!["-G", "Ninja"]);
    }

    #[test]
    fn test_unset_fields_inherit() {
        let spec = spec(BASE);
        let windows = resolve(&spec, PlatformFamily::Win32, OsName::Windows).unwrap();
        assert_eq!(windows.build_dir, PathBuf::from("build"));
        assert_eq!(windows.build_out_dir, PathBuf::from("../libs"));
        assert_eq!(windows.defines, vec!["PNG_DEBUG"]);
    }

    #[test]
    fn test_option_override_replaces_in_place() {
        let doc = r#"
project = "p"
[common]
archs = ["x64"]
[[common.options]]
name = "A"
value = false
[[common.options]]
name = "B"
value = "keep"
[platforms.linux.linux]
[[platforms.linux.linux.options]]
name = "A"
value = true
"#;
        let spec = spec(doc);
        let linux = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        let names: Vec<&str> = linux.options.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(linux.options[0].value, OptionValue::Bool(true));
    }

    #[test]
    fn test_defines_concatenate_in_order() {
        let doc = r#"
project = "p"
[common]
archs = ["x64"]
defines = ["FIRST", "SECOND"]
[platforms.linux.linux]
defines = ["THIRD"]
"#;
        let spec = spec(doc);
        let linux = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        assert_eq!(linux.defines, vec!["FIRST", "SECOND", "THIRD"]);
    }

    #[test]
    fn test_conflicting_define() {
        let doc = r#"
project = "p"
[common]
archs = ["x64"]
defines = ["FOO=1"]
[platforms.linux.linux]
defines = ["FOO=2"]
"#;
        let spec = spec(doc);
        let err = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap_err();
        assert!(matches!(err, MergeError::ConflictingOption { ref name, .. } if name == "FOO"));
    }

    #[test]
    fn test_repeated_define_within_one_level_kept() {
        let doc = r#"
project = "p"
[common]
archs = ["x64"]
defines = ["FOO", "FOO"]
[platforms.linux.linux]
defines = ["BAR"]
"#;
        let spec = spec(doc);
        let linux = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        // Repeats inside a single level are not deduplicated and not
        // a conflict; only a cross-level repeat is.
        assert_eq!(linux.defines, vec!["FOO", "FOO", "BAR"]);
    }

    #[test]
    fn test_subdirectories_override_replaces() {
        let doc = r#"
project = "p"
[common]
archs = ["x64"]
subdirectories = ["zlib"]
[platforms.linux.linux]
subdirectories = []
[platforms.win32.windows]
"#;
        let spec = spec(doc);
        let linux = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        assert!(linux.subdirectories.is_empty());

        let windows = resolve(&spec, PlatformFamily::Win32, OsName::Windows).unwrap();
        assert_eq!(windows.subdirectories, vec![PathBuf::from("zlib")]);
    }

    #[test]
    fn test_explicitly_empty_replaces() {
        let doc = r#"
project = "p"
[common]
archs = ["x64"]
defines = ["FOO"]
[platforms.linux.linux]
defines = []
"#;
        let spec = spec(doc);
        let linux = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        // Explicitly-empty defines still concatenate: common survives.
        assert_eq!(linux.defines, vec!["FOO"]);
    }

    #[test]
    fn test_unknown_target() {
        let spec = spec(BASE);
        let err = resolve(&spec, PlatformFamily::Darwin, OsName::Macos).unwrap_err();
        assert!(matches!(err, MergeError::UnknownTarget { .. }));

        // Subdirectory resolution falls back to common.
        let effective = resolve_or_common(&spec, PlatformFamily::Darwin, OsName::Macos).unwrap();
        assert_eq!(effective.archs, vec![Arch::X64]);
    }

    #[test]
    fn test_merge_deterministic() {
        let spec = spec(BASE);
        let a = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        let b = resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        assert_eq!(a, b);
    }
}
