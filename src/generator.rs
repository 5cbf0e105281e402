//! Invocation driver boundary
//!
//! The engine hands each target plan to an external build generator
//! through the [`Generator`] trait. [`ProcessGenerator`] is the real
//! implementation: it spawns the configured generator command (cmake
//! by default) for a configure step and a build step, and treats any
//! non-zero exit status as a failure. No retries are attempted: native
//! builds are not assumed safe to blindly re-run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::matrix::TargetPlan;
use crate::spec::{Arch, OsName};

/// File extensions recognized as native library artifacts
const LIBRARY_EXTENSIONS: &[&str] = &["a", "so", "dylib", "lib", "dll"];

/// A file produced by a successful target plan invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Absolute path of the produced file
    pub path: PathBuf,

    /// Logical library name: the file stem minus any `lib` prefix
    pub logical_name: String,

    /// Project that produced the artifact
    pub project: String,
}

impl Artifact {
    /// Classify a produced file as a library artifact, if it is one.
    pub fn from_path(path: &Path, project: &str) -> Option<Artifact> {
        let extension = path.extension()?.to_str()?;
        if !LIBRARY_EXTENSIONS.contains(&extension) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let logical_name = stem.strip_prefix("lib").unwrap_or(stem).to_string();
        Some(Artifact {
            path: path.to_path_buf(),
            logical_name,
            project: project.to_string(),
        })
    }
}

/// Everything a generator invocation needs, fully resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorInvocation {
    /// Project being generated
    pub project: String,

    /// Source directory holding the build description
    pub source_dir: PathBuf,

    /// Build directory for this (os, arch) pair
    pub build_dir: PathBuf,

    pub os: OsName,
    pub arch: Arch,

    /// Variable bindings passed as generator definitions, in key order
    pub variables: Vec<(String, String)>,

    /// Preprocessor defines, in declaration order
    pub defines: Vec<String>,

    /// Option bindings rendered to generator scalars, in declaration order
    pub options: Vec<(String, String)>,

    /// Extra flags appended verbatim
    pub flags: Vec<String>,

    /// Resolved libraries passed as link inputs
    pub link_inputs: Vec<Artifact>,
}

impl GeneratorInvocation {
    /// Assemble the invocation for a plan. `link_inputs` are the
    /// libraries resolved from sub-builds and explicit paths.
    pub fn for_plan(
        plan: &TargetPlan,
        source_dir: &Path,
        build_dir: &Path,
        link_inputs: Vec<Artifact>,
    ) -> Self {
        let effective = &plan.effective;
        GeneratorInvocation {
            project: effective.project.clone(),
            source_dir: source_dir.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
            os: plan.os,
            arch: plan.arch,
            variables: effective
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            defines: effective.defines.clone(),
            options: effective
                .options
                .iter()
                .map(|binding| (binding.name.clone(), binding.value.render()))
                .collect(),
            flags: effective.build_flags.clone(),
            link_inputs,
        }
    }

    /// Arguments for the configure step, in a reproducible order:
    /// source/build dirs, target identity, variables, options, defines,
    /// link inputs, then the verbatim flags.
    pub fn configure_args(&self) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.source_dir.display().to_string(),
            "-B".to_string(),
            self.build_dir.display().to_string(),
            format!("-DXBUILD_OS={}", self.os),
            format!("-DXBUILD_ARCH={}", self.arch),
        ];

        for (name, value) in &self.variables {
            args.push(format!("-D{}={}", name, value));
        }
        for (name, value) in &self.options {
            args.push(format!("-D{}={}", name, value));
        }
        if !self.defines.is_empty() {
            args.push(format!("-DXBUILD_DEFINES={}", self.defines.join(";")));
        }
        if !self.link_inputs.is_empty() {
            let paths: Vec<String> = self
                .link_inputs
                .iter()
                .map(|a| a.path.display().to_string())
                .collect();
            args.push(format!("-DXBUILD_LINK_LIBRARIES={}", paths.join(";")));
        }
        args.extend(self.flags.iter().cloned());
        args
    }
}

/// Result of a successful generator invocation
#[derive(Debug, Clone, Default)]
pub struct GeneratorOutcome {
    /// Library artifacts found under the build directory
    pub artifacts: Vec<Artifact>,
}

/// Errors crossing the generator boundary
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("failed to launch generator `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The external generator exited non-zero.
    #[error("generator {phase} step failed for `{project}` with exit status {status}")]
    Failed {
        project: String,
        phase: &'static str,
        status: i32,
    },

    #[error("generator io error: {0}")]
    Io(#[from] io::Error),
}

/// External build generator seam
pub trait Generator: Send + Sync {
    /// Run the generator for one target plan. Implementations must not
    /// retry on failure.
    fn generate(&self, invocation: &GeneratorInvocation)
        -> Result<GeneratorOutcome, GeneratorError>;

    /// Name shown in diagnostics and run records
    fn name(&self) -> &str;
}

/// Generator that shells out to an external command
pub struct ProcessGenerator {
    command: String,
    verbose: bool,
}

impl ProcessGenerator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn run_step(
        &self,
        invocation: &GeneratorInvocation,
        phase: &'static str,
        args: &[String],
    ) -> Result<(), GeneratorError> {
        if self.verbose {
            eprintln!("  [{}] {} {}", phase, self.command, args.join(" "));
        }

        let output = Command::new(&self.command)
            .args(args)
            .current_dir(&invocation.source_dir)
            .output()
            .map_err(|source| GeneratorError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let log_path = invocation.build_dir.join(format!("{}.log", phase));
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut log = output.stdout.clone();
        log.extend_from_slice(&output.stderr);
        fs::write(&log_path, &log)?;

        if !output.status.success() {
            if !self.verbose {
                // Surface the tail of the log on failure.
                let text = String::from_utf8_lossy(&log);
                for line in text.lines().rev().take(20).collect::<Vec<_>>().iter().rev() {
                    eprintln!("    {}", line);
                }
            }
            return Err(GeneratorError::Failed {
                project: invocation.project.clone(),
                phase,
                status: output.status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

impl Default for ProcessGenerator {
    fn default() -> Self {
        Self::new("cmake")
    }
}

impl Generator for ProcessGenerator {
    fn generate(
        &self,
        invocation: &GeneratorInvocation,
    ) -> Result<GeneratorOutcome, GeneratorError> {
        fs::create_dir_all(&invocation.build_dir)?;

        self.run_step(invocation, "configure", &invocation.configure_args())?;

        let build_args = vec![
            "--build".to_string(),
            invocation.build_dir.display().to_string(),
        ];
        self.run_step(invocation, "build", &build_args)?;

        let mut artifacts = Vec::new();
        for entry in walkdir::WalkDir::new(&invocation.build_dir)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.file_type().is_file() {
                if let Some(artifact) = Artifact::from_path(entry.path(), &invocation.project) {
                    artifacts.push(artifact);
                }
            }
        }
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(GeneratorOutcome { artifacts })
    }

    fn name(&self) -> &str {
        &self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge;
    use crate::spec::{BuildSpec, PlatformFamily};

    #[test]
    fn test_artifact_from_path() {
        let artifact =
            Artifact::from_path(Path::new("/b/libzlibstatic.a"), "zlib").unwrap();
        assert_eq!(artifact.logical_name, "zlibstatic");
        assert_eq!(artifact.project, "zlib");

        let windows = Artifact::from_path(Path::new("/b/png.lib"), "libpng").unwrap();
        assert_eq!(windows.logical_name, "png");

        assert!(Artifact::from_path(Path::new("/b/notes.txt"), "p").is_none());
        assert!(Artifact::from_path(Path::new("/b/CMakeCache"), "p").is_none());
    }

    #[test]
    fn test_configure_args_order() {
        let doc = r#"
project = "libpng"
[common]
archs = ["x64"]
defines = ["PNG_DEBUG"]
build_flags = ["-G", "Ninja"]
[common.variables]
PNG_SHARED = "OFF"
[[common.options]]
name = "ZLIB_BUILD_SHARED"
value = false
[platforms.linux.linux]
"#;
        let spec = BuildSpec::from_toml_str(doc, Path::new("xbuild.toml"), "d".to_string())
            .unwrap();
        let effective =
            merge::resolve(&spec, PlatformFamily::Linux, OsName::Linux).unwrap();
        let plans =
            crate::matrix::expand(PlatformFamily::Linux, OsName::Linux, "d", &effective).unwrap();

        let invocation = GeneratorInvocation::for_plan(
            &plans[0],
            Path::new("/src"),
            Path::new("/src/build/linux-x64"),
            vec![Artifact {
                path: PathBuf::from("/src/zlib/build/libz.a"),
                logical_name: "z".to_string(),
                project: "zlib".to_string(),
            }],
        );

        let args = invocation.configure_args();
        assert_eq!(args[0], "-S");
        assert_eq!(args[2], "-B");
        assert!(args.contains(&"-DXBUILD_OS=linux".to_string()));
        assert!(args.contains(&"-DXBUILD_ARCH=x64".to_string()));
        assert!(args.contains(&"-DPNG_SHARED=OFF".to_string()));
        assert!(args.contains(&"-DZLIB_BUILD_SHARED=OFF".to_string()));
        assert!(args.contains(&"-DXBUILD_DEFINES=PNG_DEBUG".to_string()));
        assert!(args.contains(&"-DXBUILD_LINK_LIBRARIES=/src/zlib/build/libz.a".to_string()));

        // Verbatim flags come last.
        assert_eq!(&args[args.len() - 2..], &["-G", "Ninja"]);
    }
}
