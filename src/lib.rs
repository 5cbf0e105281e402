//! xbuild - cross-platform native library build orchestration
//!
//! This crate turns a single declarative build description
//! (`xbuild.toml`) into one generator invocation per target platform
//! and architecture, builds subdirectory dependencies first, and
//! collects the produced libraries into a stable output layout.

pub mod collect;
pub mod compose;
pub mod generator;
pub mod matrix;
pub mod merge;
pub mod mock;
pub mod orchestrate;
pub mod spec;
pub mod summary;

pub use compose::SpecArena;
pub use generator::{Generator, ProcessGenerator};
pub use matrix::TargetPlan;
pub use merge::EffectiveConfig;
pub use orchestrate::{Orchestrator, OrchestratorConfig};
pub use spec::{Arch, BuildSpec, OsName, PlatformFamily};
pub use summary::{ExitCode, FailureKind, PlanSummary, RunSummary, Status};
