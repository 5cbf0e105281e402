//! Run orchestrator
//!
//! Resolves a build description tree into an ordered run plan, emits
//! run_plan.json before execution starts, then drives every target
//! plan through the generator and collector. Plans run in parallel;
//! a failure aborts the remaining plans of its platform family while
//! other families continue. Each plan builds its dependency closure
//! depth-first, so sub-build artifacts are on disk before the consumer
//! configures.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::collect::{self, CollectError, DestinationRegistry};
use crate::compose::{self, ComposeError, SpecArena, SpecId};
use crate::generator::{Artifact, Generator, GeneratorInvocation, ProcessGenerator};
use crate::matrix::{self, MatrixError, TargetPlan};
use crate::merge::{self, MergeError};
use crate::spec::{Arch, BuildSpec, OsName, PlatformFamily, SpecError};
use crate::summary::{ExitCode, FailureKind, PlanSummary, RunSummary};

/// Schema version for run_plan.json
pub const RUN_PLAN_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for run_plan.json
pub const RUN_PLAN_SCHEMA_ID: &str = "xbuild/run_plan@1";

/// One entry in the run plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Entry index (0-based)
    pub index: usize,

    /// Project being built
    pub project: String,

    pub family: PlatformFamily,
    pub os: OsName,

    /// Absent when the OS target was rejected before expansion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<Arch>,

    /// Plan identity; absent for rejected entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_key: Option<String>,

    /// Whether the entry was rejected at plan time
    #[serde(default)]
    pub rejected: bool,

    /// Rejection reason (if rejected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The run plan artifact (run_plan.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlanDoc {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When this plan was created
    pub created_at: DateTime<Utc>,

    /// Run identifier
    pub run_id: String,

    /// Root project
    pub project: String,

    /// Digest of the root build description
    pub spec_digest: String,

    /// Generator the plans will be handed to
    pub generator: String,

    /// Distinct descriptions across every selected target's
    /// dependency closure
    pub spec_count: usize,

    /// Ordered entries
    pub entries: Vec<PlanEntry>,
}

impl RunPlanDoc {
    /// Count of entries rejected at plan time
    pub fn rejected_count(&self) -> usize {
        self.entries.iter().filter(|e| e.rejected).count()
    }
}

impl std::fmt::Display for RunPlanDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Run Plan ===")?;
        writeln!(f)?;
        writeln!(f, "Run ID: {}", self.run_id)?;
        writeln!(f, "Project: {}", self.project)?;
        writeln!(f, "Generator: {}", self.generator)?;
        writeln!(f, "Descriptions: {}", self.spec_count)?;
        writeln!(f)?;
        writeln!(f, "Targets ({}):", self.entries.len())?;
        for entry in &self.entries {
            match entry.arch {
                Some(arch) => writeln!(
                    f,
                    "  [{}] {}/{}/{} - OK",
                    entry.index, entry.family, entry.os, arch
                )?,
                None => writeln!(
                    f,
                    "  [{}] {}/{} - REJECTED",
                    entry.index, entry.family, entry.os
                )?,
            }
            if let Some(reason) = &entry.reason {
                writeln!(f, "        Reason: {}", reason)?;
            }
        }
        Ok(())
    }
}

/// Errors that abort a run before any plan executes
#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("failed to build scheduler: {0}")]
    Scheduler(String),

    #[error("failed to write run records to `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl OrchestrateError {
    /// Stable exit code for a run that failed before execution
    pub fn exit_code(&self) -> ExitCode {
        match self {
            OrchestrateError::Spec(SpecError::Io { .. }) => ExitCode::Io,
            OrchestrateError::Spec(_) => ExitCode::MalformedSpec,
            OrchestrateError::Compose(ComposeError::Spec(SpecError::Io { .. })) => ExitCode::Io,
            OrchestrateError::Compose(ComposeError::Spec(_)) => ExitCode::MalformedSpec,
            OrchestrateError::Compose(ComposeError::CyclicDependency { .. }) => {
                ExitCode::CyclicDependency
            }
            OrchestrateError::Compose(ComposeError::UnresolvedLibrary { .. }) => {
                ExitCode::UnresolvedLibrary
            }
            OrchestrateError::Scheduler(_) | OrchestrateError::Io { .. } => ExitCode::Io,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Root build description: a directory or an xbuild.toml path
    pub spec_path: PathBuf,

    /// Platform families to build; empty means the host family
    pub families: Vec<PlatformFamily>,

    /// Restrict to these target operating systems; empty means all
    pub os_filter: Vec<OsName>,

    /// Restrict to these architectures; empty means all
    pub arch_filter: Vec<Arch>,

    /// Output directory override; default is each description's
    /// build_out_dir
    pub out_dir: Option<PathBuf>,

    /// Generator command (default "cmake")
    pub generator: Option<String>,

    /// Parallel plan limit; None uses the scheduler default
    pub jobs: Option<usize>,

    /// Verbose diagnostics on stderr
    pub verbose: bool,
}

impl OrchestratorConfig {
    pub fn new(spec_path: impl Into<PathBuf>) -> Self {
        Self {
            spec_path: spec_path.into(),
            families: Vec::new(),
            os_filter: Vec::new(),
            arch_filter: Vec::new(),
            out_dir: None,
            generator: None,
            jobs: None,
            verbose: false,
        }
    }
}

/// A resolved run, ready to execute
#[derive(Debug)]
pub struct PlannedRun {
    /// The run plan artifact
    pub doc: RunPlanDoc,

    /// Expanded plans, in entry order
    pub units: Vec<TargetPlan>,

    /// Summaries for OS targets rejected at plan time
    pub pre_failures: Vec<PlanSummary>,

    /// Directory the run records are written to
    pub records_dir: PathBuf,

    /// Dependency closure per (family, os), resolved once at plan time
    /// and reused verbatim at execution time
    arenas: BTreeMap<(PlatformFamily, OsName), SpecArena>,
}

/// Result of an executed run
#[derive(Debug)]
pub struct RunReport {
    /// Aggregated run summary
    pub summary: RunSummary,

    /// One summary per entry, executed or not
    pub plan_summaries: Vec<PlanSummary>,

    /// Directory the run records were written to
    pub records_dir: PathBuf,
}

struct PlanFailure {
    kind: FailureKind,
    detail: String,
    chain: Vec<String>,
}

/// Drives a full run: plan, invoke, collect, summarize
pub struct Orchestrator {
    config: OrchestratorConfig,
    generator: Box<dyn Generator>,
    interrupt: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let command = config.generator.clone().unwrap_or_else(|| "cmake".to_string());
        let generator = ProcessGenerator::new(command).verbose(config.verbose);
        Self {
            config,
            generator: Box::new(generator),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the generator, e.g. with a mock
    pub fn with_generator(mut self, generator: Box<dyn Generator>) -> Self {
        self.generator = generator;
        self
    }

    /// Share an interrupt flag; setting it stops scheduling new plans.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    fn families(&self) -> Vec<PlatformFamily> {
        if self.config.families.is_empty() {
            vec![PlatformFamily::host()]
        } else {
            self.config.families.clone()
        }
    }

    /// Resolve the description tree into a run plan without executing
    /// anything. The dependency closure for every selected (family, os)
    /// pair is loaded here; a cycle anywhere aborts the whole run.
    pub fn plan(&self) -> Result<PlannedRun, OrchestrateError> {
        let root = BuildSpec::from_file(&self.config.spec_path)?;
        let run_id = ulid::Ulid::new().to_string().to_lowercase();

        let mut entries = Vec::new();
        let mut units = Vec::new();
        let mut pre_failures = Vec::new();
        let mut arenas: BTreeMap<(PlatformFamily, OsName), SpecArena> = BTreeMap::new();

        for family in self.families() {
            for os in root.os_targets(family) {
                if !self.config.os_filter.is_empty() && !self.config.os_filter.contains(&os) {
                    continue;
                }

                let arena = SpecArena::load(&self.config.spec_path, family, os)?;
                arenas.insert((family, os), arena);

                let rejection = match merge::resolve(&root, family, os) {
                    Ok(effective) => {
                        match matrix::expand(family, os, &root.digest, &effective) {
                            Ok(plans) => {
                                for plan in plans {
                                    if !self.config.arch_filter.is_empty()
                                        && !self.config.arch_filter.contains(&plan.arch)
                                    {
                                        continue;
                                    }
                                    entries.push(PlanEntry {
                                        index: entries.len(),
                                        project: root.project.clone(),
                                        family,
                                        os,
                                        arch: Some(plan.arch),
                                        plan_id: Some(plan.plan_id.clone()),
                                        plan_key: Some(plan.plan_key.clone()),
                                        rejected: false,
                                        reason: None,
                                    });
                                    units.push(plan);
                                }
                                None
                            }
                            Err(err) => Some((failure_kind_for_matrix(&err), err.to_string())),
                        }
                    }
                    Err(err) => Some((failure_kind_for_merge(&err), err.to_string())),
                };

                if let Some((kind, detail)) = rejection {
                    entries.push(PlanEntry {
                        index: entries.len(),
                        project: root.project.clone(),
                        family,
                        os,
                        arch: None,
                        plan_id: None,
                        plan_key: None,
                        rejected: true,
                        reason: Some(detail.clone()),
                    });
                    pre_failures.push(PlanSummary::failure(
                        run_id.clone(),
                        root.project.clone(),
                        family,
                        os,
                        None,
                        kind,
                        detail,
                        0,
                    ));
                }
            }
        }

        let records_dir = root
            .dir()
            .join(&root.common.build_dir)
            .join("runs")
            .join(&run_id);

        // Distinct descriptions across every target's closure; the
        // root counts even when no target was selected.
        let mut distinct: BTreeSet<PathBuf> = BTreeSet::new();
        for arena in arenas.values() {
            for spec in arena.specs() {
                distinct.insert(spec.source_path.clone());
            }
        }
        let spec_count = distinct.len().max(1);

        let doc = RunPlanDoc {
            schema_version: RUN_PLAN_SCHEMA_VERSION,
            schema_id: RUN_PLAN_SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            run_id,
            project: root.project.clone(),
            spec_digest: root.digest.clone(),
            generator: self.generator.name().to_string(),
            spec_count,
            entries,
        };

        Ok(PlannedRun {
            doc,
            units,
            pre_failures,
            records_dir,
            arenas,
        })
    }

    /// Plan and execute a full run, writing the run records as it
    /// goes. A failing plan never aborts the process; the failure is
    /// reflected in the aggregated summary's exit code.
    pub fn run(&self) -> Result<RunReport, OrchestrateError> {
        let started = Instant::now();
        let planned = self.plan()?;
        let run_id = planned.doc.run_id.clone();

        fs::create_dir_all(&planned.records_dir).map_err(|source| OrchestrateError::Io {
            path: planned.records_dir.clone(),
            source,
        })?;
        let plan_path = planned.records_dir.join("run_plan.json");
        let json = serde_json::to_string_pretty(&planned.doc)
            .map_err(|e| OrchestrateError::Scheduler(e.to_string()))?;
        fs::write(&plan_path, json).map_err(|source| OrchestrateError::Io {
            path: plan_path,
            source,
        })?;

        if self.config.verbose {
            eprintln!(
                "[xbuild] run {}: {} plans across {} descriptions",
                run_id,
                planned.units.len(),
                planned.doc.spec_count
            );
        }

        let registry = DestinationRegistry::new();
        let aborts: HashMap<PlatformFamily, AtomicBool> = self
            .families()
            .into_iter()
            .map(|family| (family, AtomicBool::new(false)))
            .collect();

        let execute = || {
            planned
                .units
                .par_iter()
                .map(|unit| match planned.arenas.get(&(unit.family, unit.os)) {
                    Some(arena) => self.execute_unit(arena, unit, &run_id, &registry, &aborts),
                    // Unreachable by construction: every unit's target
                    // had its closure loaded at plan time.
                    None => PlanSummary::failure(
                        run_id.clone(),
                        unit.effective.project.clone(),
                        unit.family,
                        unit.os,
                        Some(unit.arch),
                        FailureKind::Io,
                        "missing dependency graph for target".to_string(),
                        0,
                    ),
                })
                .collect::<Vec<PlanSummary>>()
        };

        let mut summaries = match self.config.jobs {
            Some(jobs) => rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .map_err(|e| OrchestrateError::Scheduler(e.to_string()))?
                .install(execute),
            None => execute(),
        };
        summaries.extend(planned.pre_failures);

        let interrupted = self.interrupt.load(Ordering::SeqCst);
        let summary = if summaries.is_empty() {
            RunSummary::empty(run_id)
        } else {
            RunSummary::from_plan_summaries(
                run_id,
                &summaries,
                interrupted,
                started.elapsed().as_millis() as u64,
            )
        };

        for (index, plan_summary) in summaries.iter().enumerate() {
            let path = planned
                .records_dir
                .join(format!("plan_summary_{}.json", index));
            plan_summary
                .write_to_file(&path)
                .map_err(|source| OrchestrateError::Io { path, source })?;
        }
        let summary_path = planned.records_dir.join("run_summary.json");
        summary
            .write_to_file(&summary_path)
            .map_err(|source| OrchestrateError::Io {
                path: summary_path,
                source,
            })?;

        Ok(RunReport {
            summary,
            plan_summaries: summaries,
            records_dir: planned.records_dir,
        })
    }

    fn execute_unit(
        &self,
        arena: &SpecArena,
        unit: &TargetPlan,
        run_id: &str,
        registry: &DestinationRegistry,
        aborts: &HashMap<PlatformFamily, AtomicBool>,
    ) -> PlanSummary {
        let project = unit.effective.project.clone();

        if self.interrupt.load(Ordering::SeqCst) {
            return PlanSummary::skipped(
                run_id.to_string(),
                project,
                unit.family,
                unit.os,
                unit.arch,
                "run interrupted".to_string(),
            );
        }
        if let Some(abort) = aborts.get(&unit.family) {
            if abort.load(Ordering::SeqCst) {
                return PlanSummary::skipped(
                    run_id.to_string(),
                    project,
                    unit.family,
                    unit.os,
                    unit.arch,
                    "platform aborted after earlier failure".to_string(),
                );
            }
        }

        if self.config.verbose {
            eprintln!("[xbuild] building {}", unit.label());
        }

        let started = Instant::now();
        match self.execute_closure(arena, unit, registry) {
            Ok(artifacts) => {
                if self.config.verbose {
                    eprintln!("[xbuild] {} done ({} artifacts)", unit.label(), artifacts.len());
                }
                PlanSummary::success(
                    run_id.to_string(),
                    unit.plan_id.clone(),
                    unit.plan_key.clone(),
                    project,
                    unit.family,
                    unit.os,
                    unit.arch,
                    started.elapsed().as_millis() as u64,
                    artifacts,
                )
            }
            Err(failure) => {
                if let Some(abort) = aborts.get(&unit.family) {
                    abort.store(true, Ordering::SeqCst);
                }
                eprintln!(
                    "[xbuild] {} failed in `{}`: {}",
                    unit.label(),
                    failure.chain.join(" -> "),
                    failure.detail
                );
                PlanSummary::failure(
                    run_id.to_string(),
                    project,
                    unit.family,
                    unit.os,
                    Some(unit.arch),
                    failure.kind,
                    failure.detail,
                    started.elapsed().as_millis() as u64,
                )
                .with_plan(unit.plan_id.clone(), unit.plan_key.clone())
                .with_chain(failure.chain)
            }
        }
    }

    /// Build the dependency closure of one plan, dependencies first,
    /// and collect artifacts at every level.
    fn execute_closure(
        &self,
        arena: &SpecArena,
        unit: &TargetPlan,
        registry: &DestinationRegistry,
    ) -> Result<Vec<PathBuf>, PlanFailure> {
        let mut produced: HashMap<SpecId, Vec<Artifact>> = HashMap::new();
        let mut collected = Vec::new();

        for &id in arena.build_order() {
            let spec = arena.spec(id);
            let chain = arena.chain(id).to_vec();
            let fail = |kind: FailureKind, detail: String| PlanFailure {
                kind,
                detail,
                chain: chain.clone(),
            };

            if self.interrupt.load(Ordering::SeqCst) {
                return Err(fail(
                    FailureKind::Interrupted,
                    "run interrupted".to_string(),
                ));
            }

            // The root plan is already resolved; sub-builds inherit
            // the consumer's family, OS, and architecture.
            let node_plan = if id == arena.root() {
                unit.clone()
            } else {
                let effective = merge::resolve_or_common(spec, unit.family, unit.os)
                    .map_err(|e| fail(failure_kind_for_merge(&e), e.to_string()))?;
                matrix::plan_for_arch(unit.family, unit.os, unit.arch, &spec.digest, &effective)
                    .map_err(|e| fail(failure_kind_for_matrix(&e), e.to_string()))?
            };

            let spec_dir = spec.dir();
            let build_dir = spec_dir
                .join(&node_plan.effective.build_dir)
                .join(format!("{}-{}", unit.os, unit.arch));

            let mut candidates = Vec::new();
            for dep in arena.dependencies(id) {
                if let Some(artifacts) = produced.get(&dep) {
                    candidates.extend(artifacts.iter().cloned());
                }
            }
            let link_inputs = compose::resolve_libraries(&node_plan.effective, &spec_dir, &candidates)
                .map_err(|e| fail(failure_kind_for_compose(&e), e.to_string()))?;

            let invocation =
                GeneratorInvocation::for_plan(&node_plan, &spec_dir, &build_dir, link_inputs);
            let outcome = self
                .generator
                .generate(&invocation)
                .map_err(|e| fail(FailureKind::GeneratorFailed, e.to_string()))?;

            if !node_plan.effective.copy.is_empty() {
                let out_base = match &self.config.out_dir {
                    Some(out) => out.clone(),
                    None => spec_dir.join(&node_plan.effective.build_out_dir),
                };
                let out_dir = out_base
                    .join(unit.os.as_str())
                    .join(unit.arch.as_str());
                let written = collect::collect(&node_plan, &build_dir, &out_dir, registry)
                    .map_err(|e| fail(failure_kind_for_collect(&e), e.to_string()))?;
                collected.extend(written);
            }

            produced.insert(id, outcome.artifacts);
        }

        Ok(collected)
    }
}

fn failure_kind_for_merge(err: &MergeError) -> FailureKind {
    match err {
        MergeError::ConflictingOption { .. } => FailureKind::ConflictingOption,
        MergeError::UnknownTarget { .. } => FailureKind::MalformedSpec,
    }
}

fn failure_kind_for_matrix(err: &MatrixError) -> FailureKind {
    match err {
        MatrixError::EmptyArchitectureList { .. } => FailureKind::EmptyArchitectureList,
        MatrixError::PlanKey(_) => FailureKind::Io,
    }
}

fn failure_kind_for_compose(err: &ComposeError) -> FailureKind {
    match err {
        ComposeError::Spec(SpecError::Io { .. }) => FailureKind::Io,
        ComposeError::Spec(_) => FailureKind::MalformedSpec,
        ComposeError::CyclicDependency { .. } => FailureKind::CyclicDependency,
        ComposeError::UnresolvedLibrary { .. } => FailureKind::UnresolvedLibrary,
    }
}

fn failure_kind_for_collect(err: &CollectError) -> FailureKind {
    match err {
        CollectError::CopyFailed { .. } | CollectError::Pattern { .. } => FailureKind::CopyFailed,
        CollectError::DestinationCollision { .. } => FailureKind::DestinationCollision,
        CollectError::Io { .. } => FailureKind::Io,
    }
}
