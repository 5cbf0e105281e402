//! xbuild CLI
//!
//! Entry point for the `xbuild` command-line tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use xbuild::compose::ComposeError;
use xbuild::orchestrate::{Orchestrator, OrchestratorConfig};
use xbuild::spec::{Arch, BuildSpec, OsName, PlatformFamily, SpecError};
use xbuild::summary::ExitCode;
use xbuild::SpecArena;

#[derive(Parser)]
#[command(name = "xbuild")]
#[command(about = "Cross-platform native library build orchestration", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every target of a build description
    Run {
        #[command(flatten)]
        selection: Selection,

        /// Output directory override
        #[arg(long)]
        out: Option<PathBuf>,

        /// Generator command (default: cmake)
        #[arg(long)]
        generator: Option<String>,

        /// Maximum number of plans built in parallel
        #[arg(long, short = 'j')]
        jobs: Option<usize>,

        /// Verbose diagnostics on stderr
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Resolve and print the run plan without building
    Plan {
        #[command(flatten)]
        selection: Selection,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Validate a build description and its dependency closure
    Verify {
        /// Directory holding xbuild.toml (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(clap::Args)]
struct Selection {
    /// Directory holding xbuild.toml (default: current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Platform families to build (default: the host family)
    #[arg(long = "platform", value_delimiter = ',')]
    platforms: Vec<PlatformFamily>,

    /// Restrict to these target operating systems
    #[arg(long = "os", value_delimiter = ',')]
    os: Vec<OsName>,

    /// Restrict to these architectures
    #[arg(long = "arch", value_delimiter = ',')]
    archs: Vec<Arch>,
}

impl Selection {
    fn into_config(self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::new(self.path);
        config.families = self.platforms;
        config.os_filter = self.os;
        config.arch_filter = self.archs;
        config
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            selection,
            out,
            generator,
            jobs,
            verbose,
        } => {
            let mut config = selection.into_config();
            config.out_dir = out;
            config.generator = generator;
            config.jobs = jobs;
            config.verbose = verbose;
            run_build(config);
        }
        Commands::Plan { selection, json } => {
            run_plan(selection.into_config(), json);
        }
        Commands::Verify { path } => {
            run_verify(path);
        }
    }
}

fn run_build(config: OrchestratorConfig) -> ! {
    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("[xbuild] interrupt received, finishing running plans");
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install interrupt handler: {}", e);
    }

    let orchestrator = Orchestrator::new(config).with_interrupt_flag(interrupt);
    match orchestrator.run() {
        Ok(report) => {
            for plan in &report.plan_summaries {
                eprintln!("  {}", plan.human_summary);
            }
            eprintln!("{}", report.summary.human_summary);
            eprintln!("Records: {}", report.records_dir.display());
            process::exit(report.summary.exit_code);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code().as_i32());
        }
    }
}

fn run_plan(config: OrchestratorConfig, json: bool) -> ! {
    let orchestrator = Orchestrator::new(config);
    match orchestrator.plan() {
        Ok(planned) => {
            if json {
                match serde_json::to_string_pretty(&planned.doc) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing output: {}", e);
                        process::exit(ExitCode::Io.as_i32());
                    }
                }
            } else {
                println!("{}", planned.doc);
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code().as_i32());
        }
    }
}

fn run_verify(path: PathBuf) -> ! {
    let root = match BuildSpec::from_file(&path) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {}", e);
            let code = match &e {
                SpecError::Io { .. } => ExitCode::Io,
                _ => ExitCode::MalformedSpec,
            };
            process::exit(code.as_i32());
        }
    };

    // The closure can differ per target, so every declared (family,
    // os) pair is verified; an undeclared description verifies its
    // common closure against the host.
    let mut targets: Vec<(PlatformFamily, OsName)> = Vec::new();
    for (family, oses) in &root.platforms {
        for os in oses.keys() {
            targets.push((*family, *os));
        }
    }
    if targets.is_empty() {
        let family = PlatformFamily::host();
        let os = match family {
            PlatformFamily::Win32 => OsName::Windows,
            PlatformFamily::Linux => OsName::Linux,
            PlatformFamily::Darwin => OsName::Macos,
        };
        targets.push((family, os));
    }

    let mut lines = Vec::new();
    for (family, os) in &targets {
        match SpecArena::load(&path, *family, *os) {
            Ok(arena) => {
                lines.push(format!(
                    "  {}/{}: {} description{}",
                    family,
                    os,
                    arena.len(),
                    if arena.len() == 1 { "" } else { "s" }
                ));
                for &id in arena.build_order() {
                    lines.push(format!("    {}", arena.chain(id).join(" -> ")));
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                let code = match &e {
                    ComposeError::CyclicDependency { .. } => ExitCode::CyclicDependency,
                    ComposeError::Spec(SpecError::Io { .. }) => ExitCode::Io,
                    _ => ExitCode::MalformedSpec,
                };
                process::exit(code.as_i32());
            }
        }
    }

    println!(
        "OK: {} ({} target{})",
        root.project,
        targets.len(),
        if targets.len() == 1 { "" } else { "s" }
    );
    for line in lines {
        println!("{}", line);
    }
    process::exit(0);
}
