/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for Syn-Patch-Core. Reduces vulnerability
    update manifests into zypper patch plans, resolves tooling
    images, and verifies post-install manifests.

  Security / Safety Notes:
    Operates within user privileges. Reads operator-supplied
    files and writes plans to operator-controlled paths only;
    no commands are executed.

  Dependencies:
    clap for CLI parsing, chrono for timestamps.

  Operational Scope:
    Invoked by image patch pipelines that own a build engine
    and need a validated plan or a post-run verdict.

  Revision History:
    2025-11-12 COD  Authored Syn-Patch Core runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};

use synpatch_core::config::SynpatchConfig;
use synpatch_core::error::{PatchError, Result};
use synpatch_core::logger::{LogLevel, Logger};
use synpatch_core::plan::{build_plan, PlanLayout, UpdatePlan};
use synpatch_core::tooling::ToolingSelector;
use synpatch_core::updates::{load_update_manifest, reduce_updates};
use synpatch_core::validate::validate_package_versions;
use synpatch_core::version::VersionComparer;

/// Command-line arguments for Syn-Patch-Core.
#[derive(Debug, Parser)]
#[command(
    name = "Syn-Patch-Core",
    version,
    author = "Synavera Systems",
    about = "Minimal RPM patch planner for container images"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, global = true, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Enable verbose logging to stderr.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reduce an update manifest and emit the zypper patch plan.
    Plan {
        /// Update manifest (JSON).
        #[arg(long, value_name = "PATH")]
        manifest: PathBuf,
        /// Skip packages with malformed versions instead of failing.
        #[arg(long, action = ArgAction::SetTrue)]
        ignore_errors: bool,
        /// Write the plan here instead of stdout.
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Write the plan into the configured plan directory.
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "output")]
        save: bool,
    },
    /// Check an installed-package manifest against the requested updates.
    Validate {
        /// Update manifest (JSON).
        #[arg(long, value_name = "PATH")]
        manifest: PathBuf,
        /// `name<TAB>version-release<TAB>arch` file produced by a plan run.
        #[arg(long, value_name = "PATH")]
        installed: PathBuf,
        /// Report shortfalls as data instead of failing.
        #[arg(long, action = ArgAction::SetTrue)]
        ignore_errors: bool,
    },
    /// Print the tooling image for a distribution.
    Tooling {
        #[arg(long, value_name = "TYPE")]
        os_type: String,
        #[arg(long, value_name = "VERSION")]
        os_version: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[Syn-Patch-Core] {}", err);
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = SynpatchConfig::load_from_optional_path(cli.config.as_deref())?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .or_else(|| Some(config.log_dir().join(format!("core_{session_stamp}.log"))));
    let logger = Logger::new(log_path, cli.verbose)?;
    logger.info("INIT", "Syn-Patch Core awakening.");

    let code = match cli.command {
        Command::Plan {
            manifest,
            ignore_errors,
            output,
            save,
        } => {
            let output = if save {
                Some(
                    config
                        .plan_dir()
                        .join(format!("plan_{session_stamp}.json")),
                )
            } else {
                output
            };
            run_plan(
                &config,
                &logger,
                &manifest,
                ignore_errors,
                output.as_deref(),
            )?
        }
        Command::Validate {
            manifest,
            installed,
            ignore_errors,
        } => run_validate(&logger, &manifest, &installed, ignore_errors)?,
        Command::Tooling {
            os_type,
            os_version,
        } => {
            let selector = ToolingSelector::new(config.tooling.clone());
            println!("{}", selector.select(&os_type, &os_version, &logger));
            ExitCode::SUCCESS
        }
    };

    logger.info("COMPLETE", "Patch session settled.");
    logger.finalize()?;
    Ok(code)
}

fn run_plan(
    config: &SynpatchConfig,
    logger: &Logger,
    manifest_path: &Path,
    ignore_errors: bool,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let manifest = load_update_manifest(manifest_path)?;
    let updates = reduce_updates(
        &manifest.updates,
        &VersionComparer::rpm(),
        ignore_errors,
        logger,
    )?;
    logger.info(
        "UPDATES",
        format!(
            "Requested={} unique={} skipped={}",
            manifest.updates.len(),
            updates.len(),
            updates.skipped().len()
        ),
    );
    if updates.is_empty() {
        logger.log(
            LogLevel::Warn,
            "EMPTY",
            "No update packages were specified to apply",
        );
        return Ok(ExitCode::SUCCESS);
    }

    let selector = ToolingSelector::new(config.tooling.clone());
    let tooling_image = selector.select(
        &manifest.metadata.os.os_type,
        &manifest.metadata.os.version,
        logger,
    );
    let layout = PlanLayout::from(&config.layout);
    let plan = build_plan(&updates, &tooling_image, &layout, &config.proxy.bindings())?;

    match output {
        Some(path) => {
            write_plan(&plan, path)?;
            logger.info("PLAN", format!("Plan written to {}", path.display()));
        }
        None => {
            let rendered = serde_json::to_string_pretty(&plan).map_err(|err| {
                PatchError::Serialization(format!("Failed to render plan: {err}"))
            })?;
            writeln!(io::stdout().lock(), "{rendered}")?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_validate(
    logger: &Logger,
    manifest_path: &Path,
    installed_path: &Path,
    ignore_errors: bool,
) -> Result<ExitCode> {
    let manifest = load_update_manifest(manifest_path)?;
    let comparer = VersionComparer::rpm();
    let updates = reduce_updates(&manifest.updates, &comparer, ignore_errors, logger)?;
    let installed = std::fs::read(installed_path).map_err(|err| PatchError::ExtractionFailure {
        path: installed_path.display().to_string(),
        reason: err.to_string(),
    })?;

    let failed =
        validate_package_versions(&updates, &comparer, &installed, ignore_errors, logger)?;
    if failed.is_empty() {
        println!(
            "→ All {} requested packages at or above fixed versions.",
            updates.len()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let mut stdout = io::stdout().lock();
    for name in &failed {
        writeln!(stdout, "{name}")?;
    }
    logger.error(
        "SHORTFALL",
        format!("{} packages below requested version", failed.len()),
    );
    Ok(ExitCode::from(2))
}

fn write_plan(plan: &UpdatePlan, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            PatchError::Filesystem(format!(
                "Failed to create plan directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    let file = File::create(path).map_err(|err| {
        PatchError::Filesystem(format!("Failed to create plan file {}: {err}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, plan).map_err(|err| {
        PatchError::Filesystem(format!("Failed to write plan {}: {err}", path.display()))
    })?;
    Ok(())
}
