use anyhow::{Context, Result};
use clap::Parser;
use lod2_pipeline::batch::{missing_tools, EXIT_OK, EXIT_UNIT_FAILED};
use lod2_pipeline::cleanup::{clean_unit, unit_dirs, CleanupOutcome};
use lod2_pipeline::config::{config_stub, resolve_config};
use lod2_pipeline::locator::SkippedDir;
use lod2_pipeline::util::display_path;
use lod2_pipeline::{
    build_plan, locate, BatchController, BatchReport, CancelToken, Discovery, PipelineConfig,
    PipelineError, PlanSettings, TracingSink,
};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod signals;

use cli::{CleanArgs, Command, DataArgs, PlanArgs, RootArgs, RunArgs, ScanArgs, TargetArgs};

/// No qualifying work unit was found.
const EXIT_DISCOVERY_EMPTY: u8 = 3;
/// Invalid inputs or config, or a batch-fatal orchestrator fault.
const EXIT_FAULT: u8 = 4;

const LOG_ENV: &str = "LODPIPE_LOG";

/// JSON written by `run --report` / `run --json`.
#[derive(Serialize)]
struct RunReport<'a> {
    #[serde(flatten)]
    batch: &'a BatchReport,
    skipped: &'a [SkippedDir],
}

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match dispatch(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::DiscoveryEmpty) => EXIT_DISCOVERY_EMPTY,
        _ => EXIT_FAULT,
    }
}

fn dispatch(args: RootArgs) -> Result<u8> {
    match args.command {
        Command::Scan(scan) => {
            let config = resolve_config(args.config.as_deref())?;
            cmd_scan(&scan, &config)
        }
        Command::Plan(plan) => {
            let config = resolve_config(args.config.as_deref())?;
            cmd_plan(&plan, config)
        }
        Command::Run(run) => {
            let config = resolve_config(args.config.as_deref())?;
            cmd_run(&run, config)
        }
        Command::Clean(clean) => cmd_clean(&clean),
        Command::Config => {
            println!("{}", config_stub()?);
            Ok(EXIT_OK as u8)
        }
    }
}

fn discover(data: &DataArgs, config: &PipelineConfig) -> Result<Discovery> {
    let discovery = locate(&data.data, data.mode, &config.extensions)?;
    if discovery.units.is_empty() {
        return Err(empty_discovery(&data.data));
    }
    Ok(discovery)
}

fn empty_discovery(root: &Path) -> anyhow::Error {
    anyhow::Error::new(PipelineError::DiscoveryEmpty).context(format!("scan {}", root.display()))
}

fn settings_for(target: &TargetArgs, config: PipelineConfig) -> Result<PlanSettings> {
    PlanSettings::new(&target.dtm, &target.output, &target.work_root, config)
        .context("resolve dtm, output and work root paths")
}

fn cmd_scan(args: &ScanArgs, config: &PipelineConfig) -> Result<u8> {
    let discovery = locate(&args.data.data, args.data.mode, &config.extensions)?;
    if args.json {
        let text = serde_json::to_string_pretty(&discovery).context("serialize discovery")?;
        println!("{text}");
    } else {
        for unit in &discovery.units {
            println!("✓ {}", unit.name());
        }
        for skipped in &discovery.skipped {
            match &skipped.reason {
                Some(reason) => println!("✗ {} ({reason})", skipped.name),
                None => {
                    let missing: Vec<&str> =
                        skipped.missing.iter().map(|kind| kind.as_str()).collect();
                    println!("✗ {} (missing {})", skipped.name, missing.join(", "));
                }
            }
        }
    }
    if discovery.units.is_empty() {
        return Err(empty_discovery(&args.data.data));
    }
    Ok(EXIT_OK as u8)
}

fn cmd_plan(args: &PlanArgs, config: PipelineConfig) -> Result<u8> {
    let discovery = discover(&args.data, &config)?;
    let settings = settings_for(&args.target, config)?;
    let mut failed = false;
    for unit in &discovery.units {
        match build_plan(unit, &settings) {
            Ok(plan) => {
                println!("# {} (x={}, y={})", plan.unit, plan.offset.x, plan.offset.y);
                for stage in &plan.stages {
                    println!("{:<16} {}", stage.name.as_str(), stage.command.display_line());
                }
                println!(
                    "{:<16} {}",
                    "artifact",
                    display_path(&plan.final_artifact, Some(&settings.output_root))
                );
            }
            Err(err) => {
                failed = true;
                println!("# {}: {err}", unit.name());
            }
        }
    }
    let code = if failed { EXIT_UNIT_FAILED } else { EXIT_OK };
    Ok(code as u8)
}

fn cmd_run(args: &RunArgs, config: PipelineConfig) -> Result<u8> {
    let discovery = discover(&args.data, &config)?;
    for (stage, program) in missing_tools(&config) {
        tracing::warn!(stage = %stage, program = %program, "stage tool not found on PATH");
    }
    let cancel = CancelToken::new();
    signals::install(&cancel).context("install signal handlers")?;
    let controller = BatchController::from_config(&config, cancel);
    let settings = settings_for(&args.target, config)?;

    let report = controller.run(&discovery.units, &settings, &TracingSink)?;
    for result in &report.results {
        tracing::info!(unit = %result.unit, "{}", result.outcome);
    }
    if !report.not_started.is_empty() {
        tracing::warn!(units = ?report.not_started, "units not started");
    }

    let run_report = RunReport {
        batch: &report,
        skipped: &discovery.skipped,
    };
    let text = serde_json::to_string_pretty(&run_report).context("serialize batch report")?;
    if let Some(path) = &args.report {
        write_report(path, &text)?;
    }
    if args.json {
        println!("{text}");
    }
    Ok(u8::try_from(report.exit_code()).unwrap_or(EXIT_FAULT))
}

fn write_report(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create report dir {}", parent.display()))?;
    }
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn cmd_clean(args: &CleanArgs) -> Result<u8> {
    let units = if args.units.is_empty() {
        unit_dirs(&args.work_root)?
    } else {
        args.units.clone()
    };
    for unit in &units {
        match clean_unit(&args.work_root, unit)? {
            CleanupOutcome::Removed => println!("removed {unit}"),
            CleanupOutcome::Absent => println!("absent  {unit}"),
        }
    }
    Ok(EXIT_OK as u8)
}
