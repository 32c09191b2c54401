//! CLI argument parsing for the conversion orchestrator.
use clap::{Args, Parser, Subcommand};
use lod2_pipeline::DiscoveryMode;
use std::path::PathBuf;

/// Default scratch directory for per-unit intermediates.
pub const DEFAULT_WORK_ROOT: &str = "temp";

#[derive(Parser, Debug)]
#[command(
    name = "lodpipe",
    version,
    about = "Run the mesh to CityGML LOD2 conversion stages over folders of tiles",
    after_help = "Examples:\n  lodpipe scan --data ./tiles --mode batch\n  lodpipe plan --data ./tiles/AG_09_C --dtm ./dtm.tif --output ./out\n  lodpipe run --data ./tiles --mode batch --dtm ./dtm.tif --output ./out --report out/report.json\n  lodpipe clean --work-root temp AG_09_C\n  lodpipe config > lodpipe.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Pipeline config JSON (defaults to the per-user config, then built-ins)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log debug detail, including every bound stage command
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Scan(ScanArgs),
    Plan(PlanArgs),
    Run(RunArgs),
    Clean(CleanArgs),
    /// Print the default pipeline config as JSON
    Config,
}

/// Where to look for work units.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Folder holding one unit (single mode) or one unit per subfolder (batch mode)
    #[arg(long, value_name = "DIR")]
    pub data: PathBuf,

    /// Treat the data folder as one unit or as a parent of many
    #[arg(long, value_enum, default_value = "single")]
    pub mode: DiscoveryMode,
}

/// Inputs shared by every unit in a run.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Terrain model (GeoTIFF) used by the elevation stage
    #[arg(long, value_name = "FILE")]
    pub dtm: PathBuf,

    /// Root for final artifacts; each unit writes <output>/<unit>/<unit>.gml
    #[arg(long, value_name = "DIR")]
    pub output: PathBuf,

    /// Root for per-unit intermediate directories
    #[arg(long, value_name = "DIR", default_value = DEFAULT_WORK_ROOT)]
    pub work_root: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "List qualifying and skipped folders")]
pub struct ScanArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Build plans and print the bound stage commands without running them")]
pub struct PlanArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Run every stage for every qualifying unit")]
pub struct RunArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Write the batch report JSON to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Print the batch report JSON to stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Remove per-unit intermediate directories")]
pub struct CleanArgs {
    /// Root for per-unit intermediate directories
    #[arg(long, value_name = "DIR", default_value = DEFAULT_WORK_ROOT)]
    pub work_root: PathBuf,

    /// Units to clean; every unit under the work root when omitted
    #[arg(value_name = "UNIT")]
    pub units: Vec<String>,
}
