//! Execution plan construction.
//!
//! A plan is the fully bound list of stage invocations for one unit plus the
//! directories they use. Building one never starts a process and never
//! deletes anything; it only reads the coordinate file and makes sure the
//! directories exist.
use crate::config::PipelineConfig;
use crate::coords::{read_offset, CoordinateOffset};
use crate::error::PlanError;
use crate::locator::WorkUnit;
use crate::paths::UnitPaths;
use crate::util::format_command_line;
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    Separate,
    Decimate,
    Translate,
    Elevate,
    SemanticSplit,
    CitygmlConvert,
    CitygmlMerge,
}

impl StageName {
    pub const ORDER: [StageName; 7] = [
        StageName::Separate,
        StageName::Decimate,
        StageName::Translate,
        StageName::Elevate,
        StageName::SemanticSplit,
        StageName::CitygmlConvert,
        StageName::CitygmlMerge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Separate => "separate",
            StageName::Decimate => "decimate",
            StageName::Translate => "translate",
            StageName::Elevate => "elevate",
            StageName::SemanticSplit => "semantic-split",
            StageName::CitygmlConvert => "citygml-convert",
            StageName::CitygmlMerge => "citygml-merge",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program and explicit argument list; nothing is ever passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl StageCommand {
    /// Quoted, copy-pasteable rendering for logs and dry runs.
    pub fn display_line(&self) -> String {
        format_command_line(&self.program, &self.args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: StageName,
    pub command: StageCommand,
    pub input_dir: PathBuf,
    /// Stage output directory, or the final artifact file for the merge stage.
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub unit: String,
    pub offset: CoordinateOffset,
    pub work_dir: PathBuf,
    pub final_artifact: PathBuf,
    pub stages: Vec<StageDescriptor>,
}

/// Batch-wide inputs shared by every unit's plan.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub dtm: PathBuf,
    pub output_root: PathBuf,
    pub work_root: PathBuf,
    pub config: PipelineConfig,
}

impl PlanSettings {
    /// Paths are made absolute so stages launched in `tools_dir` see the
    /// same files we do.
    pub fn new(
        dtm: &Path,
        output_root: &Path,
        work_root: &Path,
        config: PipelineConfig,
    ) -> std::io::Result<Self> {
        Ok(Self {
            dtm: std::path::absolute(dtm)?,
            output_root: std::path::absolute(output_root)?,
            work_root: std::path::absolute(work_root)?,
            config,
        })
    }
}

pub fn build_plan(unit: &WorkUnit, settings: &PlanSettings) -> Result<ExecutionPlan, PlanError> {
    let offset = read_offset(unit.coord_file())?;
    let paths = UnitPaths::new(&settings.work_root, &settings.output_root, unit.name());
    let config = &settings.config;

    for dir in paths.stage_dirs() {
        create_dir(&dir)?;
    }
    create_dir(&paths.output_dir())?;
    let final_artifact = paths.final_artifact(&config.final_extension);

    let mesh = absolute(unit.mesh_file())?;
    let footprint = absolute(unit.footprint_file())?;
    let x = format_coordinate(offset.x);
    let y = format_coordinate(offset.y);
    let z = format_coordinate(CoordinateOffset::Z);

    let mut merge_args: Vec<OsString> = vec![
        "--input".into(),
        paths.citygml_dir().into_os_string(),
        "--output".into(),
        final_artifact.clone().into_os_string(),
        "--name".into(),
        unit.name().into(),
    ];
    if let Some(author) = config.merge_author.as_deref() {
        merge_args.push("--author".into());
        merge_args.push(author.into());
    }

    let bindings: [(StageName, PathBuf, PathBuf, Vec<OsString>); 7] = [
        (
            StageName::Separate,
            unit.dir().to_path_buf(),
            paths.separate_dir(),
            vec![
                format!("-cx={x}").into(),
                format!("-cy={y}").into(),
                mesh.into_os_string(),
                footprint.clone().into_os_string(),
                paths.separate_dir().into_os_string(),
            ],
        ),
        (
            StageName::Decimate,
            paths.separate_dir(),
            paths.decimate_dir(),
            vec![
                "-i".into(),
                paths.separate_dir().into_os_string(),
                "-o".into(),
                paths.decimate_dir().into_os_string(),
                "-a".into(),
                format_coordinate(config.decimate_angle_degrees).into(),
            ],
        ),
        (
            StageName::Translate,
            paths.decimate_dir(),
            paths.translate_dir(),
            vec![
                flag_value("-input=", paths.decimate_dir()),
                flag_value("-output=", paths.translate_dir()),
                format!("-tx={x}").into(),
                format!("-ty={y}").into(),
                format!("-tz={z}").into(),
            ],
        ),
        (
            StageName::Elevate,
            paths.translate_dir(),
            paths.elevate_dir(),
            vec![
                "--input".into(),
                paths.translate_dir().into_os_string(),
                "--output".into(),
                paths.elevate_dir().into_os_string(),
                "--dtm".into(),
                settings.dtm.clone().into_os_string(),
            ],
        ),
        (
            StageName::SemanticSplit,
            paths.elevate_dir(),
            paths.split_dir(),
            vec![
                "--obj-dir".into(),
                paths.elevate_dir().into_os_string(),
                "--geojson".into(),
                footprint.into_os_string(),
                "--output".into(),
                paths.split_dir().into_os_string(),
            ],
        ),
        (
            StageName::CitygmlConvert,
            paths.split_dir(),
            paths.citygml_dir(),
            vec![
                "-input".into(),
                paths.split_dir().into_os_string(),
                "-output".into(),
                paths.citygml_dir().into_os_string(),
            ],
        ),
        (
            StageName::CitygmlMerge,
            paths.citygml_dir(),
            final_artifact.clone(),
            merge_args,
        ),
    ];

    let stages = bindings
        .into_iter()
        .map(|(name, input_dir, output, bound)| {
            let tool = config.tools.get(name);
            let mut args: Vec<OsString> = tool.leading_args().iter().map(OsString::from).collect();
            args.extend(bound);
            StageDescriptor {
                name,
                command: StageCommand {
                    program: tool.program().into(),
                    args,
                    current_dir: config.tools_dir.clone(),
                },
                input_dir,
                output,
            }
        })
        .collect();

    Ok(ExecutionPlan {
        unit: unit.name().to_string(),
        offset,
        work_dir: paths.unit_work_dir(),
        final_artifact,
        stages,
    })
}

/// Shortest decimal that round-trips, e.g. `12345.6` or `25`.
fn format_coordinate(value: f64) -> String {
    format!("{value}")
}

fn flag_value(flag: &str, value: PathBuf) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(value.as_os_str());
    arg
}

fn absolute(path: &Path) -> Result<PathBuf, PlanError> {
    std::path::absolute(path).map_err(|source| PlanError::Layout {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(dir: &Path) -> Result<(), PlanError> {
    fs::create_dir_all(dir).map_err(|source| PlanError::Layout {
        path: dir.to_path_buf(),
        source,
    })
}

/// Remove whatever a previous run left and recreate the directory empty.
fn reset_dir(dir: &Path) -> Result<(), PlanError> {
    let layout_err = |source| PlanError::Layout {
        path: dir.to_path_buf(),
        source,
    };
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(layout_err(err)),
    }
    fs::create_dir_all(dir).map_err(layout_err)
}

fn remove_stale_file(path: &Path) -> Result<(), PlanError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PlanError::Layout {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl ExecutionPlan {
    pub fn stage(&self, name: StageName) -> Option<&StageDescriptor> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Empty every stage output directory and delete the final artifact, so
    /// a run never sees files from an earlier one. Called right before the
    /// first stage starts; building a plan leaves existing outputs alone.
    pub fn clear_previous_outputs(&self) -> Result<(), PlanError> {
        for stage in &self.stages {
            if stage.output == self.final_artifact {
                remove_stale_file(&stage.output)?;
            } else {
                reset_dir(&stage.output)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
