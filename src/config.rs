//! Pipeline configuration helpers.
//!
//! This module loads, validates, and defaults the JSON config that names the
//! external stage tools and the constants bound into their arguments.
use crate::plan::StageName;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Default planar decimation angle handed to the decimate stage.
pub const DEFAULT_DECIMATE_ANGLE_DEGREES: f64 = 25.0;

/// Grace period between the termination request and the force-kill.
pub const DEFAULT_TERMINATION_GRACE_MS: u64 = 5_000;

const CONFIG_DIR_NAME: &str = "lodpipe";
const CONFIG_FILE_NAME: &str = "config.json";

/// Program plus fixed leading arguments for one stage tool.
///
/// Accepts either a JSON argv array or a single command line that is split
/// with shell quoting rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ToolSpec", into = "Vec<String>")]
pub struct ToolCommand {
    argv: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolSpec {
    Line(String),
    Argv(Vec<String>),
}

impl TryFrom<ToolSpec> for ToolCommand {
    type Error = String;

    fn try_from(spec: ToolSpec) -> std::result::Result<Self, Self::Error> {
        let argv = match spec {
            ToolSpec::Line(line) => shell_words::split(&line)
                .map_err(|err| format!("parse tool command {line:?}: {err}"))?,
            ToolSpec::Argv(argv) => argv,
        };
        ToolCommand::new(argv)
    }
}

impl From<ToolCommand> for Vec<String> {
    fn from(command: ToolCommand) -> Self {
        command.argv
    }
}

impl ToolCommand {
    pub fn new<I, S>(argv: I) -> std::result::Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        match argv.first() {
            Some(program) if !program.trim().is_empty() => Ok(Self { argv }),
            _ => Err("tool command must name a program".to_string()),
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments placed before the bound stage arguments.
    pub fn leading_args(&self) -> &[String] {
        &self.argv[1..]
    }
}

/// File extensions (without the dot) that qualify a work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputExtensions {
    pub mesh: String,
    pub footprint: String,
    pub coordinates: String,
}

impl Default for InputExtensions {
    fn default() -> Self {
        Self {
            mesh: "obj".to_string(),
            footprint: "geojson".to_string(),
            coordinates: "txt".to_string(),
        }
    }
}

/// One tool per pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageTools {
    pub separate: ToolCommand,
    pub decimate: ToolCommand,
    pub translate: ToolCommand,
    pub elevate: ToolCommand,
    pub semantic_split: ToolCommand,
    pub citygml_convert: ToolCommand,
    pub citygml_merge: ToolCommand,
}

impl StageTools {
    pub fn get(&self, stage: StageName) -> &ToolCommand {
        match stage {
            StageName::Separate => &self.separate,
            StageName::Decimate => &self.decimate,
            StageName::Translate => &self.translate,
            StageName::Elevate => &self.elevate,
            StageName::SemanticSplit => &self.semantic_split,
            StageName::CitygmlConvert => &self.citygml_convert,
            StageName::CitygmlMerge => &self.citygml_merge,
        }
    }

    pub fn set(&mut self, stage: StageName, command: ToolCommand) {
        match stage {
            StageName::Separate => self.separate = command,
            StageName::Decimate => self.decimate = command,
            StageName::Translate => self.translate = command,
            StageName::Elevate => self.elevate = command,
            StageName::SemanticSplit => self.semantic_split = command,
            StageName::CitygmlConvert => self.citygml_convert = command,
            StageName::CitygmlMerge => self.citygml_merge = command,
        }
    }
}

impl Default for StageTools {
    fn default() -> Self {
        fn go_run(source: &str) -> ToolCommand {
            ToolCommand {
                argv: vec!["go".to_string(), "run".to_string(), source.to_string()],
            }
        }
        Self {
            separate: go_run("func/separator/objseparator.go"),
            decimate: ToolCommand {
                argv: vec![
                    "python".to_string(),
                    "func/decimate/decimate.py".to_string(),
                ],
            },
            translate: go_run("func/translate/translate.go"),
            elevate: go_run("func/elevate/elevate.go"),
            semantic_split: go_run("func/semantic/semantic-mapping.go"),
            citygml_convert: go_run("func/building-lod2/to-citygml-lod2.go"),
            citygml_merge: go_run("func/merge-citygml/merge-building-lod2.go"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub schema_version: u32,
    pub extensions: InputExtensions,
    /// Extension of the merged artifact written under the output root.
    pub final_extension: String,
    pub decimate_angle_degrees: f64,
    pub tools: StageTools,
    /// Working directory for every stage process; inherits ours when unset.
    pub tools_dir: Option<PathBuf>,
    pub termination_grace_ms: u64,
    pub merge_author: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        default_config()
    }
}

/// Build the config used when no file is given.
pub fn default_config() -> PipelineConfig {
    PipelineConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        extensions: InputExtensions::default(),
        final_extension: "gml".to_string(),
        decimate_angle_degrees: DEFAULT_DECIMATE_ANGLE_DEGREES,
        tools: StageTools::default(),
        tools_dir: None,
        termination_grace_ms: DEFAULT_TERMINATION_GRACE_MS,
        merge_author: None,
    }
}

/// Render the default config as pretty JSON.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig =
        serde_json::from_slice(&bytes).context("parse pipeline config JSON")?;
    validate_config(&config)?;
    Ok(config)
}

/// Pick the explicit config, then the per-user one, then the defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    if let Some(path) = user_config_path().filter(|path| path.is_file()) {
        tracing::debug!(path = %path.display(), "using user config");
        return load_config(&path);
    }
    Ok(default_config())
}

/// `<config dir>/lodpipe/config.json`, when the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported pipeline config schema_version {}",
            config.schema_version
        ));
    }
    let extensions = [
        ("extensions.mesh", &config.extensions.mesh),
        ("extensions.footprint", &config.extensions.footprint),
        ("extensions.coordinates", &config.extensions.coordinates),
        ("final_extension", &config.final_extension),
    ];
    for (label, ext) in extensions {
        validate_extension(ext, label)?;
    }
    if !config.decimate_angle_degrees.is_finite() || config.decimate_angle_degrees <= 0.0 {
        return Err(anyhow!(
            "decimate_angle_degrees must be a positive number (got {})",
            config.decimate_angle_degrees
        ));
    }
    if config.termination_grace_ms == 0 {
        return Err(anyhow!("termination_grace_ms must be greater than zero"));
    }
    Ok(())
}

fn validate_extension(ext: &str, label: &str) -> Result<()> {
    if ext.trim().is_empty() {
        return Err(anyhow!("{label} must be non-empty"));
    }
    if ext.starts_with('.') || ext.contains(['/', '\\', '*']) {
        return Err(anyhow!(
            "{label} must be a bare extension like \"obj\" (got {ext:?})"
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
