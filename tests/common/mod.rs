//! Shared fixture for integration tests.
//!
//! Every stage tool is the same `sh` script with the stage name as its first
//! argument. The script records each call, prints one stdout and one stderr
//! line, and writes the merged artifact when it plays the merge stage.
#![allow(dead_code)]

use lod2_pipeline::config::ToolCommand;
use lod2_pipeline::{PipelineConfig, PlanSettings, StageName};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const DEFAULT_COORDS: &str = "100.5\n200.25\n";

/// How the fake stage tool should misbehave.
#[derive(Debug, Default, Clone)]
pub struct FakeTool {
    /// `(unit, stage, code)`: exit with `code` when running `stage` for `unit`.
    pub fail: Option<(String, StageName, i32)>,
    /// `(unit, stage)`: sleep for a long time instead of finishing.
    pub hang: Option<(String, StageName)>,
    /// Ignore SIGTERM while hanging.
    pub ignore_term: bool,
}

impl FakeTool {
    pub fn failing(unit: &str, stage: StageName, code: i32) -> Self {
        Self {
            fail: Some((unit.to_string(), stage, code)),
            ..Self::default()
        }
    }

    pub fn hanging(unit: &str, stage: StageName) -> Self {
        Self {
            hang: Some((unit.to_string(), stage)),
            ..Self::default()
        }
    }

    pub fn hanging_through_term(unit: &str, stage: StageName) -> Self {
        Self {
            ignore_term: true,
            ..Self::hanging(unit, stage)
        }
    }
}

/// One recorded tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub stage: String,
    pub args: String,
}

impl ToolCall {
    pub fn is_for(&self, unit: &str) -> bool {
        self.args.contains(&format!("/{unit}/")) || self.args.ends_with(&format!("/{unit}"))
    }
}

/// A temp directory laid out as data, output and work roots plus a DTM.
pub struct Workspace {
    _temp: TempDir,
    pub root: PathBuf,
    pub data: PathBuf,
    pub output: PathBuf,
    pub work: PathBuf,
    pub dtm: PathBuf,
    log: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let root = temp.path().to_path_buf();
        let data = root.join("data");
        fs::create_dir_all(&data).expect("create data dir");
        let dtm = root.join("dtm.tif");
        fs::write(&dtm, b"II*\0").expect("write dtm");
        Self {
            output: root.join("out"),
            work: root.join("temp"),
            log: root.join("calls.log"),
            data,
            dtm,
            root,
            _temp: temp,
        }
    }

    /// A qualifying unit folder with the default coordinates.
    pub fn add_unit(&self, name: &str) -> PathBuf {
        self.add_unit_with_coords(name, DEFAULT_COORDS)
    }

    pub fn add_unit_with_coords(&self, name: &str, coords: &str) -> PathBuf {
        let dir = self.data.join(name);
        fs::create_dir_all(&dir).expect("create unit dir");
        fs::write(dir.join(format!("{name}.obj")), b"v 0 0 0\n").expect("write mesh");
        fs::write(
            dir.join(format!("{name}.geojson")),
            br#"{"type":"FeatureCollection","features":[]}"#,
        )
        .expect("write footprint");
        fs::write(dir.join(format!("{name}.txt")), coords).expect("write coords");
        dir
    }

    /// A folder holding only the given extensions.
    pub fn add_partial_unit(&self, name: &str, extensions: &[&str]) -> PathBuf {
        let dir = self.data.join(name);
        fs::create_dir_all(&dir).expect("create unit dir");
        for ext in extensions {
            fs::write(dir.join(format!("{name}.{ext}")), b"").expect("write input");
        }
        dir
    }

    /// Config whose every stage runs the fake tool.
    pub fn config(&self, behaviour: &FakeTool) -> PipelineConfig {
        let script = self.write_script(behaviour);
        let mut config = PipelineConfig::default();
        for stage in StageName::ORDER {
            let tool = ToolCommand::new([
                "sh".to_string(),
                script.display().to_string(),
                stage.as_str().to_string(),
            ])
            .expect("tool command");
            config.tools.set(stage, tool);
        }
        config.termination_grace_ms = 500;
        config
    }

    pub fn settings(&self, config: PipelineConfig) -> PlanSettings {
        PlanSettings::new(&self.dtm, &self.output, &self.work, config).expect("plan settings")
    }

    /// Write `config` as JSON next to the data and return its path.
    pub fn write_config(&self, config: &PipelineConfig) -> PathBuf {
        let path = self.root.join("lodpipe.json");
        let text = serde_json::to_string_pretty(config).expect("serialize config");
        fs::write(&path, text).expect("write config");
        path
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        let Ok(text) = fs::read_to_string(&self.log) else {
            return Vec::new();
        };
        text.lines()
            .filter_map(|line| line.split_once('|'))
            .map(|(stage, args)| ToolCall {
                stage: stage.to_string(),
                args: args.to_string(),
            })
            .collect()
    }

    /// Stage names invoked for `unit`, in call order.
    pub fn stages_for(&self, unit: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.is_for(unit))
            .map(|call| call.stage)
            .collect()
    }

    pub fn artifact(&self, unit: &str) -> PathBuf {
        self.output.join(unit).join(format!("{unit}.gml"))
    }

    fn write_script(&self, behaviour: &FakeTool) -> PathBuf {
        let (fail_stage, fail_unit, fail_code) = match &behaviour.fail {
            Some((unit, stage, code)) => (stage.as_str(), unit.as_str(), *code),
            None => ("none", "none", 0),
        };
        let (hang_stage, hang_unit) = match &behaviour.hang {
            Some((unit, stage)) => (stage.as_str(), unit.as_str()),
            None => ("none", "none"),
        };
        let trap = if behaviour.ignore_term {
            "trap '' TERM"
        } else {
            ""
        };
        let script = format!(
            r#"stage="$1"
shift
printf '%s|%s\n' "$stage" "$*" >> '{log}'
echo "running $stage"
echo "warning from $stage" >&2
case "$stage|$*" in
  '{fail_stage}|'*'/{fail_unit}/'*) exit {fail_code} ;;
esac
case "$stage|$*" in
  '{hang_stage}|'*'/{hang_unit}/'*) {trap}
    sleep 30 ;;
esac
if [ "$stage" = citygml-merge ]; then
  while [ $# -gt 0 ]; do
    if [ "$1" = --output ]; then printf '<CityModel/>\n' > "$2"; fi
    shift
  done
fi
exit 0
"#,
            log = self.log.display(),
        );
        let path = self.root.join("fake-tool.sh");
        fs::write(&path, script).expect("write fake tool");
        path
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
}
