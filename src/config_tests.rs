use super::{config_stub, default_config, load_config, validate_config, PipelineConfig};
use crate::plan::StageName;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, contents.as_bytes()).expect("write config");
    (dir, path)
}

#[test]
fn stub_parses_back_to_defaults() {
    let stub = config_stub().expect("render stub");
    let parsed: PipelineConfig = serde_json::from_str(&stub).expect("parse stub");
    assert_eq!(parsed, default_config());
}

#[test]
fn partial_config_keeps_defaults_for_missing_fields() {
    let (_dir, path) = write_config(r#"{"schema_version": 1, "merge_author": "Survey Team"}"#);
    let config = load_config(&path).expect("load config");
    assert_eq!(config.merge_author.as_deref(), Some("Survey Team"));
    assert_eq!(config.final_extension, "gml");
    assert_eq!(config.decimate_angle_degrees, 25.0);
    assert_eq!(config.tools.get(StageName::Elevate).program(), "go");
}

#[test]
fn tool_command_accepts_a_shell_line_or_an_argv_array() {
    let (_dir, path) = write_config(
        r#"{
            "tools": {
                "decimate": "blender --background --python 'func/decimate/decimate.py' --",
                "elevate": ["/opt/tools/elevate"]
            }
        }"#,
    );
    let config = load_config(&path).expect("load config");
    let decimate = config.tools.get(StageName::Decimate);
    assert_eq!(decimate.program(), "blender");
    assert_eq!(
        decimate.leading_args(),
        ["--background", "--python", "func/decimate/decimate.py", "--"]
    );
    let elevate = config.tools.get(StageName::Elevate);
    assert_eq!(elevate.program(), "/opt/tools/elevate");
    assert!(elevate.leading_args().is_empty());
}

#[test]
fn empty_tool_command_is_rejected() {
    let (_dir, path) = write_config(r#"{"tools": {"translate": []}}"#);
    let err = load_config(&path).expect_err("empty argv must fail");
    assert!(format!("{err:#}").contains("must name a program"), "{err:#}");
}

#[test]
fn unknown_fields_are_rejected() {
    let (_dir, path) = write_config(r#"{"final_ext": "gml"}"#);
    assert!(load_config(&path).is_err());
}

#[test]
fn validation_rejects_bad_values() {
    let mut config = default_config();
    config.schema_version = 7;
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.extensions.mesh = ".obj".to_string();
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.decimate_angle_degrees = 0.0;
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.termination_grace_ms = 0;
    assert!(validate_config(&config).is_err());

    assert!(validate_config(&default_config()).is_ok());
}
