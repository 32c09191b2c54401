//! Explicit removal of a unit's intermediate files.
//!
//! Never called by the executor. Removing a unit that is already gone is
//! reported as `Absent`, so calling it twice is harmless.
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed,
    Absent,
}

/// Remove `<workRoot>/<unit>` and everything below it.
pub fn clean_unit(work_root: &Path, unit: &str) -> Result<CleanupOutcome> {
    validate_unit_name(unit)?;
    let dir = work_root.join(unit);
    match fs::remove_dir_all(&dir) {
        Ok(()) => {
            tracing::info!(unit, path = %dir.display(), "removed working directory");
            Ok(CleanupOutcome::Removed)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(CleanupOutcome::Absent),
        Err(source) => Err(PipelineError::Io { path: dir, source }),
    }
}

/// Names of the unit directories currently under the work root, sorted.
pub fn unit_dirs(work_root: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(work_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PipelineError::Io {
                path: work_root.to_path_buf(),
                source,
            })
        }
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::Io {
            path: work_root.to_path_buf(),
            source,
        })?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// A unit name must be exactly one normal path component.
fn validate_unit_name(unit: &str) -> Result<()> {
    let mut components = Path::new(unit).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PipelineError::InvalidInput(format!(
            "{unit:?} is not a unit name"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_is_idempotent() {
        let root = tempfile::tempdir().expect("temp dir");
        fs::create_dir_all(root.path().join("A").join("separate")).expect("create");
        fs::write(root.path().join("A").join("separate").join("x.obj"), b"").expect("write");

        assert_eq!(clean_unit(root.path(), "A").expect("clean"), CleanupOutcome::Removed);
        assert!(!root.path().join("A").exists());
        assert_eq!(clean_unit(root.path(), "A").expect("clean again"), CleanupOutcome::Absent);
    }

    #[test]
    fn names_that_escape_the_work_root_are_rejected() {
        let root = tempfile::tempdir().expect("temp dir");
        for name in ["..", "", "A/B", "/etc", "."] {
            assert!(
                matches!(clean_unit(root.path(), name), Err(PipelineError::InvalidInput(_))),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn unit_dirs_lists_directories_only() {
        let root = tempfile::tempdir().expect("temp dir");
        fs::create_dir_all(root.path().join("B")).expect("B");
        fs::create_dir_all(root.path().join("A")).expect("A");
        fs::write(root.path().join("notes.txt"), b"").expect("file");
        assert_eq!(unit_dirs(root.path()).expect("list"), ["A", "B"]);
        assert!(unit_dirs(&root.path().join("missing")).expect("missing").is_empty());
    }
}
