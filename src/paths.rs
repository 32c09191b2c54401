//! Typed paths into a unit's working and output layout.
//!
//! Every path a stage reads or writes is derived here so two units can never
//! share a directory.
use std::path::{Path, PathBuf};

/// Path helper for one unit, namespaced by the unit name.
#[derive(Debug, Clone)]
pub struct UnitPaths {
    work_root: PathBuf,
    output_root: PathBuf,
    unit: String,
}

impl UnitPaths {
    pub fn new(work_root: &Path, output_root: &Path, unit: &str) -> Self {
        Self {
            work_root: work_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            unit: unit.to_string(),
        }
    }

    /// Return `<workRoot>/<unit>`.
    pub fn unit_work_dir(&self) -> PathBuf {
        self.work_root.join(&self.unit)
    }

    /// Return the `separate/` directory path.
    pub fn separate_dir(&self) -> PathBuf {
        self.unit_work_dir().join("separate")
    }

    /// Return the `decimate/` directory path.
    pub fn decimate_dir(&self) -> PathBuf {
        self.unit_work_dir().join("decimate")
    }

    /// Return the `translate/` directory path.
    pub fn translate_dir(&self) -> PathBuf {
        self.unit_work_dir().join("translate")
    }

    /// Return the `elevate/` directory path.
    pub fn elevate_dir(&self) -> PathBuf {
        self.unit_work_dir().join("elevate")
    }

    /// Return the `split/` directory path for semantic mapping output.
    pub fn split_dir(&self) -> PathBuf {
        self.unit_work_dir().join("split")
    }

    /// Return the `citygml/` directory path holding the pre-merge files.
    pub fn citygml_dir(&self) -> PathBuf {
        self.unit_work_dir().join("citygml")
    }

    /// All intermediate directories in stage order.
    pub fn stage_dirs(&self) -> [PathBuf; 6] {
        [
            self.separate_dir(),
            self.decimate_dir(),
            self.translate_dir(),
            self.elevate_dir(),
            self.split_dir(),
            self.citygml_dir(),
        ]
    }

    /// Return `<outputRoot>/<unit>`.
    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(&self.unit)
    }

    /// Return `<outputRoot>/<unit>/<unit>.<ext>`.
    pub fn final_artifact(&self, extension: &str) -> PathBuf {
        self.output_dir().join(format!("{}.{extension}", self.unit))
    }
}
