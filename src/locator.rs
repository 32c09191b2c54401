//! Work unit discovery.
//!
//! A directory qualifies when it holds at least one mesh, one footprint and
//! one coordinate file. When a kind has several candidates the
//! lexicographically first one is used and a warning is logged.
use crate::config::InputExtensions;
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DiscoveryMode {
    /// The root itself is the only candidate.
    Single,
    /// Every immediate subdirectory of the root is a candidate.
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Mesh,
    Footprint,
    Coordinates,
}

impl InputKind {
    pub const ALL: [InputKind; 3] = [InputKind::Mesh, InputKind::Footprint, InputKind::Coordinates];

    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Mesh => "mesh",
            InputKind::Footprint => "footprint",
            InputKind::Coordinates => "coordinates",
        }
    }

    fn extension<'a>(&self, extensions: &'a InputExtensions) -> &'a str {
        match self {
            InputKind::Mesh => &extensions.mesh,
            InputKind::Footprint => &extensions.footprint,
            InputKind::Coordinates => &extensions.coordinates,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One directory of input data. Only built with all three files present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    name: String,
    dir: PathBuf,
    mesh_file: PathBuf,
    footprint_file: PathBuf,
    coord_file: PathBuf,
}

impl WorkUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mesh_file(&self) -> &Path {
        &self.mesh_file
    }

    pub fn footprint_file(&self) -> &Path {
        &self.footprint_file
    }

    pub fn coord_file(&self) -> &Path {
        &self.coord_file
    }
}

/// A candidate directory that did not qualify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDir {
    pub name: String,
    pub path: PathBuf,
    pub missing: Vec<InputKind>,
    /// Set when the folder could not be inspected at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    pub units: Vec<WorkUnit>,
    pub skipped: Vec<SkippedDir>,
}

/// Scan `root` for work units, sorted by name.
pub fn locate(root: &Path, mode: DiscoveryMode, extensions: &InputExtensions) -> Result<Discovery> {
    if !root.is_dir() {
        return Err(PipelineError::InvalidInput(format!(
            "data folder {} does not exist or is not a directory",
            root.display()
        )));
    }
    let candidates = match mode {
        DiscoveryMode::Single => vec![root.to_path_buf()],
        DiscoveryMode::Batch => subdirectories(root)?,
    };

    let mut discovery = Discovery::default();
    for dir in candidates {
        let checked = unit_name(&dir).and_then(|name| {
            let found = qualify(&dir, &name, extensions)?;
            Ok((name, found))
        });
        match checked {
            Ok((_, Ok(unit))) => discovery.units.push(unit),
            Ok((name, Err(missing))) => {
                tracing::info!(
                    unit = %name,
                    missing = ?missing,
                    "skipping folder with missing inputs"
                );
                discovery.skipped.push(SkippedDir {
                    name,
                    path: dir,
                    missing,
                    reason: None,
                });
            }
            // One bad subfolder must not hide the others.
            Err(err) if mode == DiscoveryMode::Batch => {
                tracing::warn!(
                    path = %dir.display(),
                    error = %err,
                    "skipping unreadable folder"
                );
                discovery.skipped.push(SkippedDir {
                    name: lossy_name(&dir),
                    path: dir,
                    missing: Vec::new(),
                    reason: Some(err.to_string()),
                });
            }
            Err(err) => return Err(err),
        }
    }
    discovery.units.sort_by(|a, b| a.name().cmp(b.name()));
    discovery.skipped.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
    Ok(discovery)
}

/// True when `dir` has at least one file of every required kind.
pub fn qualifies(dir: &Path, extensions: &InputExtensions) -> Result<bool> {
    for kind in InputKind::ALL {
        if matching_files(dir, kind.extension(extensions))?.is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

fn qualify(
    dir: &Path,
    name: &str,
    extensions: &InputExtensions,
) -> Result<std::result::Result<WorkUnit, Vec<InputKind>>> {
    let mut picked = Vec::with_capacity(InputKind::ALL.len());
    let mut missing = Vec::new();
    for kind in InputKind::ALL {
        let matches = matching_files(dir, kind.extension(extensions))?;
        match matches.first() {
            Some(first) => {
                if matches.len() > 1 {
                    tracing::warn!(
                        unit = %name,
                        kind = %kind,
                        candidates = matches.len(),
                        using = %first.display(),
                        "multiple input files of one kind; using the first by name"
                    );
                }
                picked.push(first.clone());
            }
            None => missing.push(kind),
        }
    }
    if !missing.is_empty() {
        return Ok(Err(missing));
    }
    let [mesh_file, footprint_file, coord_file]: [PathBuf; 3] = picked
        .try_into()
        .map_err(|_| PipelineError::OrchestratorFault("input slot count mismatch".to_string()))?;
    Ok(Ok(WorkUnit {
        name: name.to_string(),
        dir: dir.to_path_buf(),
        mesh_file,
        footprint_file,
        coord_file,
    }))
}

/// Regular files directly in `dir` named `*.<ext>`, sorted.
fn matching_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for entry in read_dir(dir)? {
        let path = entry.path();
        let is_match = path.extension().is_some_and(|found| found == ext)
            && path.file_stem().is_some_and(|stem| !stem.is_empty());
        if is_match && path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

fn subdirectories(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = read_dir(root)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn read_dir(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let io_err = |source| PipelineError::Io {
        path: dir.to_path_buf(),
        source,
    };
    fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(io_err)
}

fn lossy_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

fn unit_name(dir: &Path) -> Result<String> {
    // `.` and `..` roots have no file name until resolved.
    let resolved = match dir.file_name() {
        Some(_) => dir.to_path_buf(),
        None => dir.canonicalize().map_err(|source| PipelineError::Io {
            path: dir.to_path_buf(),
            source,
        })?,
    };
    let name = resolved
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "{} has no UTF-8 directory name to use as unit name",
                dir.display()
            ))
        })?;
    Ok(name.to_string())
}
