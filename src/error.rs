//! Error types for the orchestrator.
//!
//! `PlanError` stays contained to one work unit; `PipelineError` is what the
//! batch surfaces to its caller.
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a single unit before any of its stages run.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("malformed coordinate file {path}: {reason}")]
    MalformedCoordinateFile { path: PathBuf, reason: String },

    #[error("cannot prepare directory {path}: {source}")]
    Layout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Batch-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no qualifying work units found")]
    DiscoveryEmpty,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("orchestrator fault: {0}")]
    OrchestratorFault(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
