//! Stage and unit outcomes recorded in events and the batch report.
use crate::plan::StageName;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    /// Non-zero exit. A signal death is reported as `128 + signal`.
    StageFailed { code: i32 },
    LaunchFailed { cause: String },
    Cancelled,
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Success => f.write_str("success"),
            StageOutcome::StageFailed { code } => write!(f, "exit code {code}"),
            StageOutcome::LaunchFailed { cause } => write!(f, "launch failed: {cause}"),
            StageOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitOutcome {
    Completed { artifact: PathBuf },
    StageFailed { stage: StageName, code: i32 },
    LaunchFailed { stage: StageName, cause: String },
    /// `stage` is the stage that was interrupted, if one was running.
    Cancelled { stage: Option<StageName> },
    MalformedCoordinateFile { reason: String },
    /// The unit's working or output directories could not be prepared.
    LayoutFailed { reason: String },
}

impl UnitOutcome {
    /// Unit result for a stage that did not succeed.
    pub fn from_stage(stage: StageName, outcome: StageOutcome, artifact: PathBuf) -> Self {
        match outcome {
            StageOutcome::Success => UnitOutcome::Completed { artifact },
            StageOutcome::StageFailed { code } => UnitOutcome::StageFailed { stage, code },
            StageOutcome::LaunchFailed { cause } => UnitOutcome::LaunchFailed { stage, cause },
            StageOutcome::Cancelled => UnitOutcome::Cancelled { stage: Some(stage) },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, UnitOutcome::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UnitOutcome::Cancelled { .. })
    }

    /// Neither completed nor cancelled.
    pub fn is_failure(&self) -> bool {
        !self.is_completed() && !self.is_cancelled()
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Completed { artifact } => write!(f, "completed: {}", artifact.display()),
            UnitOutcome::StageFailed { stage, code } => {
                write!(f, "stage {stage} failed with exit code {code}")
            }
            UnitOutcome::LaunchFailed { stage, cause } => {
                write!(f, "stage {stage} could not be launched: {cause}")
            }
            UnitOutcome::Cancelled { stage: Some(stage) } => {
                write!(f, "cancelled during stage {stage}")
            }
            UnitOutcome::Cancelled { stage: None } => f.write_str("cancelled"),
            UnitOutcome::MalformedCoordinateFile { reason } => {
                write!(f, "malformed coordinate file: {reason}")
            }
            UnitOutcome::LayoutFailed { reason } => write!(f, "layout failed: {reason}"),
        }
    }
}
