//! Batch controller: drives the executor over every discovered unit.
//!
//! Units run one at a time in discovery order. A unit's failure is recorded
//! and the batch moves on; only a fault in the orchestrator itself (an
//! unusable output root, say) ends the batch early with `RunState::Failed`.
use crate::cancel::{CancelToken, ControlHandle, RunState, RunStateCell};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::executor::PipelineExecutor;
use crate::locator::WorkUnit;
use crate::outcome::UnitOutcome;
use crate::plan::{PlanSettings, StageName};
use crate::runner::StageRunner;
use crate::sink::{LogSink, PipelineEvent};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// All units completed.
pub const EXIT_OK: i32 = 0;
/// At least one unit failed.
pub const EXIT_UNIT_FAILED: i32 = 1;
/// The batch was stopped before every unit ran to completion.
pub const EXIT_CANCELLED: i32 = 130;

const WRITE_CHECK_NAME: &str = ".lodpipe-write-check";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitResult {
    pub unit: String,
    pub outcome: UnitOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub state: RunState,
    pub cancelled: bool,
    /// Outcomes of every unit that started, in run order.
    pub results: Vec<UnitResult>,
    /// Units left untouched because cancellation came first.
    pub not_started: Vec<String>,
}

impl BatchReport {
    pub fn outcome(&self, unit: &str) -> Option<&UnitOutcome> {
        self.results
            .iter()
            .find(|result| result.unit == unit)
            .map(|result| &result.outcome)
    }

    pub fn completed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome.is_completed())
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome.is_failure())
            .count()
    }

    /// Process exit code for the CLI. Cancellation wins over unit failures.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            EXIT_CANCELLED
        } else if self.failed_count() > 0 {
            EXIT_UNIT_FAILED
        } else {
            EXIT_OK
        }
    }
}

/// One per orchestration session; owns the run state and the cancel flag.
#[derive(Debug)]
pub struct BatchController {
    state: RunStateCell,
    cancel: CancelToken,
    executor: PipelineExecutor,
}

impl BatchController {
    pub fn new(grace: Duration) -> Self {
        Self::with_cancel(grace, CancelToken::new())
    }

    /// Share an existing flag, e.g. one raised by a signal handler.
    pub fn with_cancel(grace: Duration, cancel: CancelToken) -> Self {
        Self {
            state: RunStateCell::default(),
            cancel,
            executor: PipelineExecutor::new(StageRunner::new(grace)),
        }
    }

    pub fn from_config(config: &PipelineConfig, cancel: CancelToken) -> Self {
        Self::with_cancel(Duration::from_millis(config.termination_grace_ms), cancel)
    }

    /// Handle for observers: read the state, request a stop.
    pub fn control(&self) -> ControlHandle {
        ControlHandle::new(self.state.clone(), self.cancel.clone())
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn run(
        &self,
        units: &[WorkUnit],
        settings: &PlanSettings,
        sink: &dyn LogSink,
    ) -> Result<BatchReport> {
        if units.is_empty() {
            return Err(PipelineError::DiscoveryEmpty);
        }
        validate_inputs(settings)?;
        if let Err(current) = self.state.transition(RunState::Running) {
            return Err(PipelineError::OrchestratorFault(format!(
                "batch controller already used (state {current})"
            )));
        }
        if let Err(err) = prepare_roots(settings) {
            let _ = self.state.transition(RunState::Failed);
            tracing::error!(error = %err, "batch aborted");
            return Err(err);
        }

        sink.emit(PipelineEvent::BatchStarted { total: units.len() });
        let mut results = Vec::with_capacity(units.len());
        let mut not_started = Vec::new();
        for (offset, unit) in units.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    remaining = units.len() - offset,
                    "stop requested; remaining units will not start"
                );
                let _ = self.state.transition(RunState::Cancelling);
                not_started.extend(units[offset..].iter().map(|unit| unit.name().to_string()));
                break;
            }
            let outcome =
                self.executor
                    .run_unit(unit, settings, offset + 1, units.len(), sink, &self.cancel);
            results.push(UnitResult {
                unit: unit.name().to_string(),
                outcome,
            });
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            let _ = self.state.transition(RunState::Cancelling);
        }
        let _ = self.state.transition(RunState::Completed);
        let report = BatchReport {
            state: self.state.get(),
            cancelled,
            results,
            not_started,
        };
        sink.emit(PipelineEvent::BatchFinished {
            completed: report.completed_count(),
            failed: report.failed_count(),
            cancelled,
        });
        Ok(report)
    }
}

/// Reject a batch whose shared inputs are unusable before anything starts.
pub fn validate_inputs(settings: &PlanSettings) -> Result<()> {
    if !settings.dtm.is_file() {
        return Err(PipelineError::InvalidInput(format!(
            "DTM file {} does not exist",
            settings.dtm.display()
        )));
    }
    Ok(())
}

fn prepare_roots(settings: &PlanSettings) -> Result<()> {
    for (label, root) in [
        ("output root", &settings.output_root),
        ("work root", &settings.work_root),
    ] {
        fs::create_dir_all(root).map_err(|err| {
            PipelineError::OrchestratorFault(format!("cannot create {label} {}: {err}", root.display()))
        })?;
        check_writable(root).map_err(|err| {
            PipelineError::OrchestratorFault(format!("{label} {} is not writable: {err}", root.display()))
        })?;
    }
    Ok(())
}

fn check_writable(dir: &Path) -> std::io::Result<()> {
    let marker = dir.join(WRITE_CHECK_NAME);
    fs::write(&marker, b"")?;
    fs::remove_file(&marker)
}

/// Stage programs that cannot be resolved from `PATH` (or `tools_dir`).
///
/// Advisory only: a missing tool still surfaces as `LaunchFailed` when its
/// stage is reached.
pub fn missing_tools(config: &PipelineConfig) -> Vec<(StageName, String)> {
    let cwd = match &config.tools_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().unwrap_or_default(),
    };
    let path_var = std::env::var_os("PATH");
    StageName::ORDER
        .into_iter()
        .filter_map(|stage| {
            let program = config.tools.get(stage).program();
            match which::which_in(program, path_var.as_ref(), &cwd) {
                Ok(_) => None,
                Err(_) => Some((stage, program.to_string())),
            }
        })
        .collect()
}
