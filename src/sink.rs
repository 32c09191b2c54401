//! Progress events and the sinks that receive them.
//!
//! The orchestrator never prints directly; everything observable goes
//! through a `LogSink` so a CLI, a UI, or a test can watch the same stream.
use crate::outcome::{StageOutcome, UnitOutcome};
use crate::plan::StageName;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    BatchStarted {
        total: usize,
    },
    UnitStarted {
        unit: String,
        index: usize,
        total: usize,
    },
    /// Bound coordinate offset, reported once the plan is built.
    UnitPlanned {
        unit: String,
        x: f64,
        y: f64,
    },
    StageStarted {
        unit: String,
        stage: StageName,
        command_line: String,
    },
    StageOutput {
        stage: StageName,
        line: String,
    },
    StageFinished {
        unit: String,
        stage: StageName,
        outcome: StageOutcome,
        elapsed: Duration,
    },
    UnitFinished {
        unit: String,
        outcome: UnitOutcome,
    },
    BatchFinished {
        completed: usize,
        failed: usize,
        cancelled: bool,
    },
}

pub trait LogSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::BatchStarted { total } => {
                tracing::info!(total, "Starting processing of {total} folder(s)");
            }
            PipelineEvent::UnitStarted { unit, index, total } => {
                tracing::info!(unit = %unit, "Processing {unit} ({index}/{total})");
            }
            PipelineEvent::UnitPlanned { unit, x, y } => {
                tracing::info!(unit = %unit, x, y, "coordinate offset bound");
            }
            PipelineEvent::StageStarted {
                unit,
                stage,
                command_line,
            } => {
                tracing::info!(unit = %unit, stage = %stage, "stage started");
                tracing::debug!(stage = %stage, command = %command_line, "stage command");
            }
            PipelineEvent::StageOutput { stage, line } => {
                tracing::info!(target: "lodpipe::stage", stage = %stage, "{line}");
            }
            PipelineEvent::StageFinished {
                unit,
                stage,
                outcome,
                elapsed,
            } => {
                let elapsed_ms = elapsed.as_millis();
                if outcome.is_success() {
                    tracing::info!(unit = %unit, stage = %stage, elapsed_ms, "stage finished");
                } else {
                    tracing::warn!(
                        unit = %unit,
                        stage = %stage,
                        elapsed_ms,
                        outcome = %outcome,
                        "stage did not succeed"
                    );
                }
            }
            PipelineEvent::UnitFinished { unit, outcome } => match outcome {
                UnitOutcome::Completed { .. } => {
                    tracing::info!(unit = %unit, "✓ Successfully processed {unit}");
                }
                other => {
                    tracing::error!(unit = %unit, outcome = %other, "✗ Error processing {unit}");
                }
            },
            PipelineEvent::BatchFinished {
                completed,
                failed,
                cancelled,
            } => {
                if cancelled {
                    tracing::warn!(completed, failed, "Processing stopped by user");
                } else {
                    tracing::info!(completed, failed, "Processing completed");
                }
            }
        }
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Output lines forwarded for `stage`, in order.
    pub fn lines_for(&self, stage: StageName) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::StageOutput { stage: s, line } if s == stage => Some(line),
                _ => None,
            })
            .collect()
    }

    /// `(unit, stage)` for every stage start, in order.
    pub fn started_stages(&self) -> Vec<(String, StageName)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::StageStarted { unit, stage, .. } => Some((unit, stage)),
                _ => None,
            })
            .collect()
    }

    pub fn started_units(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::UnitStarted { unit, .. } => Some(unit),
                _ => None,
            })
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
