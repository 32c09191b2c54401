//! Runs one unit's stages in their fixed order.
//!
//! Stage N+1 starts only after stage N reported success. Outputs of an
//! earlier run are cleared just before the first stage; afterwards working
//! directories are left in place whatever the result (see `cleanup`).
use crate::cancel::CancelToken;
use crate::error::PlanError;
use crate::locator::WorkUnit;
use crate::outcome::UnitOutcome;
use crate::plan::{build_plan, ExecutionPlan, PlanSettings};
use crate::runner::StageRunner;
use crate::sink::{LogSink, PipelineEvent};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    runner: StageRunner,
}

impl PipelineExecutor {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    /// Plan and run one unit, bracketed by unit start/finish events.
    ///
    /// `index` is 1-based within `total`.
    pub fn run_unit(
        &self,
        unit: &WorkUnit,
        settings: &PlanSettings,
        index: usize,
        total: usize,
        sink: &dyn LogSink,
        cancel: &CancelToken,
    ) -> UnitOutcome {
        sink.emit(PipelineEvent::UnitStarted {
            unit: unit.name().to_string(),
            index,
            total,
        });
        let outcome = match build_plan(unit, settings) {
            Ok(plan) => {
                sink.emit(PipelineEvent::UnitPlanned {
                    unit: plan.unit.clone(),
                    x: plan.offset.x,
                    y: plan.offset.y,
                });
                if cancel.is_cancelled() {
                    UnitOutcome::Cancelled { stage: None }
                } else {
                    match plan.clear_previous_outputs() {
                        Ok(()) => self.run_stages(&plan, sink, cancel),
                        Err(err) => UnitOutcome::LayoutFailed {
                            reason: err.to_string(),
                        },
                    }
                }
            }
            Err(err @ PlanError::MalformedCoordinateFile { .. }) => {
                UnitOutcome::MalformedCoordinateFile {
                    reason: err.to_string(),
                }
            }
            Err(err @ PlanError::Layout { .. }) => UnitOutcome::LayoutFailed {
                reason: err.to_string(),
            },
        };
        sink.emit(PipelineEvent::UnitFinished {
            unit: unit.name().to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Run the plan's stages, stopping at the first one that does not succeed.
    pub fn run_stages(
        &self,
        plan: &ExecutionPlan,
        sink: &dyn LogSink,
        cancel: &CancelToken,
    ) -> UnitOutcome {
        for stage in &plan.stages {
            if cancel.is_cancelled() {
                return UnitOutcome::Cancelled { stage: None };
            }
            sink.emit(PipelineEvent::StageStarted {
                unit: plan.unit.clone(),
                stage: stage.name,
                command_line: stage.command.display_line(),
            });
            let started = Instant::now();
            let outcome = self.runner.run(stage, sink, cancel);
            sink.emit(PipelineEvent::StageFinished {
                unit: plan.unit.clone(),
                stage: stage.name,
                outcome: outcome.clone(),
                elapsed: started.elapsed(),
            });
            if !outcome.is_success() {
                return UnitOutcome::from_stage(stage.name, outcome, plan.final_artifact.clone());
            }
        }
        UnitOutcome::Completed {
            artifact: plan.final_artifact.clone(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::coords::CoordinateOffset;
    use crate::outcome::StageOutcome;
    use crate::plan::{StageCommand, StageDescriptor, StageName};
    use crate::sink::RecordingSink;
    use std::time::Duration;

    fn plan_of(scripts: &[(StageName, &str)]) -> ExecutionPlan {
        ExecutionPlan {
            unit: "A".to_string(),
            offset: CoordinateOffset { x: 1.0, y: 2.0 },
            work_dir: "temp/A".into(),
            final_artifact: "out/A/A.gml".into(),
            stages: scripts
                .iter()
                .map(|(name, script)| StageDescriptor {
                    name: *name,
                    command: StageCommand {
                        program: "sh".into(),
                        args: vec!["-c".into(), (*script).into()],
                        current_dir: None,
                    },
                    input_dir: "in".into(),
                    output: "out".into(),
                })
                .collect(),
        }
    }

    fn executor() -> PipelineExecutor {
        PipelineExecutor::new(StageRunner::new(Duration::from_secs(5)))
    }

    #[test]
    fn all_stages_succeed_in_order() {
        let plan = plan_of(&[
            (StageName::Separate, "echo s"),
            (StageName::Decimate, "echo d"),
            (StageName::Translate, "echo t"),
        ]);
        let sink = RecordingSink::new();
        let outcome = executor().run_stages(&plan, &sink, &CancelToken::new());
        assert_eq!(
            outcome,
            UnitOutcome::Completed {
                artifact: "out/A/A.gml".into()
            }
        );
        let started: Vec<_> = sink.started_stages().into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            started,
            [StageName::Separate, StageName::Decimate, StageName::Translate]
        );

        // Each stage's output sits between its start and finish events.
        let events = sink.events();
        let position = |wanted: &PipelineEvent| events.iter().position(|e| e == wanted);
        let line = position(&PipelineEvent::StageOutput {
            stage: StageName::Decimate,
            line: "d".to_string(),
        })
        .expect("decimate output");
        let start = events
            .iter()
            .position(|e| {
                matches!(e, PipelineEvent::StageStarted { stage: StageName::Decimate, .. })
            })
            .expect("decimate start");
        let finish = events
            .iter()
            .position(|e| {
                matches!(e, PipelineEvent::StageFinished { stage: StageName::Decimate, .. })
            })
            .expect("decimate finish");
        assert!(start < line && line < finish);
    }

    #[test]
    fn first_failure_stops_the_unit() {
        let plan = plan_of(&[
            (StageName::Separate, "true"),
            (StageName::Decimate, "exit 4"),
            (StageName::Translate, "echo unreachable"),
        ]);
        let sink = RecordingSink::new();
        let outcome = executor().run_stages(&plan, &sink, &CancelToken::new());
        assert_eq!(
            outcome,
            UnitOutcome::StageFailed {
                stage: StageName::Decimate,
                code: 4
            }
        );
        assert_eq!(sink.started_stages().len(), 2);
        assert!(sink.lines_for(StageName::Translate).is_empty());
        assert!(sink.events().iter().any(|e| matches!(
            e,
            PipelineEvent::StageFinished {
                stage: StageName::Decimate,
                outcome: StageOutcome::StageFailed { code: 4 },
                ..
            }
        )));
    }

    #[test]
    fn cancellation_after_a_stage_prevents_the_next() {
        let plan = plan_of(&[
            (StageName::Separate, "true"),
            (StageName::Decimate, "true"),
        ]);
        let token = CancelToken::new();

        struct CancelAfterFirstStage(CancelToken, RecordingSink);
        impl LogSink for CancelAfterFirstStage {
            fn emit(&self, event: PipelineEvent) {
                if matches!(event, PipelineEvent::StageFinished { .. }) {
                    self.0.cancel();
                }
                self.1.emit(event);
            }
        }
        let sink = CancelAfterFirstStage(token.clone(), RecordingSink::new());
        let outcome = executor().run_stages(&plan, &sink, &token);
        assert_eq!(outcome, UnitOutcome::Cancelled { stage: None });
        assert_eq!(sink.1.started_stages().len(), 1);
    }
}
