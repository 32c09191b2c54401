//! Orchestrates the mesh to CityGML LOD2 conversion stages over folders of
//! input tiles.
//!
//! Flow: [`locator`] finds work units, [`plan`] binds each one into an
//! ordered list of stage commands, [`executor`] runs them through
//! [`runner`], and [`batch`] drives the whole set with cancellation and
//! per-unit failure isolation.
pub mod batch;
pub mod cancel;
pub mod cleanup;
pub mod config;
pub mod coords;
pub mod error;
pub mod executor;
pub mod locator;
pub mod outcome;
pub mod paths;
pub mod plan;
pub mod runner;
pub mod sink;
pub mod util;

pub use batch::{BatchController, BatchReport, UnitResult};
pub use cancel::{CancelToken, ControlHandle, RunState};
pub use config::PipelineConfig;
pub use error::{PipelineError, PlanError};
pub use locator::{locate, Discovery, DiscoveryMode, WorkUnit};
pub use outcome::{StageOutcome, UnitOutcome};
pub use plan::{build_plan, ExecutionPlan, PlanSettings, StageDescriptor, StageName};
pub use sink::{LogSink, PipelineEvent, RecordingSink, TracingSink};
