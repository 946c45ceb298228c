#![deny(missing_docs)]
#![doc = "Experiment orchestration: job enumeration, group-ordered scheduling and run teardown."]

/// Cooperative cancellation and external interrupts.
pub mod cancel;
/// Run settings and declarative plans.
pub mod config;
/// The experiment facade.
pub mod experiment;
/// Single (algorithm, condition) evaluation units.
pub mod job;
/// Resolution of algorithm descriptors into component graphs.
pub mod resolve;
/// Group-ordered job execution.
pub mod scheduler;
/// Evaluation task interface.
pub mod task;

pub use cancel::{CancelToken, Interrupt};
pub use config::{
    load_plan, resolve_thread_count, ExperimentConfig, ExperimentPlan, THREAD_COUNT_ENV,
};
pub use experiment::{Experiment, RunReport, SinkOpener};
pub use job::{GroupContext, Job, RunContext};
pub use resolve::ConfigResolver;
pub use scheduler::{Scheduler, SchedulerState};
pub use task::{EvalTask, TaskOutput};
