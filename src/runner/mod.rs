//! Test orchestration: attempts, retries, the queue and the session.

pub mod backoff;
pub mod harness;
pub mod orchestrator;
pub mod outcome;
pub mod scheduler;

pub use backoff::backoff_delay;
pub use harness::{required_tools, Harness, RunOptions};
pub use orchestrator::{ItemRun, PhaseOrchestrator};
pub use outcome::{
    process_failure, FailureKind, Phase, PhaseResult, PhaseTimer, TestItem, TestOutcome,
};
pub use scheduler::{
    allowed_method, build_queue, Exclusion, ExclusionReason, ProgressEvent, QueuePlan,
    ScheduleResult, SequentialScheduler, SkippedSubject,
};
