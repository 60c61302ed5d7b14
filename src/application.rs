//! Application layer - run orchestration
//!
//! Coordinates the domain logic with storage and the generation service:
//! batch scheduling, per-batch persistence, the run state machine and the
//! read-only status report.

pub mod engine;
pub mod persistence;
pub mod scheduler;
pub mod status;

// Re-export commonly used items
pub use engine::{EngineSettings, FillEngine, JobState, RunOutcome, RunSummary};
pub use persistence::PersistenceWriter;
pub use scheduler::{BatchReport, BatchScheduler, BatchSink, DrainSummary, SchedulerConfig};
pub use status::{CheckpointState, StatusReport};
