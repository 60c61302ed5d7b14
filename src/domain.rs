//! Domain module - grid, checkpoint ledger and task discovery
//!
//! Everything here is in-memory and synchronous. Persistence and the external
//! generation service live in the infrastructure layer.

pub mod discovery;
pub mod grid;
pub mod ledger;
pub mod task;

// Re-export commonly used items
pub use discovery::discover;
pub use grid::Grid;
pub use ledger::CheckpointLedger;
pub use task::{CellAddress, FillOrder, FillTask, TaskOutcome, TaskState};
