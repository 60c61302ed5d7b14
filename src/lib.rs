//! cellfill - checkpointed parallel cell-fill engine
//!
//! Fills the empty cells of a tabular dataset with text from a generation
//! service. Work runs in sequential batches of parallel calls; after each batch
//! the dataset and a checkpoint ledger are rewritten atomically, so an
//! interrupted run resumes without repeating finished cells.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::{FillEngine, RunOutcome, RunSummary, StatusReport};
pub use infrastructure::config::AppConfig;
