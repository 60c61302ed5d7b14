//! Persistence writer
//!
//! Owns the in-memory grid and ledger for the duration of a run. Only this
//! writer mutates them, and only between batches. Each batch is committed as
//! dataset first, checkpoint second; reconciliation on the next start covers a
//! crash between the two writes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::scheduler::{BatchReport, BatchSink};
use crate::domain::{CheckpointLedger, Grid, TaskOutcome};
use crate::infrastructure::checkpoint_store::CheckpointStore;
use crate::infrastructure::dataset_store::DatasetStore;
use crate::infrastructure::errors::{EngineError, StoreResult};

/// Effect of applying one batch to memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedBatch {
    /// Cells written and marked
    pub filled: usize,
    /// Successful results whose address no longer exists in the grid
    pub rejected: usize,
}

pub struct PersistenceWriter {
    grid: Grid,
    ledger: CheckpointLedger,
    dataset: Arc<dyn DatasetStore>,
    checkpoint: CheckpointStore,
}

impl PersistenceWriter {
    pub fn new(
        grid: Grid,
        ledger: CheckpointLedger,
        dataset: Arc<dyn DatasetStore>,
        checkpoint: CheckpointStore,
    ) -> Self {
        Self {
            grid,
            ledger,
            dataset,
            checkpoint,
        }
    }

    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub const fn ledger(&self) -> &CheckpointLedger {
        &self.ledger
    }

    /// Write successful results into the grid and mark them in the ledger.
    /// Failed slots leave both untouched.
    pub fn apply(&mut self, outcomes: &[TaskOutcome]) -> AppliedBatch {
        let mut applied = AppliedBatch::default();
        for outcome in outcomes {
            let Some(text) = outcome.filled_text() else {
                continue;
            };
            if self.grid.set(outcome.address, text) {
                self.ledger.mark(outcome.address);
                applied.filled += 1;
            } else {
                warn!(
                    row = outcome.address.row,
                    col = outcome.address.col,
                    "Result targets a cell outside the grid, dropped"
                );
                applied.rejected += 1;
            }
        }
        applied
    }

    /// Save grid then ledger. Nothing is written when nothing changed.
    pub async fn flush(&self, applied: AppliedBatch) -> StoreResult<()> {
        if applied.filled == 0 {
            debug!("Batch produced no content, skipping save");
            return Ok(());
        }
        self.dataset.save(&self.grid).await?;
        self.checkpoint.save(&self.ledger).await?;
        Ok(())
    }
}

#[async_trait]
impl BatchSink for PersistenceWriter {
    async fn commit(&mut self, report: &BatchReport) -> Result<(), EngineError> {
        let applied = self.apply(&report.outcomes);
        self.flush(applied)
            .await
            .map_err(|source| EngineError::Persistence {
                batch: report.batch_number,
                source,
            })
    }
}
