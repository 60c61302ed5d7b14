//! Read-only progress report for a dataset and its checkpoint

use std::fmt;
use std::path::PathBuf;

use crate::domain::{CellAddress, Grid};
use crate::infrastructure::checkpoint_store::{CheckpointStore, LedgerSnapshot};
use crate::infrastructure::dataset_store::DatasetStore;
use crate::infrastructure::errors::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStatus {
    pub label: String,
    pub filled: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointState {
    Missing,
    Corrupted(String),
    Present {
        entries: usize,
        /// Entries the next run's reconciliation would remove
        stale: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub dataset_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub rows: usize,
    pub candidates: usize,
    pub filled: usize,
    pub columns: Vec<ColumnStatus>,
    pub checkpoint: CheckpointState,
}

impl StatusReport {
    /// Load both files and summarize. Never writes to disk.
    pub async fn collect(
        dataset: &dyn DatasetStore,
        checkpoint: &CheckpointStore,
    ) -> StoreResult<Self> {
        let grid = dataset.load().await?;
        let checkpoint_state = match checkpoint.inspect().await {
            LedgerSnapshot::Missing => CheckpointState::Missing,
            LedgerSnapshot::Corrupted { reason } => CheckpointState::Corrupted(reason),
            LedgerSnapshot::Loaded(ledger) => CheckpointState::Present {
                entries: ledger.len(),
                stale: ledger.stale_entries(&grid).len(),
            },
        };
        let (candidates, filled) = grid.fill_counts();

        Ok(Self {
            dataset_path: dataset.path().to_path_buf(),
            checkpoint_path: checkpoint.path().to_path_buf(),
            rows: grid.row_count(),
            candidates,
            filled,
            columns: column_breakdown(&grid),
            checkpoint: checkpoint_state,
        })
    }

    #[must_use]
    pub const fn missing(&self) -> usize {
        self.candidates - self.filled
    }

    /// Filled share of candidate cells, 0.0 to 100.0
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_complete(&self) -> f64 {
        if self.candidates == 0 {
            return 100.0;
        }
        self.filled as f64 * 100.0 / self.candidates as f64
    }
}

fn column_breakdown(grid: &Grid) -> Vec<ColumnStatus> {
    grid.headers()
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, label)| !label.trim().is_empty())
        .map(|(col, label)| {
            let mut status = ColumnStatus {
                label: label.clone(),
                filled: 0,
                missing: 0,
            };
            for idx in 0..grid.row_count() {
                if grid.entity_name(idx).is_none() {
                    continue;
                }
                let address = CellAddress::new(CellAddress::display_row(idx), col);
                if grid.is_filled(address) {
                    status.filled += 1;
                } else {
                    status.missing += 1;
                }
            }
            status
        })
        .collect()
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset:    {}", self.dataset_path.display())?;
        writeln!(f, "Rows:       {}", self.rows)?;
        writeln!(
            f,
            "Cells:      {}/{} filled ({:.1}%), {} missing",
            self.filled,
            self.candidates,
            self.percent_complete(),
            self.missing()
        )?;
        for column in &self.columns {
            writeln!(
                f,
                "  {:<32} {:>7} filled {:>7} missing",
                column.label, column.filled, column.missing
            )?;
        }
        write!(f, "Checkpoint: {} ", self.checkpoint_path.display())?;
        match &self.checkpoint {
            CheckpointState::Missing => writeln!(f, "(not found)"),
            CheckpointState::Corrupted(reason) => {
                writeln!(f, "(corrupted: {reason}; next run starts fresh)")
            }
            CheckpointState::Present { entries, stale } => {
                writeln!(f, "({entries} entries, {stale} stale)")
            }
        }
    }
}
