//! Checkpoint ledger
//!
//! Completion flags for cells that were successfully filled. The ledger never
//! caches values; the dataset stays authoritative and [`CheckpointLedger::reconcile`]
//! drops any flag the grid no longer backs.

use std::collections::BTreeSet;

use crate::domain::grid::Grid;
use crate::domain::task::CellAddress;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointLedger {
    entries: BTreeSet<CellAddress>,
}

impl CheckpointLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the completion flag. Only call after a non-empty result was written.
    ///
    /// Returns `true` when the address was not marked before.
    pub fn mark(&mut self, address: CellAddress) -> bool {
        self.entries.insert(address)
    }

    #[must_use]
    pub fn contains(&self, address: CellAddress) -> bool {
        self.entries.contains(&address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marked addresses in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = CellAddress> + '_ {
        self.entries.iter().copied()
    }

    /// Entries the grid does not back: row or column out of range, or a cell
    /// that is empty or whitespace.
    #[must_use]
    pub fn stale_entries(&self, grid: &Grid) -> Vec<CellAddress> {
        self.entries
            .iter()
            .copied()
            .filter(|addr| !grid.is_filled(*addr))
            .collect()
    }

    /// Remove every stale entry and return what was removed.
    ///
    /// The caller persists the ledger only when the returned list is non-empty.
    pub fn reconcile(&mut self, grid: &Grid) -> Vec<CellAddress> {
        let stale = self.stale_entries(grid);
        for addr in &stale {
            self.entries.remove(addr);
        }
        stale
    }
}

impl FromIterator<CellAddress> for CheckpointLedger {
    fn from_iter<I: IntoIterator<Item = CellAddress>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
