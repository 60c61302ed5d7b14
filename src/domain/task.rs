//! Fill task value objects
//!
//! A task is one empty cell that needs generated content. Its identity is the
//! cell address; the entity name and section label are only generation inputs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display row of the first data row. Row 1 is the header row.
pub const FIRST_DATA_ROW: usize = 2;

/// Stable spreadsheet-style address of a cell.
///
/// `row` uses display numbering (first data row = 2) and `col` is the index
/// into the header list (column 0 is the entity name column). This pair is
/// the identity persisted in the checkpoint ledger, so it must never be
/// renumbered during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellAddress {
    pub row: usize,
    pub col: usize,
}

impl CellAddress {
    #[must_use]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Zero-based index into the data rows, if the display row is a data row.
    #[must_use]
    pub const fn data_index(&self) -> Option<usize> {
        self.row.checked_sub(FIRST_DATA_ROW)
    }

    /// Display row for a zero-based data row index.
    #[must_use]
    pub const fn display_row(data_index: usize) -> usize {
        data_index + FIRST_DATA_ROW
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.col)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid cell address '{0}', expected \"<row>-<col>\"")]
pub struct AddressParseError(pub String);

impl FromStr for CellAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (row, col) = s
            .split_once('-')
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        let row = row
            .trim()
            .parse()
            .map_err(|_| AddressParseError(s.to_string()))?;
        let col = col
            .trim()
            .parse()
            .map_err(|_| AddressParseError(s.to_string()))?;
        Ok(Self { row, col })
    }
}

/// One unit of work: fill the cell at `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillTask {
    pub address: CellAddress,
    pub entity_name: String,
    pub section_label: String,
}

impl FillTask {
    #[must_use]
    pub fn new(
        row: usize,
        col: usize,
        entity_name: impl Into<String>,
        section_label: impl Into<String>,
    ) -> Self {
        Self {
            address: CellAddress::new(row, col),
            entity_name: entity_name.into(),
            section_label: section_label.into(),
        }
    }

    #[must_use]
    pub const fn row(&self) -> usize {
        self.address.row
    }

    #[must_use]
    pub const fn col(&self) -> usize {
        self.address.col
    }
}

/// Processing order of the discovered task list.
///
/// `Reverse` is the same set as `Forward`, bottom to top. Two operators can run
/// one instance of each and converge on a large backlog from opposite ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillOrder {
    #[default]
    #[serde(alias = "topdown")]
    Forward,
    #[serde(alias = "bottomup")]
    Reverse,
}

impl fmt::Display for FillOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Reverse => write!(f, "reverse"),
        }
    }
}

/// Per-task lifecycle inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InFlight,
    Succeeded,
    /// No more automatic retries in this run. The ledger is not marked, so the
    /// cell is discovered again on the next invocation.
    Failed,
}

/// Result slot a worker hands back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub address: CellAddress,
    pub text: Option<String>,
}

impl TaskOutcome {
    #[must_use]
    pub const fn new(address: CellAddress, text: Option<String>) -> Self {
        Self { address, text }
    }

    #[must_use]
    pub const fn failed(address: CellAddress) -> Self {
        Self { address, text: None }
    }

    /// Text that may be written to the grid. Blank output never counts.
    #[must_use]
    pub fn filled_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        if self.filled_text().is_some() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        }
    }
}
