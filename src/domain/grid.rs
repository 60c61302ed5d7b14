//! In-memory grid model
//!
//! The grid is an ordered header list plus ordered, positional rows of text.
//! `headers[0]` is the entity name column; `headers[1..]` are section labels.
//! Rows are addressed with [`CellAddress`] display numbering.

use crate::domain::task::CellAddress;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Grid {
    /// Build a grid, padding short rows to the header width.
    #[must_use]
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();
        Self { headers, rows }
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() || self.rows.is_empty()
    }

    /// Entity name of the row at zero-based `data_index`, trimmed.
    #[must_use]
    pub fn entity_name(&self, data_index: usize) -> Option<&str> {
        self.rows
            .get(data_index)
            .and_then(|row| row.first())
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
    }

    /// Current value of a cell, `None` when the address is outside the grid.
    ///
    /// A column inside the header range but beyond a row's stored width reads
    /// as empty.
    #[must_use]
    pub fn cell(&self, address: CellAddress) -> Option<&str> {
        let row = self.rows.get(address.data_index()?)?;
        if address.col >= self.headers.len() {
            return None;
        }
        Some(row.get(address.col).map_or("", String::as_str))
    }

    /// True when the cell exists and holds non-whitespace text.
    #[must_use]
    pub fn is_filled(&self, address: CellAddress) -> bool {
        self.cell(address).is_some_and(|v| !v.trim().is_empty())
    }

    /// Write a cell value. Returns `false` without touching the grid when the
    /// address is outside the header or row range.
    pub fn set(&mut self, address: CellAddress, value: impl Into<String>) -> bool {
        let width = self.headers.len();
        if address.col >= width {
            return false;
        }
        let Some(row) = address.data_index().and_then(|idx| self.rows.get_mut(idx)) else {
            return false;
        };
        if row.len() < width {
            row.resize(width, String::new());
        }
        row[address.col] = value.into();
        true
    }

    /// Count of (entity row, labelled section) cells and how many hold text.
    #[must_use]
    pub fn fill_counts(&self) -> (usize, usize) {
        let mut candidates = 0;
        let mut filled = 0;
        for (idx, row) in self.rows.iter().enumerate() {
            if self.entity_name(idx).is_none() {
                continue;
            }
            for (col, header) in self.headers.iter().enumerate().skip(1) {
                if header.trim().is_empty() {
                    continue;
                }
                candidates += 1;
                if row.get(col).is_some_and(|v| !v.trim().is_empty()) {
                    filled += 1;
                }
            }
        }
        (candidates, filled)
    }
}
