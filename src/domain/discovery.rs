//! Task discovery over a sparse grid
//!
//! Pure function of grid, ledger and order. No I/O, no logging side effects
//! beyond what the caller chooses to do with the result.

use crate::domain::grid::Grid;
use crate::domain::ledger::CheckpointLedger;
use crate::domain::task::{CellAddress, FillOrder, FillTask};

/// Collect the missing-cell tasks.
///
/// A cell is a candidate when its row has an entity name, its column has a
/// non-blank header, it is not marked in the ledger, and it holds no text yet.
/// `Reverse` reverses the whole row-major list; rows are never interleaved.
#[must_use]
pub fn discover(grid: &Grid, ledger: &CheckpointLedger, order: FillOrder) -> Vec<FillTask> {
    let headers = grid.headers();
    let mut tasks = Vec::new();

    for data_index in 0..grid.row_count() {
        let Some(entity) = grid.entity_name(data_index) else {
            continue;
        };
        let row = CellAddress::display_row(data_index);

        for (col, header) in headers.iter().enumerate().skip(1) {
            if header.trim().is_empty() {
                continue;
            }
            let address = CellAddress::new(row, col);
            if ledger.contains(address) || grid.is_filled(address) {
                continue;
            }
            tasks.push(FillTask {
                address,
                entity_name: entity.to_string(),
                section_label: header.clone(),
            });
        }
    }

    if order == FillOrder::Reverse {
        tasks.reverse();
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn scenario_grid() -> Grid {
        Grid::new(
            vec!["Term".into(), "S1".into(), "S2".into(), "S3".into()],
            vec![
                vec!["A".into(), "x".into(), String::new(), String::new()],
                vec!["B".into(), String::new(), String::new(), String::new()],
            ],
        )
    }

    #[test]
    fn empty_ledger_yields_every_missing_cell() {
        let tasks = discover(&scenario_grid(), &CheckpointLedger::new(), FillOrder::Forward);
        let addrs: Vec<_> = tasks.iter().map(|t| (t.row(), t.col())).collect();
        assert_eq!(addrs, vec![(2, 2), (2, 3), (3, 1), (3, 2), (3, 3)]);
        assert_eq!(tasks[0].entity_name, "A");
        assert_eq!(tasks[0].section_label, "S2");
    }

    #[test]
    fn ledger_entries_are_skipped() {
        let ledger: CheckpointLedger = [CellAddress::new(3, 2)].into_iter().collect();
        let tasks = discover(&scenario_grid(), &ledger, FillOrder::Forward);
        assert_eq!(tasks.len(), 4);
        assert!(tasks.iter().all(|t| t.address != CellAddress::new(3, 2)));
    }

    #[rstest]
    #[case::blank_entity(vec!["  ".into(), String::new()], 0)]
    #[case::named_entity(vec!["C".into(), String::new()], 1)]
    #[case::whitespace_cell(vec!["C".into(), " \t".into()], 1)]
    #[case::filled_cell(vec!["C".into(), "done".into()], 0)]
    fn row_rules(#[case] row: Vec<String>, #[case] expected: usize) {
        let grid = Grid::new(vec!["Term".into(), "S1".into(), String::new()], vec![row]);
        assert_eq!(discover(&grid, &CheckpointLedger::new(), FillOrder::Forward).len(), expected);
    }

    #[test]
    fn headerless_grid_has_no_tasks() {
        let grid = Grid::new(Vec::new(), vec![vec!["A".into()]]);
        assert!(discover(&grid, &CheckpointLedger::new(), FillOrder::Forward).is_empty());
    }

    proptest! {
        #[test]
        fn reverse_is_exactly_forward_reversed(
            cells in proptest::collection::vec(
                proptest::collection::vec(prop_oneof!["", "v"], 3),
                0..8,
            ),
        ) {
            let rows: Vec<Vec<String>> = cells
                .into_iter()
                .enumerate()
                .map(|(i, mut r)| {
                    r.insert(0, if i % 3 == 0 { String::new() } else { format!("E{i}") });
                    r
                })
                .collect();
            let grid = Grid::new(
                vec!["Term".into(), "S1".into(), "S2".into(), "S3".into()],
                rows,
            );
            let ledger = CheckpointLedger::new();
            let mut forward = discover(&grid, &ledger, FillOrder::Forward);
            let reverse = discover(&grid, &ledger, FillOrder::Reverse);
            forward.reverse();
            prop_assert_eq!(forward, reverse);
        }
    }
}
