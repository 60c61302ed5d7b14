//! Discovery, reconciliation and batch draining over a large sparse grid

use std::sync::Arc;

use async_trait::async_trait;
use cellfill::application::{BatchReport, BatchScheduler, BatchSink, SchedulerConfig};
use cellfill::domain::{CellAddress, CheckpointLedger, FillOrder, FillTask, Grid, discover};
use cellfill::infrastructure::{ContentGenerator, EngineError};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

const ROWS: usize = 20_000;
const SECTIONS: usize = 8;

/// Every third cell filled, every fifth filled cell also in the ledger, plus
/// some stale ledger entries.
fn sparse_fixture() -> (Grid, CheckpointLedger) {
    let headers = std::iter::once("Term".to_string())
        .chain((1..=SECTIONS).map(|i| format!("Section {i}")))
        .collect();
    let mut ledger = CheckpointLedger::new();
    let rows = (0..ROWS)
        .map(|idx| {
            let mut row = vec![format!("Term {idx}")];
            for col in 1..=SECTIONS {
                let address = CellAddress::new(CellAddress::display_row(idx), col);
                if (idx + col) % 3 == 0 {
                    row.push("already written".to_string());
                    if (idx + col) % 5 == 0 {
                        ledger.mark(address);
                    }
                } else {
                    row.push(String::new());
                    if (idx * col) % 97 == 0 {
                        ledger.mark(address);
                    }
                }
            }
            row
        })
        .collect();
    (Grid::new(headers, rows), ledger)
}

struct InstantGenerator;

#[async_trait]
impl ContentGenerator for InstantGenerator {
    async fn generate(&self, task: &FillTask) -> Option<String> {
        Some(task.entity_name.clone())
    }
}

struct DiscardSink;

#[async_trait]
impl BatchSink for DiscardSink {
    async fn commit(&mut self, report: &BatchReport) -> Result<(), EngineError> {
        black_box(report.succeeded());
        Ok(())
    }
}

fn discovery_benchmarks(c: &mut Criterion) {
    let (grid, ledger) = sparse_fixture();

    c.bench_function("discover forward (20k x 8)", |b| {
        b.iter(|| black_box(discover(&grid, &ledger, FillOrder::Forward)));
    });

    c.bench_function("discover reverse (20k x 8)", |b| {
        b.iter(|| black_box(discover(&grid, &ledger, FillOrder::Reverse)));
    });

    c.bench_function("reconcile ledger (20k x 8)", |b| {
        b.iter(|| {
            let mut ledger = ledger.clone();
            black_box(ledger.reconcile(&grid))
        });
    });
}

fn drain_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (grid, ledger) = sparse_fixture();
    let tasks: Vec<FillTask> = discover(&grid, &ledger, FillOrder::Forward)
        .into_iter()
        .take(3_000)
        .collect();
    let scheduler = BatchScheduler::new(
        Arc::new(InstantGenerator),
        SchedulerConfig {
            workers: 25,
            batch_size: 75,
        },
    );

    c.bench_function("drain 3000 tasks, 25 workers", |b| {
        b.to_async(&rt).iter(|| async {
            let mut sink = DiscardSink;
            black_box(
                scheduler
                    .run(&tasks, &mut sink, &CancellationToken::new())
                    .await
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, discovery_benchmarks, drain_benchmark);
criterion_main!(benches);
