//! Batch scheduler / worker pool
//!
//! Drains an ordered task list in fixed-size batches. Tasks inside a batch run
//! concurrently (at most `workers` in flight); the next batch starts only after
//! the previous one has been committed by the [`BatchSink`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{FillTask, TaskOutcome, TaskState};
use crate::infrastructure::errors::EngineError;
use crate::infrastructure::generation_client::ContentGenerator;

/// Scheduler limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum simultaneous generation calls
    pub workers: usize,
    /// Tasks per batch
    pub batch_size: usize,
}

/// Results of one fully drained batch, in task order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// 1-based
    pub batch_number: usize,
    pub batch_count: usize,
    pub outcomes: Vec<TaskOutcome>,
    /// Slots whose task panicked or was aborted
    pub crashed: usize,
}

impl BatchReport {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state() == TaskState::Succeeded)
            .count()
    }
}

/// Receives each batch after it has fully drained.
#[async_trait]
pub trait BatchSink: Send {
    /// Persist the batch. An error stops the drain.
    async fn commit(&mut self, report: &BatchReport) -> Result<(), EngineError>;
}

/// Totals for a whole drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub batches_completed: usize,
    pub batch_count: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub crashed: usize,
    /// Stopped early on cancellation
    pub interrupted: bool,
}

pub struct BatchScheduler {
    generator: Arc<dyn ContentGenerator>,
    semaphore: Arc<Semaphore>,
    config: SchedulerConfig,
}

impl BatchScheduler {
    /// `workers` and `batch_size` are clamped to at least 1.
    pub fn new(generator: Arc<dyn ContentGenerator>, config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            workers: config.workers.max(1),
            batch_size: config.batch_size.max(1),
        };
        Self {
            generator,
            semaphore: Arc::new(Semaphore::new(config.workers)),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    #[must_use]
    pub fn batch_count(&self, task_count: usize) -> usize {
        task_count.div_ceil(self.config.batch_size)
    }

    /// Run one batch to completion. Every task yields exactly one outcome, in
    /// input order; a panicking task becomes a failed slot.
    pub async fn run_batch(&self, batch: &[FillTask]) -> (Vec<TaskOutcome>, usize) {
        let handles: Vec<_> = batch
            .iter()
            .cloned()
            .map(|task| {
                let semaphore = Arc::clone(&self.semaphore);
                let generator = Arc::clone(&self.generator);

                tokio::spawn(async move {
                    debug!(row = task.row(), col = task.col(), state = ?TaskState::Pending, "Task queued");
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return TaskOutcome::failed(task.address);
                    };
                    debug!(row = task.row(), col = task.col(), state = ?TaskState::InFlight, "Task started");
                    let outcome = TaskOutcome::new(task.address, generator.generate(&task).await);
                    debug!(row = task.row(), col = task.col(), state = ?outcome.state(), "Task finished");
                    outcome
                })
            })
            .collect();

        let results = join_all(handles).await;

        let mut crashed = 0;
        let outcomes = batch
            .iter()
            .zip(results)
            .map(|(task, result)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(row = task.row(), col = task.col(), "Task crashed: {}", e);
                    crashed += 1;
                    TaskOutcome::failed(task.address)
                }
            })
            .collect();

        (outcomes, crashed)
    }

    /// Drain `tasks` batch by batch, committing each through `sink`.
    ///
    /// Cancellation is checked between batches: the batch in flight always
    /// finishes and is committed first.
    pub async fn run<S: BatchSink + ?Sized>(
        &self,
        tasks: &[FillTask],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<DrainSummary, EngineError> {
        let batch_count = self.batch_count(tasks.len());
        let mut summary = DrainSummary {
            batch_count,
            ..DrainSummary::default()
        };

        for (idx, batch) in tasks.chunks(self.config.batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "🛑 Stop requested, {} of {} batches left unprocessed",
                    batch_count - idx,
                    batch_count
                );
                summary.interrupted = true;
                break;
            }

            let batch_number = idx + 1;
            info!(
                "Processing batch {}/{} ({} tasks, {} workers)",
                batch_number,
                batch_count,
                batch.len(),
                self.config.workers
            );

            let (outcomes, crashed) = self.run_batch(batch).await;
            let report = BatchReport {
                batch_number,
                batch_count,
                outcomes,
                crashed,
            };

            sink.commit(&report).await?;

            summary.batches_completed += 1;
            summary.attempted += report.attempted();
            summary.succeeded += report.succeeded();
            summary.crashed += report.crashed;

            info!(
                "✅ Batch {}/{} saved ({}/{} filled, {} total so far)",
                batch_number,
                batch_count,
                report.succeeded(),
                report.attempted(),
                summary.succeeded
            );
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingGenerator {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ContentGenerator for CountingGenerator {
        async fn generate(&self, task: &FillTask) -> Option<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if task.entity_name == "panic" {
                panic!("generator blew up");
            }
            (task.col() != 2).then(|| format!("text for {}", task.address))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        reports: Vec<BatchReport>,
        cancel_after_first: Option<CancellationToken>,
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        async fn commit(&mut self, report: &BatchReport) -> Result<(), EngineError> {
            self.reports.push(report.clone());
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
            Ok(())
        }
    }

    fn tasks(n: usize) -> Vec<FillTask> {
        (0..n)
            .map(|i| FillTask::new(2 + i / 3, 1 + i % 3, format!("T{i}"), "Definition"))
            .collect()
    }

    fn scheduler(workers: usize, batch_size: usize) -> (BatchScheduler, Arc<CountingGenerator>) {
        let generator = Arc::new(CountingGenerator {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let scheduler = BatchScheduler::new(
            Arc::clone(&generator) as Arc<dyn ContentGenerator>,
            SchedulerConfig { workers, batch_size },
        );
        (scheduler, generator)
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_sequential_and_bounded() {
        let (scheduler, generator) = scheduler(2, 4);
        let mut sink = RecordingSink::default();

        let summary = scheduler
            .run(&tasks(10), &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.batch_count, 3);
        assert_eq!(summary.batches_completed, 3);
        assert_eq!(summary.attempted, 10);
        assert!(!summary.interrupted);
        assert_eq!(
            sink.reports.iter().map(BatchReport::attempted).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert!(generator.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_keep_task_order_and_failures() {
        let (scheduler, _) = scheduler(3, 3);
        let batch = tasks(3);

        let (outcomes, crashed) = scheduler.run_batch(&batch).await;

        assert_eq!(crashed, 0);
        let addresses: Vec<_> = outcomes.iter().map(|o| o.address).collect();
        let expected: Vec<_> = batch.iter().map(|t| t.address).collect();
        assert_eq!(addresses, expected);
        assert_eq!(outcomes[1].state(), TaskState::Failed);
        assert_eq!(outcomes[0].state(), TaskState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_does_not_sink_its_siblings() {
        let (scheduler, _) = scheduler(4, 4);
        let mut batch = tasks(3);
        batch[0].entity_name = "panic".into();

        let (outcomes, crashed) = scheduler.run_batch(&batch).await;

        assert_eq!(crashed, 1);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].state(), TaskState::Failed);
        assert_eq!(outcomes[2].state(), TaskState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_finishes_the_current_batch_only() {
        let (scheduler, _) = scheduler(2, 2);
        let token = CancellationToken::new();
        let mut sink = RecordingSink {
            cancel_after_first: Some(token.clone()),
            ..RecordingSink::default()
        };

        let summary = scheduler.run(&tasks(6), &mut sink, &token).await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.batches_completed, 1);
        assert_eq!(sink.reports.len(), 1);
        assert_eq!(sink.reports[0].attempted(), 2);
    }

    #[tokio::test]
    async fn empty_task_list_commits_nothing() {
        let (scheduler, _) = scheduler(2, 2);
        let mut sink = RecordingSink::default();

        let summary = scheduler
            .run(&[], &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary, DrainSummary::default());
        assert!(sink.reports.is_empty());
    }
}
