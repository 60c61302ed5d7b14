//! Fill engine
//!
//! One run: load, reconcile, discover, drain. Job state moves
//! `Idle -> Discovering -> DrainingBatches -> Done`.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::persistence::PersistenceWriter;
use crate::application::scheduler::{BatchScheduler, SchedulerConfig};
use crate::domain::{FillOrder, discover};
use crate::infrastructure::checkpoint_store::CheckpointStore;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::dataset_store::{DatasetStore, ensure_dataset_exists, open_dataset_store};
use crate::infrastructure::errors::EngineError;
use crate::infrastructure::generation_client::ContentGenerator;

/// Tasks listed in the pre-drain sample log.
const SAMPLE_TASKS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Discovering,
    DrainingBatches,
    Done,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every discovered task was attempted
    Completed,
    /// Stopped between batches on request; finished batches are saved
    Interrupted,
    /// Discovery found no work; nothing was written
    NothingToDo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Ledger entries dropped by reconciliation
    pub purged: usize,
    pub discovered: usize,
    pub batch_count: usize,
    pub batches_completed: usize,
    pub attempted: usize,
    pub filled: usize,
    pub crashed: usize,
}

impl RunSummary {
    const fn empty(outcome: RunOutcome, purged: usize) -> Self {
        Self {
            outcome,
            purged,
            discovered: 0,
            batch_count: 0,
            batches_completed: 0,
            attempted: 0,
            filled: 0,
            crashed: 0,
        }
    }
}

/// Run parameters taken from [`AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub order: FillOrder,
    pub scheduler: SchedulerConfig,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            order: config.order,
            scheduler: SchedulerConfig {
                workers: config.workers,
                batch_size: config.effective_batch_size(),
            },
        }
    }
}

pub struct FillEngine {
    settings: EngineSettings,
    dataset: Arc<dyn DatasetStore>,
    checkpoint: CheckpointStore,
    generator: Arc<dyn ContentGenerator>,
    state: JobState,
}

impl FillEngine {
    pub fn new(
        settings: EngineSettings,
        dataset: Arc<dyn DatasetStore>,
        checkpoint: CheckpointStore,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            settings,
            dataset,
            checkpoint,
            generator,
            state: JobState::Idle,
        }
    }

    /// Build stores from config. Fails on an unsupported dataset extension.
    pub fn from_config(
        config: &AppConfig,
        generator: Arc<dyn ContentGenerator>,
    ) -> Result<Self, EngineError> {
        let dataset = open_dataset_store(&config.dataset_path).map_err(EngineError::Startup)?;
        Ok(Self::new(
            EngineSettings::from(config),
            dataset,
            CheckpointStore::new(&config.checkpoint_path),
            generator,
        ))
    }

    /// Startup checks before any file is touched: the dataset must exist,
    /// then the checkpoint is deleted if `reset_checkpoint` is set.
    pub async fn prepare(
        dataset_path: &Path,
        checkpoint: &CheckpointStore,
        reset_checkpoint: bool,
    ) -> Result<(), EngineError> {
        ensure_dataset_exists(dataset_path)
            .await
            .map_err(EngineError::Startup)?;
        if reset_checkpoint {
            let removed = checkpoint.reset().await.map_err(EngineError::Startup)?;
            if !removed {
                info!("No checkpoint to reset at {:?}", checkpoint.path());
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    #[must_use]
    pub const fn settings(&self) -> EngineSettings {
        self.settings
    }

    fn transition(&mut self, next: JobState) {
        tracing::debug!("Job state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Execute one run. `cancel` is honored between batches.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunSummary, EngineError> {
        self.transition(JobState::Discovering);

        let grid = self.dataset.load().await.map_err(EngineError::Startup)?;
        let mut ledger = self.checkpoint.load().await.map_err(EngineError::Startup)?;

        let purged = ledger.reconcile(&grid);
        if !purged.is_empty() {
            warn!(
                "Reconciliation removed {} checkpoint entries with no content in the dataset",
                purged.len()
            );
            self.checkpoint
                .save(&ledger)
                .await
                .map_err(EngineError::Startup)?;
        }

        let tasks = discover(&grid, &ledger, self.settings.order);
        let (candidates, filled) = grid.fill_counts();
        info!(
            "Dataset has {} rows, {}/{} candidate cells filled, {} checkpoint entries, {} tasks to run ({} order)",
            grid.row_count(),
            filled,
            candidates,
            ledger.len(),
            tasks.len(),
            self.settings.order
        );

        if tasks.is_empty() {
            info!("🎉 Nothing to fill");
            self.transition(JobState::Done);
            return Ok(RunSummary::empty(RunOutcome::NothingToDo, purged.len()));
        }

        for task in tasks.iter().take(SAMPLE_TASKS) {
            info!(
                row = task.row(),
                col = task.col(),
                "Sample task: {} / {}",
                task.entity_name,
                task.section_label
            );
        }

        self.transition(JobState::DrainingBatches);
        let scheduler = BatchScheduler::new(Arc::clone(&self.generator), self.settings.scheduler);
        let mut writer = PersistenceWriter::new(
            grid,
            ledger,
            Arc::clone(&self.dataset),
            self.checkpoint.clone(),
        );
        let drain = scheduler.run(&tasks, &mut writer, cancel).await?;
        self.transition(JobState::Done);

        let summary = RunSummary {
            outcome: if drain.interrupted {
                RunOutcome::Interrupted
            } else {
                RunOutcome::Completed
            },
            purged: purged.len(),
            discovered: tasks.len(),
            batch_count: drain.batch_count,
            batches_completed: drain.batches_completed,
            attempted: drain.attempted,
            filled: drain.succeeded,
            crashed: drain.crashed,
        };

        if summary.attempted > 0 && summary.filled == 0 {
            warn!(
                "Low-value run: 0 of {} attempted tasks were filled",
                summary.attempted
            );
        }
        info!(
            "Run finished ({:?}): {}/{} filled in {}/{} batches",
            summary.outcome,
            summary.filled,
            summary.attempted,
            summary.batches_completed,
            summary.batch_count
        );

        Ok(summary)
    }
}
