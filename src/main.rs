//! cellfill command-line entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cellfill::application::{FillEngine, RunOutcome, StatusReport};
use cellfill::domain::FillOrder;
use cellfill::infrastructure::{
    AppConfig, CheckpointStore, ConfigLoader, ConfigOverrides, EngineError, GenerationClient,
    OpenAiChatBackend, ensure_dataset_exists, init_logging_with_config, log_system_info,
    open_dataset_store,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "cellfill",
    version,
    about = "Fill empty dataset cells through a text-generation API, resumably"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill missing cells, batch by batch.
    Run(RunArgs),
    /// Report fill progress without modifying anything.
    Status(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Dataset file (.json or .csv).
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,

    /// Checkpoint ledger file.
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Processing order of the task list.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Delete the checkpoint file before starting. The dataset is not touched.
    #[arg(long)]
    reset_checkpoint: bool,

    /// Maximum simultaneous generation calls.
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Tasks per batch (default: workers x 3).
    #[arg(long, short = 'b')]
    batch_size: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    #[value(alias = "topdown")]
    Forward,
    #[value(alias = "bottomup")]
    Reverse,
}

impl From<ModeArg> for FillOrder {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Forward => Self::Forward,
            ModeArg::Reverse => Self::Reverse,
        }
    }
}

impl CommonArgs {
    fn load_config(&self, extra: ConfigOverrides) -> Result<AppConfig> {
        let mut config = ConfigLoader::new(self.config.clone())
            .load()
            .context("Failed to load configuration")?;
        config.apply_overrides(&ConfigOverrides {
            dataset_path: self.file.clone(),
            checkpoint_path: self.checkpoint.clone(),
            ..extra
        });
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; it usually only carries the API key
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run_command(args).await,
        Command::Status(args) => status_command(&args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run_command(args: RunArgs) -> Result<ExitCode> {
    let config = args.common.load_config(ConfigOverrides {
        order: args.mode.map(FillOrder::from),
        workers: args.workers,
        batch_size: args.batch_size,
        ..ConfigOverrides::default()
    })?;

    init_logging_with_config(&config.logging).context("Failed to initialize logging")?;
    log_system_info();
    info!(
        "Dataset {:?}, checkpoint {:?}, order {}, {} workers, batch size {}",
        config.dataset_path,
        config.checkpoint_path,
        config.order,
        config.workers,
        config.effective_batch_size()
    );

    // dataset check comes first; the key check must not touch the checkpoint
    ensure_dataset_exists(&config.dataset_path)
        .await
        .map_err(EngineError::Startup)?;
    let backend = OpenAiChatBackend::from_config(&config.generation)
        .context("Failed to set up the generation backend")?;
    let generator = GenerationClient::new(Arc::new(backend), &config.generation);

    let checkpoint = CheckpointStore::new(&config.checkpoint_path);
    FillEngine::prepare(&config.dataset_path, &checkpoint, args.reset_checkpoint).await?;

    let mut engine = FillEngine::from_config(&config, Arc::new(generator))?;

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());

    let summary = engine.run(&cancel).await?;

    Ok(match summary.outcome {
        RunOutcome::Interrupted => {
            warn!(
                "Interrupted after {}/{} batches; rerun to continue",
                summary.batches_completed, summary.batch_count
            );
            ExitCode::from(EXIT_INTERRUPTED)
        }
        RunOutcome::Completed | RunOutcome::NothingToDo => ExitCode::SUCCESS,
    })
}

async fn status_command(args: &CommonArgs) -> Result<ExitCode> {
    let mut config = args.load_config(ConfigOverrides::default())?;
    config.logging.file_output = false;
    config.logging.console_output = true;
    if config.logging.level == "info" {
        config.logging.level = "warn".to_string();
    }
    init_logging_with_config(&config.logging).context("Failed to initialize logging")?;

    let dataset = open_dataset_store(&config.dataset_path)?;
    let checkpoint = CheckpointStore::new(&config.checkpoint_path);
    let report = StatusReport::collect(dataset.as_ref(), &checkpoint).await?;

    println!("{report}");
    Ok(ExitCode::SUCCESS)
}

/// First Ctrl-C stops after the current batch; a second one exits at once.
fn install_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("🛑 Interrupt received, finishing the current batch (Ctrl-C again to quit now)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, exiting without waiting for the batch");
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    });
}
