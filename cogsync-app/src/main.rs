//! `cogsync`: runs one word/color interference session against the synthetic
//! board and writes the trial log and signal recording under the data directory.
//!
//! ```bash
//! cogsync --subject 42 --session 1
//! cogsync -s 42 --session 2 --config study.toml --data-dir /srv/recordings
//! ```

mod app;
mod console;

use clap::{Parser, ValueEnum};
use cogsync_experiment::{ConfigError, ExperimentError, SplitPolicy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "cogsync")]
#[command(
    author,
    version,
    about = "Word/color interference task with synchronized signal acquisition",
    long_about = None
)]
pub struct Cli {
    /// Subject identifier
    #[arg(short, long)]
    subject: String,

    /// Session number (non-negative integer)
    #[arg(long)]
    session: String,

    /// TOML file with experiment settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory for session output
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Rounds per block
    #[arg(long)]
    rounds: Option<u32>,

    /// Trials per round
    #[arg(long)]
    trials: Option<u32>,

    #[arg(long)]
    baseline_ms: Option<u64>,

    #[arg(long)]
    break_ms: Option<u64>,

    #[arg(long)]
    interstitial_ms: Option<u64>,

    /// Congruent/incongruent split of each round
    #[arg(long, value_enum)]
    split: Option<SplitArg>,

    /// Seed for trial generation and synthetic signal
    #[arg(long)]
    seed: Option<u64>,

    /// Make the synthetic board drop out after this many reads
    #[arg(long)]
    fail_after_reads: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SplitArg {
    Balanced,
    Uniform,
}

impl From<SplitArg> for SplitPolicy {
    fn from(arg: SplitArg) -> Self {
        match arg {
            SplitArg::Balanced => SplitPolicy::Balanced,
            SplitArg::Uniform => SplitPolicy::UniformRandom,
        }
    }
}

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_DEVICE: u8 = 3;

fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    match err.downcast_ref::<ExperimentError>() {
        Some(ExperimentError::Config(_)) => EXIT_CONFIG,
        Some(ExperimentError::Device(_)) => EXIT_DEVICE,
        _ => EXIT_FAILURE,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {err}");
        return ExitCode::from(EXIT_FAILURE);
    }

    info!("cogsync v{}", env!("CARGO_PKG_VERSION"));

    match app::run(&cli) {
        Ok(outcome) => {
            info!(%outcome, "session ended");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
