use crate::Cli;
use crate::console::ConsolePresenter;
use anyhow::{Context, Result};
use cogsync_acquisition::{SyntheticBoard, SyntheticConfig};
use cogsync_experiment::{
    ExperimentConfig, ExperimentController, SessionContext, SessionIdentity, SessionOutcome,
};
use cogsync_store::{ArtifactPaths, PersistenceWriter};
use cogsync_timing::HighPrecisionTimer;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::{info, warn};

/// Settings file first, then command-line overrides on top.
fn load_config(cli: &Cli) -> Result<ExperimentConfig> {
    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    if let Some(rounds) = cli.rounds {
        config.rounds_per_block = rounds;
    }
    if let Some(trials) = cli.trials {
        config.trials_per_round = trials;
    }
    if let Some(ms) = cli.baseline_ms {
        config.baseline_ms = ms;
    }
    if let Some(ms) = cli.break_ms {
        config.break_ms = ms;
    }
    if let Some(ms) = cli.interstitial_ms {
        config.interstitial_ms = ms;
    }
    if let Some(split) = cli.split {
        config.split_policy = split.into();
    }
    config.validate().context("invalid experiment settings")?;
    Ok(config)
}

pub fn run(cli: &Cli) -> Result<SessionOutcome> {
    let identity = SessionIdentity::parse(&cli.subject, &cli.session)
        .context("invalid subject or session")?;
    let config = load_config(cli)?;

    let dir = cli.data_dir.join(identity.dir_name());
    if dir.exists() {
        warn!(dir = %dir.display(), "session directory exists, trial log will be appended to");
    }
    info!(
        subject = %identity.subject_id,
        session = identity.session_id,
        rounds = config.rounds_per_block,
        trials = config.trials_per_round,
        split = ?config.split_policy,
        dir = %dir.display(),
        "configuration loaded"
    );

    let board = Arc::new(SyntheticBoard::new(SyntheticConfig {
        fail_after_reads: cli.fail_after_reads,
        seed: cli.seed,
        ..Default::default()
    }));
    let presenter = ConsolePresenter::spawn().context("starting console input")?;
    let writer = PersistenceWriter::new(ArtifactPaths::in_dir(&dir));
    let rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut controller = ExperimentController::new(
        config,
        identity,
        SessionContext::new(board, presenter, writer),
        HighPrecisionTimer::new(),
        rng,
    )?;
    let report = controller.run()?;

    for summary in &report.summaries {
        info!(
            block = summary.block,
            correct = summary.correct,
            total = summary.total,
            accuracy = format!("{:.1}%", summary.accuracy),
            partial = summary.partial,
            "block result"
        );
    }
    info!(
        trials = report.trials_written,
        samples = report.samples,
        dir = %dir.display(),
        "artifacts written"
    );
    Ok(report.outcome)
}
