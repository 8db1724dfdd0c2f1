use cogsync_acquisition::{BoardDriver, DeviceError, SyntheticBoard, SyntheticConfig};
use cogsync_core::{ChannelLayout, MarkerCode, SessionPhase, TrialState};
use cogsync_experiment::{
    AbortReason, ConfigError, ExperimentConfig, ExperimentController, ExperimentError, Frame,
    InputEvent, ScriptedAnswer, ScriptedPresenter, SessionContext, SessionIdentity,
    SessionOutcome, SplitPolicy,
};
use cogsync_store::{ArtifactPaths, LogRow, PersistenceWriter, SessionRecord, read_trial_log};
use cogsync_timing::ManualTimer;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

type Controller<B> = ExperimentController<B, ScriptedPresenter<ManualTimer>, ManualTimer, StdRng>;

fn fast_config() -> ExperimentConfig {
    ExperimentConfig {
        poll_interval_ms: 5,
        queue_capacity: 256,
        ..Default::default()
    }
}

fn small_config() -> ExperimentConfig {
    ExperimentConfig {
        baseline_ms: 3_000,
        break_ms: 1_000,
        interstitial_ms: 1_000,
        announce_ms: 500,
        rounds_per_block: 2,
        trials_per_round: 3,
        split_policy: SplitPolicy::Balanced,
        ..fast_config()
    }
}

fn controller<B: BoardDriver + 'static>(
    board: Arc<B>,
    config: ExperimentConfig,
    script: impl FnOnce(ScriptedPresenter<ManualTimer>) -> ScriptedPresenter<ManualTimer>,
) -> (TempDir, ArtifactPaths, Controller<B>) {
    let dir = TempDir::new().unwrap();
    let timer = ManualTimer::new();
    let presenter = script(ScriptedPresenter::new(timer.clone()));
    let identity = SessionIdentity::new("42", 1).unwrap();
    let paths = ArtifactPaths::in_dir(dir.path().join(identity.dir_name()));
    let ctx = SessionContext::new(board, presenter, PersistenceWriter::new(paths.clone()));
    let controller =
        ExperimentController::new(config, identity, ctx, timer, StdRng::seed_from_u64(42))
            .unwrap();
    (dir, paths, controller)
}

fn codes(events: &[cogsync_core::MarkerEvent]) -> Vec<u32> {
    events.iter().map(|e| e.code.0).collect()
}

fn trial_rows(rows: &[LogRow]) -> Vec<&LogRow> {
    rows.iter().filter(|r| matches!(r, LogRow::Trial { .. })).collect()
}

fn summary_rows(rows: &[LogRow]) -> Vec<&LogRow> {
    rows.iter().filter(|r| matches!(r, LogRow::Summary { .. })).collect()
}

fn metadata(paths: &ArtifactPaths) -> SessionRecord {
    serde_json::from_str(&std::fs::read_to_string(&paths.metadata).unwrap()).unwrap()
}

#[test]
fn complete_session_logs_every_trial_and_marker() {
    let board = Arc::new(SyntheticBoard::default());
    let (_dir, paths, mut controller) = controller(board, fast_config(), |p| p);
    let report = controller.run().unwrap();

    assert!(report.outcome.is_complete());
    assert_eq!(
        report.phases,
        vec![
            SessionPhase::Baseline,
            SessionPhase::Break,
            SessionPhase::Block(1),
            SessionPhase::Interstitial,
            SessionPhase::Block(2),
            SessionPhase::Complete,
        ]
    );

    let mut expected = vec![1, 2, 11];
    expected.extend(101..=105);
    expected.extend([3, 12]);
    expected.extend(201..=205);
    assert_eq!(codes(&report.markers), expected);
    assert_eq!(codes(&report.recorded_markers), expected);
    assert!(report.marker_check.is_ok());
    assert!(report.recorded_marker_check.is_ok());
    assert!(report.samples >= expected.len());

    let rows = read_trial_log(&paths.trial_log).unwrap();
    assert_eq!(rows.iter().filter(|r| matches!(r, LogRow::Header)).count(), 1);
    let trials = trial_rows(&rows);
    assert_eq!(trials.len(), 200);
    assert_eq!(report.trials_written, 200);
    assert_eq!(controller.trials_written(), 200);
    assert_eq!(controller.summaries(), report.summaries.as_slice());
    for block in [1, 2] {
        let count = trials
            .iter()
            .filter(|r| matches!(r, LogRow::Trial { block: b, .. } if *b == block))
            .count();
        assert_eq!(count, 100);
    }
    for row in &trials {
        let LogRow::Trial {
            response,
            is_correct,
            reaction_time,
            ..
        } = row
        else {
            unreachable!()
        };
        assert_eq!(response.is_some(), is_correct.is_some());
        assert!(reaction_time.unwrap() >= 0.0);
    }

    let summaries = summary_rows(&rows);
    assert_eq!(summaries.len(), 2);
    for (row, block) in summaries.iter().zip([1, 2]) {
        match row {
            LogRow::Summary {
                block: b,
                partial,
                correct,
                total,
                accuracy,
                ..
            } => {
                assert_eq!(*b, block);
                assert!(!partial);
                assert_eq!((*correct, *total), (100, 100));
                assert_eq!(*accuracy, 100.0);
            }
            _ => unreachable!(),
        }
    }

    assert!(paths.signal.exists());
    assert!(paths.markers.exists());
    let record = metadata(&paths);
    assert_eq!(record.outcome, "completed");
    assert_eq!(record.trials, 200);
    assert_eq!(codes(&record.markers), expected);
}

#[test]
fn timed_phases_count_down_once_per_second() {
    let board = Arc::new(SyntheticBoard::default());
    let (_dir, _paths, mut controller) = controller(board, small_config(), |p| p);
    controller.run().unwrap();

    let baseline = SessionPhase::Baseline.label();
    let shown: Vec<u64> = controller
        .context()
        .presenter
        .frames()
        .iter()
        .filter_map(|f| match f {
            Frame::Countdown { label, secs } if *label == baseline => Some(*secs),
            _ => None,
        })
        .collect();
    assert_eq!(shown, vec![3, 2, 1]);
}

#[test]
fn accuracy_reflects_the_answers_given() {
    let board = Arc::new(SyntheticBoard::default());
    let (_dir, paths, mut controller) = controller(board, small_config(), |mut p| {
        // Answers outside a trial are ignored.
        p.queue(InputEvent::Classify(true));
        p.queue(InputEvent::Other);
        p.answering(ScriptedAnswer::Incorrect)
    });
    let report = controller.run().unwrap();

    assert_eq!(report.trials_written, 12);
    assert_eq!(report.summaries.len(), 2);
    assert!(report.summaries.iter().all(|s| s.total == 6 && s.correct == 0));
    let rows = read_trial_log(&paths.trial_log).unwrap();
    assert!(trial_rows(&rows).iter().all(|r| matches!(
        r,
        LogRow::Trial {
            is_correct: Some(false),
            ..
        }
    )));
    let first_round: Vec<_> = trial_rows(&rows)
        .into_iter()
        .filter(|r| matches!(r, LogRow::Trial { block: 1, round: 1, .. }))
        .collect();
    assert_eq!(first_round.len(), 3);
}

#[test]
fn cancelling_mid_round_keeps_scored_trials_and_a_partial_summary() {
    let board = Arc::new(SyntheticBoard::default());
    let (_dir, paths, mut controller) =
        controller(board, fast_config(), |p| p.cancel_after_stimuli(47));
    let report = controller.run().unwrap();

    assert_eq!(
        report.outcome,
        SessionOutcome::Aborted {
            reason: AbortReason::Cancelled,
            during: SessionPhase::Block(1),
        }
    );
    assert_eq!(report.phases.last(), Some(&SessionPhase::Aborted));
    assert_eq!(codes(&report.markers), vec![1, 2, 11, 101, 102, 103]);
    assert!(report.marker_check.is_ok());
    assert!(report.recorded_marker_check.is_ok());

    let rows = read_trial_log(&paths.trial_log).unwrap();
    let trials = trial_rows(&rows);
    assert_eq!(trials.len(), 47);
    assert!(trials.len() < 100);
    assert!(trials.iter().all(|r| matches!(
        r,
        LogRow::Trial {
            block: 1,
            response: Some(_),
            reaction_time: Some(_),
            is_correct: Some(_),
            ..
        }
    )));
    match summary_rows(&rows).as_slice() {
        [LogRow::Summary {
            block: 1,
            partial: true,
            total: 47,
            ..
        }] => {}
        other => panic!("expected one partial summary, got {other:?}"),
    }
    assert!(metadata(&paths).outcome.starts_with("aborted (cancelled)"));
}

#[test]
fn cancelling_during_baseline_stops_before_any_trial() {
    let board = Arc::new(SyntheticBoard::default());
    let (_dir, paths, mut controller) =
        controller(board, fast_config(), |p| p.cancel_at(Duration::from_secs(3)));
    let report = controller.run().unwrap();

    assert_eq!(
        report.outcome,
        SessionOutcome::Aborted {
            reason: AbortReason::Cancelled,
            during: SessionPhase::Baseline,
        }
    );
    assert_eq!(codes(&report.markers), vec![MarkerCode::BASELINE_START.0]);
    assert_eq!(report.trials_written, 0);
    assert!(report.summaries.is_empty());
    assert!(!paths.trial_log.exists());
    assert!(paths.signal.exists());
    assert!(paths.metadata.exists());
}

/// Synthetic board whose reads can be made to fail from the test.
struct SwitchableBoard {
    inner: SyntheticBoard,
    broken: AtomicBool,
}

impl BoardDriver for SwitchableBoard {
    fn prepare(&self) -> Result<(), DeviceError> {
        self.inner.prepare()
    }
    fn start_stream(&self) -> Result<(), DeviceError> {
        self.inner.start_stream()
    }
    fn read_available(&self) -> Result<Option<Array2<f64>>, DeviceError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(DeviceError::Stream("cable pulled".into()));
        }
        self.inner.read_available()
    }
    fn insert_marker(&self, code: MarkerCode) -> Result<(), DeviceError> {
        self.inner.insert_marker(code)
    }
    fn channel_layout(&self) -> ChannelLayout {
        self.inner.channel_layout()
    }
    fn stop_stream(&self) -> Result<(), DeviceError> {
        self.inner.stop_stream()
    }
    fn release(&self) -> Result<(), DeviceError> {
        self.inner.release()
    }
}

#[test]
fn device_failure_aborts_and_still_persists() {
    let board = Arc::new(SwitchableBoard {
        inner: SyntheticBoard::default(),
        broken: AtomicBool::new(false),
    });
    let (_dir, paths, mut controller) =
        controller(Arc::clone(&board), fast_config(), |p| p.silent_after_stimuli(4));
    controller.start().unwrap();

    let mut ticks = 0;
    while !(controller.context().presenter.stimuli_shown() == 5
        && controller.current_trial_state() == Some(TrialState::AwaitingResponse))
    {
        controller.tick();
        ticks += 1;
        assert!(ticks < 10_000, "never reached the fifth trial");
    }
    board.broken.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(200));

    assert_eq!(controller.tick(), SessionPhase::Aborted);
    assert_eq!(
        controller.outcome(),
        Some(SessionOutcome::Aborted {
            reason: AbortReason::DeviceFailure,
            during: SessionPhase::Block(1),
        })
    );
    let err = controller.teardown().unwrap_err();
    assert!(matches!(err, ExperimentError::Device(DeviceError::Stream(_))));

    let rows = read_trial_log(&paths.trial_log).unwrap();
    assert_eq!(trial_rows(&rows).len(), 4);
    assert!(matches!(
        summary_rows(&rows).as_slice(),
        [LogRow::Summary {
            partial: true,
            total: 4,
            ..
        }]
    ));
    assert!(paths.signal.exists());
    assert!(metadata(&paths).outcome.starts_with("aborted (device failure)"));
}

#[test]
fn unavailable_device_fails_before_anything_is_written() {
    let board = Arc::new(SyntheticBoard::new(SyntheticConfig {
        unavailable: true,
        ..Default::default()
    }));
    let (_dir, paths, mut controller) = controller(board, fast_config(), |p| p);
    let err = controller.run().unwrap_err();
    assert!(matches!(err, ExperimentError::Device(DeviceError::Unavailable(_))));
    assert_eq!(controller.current_phase(), SessionPhase::Idle);
    assert!(!paths.trial_log.parent().unwrap().exists());
}

#[test]
fn invalid_config_is_rejected_before_the_board_is_touched() {
    let board = Arc::new(SyntheticBoard::default());
    let dir = TempDir::new().unwrap();
    let timer = ManualTimer::new();
    let ctx = SessionContext::new(
        Arc::clone(&board),
        ScriptedPresenter::new(timer.clone()),
        PersistenceWriter::new(ArtifactPaths::in_dir(dir.path())),
    );
    let config = ExperimentConfig {
        trials_per_round: 0,
        ..Default::default()
    };
    let result = ExperimentController::new(
        config,
        SessionIdentity::new("42", 1).unwrap(),
        ctx,
        timer,
        StdRng::seed_from_u64(1),
    );
    assert!(matches!(result, Err(ConfigError::Zero("trials_per_round"))));
    assert_eq!(board.reads(), 0);
}

#[test]
fn unrepresentable_phase_length_is_rejected_before_streaming() {
    let board = Arc::new(SyntheticBoard::default());
    let dir = TempDir::new().unwrap();
    let timer = ManualTimer::new();
    let ctx = SessionContext::new(
        Arc::clone(&board),
        ScriptedPresenter::new(timer.clone()),
        PersistenceWriter::new(ArtifactPaths::in_dir(dir.path())),
    );
    let config = ExperimentConfig {
        baseline_ms: u64::MAX,
        ..fast_config()
    };
    let result = ExperimentController::new(
        config,
        SessionIdentity::new("42", 1).unwrap(),
        ctx,
        timer,
        StdRng::seed_from_u64(1),
    );
    assert!(matches!(result, Err(ConfigError::DurationTooLong("baseline_ms", u64::MAX))));
    assert_eq!(board.reads(), 0);
}

#[test]
fn longest_allowed_phase_runs_until_cancelled() {
    let board = Arc::new(SyntheticBoard::default());
    let config = ExperimentConfig {
        baseline_ms: u64::MAX / 1_000_000,
        ..fast_config()
    };
    let (_dir, paths, mut controller) =
        controller(board, config, |p| p.cancel_at(Duration::from_secs(5)));
    let report = controller.run().unwrap();

    assert_eq!(
        report.outcome,
        SessionOutcome::Aborted {
            reason: AbortReason::Cancelled,
            during: SessionPhase::Baseline,
        }
    );
    assert_eq!(codes(&report.markers), vec![1]);
    assert!(paths.metadata.exists());
}
