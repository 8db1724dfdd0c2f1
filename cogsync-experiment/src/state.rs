use crate::config::{ExperimentConfig, SessionIdentity};
use crate::error::{ConfigError, ExperimentError};
use crate::generator::generate_trials;
use crate::presenter::{InputEvent, Presenter};
use crate::session::{AbortReason, SessionContext, SessionOutcome, SessionReport};
use crate::trial::ActiveTrial;
use chrono::{DateTime, Local};
use cogsync_acquisition::{
    AcquisitionWorker, BoardDriver, DeviceError, MarkerChannel, StreamAggregator, WorkerHandle,
    WorkerStats,
};
use cogsync_core::{
    BlockSummary, ColorWord, MarkerCode, Phase, SessionPhase, TrialRecord, TrialState,
    verify_sequence,
};
use cogsync_store::SessionRecord;
use cogsync_timing::Timer;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    PhaseEntered,
    AnnouncementElapsed,
    PhaseElapsed,
    RoundAnnounced,
    InterTrialElapsed,
    Input(InputEvent),
}

/// Where the controller is inside the current phase. Deadlines are timer ns.
#[derive(Debug)]
enum Step {
    Enter,
    Announce { until: u64 },
    Countdown { until: u64, shown: Option<u64> },
    RoundAnnounce { until: u64 },
    Trial(ActiveTrial),
    InterTrial { until: u64 },
    Done,
}

#[derive(Debug)]
struct BlockProgress {
    block: u32,
    started: u64,
    round: u32,
    stimuli: VecDeque<ColorWord>,
    next_index: u32,
    scored: Vec<TrialRecord>,
}

impl BlockProgress {
    fn new(block: u32, started: u64) -> Self {
        Self {
            block,
            started,
            round: 0,
            stimuli: VecDeque::new(),
            next_index: 0,
            scored: Vec::new(),
        }
    }
}

/// Deadline `d` after `now`, pinned to the end of the clock instead of wrapping.
fn deadline(now: u64, d: Duration) -> u64 {
    now.saturating_add(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Drives one session from `Idle` to `Complete` or `Aborted`, one tick at a time.
///
/// The controller owns the consumer side of acquisition. Every tick checks the
/// worker, drains the queue, advances the phase machine and then waits at most
/// one tick interval for participant input.
pub struct ExperimentController<B, P, T, R>
where
    B: BoardDriver + 'static,
    P: Presenter,
    T: Timer,
    R: Rng,
{
    pub phase: SessionPhase,
    config: ExperimentConfig,
    identity: SessionIdentity,
    ctx: SessionContext<B, P>,
    timer: T,
    rng: R,
    step: Step,
    block: Option<BlockProgress>,
    markers: MarkerChannel<B>,
    worker: Option<WorkerHandle>,
    aggregator: Option<StreamAggregator>,
    /// Scored trials not yet in the log.
    pending: Vec<TrialRecord>,
    trials_written: usize,
    summaries: Vec<BlockSummary>,
    phases: Vec<SessionPhase>,
    outcome: Option<SessionOutcome>,
    failure: Option<ExperimentError>,
    worker_stats: Option<WorkerStats>,
    started_at: Option<DateTime<Local>>,
}

impl<B, P, T, R> ExperimentController<B, P, T, R>
where
    B: BoardDriver + 'static,
    P: Presenter,
    T: Timer,
    R: Rng,
{
    pub fn new(
        config: ExperimentConfig,
        identity: SessionIdentity,
        ctx: SessionContext<B, P>,
        timer: T,
        rng: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            phase: SessionPhase::Idle,
            markers: MarkerChannel::new(Arc::clone(&ctx.board)),
            config,
            identity,
            ctx,
            timer,
            rng,
            step: Step::Done,
            block: None,
            worker: None,
            aggregator: None,
            pending: Vec::new(),
            trials_written: 0,
            summaries: Vec::new(),
            phases: Vec::new(),
            outcome: None,
            failure: None,
            worker_stats: None,
            started_at: None,
        })
    }

    /// Prepares the board, starts streaming and spawns the acquisition worker.
    /// Nothing is persisted when this fails.
    pub fn start(&mut self) -> Result<(), ExperimentError> {
        if self.phase != SessionPhase::Idle {
            return Ok(());
        }
        let board = Arc::clone(&self.ctx.board);
        board.prepare()?;
        if let Err(err) = board.start_stream() {
            self.shutdown_board();
            return Err(err.into());
        }
        let handle = match AcquisitionWorker::spawn(Arc::clone(&board), self.config.worker_config())
        {
            Ok(handle) => handle,
            Err(err) => {
                self.shutdown_board();
                return Err(err.into());
            }
        };
        self.aggregator = Some(StreamAggregator::new(
            handle.receiver(),
            &board.channel_layout(),
        ));
        self.worker = Some(handle);
        self.started_at = Some(Local::now());
        info!(
            subject = %self.identity.subject_id,
            session = self.identity.session_id,
            "session started"
        );
        self.enter(SessionPhase::Baseline);
        Ok(())
    }

    /// Runs the whole session and tears it down.
    pub fn run(&mut self) -> Result<SessionReport, ExperimentError> {
        self.start()?;
        while !self.phase.is_terminal() {
            self.tick();
        }
        self.teardown()
    }

    /// Advances the machine by one step.
    pub fn tick(&mut self) -> SessionPhase {
        let began = self.timer.now();
        self.check_worker();
        self.drain();
        if self.phase.is_terminal() || self.phase == SessionPhase::Idle {
            return self.phase;
        }

        for event in self.update() {
            self.handle_event(event);
            if self.phase.is_terminal() {
                break;
            }
        }
        if !self.phase.is_terminal() {
            let wait = self.wait_budget();
            if let Some(input) = self.ctx.presenter.poll_input(wait) {
                self.handle_event(ExperimentEvent::Input(input));
            }
        }

        let elapsed = self.timer.elapsed(began);
        self.timer.record_tick(elapsed);
        self.phase
    }

    /// Time-driven events that are due now.
    pub fn update(&mut self) -> Vec<ExperimentEvent> {
        let now = self.timer.now();
        let mut events = Vec::new();
        match &mut self.step {
            Step::Enter => events.push(ExperimentEvent::PhaseEntered),
            Step::Announce { until } if now >= *until => {
                events.push(ExperimentEvent::AnnouncementElapsed)
            }
            Step::Countdown { until, .. } if now >= *until => {
                events.push(ExperimentEvent::PhaseElapsed)
            }
            Step::Countdown { until, shown } => {
                let secs = Duration::from_nanos(*until - now).as_secs_f64().ceil() as u64;
                if *shown != Some(secs) {
                    *shown = Some(secs);
                    self.ctx
                        .presenter
                        .show_countdown(&self.phase.label(), Duration::from_secs(secs));
                }
            }
            Step::RoundAnnounce { until } if now >= *until => {
                events.push(ExperimentEvent::RoundAnnounced)
            }
            Step::InterTrial { until } if now >= *until => {
                events.push(ExperimentEvent::InterTrialElapsed)
            }
            _ => {}
        }
        events
    }

    pub fn handle_event(&mut self, event: ExperimentEvent) {
        match event {
            ExperimentEvent::PhaseEntered => self.announce_phase(),
            ExperimentEvent::AnnouncementElapsed => self.begin_phase(),
            ExperimentEvent::PhaseElapsed => self.advance_phase(),
            ExperimentEvent::RoundAnnounced => self.begin_round(),
            ExperimentEvent::InterTrialElapsed => self.present_next(),
            ExperimentEvent::Input(InputEvent::Cancel) => {
                info!(phase = ?self.phase, "cancel requested");
                self.abort(AbortReason::Cancelled);
            }
            ExperimentEvent::Input(InputEvent::Classify(answer)) => self.record_response(answer),
            ExperimentEvent::Input(InputEvent::Other) => debug!("ignored input"),
        }
    }

    fn enter(&mut self, phase: SessionPhase) {
        info!(phase = ?phase, label = %phase.label(), "phase entered");
        self.phase = phase;
        self.phases.push(phase);
        self.step = Step::Enter;
    }

    fn announce_phase(&mut self) {
        let text = match self.phase {
            SessionPhase::Block(_) => format!(
                "{}\n\nPress F if the word names its own color, J if it does not.\nGet ready...",
                self.phase.label()
            ),
            _ => format!("{} is about to start.\nGet ready...", self.phase.label()),
        };
        self.ctx.presenter.show_message(&text);
        self.step = Step::Announce {
            until: deadline(self.timer.now(), self.config.announce()),
        };
    }

    fn begin_phase(&mut self) {
        let Some(code) = self.phase.start_marker() else {
            return;
        };
        if !self.insert_marker(code) {
            return;
        }
        let now = self.timer.now();
        match self.phase.block_number() {
            Some(block) => {
                self.block = Some(BlockProgress::new(block, now));
                self.announce_round();
            }
            None => {
                self.step = Step::Countdown {
                    until: deadline(now, self.config.phase_duration(self.phase)),
                    shown: None,
                };
            }
        }
    }

    fn advance_phase(&mut self) {
        match self.phase.next() {
            Some(SessionPhase::Complete) => {
                self.phase = SessionPhase::Complete;
                self.phases.push(SessionPhase::Complete);
                self.outcome = Some(SessionOutcome::Completed);
                self.step = Step::Done;
                info!("session complete");
            }
            Some(next) => self.enter(next),
            None => {}
        }
    }

    fn announce_round(&mut self) {
        let Some(progress) = self.block.as_mut() else {
            return;
        };
        progress.round += 1;
        let text = format!(
            "Round {} of {}",
            progress.round, self.config.rounds_per_block
        );
        self.ctx.presenter.show_message(&text);
        self.step = Step::RoundAnnounce {
            until: deadline(self.timer.now(), self.config.announce()),
        };
    }

    fn begin_round(&mut self) {
        let Some((block, round)) = self.block.as_ref().map(|p| (p.block, p.round)) else {
            return;
        };
        if !self.insert_marker(MarkerCode::round_start(block, round)) {
            return;
        }
        match generate_trials(
            self.config.trials_per_round as usize,
            &self.config.colors,
            self.config.split_policy,
            &mut self.rng,
        ) {
            Ok(stimuli) => {
                let congruent = stimuli.iter().filter(|s| s.is_match).count();
                debug!(block, round, trials = stimuli.len(), congruent, "round generated");
                if let Some(progress) = self.block.as_mut() {
                    progress.stimuli = stimuli.into();
                    progress.next_index = 0;
                }
                self.present_next();
            }
            Err(err) => {
                error!(%err, "could not generate round");
                self.fail(AbortReason::GeneratorFailure, err.into());
            }
        }
    }

    /// Shows the next stimulus of the round, or closes the round when none is left.
    fn present_next(&mut self) {
        let Some(progress) = self.block.as_mut() else {
            return;
        };
        match progress.stimuli.pop_front() {
            Some(stimulus) => {
                let index = progress.next_index;
                progress.next_index += 1;
                self.ctx
                    .presenter
                    .show_stimulus(&stimulus, progress.round, index + 1);
                let mut trial = ActiveTrial::new(
                    progress.block,
                    progress.round,
                    index,
                    stimulus,
                    self.timer.now(),
                );
                trial.await_response();
                self.step = Step::Trial(trial);
            }
            None => self.finish_round(),
        }
    }

    fn record_response(&mut self, answer: bool) {
        let now = self.timer.now();
        let Step::Trial(trial) = &mut self.step else {
            debug!(answer, "response outside a trial ignored");
            return;
        };
        if trial.state != TrialState::AwaitingResponse {
            return;
        }
        match trial.respond(answer, now) {
            Ok(correct) => debug!(
                word = %trial.stimulus.word,
                color = %trial.stimulus.color.name,
                answer,
                correct,
                rt_ms = trial.record.reaction_time.map(|rt| rt.as_secs_f64() * 1000.0),
                "trial scored"
            ),
            Err(err) => {
                warn!(%err, "response rejected");
                return;
            }
        }
        let pause = Step::InterTrial {
            until: deadline(now, self.config.inter_trial()),
        };
        let Step::Trial(trial) = std::mem::replace(&mut self.step, pause) else {
            return;
        };
        let record = trial.into_record();
        if let Some(progress) = self.block.as_mut() {
            progress.scored.push(record.clone());
        }
        self.pending.push(record);
        self.ctx.presenter.clear();
    }

    fn finish_round(&mut self) {
        if !self.flush_pending() {
            return;
        }
        let round = self.block.as_ref().map_or(0, |p| p.round);
        info!(phase = ?self.phase, round, "round finished");
        if round < self.config.rounds_per_block {
            self.announce_round();
        } else {
            self.finish_block();
        }
    }

    fn finish_block(&mut self) {
        let Some(progress) = self.block.take() else {
            return;
        };
        let duration = self.timer.elapsed(progress.started);
        let summary = BlockSummary::from_trials(progress.block, &progress.scored, duration, false);
        info!(
            block = summary.block,
            accuracy = summary.accuracy,
            duration_s = duration.as_secs_f64(),
            "block finished"
        );
        let written = self.ctx.writer.append_summary(&summary);
        self.summaries.push(summary);
        match written {
            Ok(()) => self.advance_phase(),
            Err(err) => {
                error!(%err, "failed to write block summary");
                self.fail(AbortReason::StorageFailure, err.into());
            }
        }
    }

    /// Appends every scored trial not yet in the log. Returns false on failure.
    fn flush_pending(&mut self) -> bool {
        if self.pending.is_empty() {
            return true;
        }
        match self.ctx.writer.append_trials(&self.pending) {
            Ok(written) => {
                self.trials_written += written;
                self.pending.clear();
                true
            }
            Err(err) => {
                error!(%err, pending = self.pending.len(), "failed to append trials");
                self.fail(AbortReason::StorageFailure, err.into());
                false
            }
        }
    }

    fn insert_marker(&mut self, code: MarkerCode) -> bool {
        match self.markers.insert(code) {
            Ok(_) => true,
            Err(err) => {
                error!(%err, code = code.0, "marker insertion failed");
                self.fail(AbortReason::DeviceFailure, err.into());
                false
            }
        }
    }

    /// A worker that exits without being asked to has failed.
    fn check_worker(&mut self) {
        let failed = self
            .worker
            .as_ref()
            .is_some_and(|w| w.is_finished() && !w.stop_requested());
        if !failed {
            return;
        }
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        let err = match worker.join() {
            Err(err) => err,
            Ok(stats) => {
                self.worker_stats = Some(stats);
                DeviceError::Stream("acquisition worker exited unexpectedly".into())
            }
        };
        error!(%err, "acquisition worker failed");
        self.drain();
        self.fail(AbortReason::DeviceFailure, err.into());
    }

    fn drain(&mut self) {
        if let Some(aggregator) = self.aggregator.as_mut() {
            aggregator.drain();
        }
    }

    fn wait_budget(&self) -> Duration {
        let tick = self.config.tick();
        let until = match &self.step {
            Step::Announce { until }
            | Step::Countdown { until, .. }
            | Step::RoundAnnounce { until }
            | Step::InterTrial { until } => *until,
            Step::Trial(_) => return tick,
            Step::Enter | Step::Done => return Duration::ZERO,
        };
        Duration::from_nanos(until.saturating_sub(self.timer.now())).min(tick)
    }

    fn fail(&mut self, reason: AbortReason, err: ExperimentError) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        self.abort(reason);
    }

    fn abort(&mut self, reason: AbortReason) {
        if self.phase.is_terminal() {
            return;
        }
        warn!(?reason, phase = ?self.phase, "session aborted");
        self.outcome = Some(SessionOutcome::Aborted {
            reason,
            during: self.phase,
        });
        self.phase = SessionPhase::Aborted;
        self.phases.push(SessionPhase::Aborted);
        self.step = Step::Done;
    }

    /// Stops the worker, keeping the queue drained so its last push cannot block.
    fn stop_worker(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        worker.request_stop();
        while !worker.is_finished() {
            self.drain();
            thread::sleep(Duration::from_millis(1));
        }
        match worker.join() {
            Ok(stats) => {
                info!(
                    polls = stats.polls,
                    batches = stats.batches,
                    samples = stats.samples,
                    backpressure_waits = stats.backpressure_waits,
                    "acquisition worker stopped"
                );
                self.worker_stats = Some(stats);
            }
            Err(err) => {
                error!(%err, "acquisition worker failed while stopping");
                if self.failure.is_none() {
                    self.failure = Some(err.into());
                }
            }
        }
        self.drain();
    }

    fn shutdown_board(&self) {
        if let Err(err) = self.ctx.board.stop_stream() {
            error!(%err, "failed to stop stream");
        }
        if let Err(err) = self.ctx.board.release() {
            error!(%err, "failed to release board");
        }
    }

    /// Persists whatever the session produced and releases the board.
    ///
    /// Every artifact is attempted even after an earlier one failed. The first
    /// failure of the session, device or storage, is returned after everything
    /// else has been written.
    pub fn teardown(&mut self) -> Result<SessionReport, ExperimentError> {
        if !self.phase.is_terminal() {
            self.abort(AbortReason::Cancelled);
        }
        let outcome = self.outcome.unwrap_or(SessionOutcome::Aborted {
            reason: AbortReason::Cancelled,
            during: self.phase,
        });
        info!(%outcome, "tearing down session");
        self.ctx.presenter.clear();
        self.stop_worker();

        self.flush_pending();
        if let Some(progress) = self.block.take() {
            let duration = self.timer.elapsed(progress.started);
            let summary =
                BlockSummary::from_trials(progress.block, &progress.scored, duration, true);
            if let Err(err) = self.ctx.writer.append_summary(&summary) {
                error!(%err, block = summary.block, "failed to write partial summary");
                self.failure.get_or_insert(err.into());
            }
            self.summaries.push(summary);
        }

        let buffer = self.aggregator.take().map(StreamAggregator::into_buffer);
        let samples = buffer.as_ref().map_or(0, |b| b.len());
        if let Some(buffer) = &buffer {
            if let Err(err) = self.ctx.writer.write_signal_artifacts(buffer) {
                error!(%err, "failed to write signal artifacts");
                self.failure.get_or_insert(err.into());
            }
        }

        let expected = self.config.expected_markers();
        let complete = outcome.is_complete();
        let recorded_markers = buffer.map(|b| b.marker_events()).unwrap_or_default();
        let marker_check = self.markers.verify(&expected, complete);
        let recorded_marker_check = verify_sequence(&recorded_markers, &expected, complete);
        if let Err(err) = &marker_check {
            error!(%err, "inserted markers do not follow the protocol");
        }
        if let Err(err) = &recorded_marker_check {
            error!(%err, "recorded marker channel does not follow the protocol");
        }

        if self.started_at.is_some() {
            self.shutdown_board();
        }

        let finished_at = Local::now();
        let record = SessionRecord {
            subject_id: self.identity.subject_id.clone(),
            session_id: self.identity.session_id,
            outcome: outcome.to_string(),
            phases: self.phases.clone(),
            markers: self.markers.events().to_vec(),
            recorded_markers: recorded_markers.clone(),
            summaries: self.summaries.clone(),
            trials: self.trials_written,
            samples,
            started_at: self.started_at.unwrap_or(finished_at),
            finished_at,
        };
        if let Err(err) = self.ctx.writer.write_session_metadata(&record) {
            error!(%err, "failed to write session metadata");
            self.failure.get_or_insert(err.into());
        }

        let tick_stats = self.timer.tick_stats();
        info!(
            ticks = tick_stats.ticks,
            avg_tick_ms = tick_stats.average_tick_ns / 1e6,
            jitter_ms = tick_stats.jitter_ns / 1e6,
            max_tick_ms = tick_stats.max_tick_ns / 1e6,
            trials = self.trials_written,
            samples,
            "session finished"
        );

        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        Ok(SessionReport {
            outcome,
            phases: self.phases.clone(),
            trials_written: self.trials_written,
            summaries: self.summaries.clone(),
            samples,
            markers: self.markers.events().to_vec(),
            recorded_markers,
            marker_check,
            recorded_marker_check,
            worker_stats: self.worker_stats.clone(),
            tick_stats,
            artifacts: self.ctx.writer.paths().clone(),
        })
    }

    pub fn current_phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current_trial_state(&self) -> Option<TrialState> {
        match &self.step {
            Step::Trial(trial) => Some(trial.state),
            _ => None,
        }
    }

    pub fn trials_written(&self) -> usize {
        self.trials_written
    }

    pub fn summaries(&self) -> &[BlockSummary] {
        &self.summaries
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    pub fn context(&self) -> &SessionContext<B, P> {
        &self.ctx
    }
}
