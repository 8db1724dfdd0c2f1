use crate::presenter::Presenter;
use cogsync_acquisition::{BoardDriver, WorkerStats};
use cogsync_core::{BlockSummary, MarkerEvent, SequenceError, SessionPhase};
use cogsync_store::{ArtifactPaths, PersistenceWriter};
use cogsync_timing::TickStats;
use std::fmt;
use std::sync::Arc;

/// The collaborators a session runs against.
pub struct SessionContext<B: BoardDriver, P: Presenter> {
    pub board: Arc<B>,
    pub presenter: P,
    pub writer: PersistenceWriter,
}

impl<B: BoardDriver, P: Presenter> SessionContext<B, P> {
    pub fn new(board: Arc<B>, presenter: P, writer: PersistenceWriter) -> Self {
        Self {
            board,
            presenter,
            writer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    DeviceFailure,
    StorageFailure,
    GeneratorFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Aborted {
        reason: AbortReason,
        /// Phase that was running when the session stopped.
        during: SessionPhase,
    },
}

impl SessionOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, SessionOutcome::Completed)
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Completed => write!(f, "completed"),
            SessionOutcome::Aborted { reason, during } => {
                let reason = match reason {
                    AbortReason::Cancelled => "cancelled",
                    AbortReason::DeviceFailure => "device failure",
                    AbortReason::StorageFailure => "storage failure",
                    AbortReason::GeneratorFailure => "generator failure",
                };
                write!(f, "aborted ({reason}) during {}", during.label())
            }
        }
    }
}

/// What a finished session left behind.
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub phases: Vec<SessionPhase>,
    pub trials_written: usize,
    pub summaries: Vec<BlockSummary>,
    pub samples: usize,
    pub markers: Vec<MarkerEvent>,
    pub recorded_markers: Vec<MarkerEvent>,
    /// Protocol check of the inserted markers, then of the recorded marker channel.
    pub marker_check: Result<(), SequenceError>,
    pub recorded_marker_check: Result<(), SequenceError>,
    pub worker_stats: Option<WorkerStats>,
    pub tick_stats: TickStats,
    pub artifacts: ArtifactPaths,
}
