use chrono::{DateTime, Local};
use cogsync_core::{BlockSummary, MarkerEvent, SessionPhase};
use serde::{Deserialize, Serialize};

/// Session metadata written next to the trial log and signal artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub subject_id: String,
    pub session_id: u32,
    pub outcome: String,
    pub phases: Vec<SessionPhase>,
    /// Markers as written by the controller, on the wall clock.
    pub markers: Vec<MarkerEvent>,
    /// Markers recovered from the recording's marker channel.
    pub recorded_markers: Vec<MarkerEvent>,
    pub summaries: Vec<BlockSummary>,
    pub trials: usize,
    pub samples: usize,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}
