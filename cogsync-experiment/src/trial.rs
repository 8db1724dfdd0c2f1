use chrono::Local;
use cogsync_core::{ColorWord, TrialError, TrialRecord, TrialState};
use std::time::Duration;

/// Timer readings (ns) taken while a trial is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialTimestamps {
    pub presented: u64,
    pub response: Option<u64>,
}

/// The trial currently on screen.
#[derive(Debug, Clone)]
pub struct ActiveTrial {
    pub stimulus: ColorWord,
    pub record: TrialRecord,
    pub state: TrialState,
    pub timestamps: TrialTimestamps,
}

impl ActiveTrial {
    pub fn new(block: u32, round: u32, index: u32, stimulus: ColorWord, now_ns: u64) -> Self {
        Self {
            record: TrialRecord::presented(block, round, index, &stimulus, Local::now()),
            stimulus,
            state: TrialState::Presented,
            timestamps: TrialTimestamps {
                presented: now_ns,
                response: None,
            },
        }
    }

    /// The stimulus is on screen and input is now counted.
    pub fn await_response(&mut self) {
        if self.state == TrialState::Presented {
            self.state = TrialState::AwaitingResponse;
        }
    }

    /// Scores the answer. Returns whether it was correct.
    pub fn respond(&mut self, response: bool, now_ns: u64) -> Result<bool, TrialError> {
        let rt = Duration::from_nanos(now_ns.saturating_sub(self.timestamps.presented));
        let correct = self.record.score(response, rt)?;
        self.timestamps.response = Some(now_ns);
        self.state = TrialState::Scored;
        Ok(correct)
    }

    pub fn into_record(self) -> TrialRecord {
        self.record
    }
}
