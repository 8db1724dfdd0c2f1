use crate::error::TrialError;
use crate::stimulus::ColorWord;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trial state machine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Presented,
    AwaitingResponse,
    Scored,
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub block: u32,
    pub round: u32,
    pub index: u32,
    pub word: String,
    pub color: String,
    pub is_match: bool,
    pub response: Option<bool>,
    pub reaction_time: Option<Duration>,
    pub is_correct: Option<bool>,
    pub timestamp: DateTime<Local>,
}

impl TrialRecord {
    pub fn presented(
        block: u32,
        round: u32,
        index: u32,
        stimulus: &ColorWord,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            block,
            round,
            index,
            word: stimulus.word.clone(),
            color: stimulus.color.name.clone(),
            is_match: stimulus.is_match,
            response: None,
            reaction_time: None,
            is_correct: None,
            timestamp,
        }
    }

    /// Records the single response this trial may receive.
    pub fn score(&mut self, response: bool, reaction_time: Duration) -> Result<bool, TrialError> {
        if self.response.is_some() {
            return Err(TrialError::AlreadyScored {
                block: self.block,
                round: self.round,
                index: self.index,
            });
        }
        let correct = response == self.is_match;
        self.response = Some(response);
        self.reaction_time = Some(reaction_time);
        self.is_correct = Some(correct);
        Ok(correct)
    }

    /// Response, reaction time and correctness are all present.
    pub fn is_complete(&self) -> bool {
        self.response.is_some() && self.reaction_time.is_some() && self.is_correct.is_some()
    }
}

/// Derived accuracy row for one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub block: u32,
    pub correct: usize,
    pub total: usize,
    pub accuracy: f64,
    pub duration: Duration,
    pub partial: bool,
}

impl BlockSummary {
    pub fn from_trials(
        block: u32,
        trials: &[TrialRecord],
        duration: Duration,
        partial: bool,
    ) -> Self {
        let scored: Vec<_> = trials
            .iter()
            .filter(|t| t.block == block && t.is_complete())
            .collect();
        let total = scored.len();
        let correct = scored.iter().filter(|t| t.is_correct == Some(true)).count();
        let accuracy = if total > 0 {
            correct as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            block,
            correct,
            total,
            accuracy,
            duration,
            partial,
        }
    }
}
