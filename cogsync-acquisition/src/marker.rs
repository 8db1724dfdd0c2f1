use crate::device::{BoardDriver, unix_now};
use crate::error::DeviceError;
use cogsync_core::{MarkerCode, MarkerEvent, SequenceError, verify_sequence};
use std::sync::Arc;
use tracing::info;

/// Writes phase-transition markers into the board's stream and keeps the log of
/// what was written. `insert` takes `&mut self`, so a channel cannot be driven from
/// two places at once.
pub struct MarkerChannel<B: BoardDriver> {
    board: Arc<B>,
    events: Vec<MarkerEvent>,
}

impl<B: BoardDriver> MarkerChannel<B> {
    pub fn new(board: Arc<B>) -> Self {
        Self {
            board,
            events: Vec::new(),
        }
    }

    pub fn insert(&mut self, code: MarkerCode) -> Result<MarkerEvent, DeviceError> {
        self.board.insert_marker(code)?;
        let event = MarkerEvent {
            code,
            time: unix_now(),
        };
        info!(code = code.0, time = event.time, "marker inserted");
        self.events.push(event);
        Ok(event)
    }

    pub fn events(&self) -> &[MarkerEvent] {
        &self.events
    }

    pub fn codes(&self) -> Vec<MarkerCode> {
        self.events.iter().map(|e| e.code).collect()
    }

    pub fn verify(
        &self,
        expected: &[MarkerCode],
        require_complete: bool,
    ) -> Result<(), SequenceError> {
        verify_sequence(&self.events, expected, require_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticBoard;

    #[test]
    fn logs_each_insert_in_order() {
        let board = Arc::new(SyntheticBoard::default());
        board.prepare().unwrap();
        board.start_stream().unwrap();
        let mut channel = MarkerChannel::new(board);
        for code in [MarkerCode::BASELINE_START, MarkerCode::BREAK_START] {
            channel.insert(code).unwrap();
        }
        assert_eq!(
            channel.codes(),
            vec![MarkerCode::BASELINE_START, MarkerCode::BREAK_START]
        );
        assert!(channel.events()[0].time <= channel.events()[1].time);
        assert!(channel.verify(&cogsync_core::protocol_markers(5), false).is_ok());
    }

    #[test]
    fn failed_insert_is_not_logged() {
        let board = Arc::new(SyntheticBoard::default());
        let mut channel = MarkerChannel::new(board);
        assert!(channel.insert(MarkerCode(1)).is_err());
        assert!(channel.events().is_empty());
    }
}
