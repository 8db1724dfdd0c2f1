use crate::marker::MarkerCode;
use thiserror::Error;

/// Raw device matrix does not match the declared channel layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("channel row {index} is outside the {rows}-row device matrix")]
    MissingRow { index: usize, rows: usize },
    #[error("channel group {group} has {actual} samples, expected {expected}")]
    SampleCount {
        group: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrialError {
    #[error("trial {block}/{round}/{index} already has a response")]
    AlreadyScored { block: u32, round: u32, index: u32 },
}

/// Recorded markers disagree with the protocol sequence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequenceError {
    #[error("marker {position}: expected code {expected}, found {found}")]
    Mismatch {
        position: usize,
        expected: MarkerCode,
        found: MarkerCode,
    },
    #[error("marker {position} (code {found}) is beyond the end of the protocol")]
    Unexpected { position: usize, found: MarkerCode },
    #[error("{missing} protocol markers were never recorded")]
    Missing { missing: usize },
    #[error("marker {position} at t={time} precedes the marker before it")]
    OutOfOrder { position: usize, time: f64 },
}
