use crate::error::SequenceError;
use crate::phase::SessionPhase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Synchronization code written into the device's marker channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerCode(pub u32);

impl MarkerCode {
    pub const BASELINE_START: Self = Self(1);
    pub const BREAK_START: Self = Self(2);
    pub const INTERSTITIAL_START: Self = Self(3);

    pub const fn block_start(block: u32) -> Self {
        Self(10 + block)
    }

    /// Rounds are numbered from 1 and must stay below 100.
    pub const fn round_start(block: u32, round: u32) -> Self {
        Self(100 * block + round)
    }

    /// The value as stored in a floating point marker channel.
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }

    /// Recovers a code from a marker channel sample. Zero means "no marker".
    pub fn from_sample(value: f64) -> Option<Self> {
        if value > 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
            Some(Self(value as u32))
        } else {
            None
        }
    }
}

impl fmt::Display for MarkerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One marker as seen on the acquisition clock (UNIX seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerEvent {
    pub code: MarkerCode,
    pub time: f64,
}

/// Ordered marker codes a completed session must produce.
pub fn protocol_markers(rounds_per_block: u32) -> Vec<MarkerCode> {
    let mut codes = Vec::new();
    for phase in SessionPhase::sequence() {
        if let Some(code) = phase.start_marker() {
            codes.push(code);
        }
        if let Some(block) = phase.block_number() {
            codes.extend((1..=rounds_per_block).map(|round| MarkerCode::round_start(block, round)));
        }
    }
    codes
}

/// Checks recorded markers against the protocol.
///
/// With `require_complete` unset, a strict prefix of `expected` is accepted, which is
/// what an aborted session leaves behind.
pub fn verify_sequence(
    recorded: &[MarkerEvent],
    expected: &[MarkerCode],
    require_complete: bool,
) -> Result<(), SequenceError> {
    for (position, event) in recorded.iter().enumerate() {
        match expected.get(position) {
            Some(&code) if code == event.code => {}
            Some(&code) => {
                return Err(SequenceError::Mismatch {
                    position,
                    expected: code,
                    found: event.code,
                });
            }
            None => {
                return Err(SequenceError::Unexpected {
                    position,
                    found: event.code,
                });
            }
        }
        if position > 0 && event.time < recorded[position - 1].time {
            return Err(SequenceError::OutOfOrder {
                position,
                time: event.time,
            });
        }
    }
    if require_complete && recorded.len() < expected.len() {
        return Err(SequenceError::Missing {
            missing: expected.len() - recorded.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(codes: &[u32]) -> Vec<MarkerEvent> {
        codes
            .iter()
            .enumerate()
            .map(|(i, &c)| MarkerEvent {
                code: MarkerCode(c),
                time: 1_700_000_000.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn protocol_for_five_rounds() {
        let codes: Vec<u32> = protocol_markers(5).into_iter().map(|c| c.0).collect();
        assert_eq!(
            codes,
            vec![1, 2, 11, 101, 102, 103, 104, 105, 3, 12, 201, 202, 203, 204, 205]
        );
    }

    #[test]
    fn codes_are_unique() {
        let codes = protocol_markers(12);
        let mut sorted = codes.clone();
        sorted.sort_by_key(|c| c.0);
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn sample_values_round_trip_only_for_positive_integers() {
        assert_eq!(MarkerCode::from_sample(103.0), Some(MarkerCode(103)));
        assert_eq!(MarkerCode::from_sample(0.0), None);
        assert_eq!(MarkerCode::from_sample(2.5), None);
    }

    #[test]
    fn complete_sequence_verifies() {
        let expected = protocol_markers(2);
        let recorded = events(&[1, 2, 11, 101, 102, 3, 12, 201, 202]);
        assert_eq!(verify_sequence(&recorded, &expected, true), Ok(()));
    }

    #[test]
    fn prefix_is_fine_unless_completion_is_required() {
        let expected = protocol_markers(2);
        let recorded = events(&[1, 2, 11, 101]);
        assert_eq!(verify_sequence(&recorded, &expected, false), Ok(()));
        assert_eq!(
            verify_sequence(&recorded, &expected, true),
            Err(SequenceError::Missing { missing: 5 })
        );
    }

    #[test]
    fn duplicated_marker_is_detected() {
        let expected = protocol_markers(2);
        let recorded = events(&[1, 2, 2, 11]);
        assert_eq!(
            verify_sequence(&recorded, &expected, false),
            Err(SequenceError::Mismatch {
                position: 2,
                expected: MarkerCode(11),
                found: MarkerCode(2),
            })
        );
    }

    #[test]
    fn time_going_backwards_is_detected() {
        let expected = protocol_markers(1);
        let mut recorded = events(&[1, 2]);
        recorded[1].time = recorded[0].time - 0.5;
        assert!(matches!(
            verify_sequence(&recorded, &expected, false),
            Err(SequenceError::OutOfOrder { position: 1, .. })
        ));
    }
}
