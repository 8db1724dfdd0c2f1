pub mod error;
pub mod marker;
pub mod phase;
pub mod signal;
pub mod stimulus;
pub mod trial;

pub use error::{LayoutError, SequenceError, TrialError};
pub use marker::{MarkerCode, MarkerEvent, protocol_markers, verify_sequence};
pub use phase::{Phase, SessionPhase};
pub use signal::{ChannelLayout, SignalBatch};
pub use stimulus::{ColorSpec, ColorWord};
pub use trial::{BlockSummary, TrialRecord, TrialState};
