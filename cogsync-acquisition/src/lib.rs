//! Device-side half of a session: the board capability trait, the background
//! acquisition worker, marker insertion and the buffer the controller drains into.

pub mod aggregator;
pub mod device;
pub mod error;
pub mod marker;
pub mod synthetic;
pub mod worker;

pub use aggregator::{SignalBuffer, StreamAggregator};
pub use device::{BoardDriver, unix_now};
pub use error::DeviceError;
pub use marker::MarkerChannel;
pub use synthetic::{SyntheticBoard, SyntheticConfig};
pub use worker::{AcquisitionWorker, WorkerConfig, WorkerHandle, WorkerStats};
