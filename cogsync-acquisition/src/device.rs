use crate::error::DeviceError;
use cogsync_core::{ChannelLayout, MarkerCode};
use ndarray::Array2;
use std::time::{SystemTime, UNIX_EPOCH};

/// Capability set the session needs from an acquisition board.
///
/// Methods take `&self`: the worker thread reads while the controller thread
/// inserts markers, so implementations synchronize internally.
pub trait BoardDriver: Send + Sync {
    fn prepare(&self) -> Result<(), DeviceError>;
    fn start_stream(&self) -> Result<(), DeviceError>;

    /// Everything buffered since the previous call, channel-major, or `None` when
    /// nothing new arrived. Must not block for longer than a short bounded wait.
    fn read_available(&self) -> Result<Option<Array2<f64>>, DeviceError>;

    fn insert_marker(&self, code: MarkerCode) -> Result<(), DeviceError>;
    fn channel_layout(&self) -> ChannelLayout;
    fn stop_stream(&self) -> Result<(), DeviceError>;
    fn release(&self) -> Result<(), DeviceError>;
}

/// Wall clock in UNIX seconds, the clock boards stamp samples with.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
