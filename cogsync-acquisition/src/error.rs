use cogsync_core::LayoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The board could not be found, prepared or started.
    #[error("device unavailable: {0}")]
    Unavailable(String),
    /// A read failed while the stream was running.
    #[error("device stream error: {0}")]
    Stream(String),
    #[error("marker insertion failed: {0}")]
    Marker(String),
    #[error("device data does not match its channel layout: {0}")]
    Layout(#[from] LayoutError),
    #[error("acquisition queue consumer disconnected")]
    QueueClosed,
    #[error("failed to spawn acquisition thread: {0}")]
    Thread(#[from] std::io::Error),
}
