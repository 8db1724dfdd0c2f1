use cogsync_acquisition::DeviceError;
use cogsync_store::StoreError;
use thiserror::Error;

/// Rejected before any device or file is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("subject id must not be empty")]
    EmptySubject,
    #[error("subject id {0:?} contains a path separator")]
    InvalidSubject(String),
    #[error("session id {0:?} is not a non-negative integer")]
    InvalidSession(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{0} of {1} ms is too long")]
    DurationTooLong(&'static str, u64),
    #[error("rounds_per_block must be below 100, got {0}")]
    TooManyRounds(u32),
    #[error("at least two colors are needed, got {0}")]
    TooFewColors(usize),
    #[error("color {0:?} is listed twice")]
    DuplicateColor(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("incongruent trials need at least two colors, got {0}")]
    TooFewColors(usize),
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
}
