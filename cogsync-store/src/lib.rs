pub mod error;
pub mod record;
pub mod writer;

pub use error::StoreError;
pub use record::SessionRecord;
pub use writer::{ArtifactPaths, LogRow, PersistenceWriter, TRIAL_HEADER, read_trial_log};
