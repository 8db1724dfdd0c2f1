//! The session itself: configuration, trial generation, the presentation seam and
//! the phase/trial controller that ties acquisition and persistence together.

pub mod config;
pub mod error;
pub mod generator;
pub mod presenter;
pub mod session;
pub mod state;
pub mod trial;

pub use config::{ExperimentConfig, SessionIdentity};
pub use error::{ConfigError, ExperimentError, GeneratorError};
pub use generator::{SplitPolicy, generate_trials};
pub use presenter::{Frame, InputEvent, Presenter, ScriptedAnswer, ScriptedPresenter};
pub use session::{AbortReason, SessionContext, SessionOutcome, SessionReport};
pub use state::{ExperimentController, ExperimentEvent};
pub use trial::{ActiveTrial, TrialTimestamps};
