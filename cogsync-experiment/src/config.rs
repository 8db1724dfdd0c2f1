use crate::error::ConfigError;
use crate::generator::SplitPolicy;
use cogsync_acquisition::WorkerConfig;
use cogsync_core::{ColorSpec, MarkerCode, SessionPhase, protocol_markers};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Longest duration whose nanosecond count still fits the timer's `u64` clock.
const MAX_DURATION_MS: u64 = u64::MAX / 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub baseline_ms: u64,
    pub break_ms: u64,
    pub interstitial_ms: u64,
    /// "Get ready" screen shown before every phase and round.
    pub announce_ms: u64,
    pub inter_trial_ms: u64,
    pub rounds_per_block: u32,
    pub trials_per_round: u32,
    pub split_policy: SplitPolicy,
    pub colors: Vec<ColorSpec>,
    /// Upper bound on how long one controller tick waits for input.
    pub tick_ms: u64,
    pub poll_interval_ms: u64,
    pub queue_capacity: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            baseline_ms: 10_000,
            break_ms: 10_000,
            interstitial_ms: 10_000,
            announce_ms: 2_000,
            inter_trial_ms: 100,
            rounds_per_block: 5,
            trials_per_round: 20,
            split_policy: SplitPolicy::default(),
            colors: ColorSpec::default_palette(),
            tick_ms: 50,
            poll_interval_ms: 100,
            queue_capacity: 1024,
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rounds_per_block == 0 {
            return Err(ConfigError::Zero("rounds_per_block"));
        }
        // Round markers are 100 * block + round.
        if self.rounds_per_block >= 100 {
            return Err(ConfigError::TooManyRounds(self.rounds_per_block));
        }
        if self.trials_per_round == 0 {
            return Err(ConfigError::Zero("trials_per_round"));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Zero("tick_ms"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("poll_interval_ms"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        for (name, ms) in [
            ("baseline_ms", self.baseline_ms),
            ("break_ms", self.break_ms),
            ("interstitial_ms", self.interstitial_ms),
            ("announce_ms", self.announce_ms),
            ("inter_trial_ms", self.inter_trial_ms),
            ("tick_ms", self.tick_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ] {
            if ms > MAX_DURATION_MS {
                return Err(ConfigError::DurationTooLong(name, ms));
            }
        }
        if self.colors.len() < 2 {
            return Err(ConfigError::TooFewColors(self.colors.len()));
        }
        let mut seen = HashSet::new();
        for color in &self.colors {
            if !seen.insert(color.name.as_str()) {
                return Err(ConfigError::DuplicateColor(color.name.clone()));
            }
        }
        Ok(())
    }

    /// Countdown length of a timed phase. Zero for anything else.
    pub fn phase_duration(&self, phase: SessionPhase) -> Duration {
        let ms = match phase {
            SessionPhase::Baseline => self.baseline_ms,
            SessionPhase::Break => self.break_ms,
            SessionPhase::Interstitial => self.interstitial_ms,
            _ => 0,
        };
        Duration::from_millis(ms)
    }

    pub fn announce(&self) -> Duration {
        Duration::from_millis(self.announce_ms)
    }

    pub fn inter_trial(&self) -> Duration {
        Duration::from_millis(self.inter_trial_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn trials_per_block(&self) -> usize {
        self.rounds_per_block as usize * self.trials_per_round as usize
    }

    pub fn expected_markers(&self) -> Vec<MarkerCode> {
        protocol_markers(self.rounds_per_block)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            queue_capacity: self.queue_capacity,
        }
    }
}

/// Who is being recorded, and which of their sessions this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub subject_id: String,
    pub session_id: u32,
}

impl SessionIdentity {
    pub fn new(subject_id: impl Into<String>, session_id: u32) -> Result<Self, ConfigError> {
        let subject_id = subject_id.into().trim().to_string();
        if subject_id.is_empty() {
            return Err(ConfigError::EmptySubject);
        }
        if subject_id.contains(['/', '\\']) {
            return Err(ConfigError::InvalidSubject(subject_id));
        }
        Ok(Self {
            subject_id,
            session_id,
        })
    }

    /// Parses the raw strings an operator typed in.
    pub fn parse(subject: &str, session: &str) -> Result<Self, ConfigError> {
        let digits = session.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidSession(session.to_string()));
        }
        let session_id = digits
            .parse()
            .map_err(|_| ConfigError::InvalidSession(session.to_string()))?;
        Self::new(subject, session_id)
    }

    pub fn dir_name(&self) -> String {
        format!("subject_{}_session_{}", self.subject_id, self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.trials_per_block(), 100);
        assert_eq!(config.expected_markers().len(), 15);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = ExperimentConfig::from_toml_str(
            r#"
            rounds_per_block = 2
            trials_per_round = 4
            split_policy = "balanced"

            [[colors]]
            name = "RED"
            rgb = [255, 0, 0]

            [[colors]]
            name = "BLUE"
            rgb = [0, 0, 255]
            "#,
        )
        .unwrap();
        assert_eq!(config.trials_per_block(), 8);
        assert_eq!(config.split_policy, SplitPolicy::Balanced);
        assert_eq!(config.colors.len(), 2);
        assert_eq!(config.baseline_ms, 10_000);
    }

    #[test]
    fn rejects_degenerate_settings() {
        let zero_trials = ExperimentConfig {
            trials_per_round: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_trials.validate(),
            Err(ConfigError::Zero("trials_per_round"))
        ));

        let one_color = ExperimentConfig {
            colors: vec![ColorSpec::new("RED", [255, 0, 0])],
            ..Default::default()
        };
        assert!(matches!(
            one_color.validate(),
            Err(ConfigError::TooFewColors(1))
        ));

        let mut twice = ExperimentConfig::default();
        twice.colors.push(ColorSpec::new("RED", [250, 0, 0]));
        assert!(matches!(
            twice.validate(),
            Err(ConfigError::DuplicateColor(name)) if name == "RED"
        ));

        let endless = ExperimentConfig {
            baseline_ms: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(
            endless.validate(),
            Err(ConfigError::DurationTooLong("baseline_ms", u64::MAX))
        ));
        let longest = ExperimentConfig {
            inter_trial_ms: MAX_DURATION_MS,
            ..Default::default()
        };
        longest.validate().unwrap();
    }

    #[test]
    fn unparsable_toml_is_a_config_error() {
        assert!(matches!(
            ExperimentConfig::from_toml_str("rounds_per_block = \"five\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn identity_parsing() {
        let id = SessionIdentity::parse(" 42 ", "1").unwrap();
        assert_eq!(id.subject_id, "42");
        assert_eq!(id.dir_name(), "subject_42_session_1");
        assert!(matches!(
            SessionIdentity::parse("", "1"),
            Err(ConfigError::EmptySubject)
        ));
        assert!(matches!(
            SessionIdentity::parse("42", "-1"),
            Err(ConfigError::InvalidSession(_))
        ));
        assert!(matches!(
            SessionIdentity::parse("42", "+1"),
            Err(ConfigError::InvalidSession(_))
        ));
        assert!(matches!(
            SessionIdentity::parse("42", "99999999999"),
            Err(ConfigError::InvalidSession(_))
        ));
        assert!(matches!(
            SessionIdentity::parse("../x", "1"),
            Err(ConfigError::InvalidSubject(_))
        ));
    }
}
