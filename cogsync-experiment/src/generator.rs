use crate::error::GeneratorError;
use cogsync_core::{ColorSpec, ColorWord};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How many of a round's trials are congruent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Half congruent, the odd trial incongruent.
    Balanced,
    /// Congruent count drawn uniformly from `0..=total`.
    #[default]
    UniformRandom,
}

impl SplitPolicy {
    fn congruent_count<R: Rng + ?Sized>(self, total: usize, rng: &mut R) -> usize {
        match self {
            SplitPolicy::Balanced => total / 2,
            SplitPolicy::UniformRandom => rng.random_range(0..=total),
        }
    }
}

/// Builds one round of shuffled stimuli. Keeps no state between calls.
pub fn generate_trials<R: Rng + ?Sized>(
    total: usize,
    colors: &[ColorSpec],
    policy: SplitPolicy,
    rng: &mut R,
) -> Result<Vec<ColorWord>, GeneratorError> {
    if colors.len() < 2 {
        return Err(GeneratorError::TooFewColors(colors.len()));
    }
    let congruent = policy.congruent_count(total, rng);
    let mut trials = Vec::with_capacity(total);
    for _ in 0..congruent {
        let color = &colors[rng.random_range(0..colors.len())];
        trials.push(ColorWord::congruent(color));
    }
    for _ in congruent..total {
        let word = rng.random_range(0..colors.len());
        // Pick among the other colors by skipping over the word's own index.
        let mut ink = rng.random_range(0..colors.len() - 1);
        if ink >= word {
            ink += 1;
        }
        trials.push(ColorWord::incongruent(&colors[word], &colors[ink]));
    }
    trials.shuffle(rng);
    Ok(trials)
}
