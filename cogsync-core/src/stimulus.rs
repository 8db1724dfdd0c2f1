use serde::{Deserialize, Serialize};

/// A named color the task can show, both as a word and as ink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSpec {
    pub name: String,
    pub rgb: [u8; 3],
}

impl ColorSpec {
    pub fn new(name: impl Into<String>, rgb: [u8; 3]) -> Self {
        Self {
            name: name.into(),
            rgb,
        }
    }

    /// The palette used in the field study.
    pub fn default_palette() -> Vec<ColorSpec> {
        vec![
            ColorSpec::new("RED", [255, 0, 0]),
            ColorSpec::new("GREEN", [0, 255, 0]),
            ColorSpec::new("BLUE", [0, 0, 255]),
            ColorSpec::new("YELLOW", [200, 200, 0]),
        ]
    }
}

/// A color word rendered in some ink color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorWord {
    pub word: String,
    pub color: ColorSpec,
    pub is_match: bool,
}

impl ColorWord {
    pub fn congruent(color: &ColorSpec) -> Self {
        Self {
            word: color.name.clone(),
            color: color.clone(),
            is_match: true,
        }
    }

    pub fn incongruent(word: &ColorSpec, ink: &ColorSpec) -> Self {
        Self {
            word: word.name.clone(),
            color: ink.clone(),
            is_match: false,
        }
    }
}
