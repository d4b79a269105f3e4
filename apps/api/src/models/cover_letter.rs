use std::fmt;

use serde::{Deserialize, Serialize};

/// Contract bounds on the letter body, inclusive.
pub const MIN_WORDS: usize = 200;
pub const MAX_WORDS: usize = 400;

/// Requested register for the letter. Accepts `professional` or `Professional`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    #[serde(alias = "Professional")]
    Professional,
    #[serde(alias = "Enthusiastic")]
    Enthusiastic,
    #[serde(alias = "Formal")]
    Formal,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Professional => "Professional",
            Self::Enthusiastic => "Enthusiastic",
            Self::Formal => "Formal",
        };
        f.write_str(s)
    }
}

/// Cover letter payload as returned by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCoverLetter {
    pub cover_letter: String,
    #[serde(default)]
    pub keywords_used: Vec<String>,
}

/// Output of the optional cover-letter stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverLetter {
    pub body: String,
    /// Recomputed from `body`; the model's own count is ignored.
    pub word_count: usize,
    /// JD keywords the letter actually contains.
    pub keywords_used: Vec<String>,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn within_bounds(words: usize) -> bool {
    (MIN_WORDS..=MAX_WORDS).contains(&words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_ignores_extra_whitespace() {
        assert_eq!(word_count("  Dear   hiring\nmanager,\n\n thanks "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_tone_defaults_to_professional_and_accepts_both_cases() {
        assert_eq!(Tone::default(), Tone::Professional);
        let formal: Tone = serde_json::from_str("\"Formal\"").unwrap();
        let eager: Tone = serde_json::from_str("\"enthusiastic\"").unwrap();
        assert_eq!(formal, Tone::Formal);
        assert_eq!(eager, Tone::Enthusiastic);
        assert_eq!(serde_json::to_string(&Tone::Formal).unwrap(), "\"formal\"");
        assert!(serde_json::from_str::<Tone>("\"casual\"").is_err());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(within_bounds(MIN_WORDS));
        assert!(within_bounds(MAX_WORDS));
        assert!(!within_bounds(MIN_WORDS - 1));
        assert!(!within_bounds(MAX_WORDS + 1));
    }
}
