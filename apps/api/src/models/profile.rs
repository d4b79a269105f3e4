//! Source documents for a pipeline run: the job description and the candidate CV.
//!
//! Both wrap the raw text together with a derived token list and keyword set.
//! Keyword occurrence is a case-insensitive token-sequence match, so a
//! multi-word keyword such as "distributed systems" only matches a contiguous
//! run of tokens, and "Java" never matches inside "JavaScript".

use std::collections::BTreeSet;
use std::ops::Deref;

/// Very common words excluded from the derived keyword set (not from the token list).
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "our", "the", "to", "we", "will", "with", "you", "your",
];

/// Immutable text plus its derived tokens and deduplicated keyword set.
#[derive(Debug, Clone)]
pub struct SourceText {
    text: String,
    tokens: Vec<String>,
    keywords: BTreeSet<String>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = tokenize(&text);
        let keywords = tokens
            .iter()
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .cloned()
            .collect();
        Self {
            text,
            tokens,
            keywords,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    /// Number of times `keyword` occurs as a contiguous token sequence.
    pub fn mentions(&self, keyword: &str) -> u32 {
        let needle = tokenize(keyword);
        if needle.is_empty() || needle.len() > self.tokens.len() {
            return 0;
        }
        self.tokens
            .windows(needle.len())
            .filter(|window| *window == needle.as_slice())
            .count() as u32
    }

    pub fn contains_keyword(&self, keyword: &str) -> bool {
        self.mentions(keyword) > 0
    }

    /// Exact, case-sensitive substring check against the raw text.
    pub fn contains_verbatim(&self, needle: &str) -> bool {
        !needle.is_empty() && self.text.contains(needle)
    }
}

/// The job description a run optimizes against.
#[derive(Debug, Clone)]
pub struct JobDescription(SourceText);

impl JobDescription {
    pub fn new(text: impl Into<String>) -> Self {
        Self(SourceText::new(text))
    }
}

impl Deref for JobDescription {
    type Target = SourceText;

    fn deref(&self) -> &SourceText {
        &self.0
    }
}

/// The candidate CV. All entities in an optimized résumé must be traceable to this text.
#[derive(Debug, Clone)]
pub struct CandidateProfile(SourceText);

impl CandidateProfile {
    pub fn new(text: impl Into<String>) -> Self {
        Self(SourceText::new(text))
    }
}

impl Deref for CandidateProfile {
    type Target = SourceText;

    fn deref(&self) -> &SourceText {
        &self.0
    }
}

/// Lower-cased tokens. `+` and `#` are token characters (C++, C#) and so is an
/// inner `.` (Node.js); leading and trailing dots are trimmed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '.')))
        .map(|raw| raw.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
