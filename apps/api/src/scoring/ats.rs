//! ATS Scorer — reproducible match score computed from categorical sub-judgments.
//!
//! score = 0.4·keyword_overlap + 0.3·experience_relevance
//!       + 0.2·skills_coverage + 0.1·format_compatibility
//!
//! Every term is normalized to 0 – 100 before weighting. The model only supplies
//! categorical labels (role relevance, gap priority) and keyword lists; the
//! arithmetic is done here, so identical inputs always give an identical score.

use serde::{Deserialize, Serialize};

use crate::models::analysis::{GapPriority, RoleRelevance};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub keyword_overlap: f64,
    pub experience_relevance: f64,
    pub skills_coverage: f64,
    pub format_compatibility: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword_overlap: 0.4,
            experience_relevance: 0.3,
            skills_coverage: 0.2,
            format_compatibility: 0.1,
        }
    }
}

/// The four normalized sub-scores, each in 0 – 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keyword_overlap: f64,
    pub experience_relevance: f64,
    pub skills_coverage: f64,
    pub format_compatibility: f64,
}

impl ScoreBreakdown {
    /// Weighted total, clamped to 0 – 100 and rounded to two decimals.
    pub fn total(&self, weights: &ScoringWeights) -> f64 {
        let raw = weights.keyword_overlap * self.keyword_overlap
            + weights.experience_relevance * self.experience_relevance
            + weights.skills_coverage * self.skills_coverage
            + weights.format_compatibility * self.format_compatibility;
        round2(raw.clamp(0.0, 100.0))
    }
}

/// Structural red flags in the CV text that ATS parsers choke on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFlag {
    /// Pipe/tab delimited rows or box-drawing characters.
    TableLayout,
    /// U+FFFD, left behind by a lossy decode.
    ReplacementCharacters,
    /// `%PDF-` headers or `(cid:NN)` glyph references from a raw PDF dump.
    PdfArtifacts,
    ControlCharacters,
    /// Private-use code points, typically icon-font bullets.
    PrivateUseGlyphs,
}

impl FormatFlag {
    pub fn penalty(self) -> f64 {
        match self {
            FormatFlag::TableLayout => 30.0,
            FormatFlag::ReplacementCharacters => 25.0,
            FormatFlag::PdfArtifacts => 40.0,
            FormatFlag::ControlCharacters => 20.0,
            FormatFlag::PrivateUseGlyphs => 10.0,
        }
    }
}

/// Categorical inputs to the score. Counts refer to the reconciled keyword lists.
#[derive(Debug, Clone)]
pub struct ScoreInputs<'a> {
    pub matched_keywords: usize,
    pub jd_keywords: usize,
    pub role_labels: &'a [RoleRelevance],
    pub gap_priorities: &'a [GapPriority],
    pub format_flags: &'a [FormatFlag],
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtsScore {
    pub total: f64,
    pub breakdown: ScoreBreakdown,
}

/// Pure, side-effect-free scorer.
#[derive(Debug, Clone, Default)]
pub struct AtsScorer {
    weights: ScoringWeights,
}

impl AtsScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score(&self, inputs: &ScoreInputs<'_>) -> AtsScore {
        let breakdown = ScoreBreakdown {
            keyword_overlap: keyword_overlap(inputs.matched_keywords, inputs.jd_keywords),
            experience_relevance: experience_relevance(inputs.role_labels),
            skills_coverage: skills_coverage(inputs.matched_keywords, inputs.gap_priorities),
            format_compatibility: format_compatibility(inputs.format_flags),
        };
        AtsScore {
            total: breakdown.total(&self.weights),
            breakdown,
        }
    }
}

/// `100 · |matched| / |jd_keywords|`; 0 when the JD yielded no keywords.
pub fn keyword_overlap(matched: usize, jd_keywords: usize) -> f64 {
    if jd_keywords == 0 {
        return 0.0;
    }
    (100.0 * matched as f64 / jd_keywords as f64).clamp(0.0, 100.0)
}

/// Mean of per-role labels; 0 when no roles were assessed.
pub fn experience_relevance(labels: &[RoleRelevance]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    labels.iter().map(|l| l.points()).sum::<f64>() / labels.len() as f64
}

/// Mean over matched keywords (100 each) and skill gaps by priority.
pub fn skills_coverage(matched: usize, gaps: &[GapPriority]) -> f64 {
    let assessed = matched + gaps.len();
    if assessed == 0 {
        return 0.0;
    }
    let points = matched as f64 * 100.0 + gaps.iter().map(|g| g.points()).sum::<f64>();
    points / assessed as f64
}

/// 100 minus the penalty of each distinct flag, floored at 0.
pub fn format_compatibility(flags: &[FormatFlag]) -> f64 {
    let mut seen: Vec<FormatFlag> = Vec::new();
    for flag in flags {
        if !seen.contains(flag) {
            seen.push(*flag);
        }
    }
    (100.0 - seen.iter().map(|f| f.penalty()).sum::<f64>()).max(0.0)
}

/// Scans CV text for structural red flags. Each flag is reported once.
pub fn detect_format_flags(cv_text: &str) -> Vec<FormatFlag> {
    let mut flags = Vec::new();

    let table_rows = cv_text
        .lines()
        .filter(|line| line.matches('|').count() >= 2 || line.matches('\t').count() >= 2)
        .count();
    let has_box_drawing = cv_text.chars().any(|c| ('\u{2500}'..='\u{257F}').contains(&c));
    if table_rows >= 2 || has_box_drawing {
        flags.push(FormatFlag::TableLayout);
    }

    if cv_text.contains('\u{FFFD}') {
        flags.push(FormatFlag::ReplacementCharacters);
    }

    if cv_text.contains("%PDF-") || cv_text.contains("(cid:") {
        flags.push(FormatFlag::PdfArtifacts);
    }

    if cv_text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        flags.push(FormatFlag::ControlCharacters);
    }

    if cv_text.chars().any(|c| ('\u{E000}'..='\u{F8FF}').contains(&c)) {
        flags.push(FormatFlag::PrivateUseGlyphs);
    }

    flags
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(
        matched: usize,
        jd: usize,
        roles: &'a [RoleRelevance],
        gaps: &'a [GapPriority],
        flags: &'a [FormatFlag],
    ) -> ScoreInputs<'a> {
        ScoreInputs {
            matched_keywords: matched,
            jd_keywords: jd,
            role_labels: roles,
            gap_priorities: gaps,
            format_flags: flags,
        }
    }

    #[test]
    fn test_perfect_inputs_score_100() {
        let roles = [RoleRelevance::HighlyRelevant];
        let score = AtsScorer::default().score(&inputs(5, 5, &roles, &[], &[]));
        assert_eq!(score.total, 100.0);
        assert_eq!(score.breakdown.format_compatibility, 100.0);
    }

    #[test]
    fn test_weighted_formula_known_values() {
        // keyword 50, experience 75, skills (2×100 + 0 + 50)/4 = 62.5, format 100
        // 0.4·50 + 0.3·75 + 0.2·62.5 + 0.1·100 = 20 + 22.5 + 12.5 + 10 = 65
        let roles = [RoleRelevance::HighlyRelevant, RoleRelevance::SomewhatRelevant];
        let gaps = [GapPriority::Critical, GapPriority::Important];
        let score = AtsScorer::default().score(&inputs(2, 4, &roles, &gaps, &[]));
        assert_eq!(score.breakdown.keyword_overlap, 50.0);
        assert_eq!(score.breakdown.experience_relevance, 75.0);
        assert_eq!(score.breakdown.skills_coverage, 62.5);
        assert_eq!(score.total, 65.0);
    }

    #[test]
    fn test_identical_inputs_give_identical_scores() {
        let roles = [RoleRelevance::SomewhatRelevant, RoleRelevance::NotRelevant];
        let gaps = [GapPriority::NiceToHave, GapPriority::Critical];
        let flags = [FormatFlag::TableLayout];
        let scorer = AtsScorer::default();
        let a = scorer.score(&inputs(3, 7, &roles, &gaps, &flags));
        let b = scorer.score(&inputs(3, 7, &roles, &gaps, &flags));
        assert_eq!(a, b);
    }

    #[test]
    fn test_total_equals_recomputation_from_breakdown() {
        let roles = [RoleRelevance::SomewhatRelevant];
        let gaps = [GapPriority::Important];
        let scorer = AtsScorer::default();
        let score = scorer.score(&inputs(1, 3, &roles, &gaps, &[FormatFlag::PrivateUseGlyphs]));
        assert_eq!(score.total, score.breakdown.total(scorer.weights()));
        assert!((0.0..=100.0).contains(&score.total));
    }

    #[test]
    fn test_empty_inputs_score_only_format() {
        let score = AtsScorer::default().score(&inputs(0, 0, &[], &[], &[]));
        assert_eq!(score.breakdown.keyword_overlap, 0.0);
        assert_eq!(score.breakdown.experience_relevance, 0.0);
        assert_eq!(score.breakdown.skills_coverage, 0.0);
        assert_eq!(score.total, 10.0);
    }

    #[test]
    fn test_format_penalties_floor_at_zero_and_ignore_duplicates() {
        let all = [
            FormatFlag::TableLayout,
            FormatFlag::ReplacementCharacters,
            FormatFlag::PdfArtifacts,
            FormatFlag::ControlCharacters,
            FormatFlag::PrivateUseGlyphs,
        ];
        assert_eq!(format_compatibility(&all), 0.0);
        assert_eq!(
            format_compatibility(&[FormatFlag::TableLayout, FormatFlag::TableLayout]),
            70.0
        );
    }

    #[test]
    fn test_nice_to_have_gap_does_not_reduce_coverage() {
        assert_eq!(skills_coverage(1, &[GapPriority::NiceToHave]), 100.0);
        assert_eq!(skills_coverage(0, &[GapPriority::Critical]), 0.0);
    }

    #[test]
    fn test_clean_cv_has_no_flags() {
        let cv = "Jane Doe\nBackend Engineer at Acme (2019 - 2023)\n- Built Rust services | 40% faster";
        assert!(detect_format_flags(cv).is_empty());
    }

    #[test]
    fn test_detects_pipe_table() {
        let cv = "| Skill | Years |\n|-------|-------|\n| Rust | 5 |";
        assert_eq!(detect_format_flags(cv), vec![FormatFlag::TableLayout]);
    }

    #[test]
    fn test_detects_encoding_markers() {
        let cv = "Experience (cid:123) r\u{FFFD}sum\u{E001} \u{0007}";
        let flags = detect_format_flags(cv);
        assert!(flags.contains(&FormatFlag::PdfArtifacts));
        assert!(flags.contains(&FormatFlag::ReplacementCharacters));
        assert!(flags.contains(&FormatFlag::PrivateUseGlyphs));
        assert!(flags.contains(&FormatFlag::ControlCharacters));
        assert!(!flags.contains(&FormatFlag::TableLayout));
    }

    #[test]
    fn test_box_drawing_counts_as_table() {
        assert_eq!(
            detect_format_flags("┌──────┐\n│ Rust │"),
            vec![FormatFlag::TableLayout]
        );
    }
}
