use serde::{Deserialize, Serialize};

use crate::models::null_as_default;
use crate::scoring::ats::{FormatFlag, ScoreBreakdown};

/// Model-assigned relevance of one past role to the target job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleRelevance {
    HighlyRelevant,
    SomewhatRelevant,
    NotRelevant,
}

impl RoleRelevance {
    /// Normalized contribution to `experience_relevance` (0 – 100).
    pub fn points(self) -> f64 {
        match self {
            RoleRelevance::HighlyRelevant => 100.0,
            RoleRelevance::SomewhatRelevant => 50.0,
            RoleRelevance::NotRelevant => 0.0,
        }
    }
}

/// Priority of a skill gap. An omitted priority is treated as `Important`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GapPriority {
    Critical,
    #[default]
    Important,
    NiceToHave,
}

impl GapPriority {
    /// Normalized contribution to `skills_coverage` (0 – 100).
    /// A nice-to-have gap does not reduce coverage.
    pub fn points(self) -> f64 {
        match self {
            GapPriority::Critical => 0.0,
            GapPriority::Important => 50.0,
            GapPriority::NiceToHave => 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub keyword: String,
    pub jd_mentions: u32,
    pub cv_mentions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssessment {
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    pub relevance: RoleRelevance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillGap {
    pub skill: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: GapPriority,
}

// ────────────────────────────────────────────────────────────────────────────
// Wire shape returned by the model for the analyze stage
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RawKeywordAnalysis {
    pub matched_keywords: Vec<KeywordMatch>,
    pub missing_critical: Vec<String>,
    #[serde(default)]
    pub missing_nice_to_have: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExperienceAnalysis {
    pub relevant_roles: Vec<RoleAssessment>,
}

/// Analysis payload as the model produced it, after contract validation.
/// Keywords are not yet reconciled against the source texts and the score is
/// the model's own claim.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAnalysis {
    pub ats_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    pub keyword_analysis: RawKeywordAnalysis,
    pub experience_analysis: RawExperienceAnalysis,
    #[serde(default)]
    pub skill_gaps: Vec<SkillGap>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub optimization_priorities: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Validated artifact
// ────────────────────────────────────────────────────────────────────────────

/// Output of the analyze stage. Immutable once produced.
///
/// `ats_score` is always the deterministic recomputation from `score_breakdown`;
/// the model's claimed number is kept in `model_ats_score` for transparency only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAnalysis {
    pub ats_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub model_ats_score: f64,
    pub summary: String,
    pub matched_keywords: Vec<KeywordMatch>,
    pub missing_critical: Vec<String>,
    pub missing_nice_to_have: Vec<String>,
    pub relevant_roles: Vec<RoleAssessment>,
    pub skill_gaps: Vec<SkillGap>,
    pub format_flags: Vec<FormatFlag>,
    pub strengths: Vec<String>,
    pub recommendations: Vec<String>,
    pub optimization_priorities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_relevance_serde_uses_screaming_case() {
        let r: RoleRelevance = serde_json::from_str(r#""SOMEWHAT_RELEVANT""#).unwrap();
        assert_eq!(r, RoleRelevance::SomewhatRelevant);
        assert_eq!(
            serde_json::to_string(&RoleRelevance::HighlyRelevant).unwrap(),
            r#""HIGHLY_RELEVANT""#
        );
    }

    #[test]
    fn test_skill_gap_without_priority_defaults_to_important() {
        let gap: SkillGap = serde_json::from_str(r#"{"skill": "Kafka"}"#).unwrap();
        assert_eq!(gap.priority, GapPriority::Important);
    }

    #[test]
    fn test_nice_to_have_serde_name() {
        let p: GapPriority = serde_json::from_str(r#""NICE_TO_HAVE""#).unwrap();
        assert_eq!(p, GapPriority::NiceToHave);
    }

    #[test]
    fn test_raw_analysis_optional_sections_default_empty() {
        let json = r#"{
            "ats_score": 64,
            "keyword_analysis": {
                "matched_keywords": [{"keyword": "Rust", "jd_mentions": 2, "cv_mentions": 1}],
                "missing_critical": ["Kafka"]
            },
            "experience_analysis": {
                "relevant_roles": [{"title": "Backend Engineer", "relevance": "HIGHLY_RELEVANT"}]
            }
        }"#;
        let raw: RawAnalysis = serde_json::from_str(json).unwrap();
        assert!(raw.keyword_analysis.missing_nice_to_have.is_empty());
        assert!(raw.skill_gaps.is_empty());
        assert!(raw.summary.is_empty());
        assert_eq!(raw.experience_analysis.relevant_roles[0].company, None);
    }
}
