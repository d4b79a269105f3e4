//! Analyze stage — JD/CV match analysis.
//!
//! The model supplies keyword lists and categorical labels. Before anything is
//! stored, keyword lists are reconciled against the actual texts and the ATS
//! score is recomputed deterministically; the model's own score is kept only
//! as `model_ats_score`.

use std::collections::HashSet;

use crate::generation::Sampling;
use crate::models::analysis::{KeywordMatch, MatchAnalysis, RawAnalysis, RawKeywordAnalysis};
use crate::models::profile::{CandidateProfile, JobDescription};
use crate::scoring::ats::{detect_format_flags, AtsScorer, ScoreInputs};

/// Lower temperature for structured output.
pub const SAMPLING: Sampling = Sampling {
    temperature: 0.5,
    max_output_tokens: 2500,
};

pub fn user_message(jd: &JobDescription, cv: &CandidateProfile) -> String {
    format!(
        "**JOB DESCRIPTION:**\n{}\n\n**CANDIDATE CV:**\n{}\n",
        jd.text(),
        cv.text()
    )
}

/// Keyword lists after reconciliation. Every matched keyword occurs in both
/// texts; every missing keyword occurs in the JD and not in the CV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledKeywords {
    pub matched: Vec<KeywordMatch>,
    pub missing_critical: Vec<String>,
    pub missing_nice_to_have: Vec<String>,
}

impl ReconciledKeywords {
    /// Size of the case-insensitive union of reconciled keywords found in the JD.
    pub fn jd_keyword_count(&self) -> usize {
        self.matched.len() + self.missing_critical.len() + self.missing_nice_to_have.len()
    }
}

#[derive(Clone, Copy)]
enum Claim {
    Matched,
    Critical,
    NiceToHave,
}

pub fn reconcile_keywords(
    raw: &RawKeywordAnalysis,
    jd: &JobDescription,
    cv: &CandidateProfile,
) -> ReconciledKeywords {
    let claims = raw
        .matched_keywords
        .iter()
        .map(|m| (m.keyword.as_str(), Claim::Matched))
        .chain(raw.missing_critical.iter().map(|k| (k.as_str(), Claim::Critical)))
        .chain(
            raw.missing_nice_to_have
                .iter()
                .map(|k| (k.as_str(), Claim::NiceToHave)),
        );

    let mut seen = HashSet::new();
    let mut out = ReconciledKeywords::default();

    for (keyword, claim) in claims {
        let keyword = keyword.trim();
        if keyword.is_empty() || !seen.insert(keyword.to_lowercase()) {
            continue;
        }
        let jd_mentions = jd.mentions(keyword);
        if jd_mentions == 0 {
            continue;
        }
        let cv_mentions = cv.mentions(keyword);
        if cv_mentions > 0 {
            out.matched.push(KeywordMatch {
                keyword: keyword.to_string(),
                jd_mentions,
                cv_mentions,
            });
            continue;
        }
        match claim {
            Claim::Matched | Claim::Critical => out.missing_critical.push(keyword.to_string()),
            Claim::NiceToHave => out.missing_nice_to_have.push(keyword.to_string()),
        }
    }

    out
}

/// Turns the validated payload into the stored artifact.
pub fn finalize(
    raw: RawAnalysis,
    jd: &JobDescription,
    cv: &CandidateProfile,
    scorer: &AtsScorer,
) -> MatchAnalysis {
    let keywords = reconcile_keywords(&raw.keyword_analysis, jd, cv);
    let relevant_roles = raw.experience_analysis.relevant_roles;
    let skill_gaps: Vec<_> = raw
        .skill_gaps
        .into_iter()
        .filter(|g| !g.skill.trim().is_empty())
        .collect();
    let format_flags = detect_format_flags(cv.text());

    let role_labels: Vec<_> = relevant_roles.iter().map(|r| r.relevance).collect();
    let gap_priorities: Vec<_> = skill_gaps.iter().map(|g| g.priority).collect();
    let score = scorer.score(&ScoreInputs {
        matched_keywords: keywords.matched.len(),
        jd_keywords: keywords.jd_keyword_count(),
        role_labels: &role_labels,
        gap_priorities: &gap_priorities,
        format_flags: &format_flags,
    });

    MatchAnalysis {
        ats_score: score.total,
        score_breakdown: score.breakdown,
        model_ats_score: raw.ats_score,
        summary: raw.summary,
        matched_keywords: keywords.matched,
        missing_critical: keywords.missing_critical,
        missing_nice_to_have: keywords.missing_nice_to_have,
        relevant_roles,
        skill_gaps,
        format_flags,
        strengths: raw.strengths,
        recommendations: raw.recommendations,
        optimization_priorities: raw.optimization_priorities,
    }
}
