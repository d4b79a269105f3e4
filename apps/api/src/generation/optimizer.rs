//! Optimize stage — rewrites the CV around the analysis keyword lists.

use std::collections::HashSet;

use crate::generation::Sampling;
use crate::models::analysis::MatchAnalysis;
use crate::models::profile::{CandidateProfile, JobDescription};
use crate::models::resume::OptimizedResume;

/// Moderate temperature for rewriting.
pub const SAMPLING: Sampling = Sampling {
    temperature: 0.6,
    max_output_tokens: 2000,
};

const DEFAULT_FOCUS: &str = "Work the missing keywords into existing experience where the CV supports them.";

pub fn user_message(jd: &JobDescription, cv: &CandidateProfile, analysis: &MatchAnalysis) -> String {
    let matched: Vec<&str> = analysis
        .matched_keywords
        .iter()
        .map(|m| m.keyword.as_str())
        .collect();
    let focus = if analysis.optimization_priorities.is_empty() {
        DEFAULT_FOCUS.to_string()
    } else {
        analysis
            .optimization_priorities
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "**ORIGINAL CV:**\n{cv}\n\n\
         **JOB DESCRIPTION:**\n{jd}\n\n\
         **MATCHED KEYWORDS (keep):**\n{matched}\n\n\
         **MISSING CRITICAL KEYWORDS:**\n{critical}\n\n\
         **MISSING NICE-TO-HAVE KEYWORDS:**\n{nice}\n\n\
         **OPTIMIZATION FOCUS:**\n{focus}\n",
        cv = cv.text(),
        jd = jd.text(),
        matched = list_or_none(&matched),
        critical = list_or_none(&analysis.missing_critical),
        nice = list_or_none(&analysis.missing_nice_to_have),
    )
}

/// Trims skill entries and drops empty and case-insensitive duplicates.
pub fn finalize(mut resume: OptimizedResume) -> OptimizedResume {
    let skills = &mut resume.user_information.skills;
    dedup_skills(&mut skills.hard_skills);
    dedup_skills(&mut skills.soft_skills);
    resume
}

fn dedup_skills(skills: &mut Vec<String>) {
    let mut seen = HashSet::new();
    let kept = std::mem::take(skills)
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect();
    *skills = kept;
}

fn list_or_none<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.iter().map(|s| s.as_ref()).collect::<Vec<&str>>().join(", ")
    }
}
