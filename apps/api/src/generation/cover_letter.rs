//! Cover-letter stage — optional, runs after a successful optimize stage.

use crate::generation::Sampling;
use crate::models::analysis::MatchAnalysis;
use crate::models::cover_letter::{self, CoverLetter, RawCoverLetter, Tone, MAX_WORDS, MIN_WORDS};
use crate::models::profile::{JobDescription, SourceText};
use crate::models::resume::OptimizedResume;

/// Higher temperature for prose.
pub const SAMPLING: Sampling = Sampling {
    temperature: 0.7,
    max_output_tokens: 1500,
};

const HIGHLIGHT_LIMIT: usize = 5;
const TOP_SKILLS_LIMIT: usize = 8;

pub fn user_message(
    jd: &JobDescription,
    analysis: &MatchAnalysis,
    resume: &OptimizedResume,
    tone: Tone,
) -> String {
    let info = &resume.user_information;
    let skills: Vec<&str> = info
        .skills
        .hard_skills
        .iter()
        .take(TOP_SKILLS_LIMIT)
        .map(String::as_str)
        .collect();
    let highlights = resume
        .highlights(HIGHLIGHT_LIMIT)
        .iter()
        .map(|h| format!("- {h}"))
        .collect::<Vec<_>>()
        .join("\n");
    let keywords: Vec<&str> = analysis
        .matched_keywords
        .iter()
        .map(|m| m.keyword.as_str())
        .collect();

    format!(
        "**CANDIDATE INFORMATION:**\n\
         Name: {name}\n\
         Current Title: {title}\n\
         Location: {location}\n\
         Top Skills: {skills}\n\
         Key Achievements:\n{highlights}\n\n\
         **JOB DESCRIPTION:**\n{jd}\n\n\
         **KEYWORDS TO USE:**\n{keywords}\n\n\
         **TONE:**\n{tone}\n\n\
         **LENGTH:** {MIN_WORDS}-{MAX_WORDS} words\n",
        name = info.name,
        title = info.main_job_title,
        location = info.location.as_deref().unwrap_or("N/A"),
        skills = skills.join(", "),
        jd = jd.text(),
        keywords = keywords.join(", "),
    )
}

/// Recomputes the word count and keeps only JD keywords the letter really contains.
pub fn finalize(raw: RawCoverLetter, jd: &JobDescription) -> CoverLetter {
    let body = raw.cover_letter.trim().to_string();
    let letter = SourceText::new(body.as_str());
    let keywords_used = raw
        .keywords_used
        .into_iter()
        .filter(|k| letter.contains_keyword(k) && jd.contains_keyword(k))
        .collect();

    CoverLetter {
        word_count: cover_letter::word_count(&body),
        body,
        keywords_used,
    }
}
