// Shared prompt constants, the stage prompt catalog, and the repair message builder.
// Stage-specific user messages live next to each stage in `generation/`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::contract::Violation;
use crate::models::run::Stage;

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to stages that restate facts from the CV.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every company, institution, degree and date you output must be copied \
    verbatim from the candidate CV. Do NOT infer, translate, abbreviate, or invent them. \
    If the CV does not contain a value, leave the field empty.";

const ANALYZE_PROMPT: &str = "\
    You are an ATS (applicant tracking system) analyst. Compare the candidate CV with the \
    job description. Return a JSON object with: ats_score (0-100), summary, \
    keyword_analysis {matched_keywords [{keyword, jd_mentions, cv_mentions}], \
    missing_critical [], missing_nice_to_have []}, experience_analysis {relevant_roles \
    [{title, company, relevance: HIGHLY_RELEVANT | SOMEWHAT_RELEVANT | NOT_RELEVANT}]}, \
    skill_gaps [{skill, priority: CRITICAL | IMPORTANT | NICE_TO_HAVE}], strengths [], \
    recommendations [], optimization_priorities [].";

const OPTIMIZE_PROMPT: &str = "\
    You are a résumé writer optimizing a CV for a specific job. Rewrite the profile \
    description, achievements and skills to naturally include the target keywords. \
    Return a JSON object with: user_information {name, main_job_title, \
    profile_description, email, phone, location, linkedin, github, experiences \
    [{job_title, company, location, start_date, end_date, achievements []}], education \
    [{institution, degree, start_date, end_date}], skills {hard_skills [], soft_skills []}}, \
    projects [{name, description, technologies []}].";

const COVER_LETTER_PROMPT: &str = "\
    You are a cover letter writer. Write a professional cover letter of 200 to 400 words \
    tailored to the job, drawing only on the candidate's real experience. Return a JSON \
    object with: cover_letter (the full letter text) and keywords_used (job keywords the \
    letter contains).";

/// Source of per-stage system prompts.
pub trait PromptStore: Send + Sync {
    fn system_prompt(&self, stage: Stage) -> String;
}

/// Built-in stage prompts, optionally overridden by `<dir>/<stage>.md` files
/// read once at startup.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    prompts: HashMap<Stage, String>,
}

impl PromptCatalog {
    pub fn builtin() -> Self {
        let prompts = Stage::ALL
            .into_iter()
            .map(|stage| (stage, builtin_prompt(stage).to_string()))
            .collect();
        Self { prompts }
    }

    /// Loads overrides from `dir`. Missing or empty files fall back to the built-in prompt.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::builtin();
        for stage in Stage::ALL {
            let path = dir.join(format!("{}.md", stage.as_str()));
            if !path.exists() {
                warn!("Prompt file {} not found, using built-in prompt", path.display());
                continue;
            }
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file {}", path.display()))?;
            if text.trim().is_empty() {
                warn!("Prompt file {} is empty, using built-in prompt", path.display());
                continue;
            }
            info!("Loaded {} prompt from {}", stage, path.display());
            catalog.prompts.insert(stage, text.trim().to_string());
        }
        Ok(catalog)
    }
}

impl PromptStore for PromptCatalog {
    fn system_prompt(&self, stage: Stage) -> String {
        let body = self
            .prompts
            .get(&stage)
            .map(String::as_str)
            .unwrap_or_else(|| builtin_prompt(stage));
        match stage {
            Stage::Optimize | Stage::CoverLetter => {
                format!("{body}\n\n{GROUNDING_INSTRUCTION}\n\n{JSON_ONLY_SYSTEM}")
            }
            Stage::Analyze => format!("{body}\n\n{JSON_ONLY_SYSTEM}"),
        }
    }
}

fn builtin_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::Analyze => ANALYZE_PROMPT,
        Stage::Optimize => OPTIMIZE_PROMPT,
        Stage::CoverLetter => COVER_LETTER_PROMPT,
    }
}

/// User message for the single repair attempt: the original request, the
/// rejected output, and every violation found in it.
pub fn repair_message(original_request: &str, invalid_output: &str, violations: &[Violation]) -> String {
    let listed = violations
        .iter()
        .map(|v| format!("- {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{original_request}\n\n\
         **YOUR PREVIOUS RESPONSE WAS REJECTED:**\n{invalid_output}\n\n\
         **PROBLEMS:**\n{listed}\n\n\
         Return the corrected JSON object only."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_prompts_demand_json() {
        let catalog = PromptCatalog::builtin();
        for stage in Stage::ALL {
            assert!(catalog.system_prompt(stage).ends_with(JSON_ONLY_SYSTEM));
        }
        assert!(catalog
            .system_prompt(Stage::Optimize)
            .contains(GROUNDING_INSTRUCTION));
        assert!(!catalog
            .system_prompt(Stage::Analyze)
            .contains(GROUNDING_INSTRUCTION));
    }

    #[test]
    fn test_from_dir_overrides_present_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("analyze.md"), "Custom analyzer prompt.\n").unwrap();
        std::fs::write(dir.path().join("optimize.md"), "   \n").unwrap();

        let catalog = PromptCatalog::from_dir(dir.path()).unwrap();
        assert!(catalog
            .system_prompt(Stage::Analyze)
            .starts_with("Custom analyzer prompt."));
        assert!(catalog
            .system_prompt(Stage::Optimize)
            .starts_with(OPTIMIZE_PROMPT));
        assert!(catalog
            .system_prompt(Stage::CoverLetter)
            .starts_with(COVER_LETTER_PROMPT));
    }

    #[test]
    fn test_repair_message_lists_every_violation() {
        let msg = repair_message(
            "original",
            "{\"ats_score\": \"high\"}",
            &[
                Violation::new("ats_score", "expected number, got string"),
                Violation::new("keyword_analysis", "required field is missing"),
            ],
        );
        assert!(msg.starts_with("original"));
        assert!(msg.contains("{\"ats_score\": \"high\"}"));
        assert!(msg.contains("- ats_score: expected number, got string"));
        assert!(msg.contains("- keyword_analysis: required field is missing"));
    }
}
