//! Schema Validator — structural contracts for each stage's JSON output.
//!
//! Validators collect every violation instead of stopping at the first one, so a
//! single repair request can tell the model everything that is wrong.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::cover_letter::{self, MAX_WORDS, MIN_WORDS};
use crate::models::profile::CandidateProfile;

const ROLE_RELEVANCE_VALUES: &[&str] = &["HIGHLY_RELEVANT", "SOMEWHAT_RELEVANT", "NOT_RELEVANT"];
const GAP_PRIORITY_VALUES: &[&str] = &["CRITICAL", "IMPORTANT", "NICE_TO_HAVE"];

/// A single contract violation, e.g. `keyword_analysis.matched_keywords[2].jd_mentions: expected integer >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stage contracts
// ────────────────────────────────────────────────────────────────────────────

/// Analyze stage contract.
pub fn validate_analysis(payload: &Value) -> Vec<Violation> {
    let mut c = Checker::default();
    let Some(root) = c.object("$", payload) else {
        return c.finish();
    };

    if let Some(score) = c.field(root, "$", "ats_score").and_then(|v| c.number("ats_score", v)) {
        if !(0.0..=100.0).contains(&score) {
            c.push("ats_score", format!("must be between 0 and 100, got {score}"));
        }
    }

    if let Some(kw) = c
        .field(root, "$", "keyword_analysis")
        .and_then(|v| c.object("keyword_analysis", v))
    {
        if let Some(matched) = c
            .field(kw, "keyword_analysis", "matched_keywords")
            .and_then(|v| c.array("keyword_analysis.matched_keywords", v))
        {
            for (i, entry) in matched.iter().enumerate() {
                let path = format!("keyword_analysis.matched_keywords[{i}]");
                if let Some(obj) = c.object(&path, entry) {
                    c.non_empty_string_field(obj, &path, "keyword");
                    c.count_field(obj, &path, "jd_mentions");
                    c.count_field(obj, &path, "cv_mentions");
                }
            }
        }
        c.string_array_field(kw, "keyword_analysis", "missing_critical", true);
        c.string_array_field(kw, "keyword_analysis", "missing_nice_to_have", false);
    }

    if let Some(exp) = c
        .field(root, "$", "experience_analysis")
        .and_then(|v| c.object("experience_analysis", v))
    {
        if let Some(roles) = c
            .field(exp, "experience_analysis", "relevant_roles")
            .and_then(|v| c.array("experience_analysis.relevant_roles", v))
        {
            for (i, role) in roles.iter().enumerate() {
                let path = format!("experience_analysis.relevant_roles[{i}]");
                if let Some(obj) = c.object(&path, role) {
                    c.non_empty_string_field(obj, &path, "title");
                    c.enum_field(obj, &path, "relevance", ROLE_RELEVANCE_VALUES, true);
                }
            }
        }
    }

    if let Some(gaps) = root.get("skill_gaps").and_then(|v| c.array("skill_gaps", v)) {
        for (i, gap) in gaps.iter().enumerate() {
            let path = format!("skill_gaps[{i}]");
            if let Some(obj) = c.object(&path, gap) {
                c.non_empty_string_field(obj, &path, "skill");
                c.enum_field(obj, &path, "priority", GAP_PRIORITY_VALUES, false);
            }
        }
    }

    for optional in ["strengths", "recommendations", "optimization_priorities"] {
        c.string_array_field(root, "$", optional, false);
    }

    c.finish()
}

/// Optimize stage contract, including the no-invented-entities check against the CV.
pub fn validate_optimized_resume(payload: &Value, cv: &CandidateProfile) -> Vec<Violation> {
    let mut c = Checker::default();
    let Some(root) = c.object("$", payload) else {
        return c.finish();
    };

    if let Some(info) = c
        .field(root, "$", "user_information")
        .and_then(|v| c.object("user_information", v))
    {
        for key in ["name", "main_job_title", "profile_description"] {
            c.non_empty_string_field(info, "user_information", key);
        }

        if let Some(experiences) = c
            .field(info, "user_information", "experiences")
            .and_then(|v| c.array("user_information.experiences", v))
        {
            for (i, exp) in experiences.iter().enumerate() {
                let path = format!("user_information.experiences[{i}]");
                if let Some(obj) = c.object(&path, exp) {
                    c.non_empty_string_field(obj, &path, "job_title");
                    if let Some(company) = c.non_empty_string_field(obj, &path, "company") {
                        c.grounded(&path, "company", company, cv);
                    }
                    c.optional_grounded_field(obj, &path, "start_date", cv);
                    c.optional_grounded_field(obj, &path, "end_date", cv);
                    c.string_array_field(obj, &path, "achievements", false);
                }
            }
        }

        if let Some(education) = c
            .field(info, "user_information", "education")
            .and_then(|v| c.array("user_information.education", v))
        {
            for (i, edu) in education.iter().enumerate() {
                let path = format!("user_information.education[{i}]");
                if let Some(obj) = c.object(&path, edu) {
                    for key in ["institution", "degree"] {
                        if let Some(value) = c.non_empty_string_field(obj, &path, key) {
                            c.grounded(&path, key, value, cv);
                        }
                    }
                    c.optional_grounded_field(obj, &path, "start_date", cv);
                    c.optional_grounded_field(obj, &path, "end_date", cv);
                }
            }
        }

        if let Some(skills) = c
            .field(info, "user_information", "skills")
            .and_then(|v| c.object("user_information.skills", v))
        {
            c.string_array_field(skills, "user_information.skills", "hard_skills", true);
            c.string_array_field(skills, "user_information.skills", "soft_skills", true);
        }
    }

    if let Some(projects) = root.get("projects").and_then(|v| c.array("projects", v)) {
        for (i, project) in projects.iter().enumerate() {
            let path = format!("projects[{i}]");
            if let Some(obj) = c.object(&path, project) {
                c.non_empty_string_field(obj, &path, "name");
                c.string_array_field(obj, &path, "technologies", false);
            }
        }
    }

    c.finish()
}

/// Cover-letter stage contract.
pub fn validate_cover_letter(payload: &Value) -> Vec<Violation> {
    let mut c = Checker::default();
    let Some(root) = c.object("$", payload) else {
        return c.finish();
    };

    if let Some(body) = c.non_empty_string_field(root, "$", "cover_letter") {
        let words = cover_letter::word_count(body);
        if !cover_letter::within_bounds(words) {
            c.push(
                "cover_letter",
                format!("must be {MIN_WORDS}-{MAX_WORDS} words, got {words}"),
            );
        }
    }
    c.string_array_field(root, "$", "keywords_used", true);

    c.finish()
}

// ────────────────────────────────────────────────────────────────────────────
// Checker
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }

    fn finish(self) -> Vec<Violation> {
        self.violations
    }

    fn join(parent: &str, key: &str) -> String {
        if parent == "$" {
            key.to_string()
        } else {
            format!("{parent}.{key}")
        }
    }

    fn field<'v>(&mut self, obj: &'v Map<String, Value>, parent: &str, key: &str) -> Option<&'v Value> {
        let value = obj.get(key);
        if value.is_none() {
            self.push(Self::join(parent, key), "required field is missing");
        }
        value
    }

    fn object<'v>(&mut self, path: &str, value: &'v Value) -> Option<&'v Map<String, Value>> {
        let obj = value.as_object();
        if obj.is_none() {
            self.push(path, format!("expected object, got {}", type_name(value)));
        }
        obj
    }

    fn array<'v>(&mut self, path: &str, value: &'v Value) -> Option<&'v Vec<Value>> {
        let arr = value.as_array();
        if arr.is_none() {
            self.push(path, format!("expected array, got {}", type_name(value)));
        }
        arr
    }

    fn number(&mut self, path: &str, value: &Value) -> Option<f64> {
        let n = value.as_f64();
        if n.is_none() {
            self.push(path, format!("expected number, got {}", type_name(value)));
        }
        n
    }

    fn non_empty_string_field<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        parent: &str,
        key: &str,
    ) -> Option<&'v str> {
        let path = Self::join(parent, key);
        match self.field(obj, parent, key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
            Value::String(_) => {
                self.push(path, "must not be empty");
                None
            }
            other => {
                self.push(path, format!("expected string, got {}", type_name(other)));
                None
            }
        }
    }

    fn count_field(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) {
        if let Some(value) = self.field(obj, parent, key) {
            if value.as_u64().is_none() {
                self.push(Self::join(parent, key), "expected integer >= 0");
            }
        }
    }

    fn string_array_field(
        &mut self,
        obj: &Map<String, Value>,
        parent: &str,
        key: &str,
        required: bool,
    ) {
        let path = Self::join(parent, key);
        let value = if required {
            self.field(obj, parent, key)
        } else {
            obj.get(key)
        };
        let Some(items) = value.and_then(|v| self.array(&path, v)) else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            if !item.is_string() {
                self.push(
                    format!("{path}[{i}]"),
                    format!("expected string, got {}", type_name(item)),
                );
            }
        }
    }

    fn enum_field(
        &mut self,
        obj: &Map<String, Value>,
        parent: &str,
        key: &str,
        allowed: &[&str],
        required: bool,
    ) {
        let path = Self::join(parent, key);
        let value = if required {
            self.field(obj, parent, key)
        } else {
            obj.get(key)
        };
        match value {
            None | Some(Value::Null) if !required => {}
            None => {}
            Some(Value::String(s)) if allowed.contains(&s.as_str()) => {}
            Some(other) => self.push(path, format!("must be one of {}, got {other}", allowed.join(" | "))),
        }
    }

    /// Entity must occur verbatim in the CV text.
    fn grounded(&mut self, parent: &str, key: &str, value: &str, cv: &CandidateProfile) {
        if !cv.contains_verbatim(value) {
            self.push(
                Self::join(parent, key),
                format!("'{value}' does not appear verbatim in the source CV"),
            );
        }
    }

    /// Optional string field; when present and non-empty it must be grounded.
    fn optional_grounded_field(
        &mut self,
        obj: &Map<String, Value>,
        parent: &str,
        key: &str,
        cv: &CandidateProfile,
    ) {
        match obj.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.trim().is_empty() => {}
            Some(Value::String(s)) => self.grounded(parent, key, s, cv),
            Some(other) => self.push(
                Self::join(parent, key),
                format!("expected string, got {}", type_name(other)),
            ),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::contract::enforce;
    use crate::models::analysis::{GapPriority, RawAnalysis};
    use crate::models::resume::OptimizedResume;

    fn valid_analysis() -> Value {
        json!({
            "ats_score": 72,
            "keyword_analysis": {
                "matched_keywords": [{"keyword": "Rust", "jd_mentions": 3, "cv_mentions": 2}],
                "missing_critical": ["Kafka"],
                "missing_nice_to_have": []
            },
            "experience_analysis": {
                "relevant_roles": [{"title": "Backend Engineer", "relevance": "HIGHLY_RELEVANT"}]
            },
            "skill_gaps": [{"skill": "Kafka", "priority": "CRITICAL"}, {"skill": "Terraform"}]
        })
    }

    fn cv() -> CandidateProfile {
        CandidateProfile::new(
            "Jane Doe\nBackend Engineer, Acme Corp, Jan 2020 - Present\n\
             BSc Computer Science, University of Leeds, 2015 - 2019",
        )
    }

    fn valid_resume() -> Value {
        json!({
            "user_information": {
                "name": "Jane Doe",
                "main_job_title": "Backend Engineer",
                "profile_description": "Backend engineer focused on reliable services.",
                "experiences": [{
                    "job_title": "Backend Engineer",
                    "company": "Acme Corp",
                    "start_date": "Jan 2020",
                    "end_date": "Present",
                    "achievements": ["Built Rust services"]
                }],
                "education": [{
                    "institution": "University of Leeds",
                    "degree": "BSc Computer Science",
                    "start_date": "2015",
                    "end_date": "2019"
                }],
                "skills": {"hard_skills": ["Rust"], "soft_skills": ["Mentoring"]}
            },
            "projects": [{"name": "ledger", "description": "toy", "technologies": ["Rust"]}]
        })
    }

    fn paths(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.path.as_str()).collect()
    }

    #[test]
    fn test_valid_analysis_has_no_violations() {
        assert!(validate_analysis(&valid_analysis()).is_empty());
    }

    #[test]
    fn test_analysis_score_out_of_range() {
        let mut payload = valid_analysis();
        payload["ats_score"] = json!(130);
        assert_eq!(paths(&validate_analysis(&payload)), vec!["ats_score"]);
    }

    #[test]
    fn test_analysis_score_as_string_is_rejected() {
        let mut payload = valid_analysis();
        payload["ats_score"] = json!("72");
        let violations = validate_analysis(&payload);
        assert_eq!(violations[0].message, "expected number, got string");
    }

    #[test]
    fn test_analysis_collects_every_violation() {
        let payload = json!({
            "keyword_analysis": {
                "matched_keywords": [{"keyword": "", "jd_mentions": -1}],
                "missing_critical": "Kafka"
            },
            "experience_analysis": {"relevant_roles": [{"title": "Dev", "relevance": "VERY"}]}
        });
        let violations = validate_analysis(&payload);
        let p = paths(&violations);
        assert!(p.contains(&"ats_score"));
        assert!(p.contains(&"keyword_analysis.matched_keywords[0].keyword"));
        assert!(p.contains(&"keyword_analysis.matched_keywords[0].jd_mentions"));
        assert!(p.contains(&"keyword_analysis.matched_keywords[0].cv_mentions"));
        assert!(p.contains(&"keyword_analysis.missing_critical"));
        assert!(p.contains(&"experience_analysis.relevant_roles[0].relevance"));
    }

    #[test]
    fn test_analysis_rejects_unknown_gap_priority_but_allows_omitted() {
        let mut payload = valid_analysis();
        payload["skill_gaps"] = json!([{"skill": "Go", "priority": "URGENT"}, {"skill": "Kafka"}]);
        assert_eq!(paths(&validate_analysis(&payload)), vec!["skill_gaps[0].priority"]);
    }

    #[test]
    fn test_non_object_root() {
        let violations = validate_analysis(&json!([1, 2]));
        assert_eq!(violations, vec![Violation::new("$", "expected object, got array")]);
    }

    #[test]
    fn test_valid_resume_has_no_violations() {
        assert!(validate_optimized_resume(&valid_resume(), &cv()).is_empty());
    }

    #[test]
    fn test_invented_company_is_a_violation() {
        let mut payload = valid_resume();
        payload["user_information"]["experiences"][0]["company"] = json!("Globex Corporation");
        let violations = validate_optimized_resume(&payload, &cv());
        assert_eq!(
            paths(&violations),
            vec!["user_information.experiences[0].company"]
        );
        assert!(violations[0].message.contains("Globex Corporation"));
    }

    #[test]
    fn test_invented_institution_degree_and_date_are_violations() {
        let mut payload = valid_resume();
        payload["user_information"]["education"][0]["institution"] = json!("MIT");
        payload["user_information"]["education"][0]["degree"] = json!("PhD Physics");
        payload["user_information"]["education"][0]["end_date"] = json!("2021");
        let violations = validate_optimized_resume(&payload, &cv());
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn test_empty_dates_are_allowed() {
        let mut payload = valid_resume();
        payload["user_information"]["experiences"][0]["end_date"] = json!("");
        payload["user_information"]["experiences"][0]["start_date"] = Value::Null;
        payload["user_information"]["education"][0]["start_date"] = Value::Null;
        payload["projects"][0]["description"] = Value::Null;
        assert!(validate_optimized_resume(&payload, &cv()).is_empty());

        let cv = cv();
        let resume: OptimizedResume =
            enforce(&payload.to_string(), |v: &Value| validate_optimized_resume(v, &cv)).unwrap();
        let info = &resume.user_information;
        assert_eq!(info.experiences[0].start_date, "");
        assert_eq!(info.experiences[0].end_date, "");
        assert_eq!(info.education[0].start_date, "");
        assert_eq!(info.education[0].end_date, "2019");
        assert_eq!(resume.projects[0].description, "");
    }

    #[test]
    fn test_null_priority_and_summary_default_through_enforce() {
        let mut payload = valid_analysis();
        payload["skill_gaps"] = json!([{"skill": "Kafka", "priority": null}]);
        payload["summary"] = Value::Null;
        assert!(validate_analysis(&payload).is_empty());

        let raw: RawAnalysis = enforce(&payload.to_string(), validate_analysis).unwrap();
        assert_eq!(raw.skill_gaps[0].priority, GapPriority::Important);
        assert_eq!(raw.summary, "");
    }

    #[test]
    fn test_resume_missing_skills_lists() {
        let mut payload = valid_resume();
        payload["user_information"]["skills"] = json!({"hard_skills": ["Rust", 5]});
        let p = paths(&validate_optimized_resume(&payload, &cv()))
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        assert!(p.contains(&"user_information.skills.hard_skills[1]".to_string()));
        assert!(p.contains(&"user_information.skills.soft_skills".to_string()));
    }

    #[test]
    fn test_cover_letter_word_bounds() {
        let short = json!({"cover_letter": "Too short.", "keywords_used": []});
        let violations = validate_cover_letter(&short);
        assert_eq!(paths(&violations), vec!["cover_letter"]);
        assert!(violations[0].message.contains("got 2"));

        let body = vec!["word"; 250].join(" ");
        let ok = json!({"cover_letter": body, "keywords_used": ["Rust"]});
        assert!(validate_cover_letter(&ok).is_empty());
    }

    #[test]
    fn test_cover_letter_requires_keyword_list() {
        let body = vec!["word"; 250].join(" ");
        let payload = json!({"cover_letter": body});
        assert_eq!(paths(&validate_cover_letter(&payload)), vec!["keywords_used"]);
    }

    #[test]
    fn test_violation_display() {
        let v = Violation::new("ats_score", "expected number, got string");
        assert_eq!(v.to_string(), "ats_score: expected number, got string");
    }
}
