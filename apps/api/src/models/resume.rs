use serde::{Deserialize, Serialize};

use crate::models::null_as_default;

/// Output of the optimize stage.
///
/// CRITICAL: every company, institution, degree and date must appear verbatim
/// in the source CV. The optimize contract rejects payloads that invent any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedResume {
    pub user_information: UserInformation,
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInformation {
    pub name: String,
    pub main_job_title: String,
    pub profile_description: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
    pub experiences: Vec<Experience>,
    pub education: Vec<Education>,
    pub skills: Skills,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub job_title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end_date: String,
    #[serde(default)]
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skills {
    pub hard_skills: Vec<String>,
    pub soft_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
}

impl OptimizedResume {
    /// Top achievement bullets across all experiences, in résumé order.
    pub fn highlights(&self, limit: usize) -> Vec<&str> {
        self.user_information
            .experiences
            .iter()
            .flat_map(|e| e.achievements.iter().map(String::as_str))
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimized_resume_minimal_payload_deserializes() {
        let json = r#"{
            "user_information": {
                "name": "Jane Doe",
                "main_job_title": "Backend Engineer",
                "profile_description": "Builds services.",
                "experiences": [
                    {"job_title": "Engineer", "company": "Acme", "start_date": "2020", "end_date": "2023",
                     "achievements": ["Cut latency 30%", "Led migration"]}
                ],
                "education": [],
                "skills": {"hard_skills": ["Rust"], "soft_skills": []}
            }
        }"#;
        let resume: OptimizedResume = serde_json::from_str(json).unwrap();
        assert!(resume.projects.is_empty());
        assert_eq!(resume.user_information.email, None);
        assert_eq!(resume.highlights(1), vec!["Cut latency 30%"]);
    }

    #[test]
    fn test_missing_company_fails_deserialization() {
        let json = r#"{"job_title": "Engineer", "start_date": "2020"}"#;
        assert!(serde_json::from_str::<Experience>(json).is_err());
    }
}
