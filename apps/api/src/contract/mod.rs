//! Contract enforcement: turns free-text model output into validated structured data.
//!
//! Flow: sanitize (extract balanced JSON) → strip markdown artifacts →
//! validate against the stage contract → deserialize into the stage's wire type.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::models::run::ErrorKind;

pub mod sanitizer;
pub mod schema;

pub use schema::Violation;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("no balanced JSON object found in model output")]
    UnparsableOutput,

    #[error("output violates the stage contract: {}", format_violations(.0))]
    SchemaInvalid(Vec<Violation>),
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::UnparsableOutput => ErrorKind::UnparsableOutput,
            ContractError::SchemaInvalid(_) => ErrorKind::SchemaInvalid,
        }
    }

    /// Violations to quote back to the model in a repair request.
    pub fn violations(&self) -> Vec<Violation> {
        match self {
            ContractError::UnparsableOutput => vec![Violation::new(
                "$",
                "response did not contain a complete JSON object",
            )],
            ContractError::SchemaInvalid(v) => v.clone(),
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs the full contract pipeline over raw model text.
///
/// `validate` returns every violation it finds; an empty list means the payload
/// satisfies the contract. Deserialization errors after a clean validation are
/// reported as a violation too, so callers only ever see the two contract kinds.
pub fn enforce<T, F>(raw: &str, validate: F) -> Result<T, ContractError>
where
    T: DeserializeOwned,
    F: Fn(&Value) -> Vec<Violation>,
{
    let mut payload = sanitizer::parse_payload(raw)?;
    sanitizer::strip_markdown_artifacts(&mut payload);

    let violations = validate(&payload);
    if !violations.is_empty() {
        return Err(ContractError::SchemaInvalid(violations));
    }

    serde_json::from_value(payload)
        .map_err(|e| ContractError::SchemaInvalid(vec![Violation::new("$", e.to_string())]))
}
