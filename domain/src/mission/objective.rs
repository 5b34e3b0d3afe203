//! Objective value object

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Upper bound on objective length, in characters.
pub const MAX_OBJECTIVE_CHARS: usize = 4000;

/// The free-text goal a mission is derived from (Value Object)
///
/// Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Objective {
    content: String,
}

impl Objective {
    pub fn parse(content: impl Into<String>) -> Result<Self, DomainError> {
        let content = content.into();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidObjective(
                "objective cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_OBJECTIVE_CHARS {
            return Err(DomainError::InvalidObjective(format!(
                "objective exceeds {} characters",
                MAX_OBJECTIVE_CHARS
            )));
        }
        Ok(Self {
            content: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn into_inner(self) -> String {
        self.content
    }
}

impl std::fmt::Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.content)
    }
}

impl TryFrom<String> for Objective {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Objective::parse(value)
    }
}

impl From<Objective> for String {
    fn from(objective: Objective) -> Self {
        objective.content
    }
}
