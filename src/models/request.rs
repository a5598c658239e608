use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::violation::{SecurityLevel, SecurityViolation};

/// A caller-submitted template plus its variable map and requested
/// strictness. Borrowed read-only during validation; the sanitized copy is
/// what executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub template: String,
    pub variables: HashMap<String, String>,
    pub requested_level: SecurityLevel,
}

impl ExecutionRequest {
    pub fn new(
        template: impl Into<String>,
        variables: HashMap<String, String>,
        requested_level: SecurityLevel,
    ) -> Self {
        Self {
            template: template.into(),
            variables,
            requested_level,
        }
    }
}

/// Template content after variable substitution and stripping, paired with
/// the violations produced while deriving it.
#[derive(Debug, Clone)]
pub struct SanitizedPayload {
    pub content: String,
    pub violations: Vec<SecurityViolation>,
}
