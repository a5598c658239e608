use std::collections::HashMap;

use crate::models::{SecurityLevel, SecurityViolation, ThreatKind};

const SOURCE: &str = "input_validator";

/// Maximum accepted length for the template and each variable value.
/// Stricter levels impose smaller ceilings.
fn max_input_len(level: SecurityLevel) -> usize {
    match level {
        SecurityLevel::Low => 10_000,
        SecurityLevel::Medium => 5_000,
        SecurityLevel::High => 2_500,
        SecurityLevel::Critical => 1_000,
    }
}

fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Bounds-checks raw template and variable sizes and encodings. Pure; holds
/// no state and is safe to call from any number of concurrent requests.
#[derive(Debug, Default)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        template: &str,
        variables: &HashMap<String, String>,
        level: SecurityLevel,
    ) -> Vec<SecurityViolation> {
        let mut violations = Vec::new();
        let ceiling = max_input_len(level);

        self.check_nul(template, "template", &mut violations);
        if template.len() > ceiling {
            violations.push(SecurityViolation::new(
                ThreatKind::ResourceExhaustion,
                SecurityLevel::High,
                format!(
                    "Template length {} exceeds the {} ceiling of {} chars",
                    template.len(),
                    level,
                    ceiling
                ),
                template,
                SOURCE,
            ));
        }

        for (name, value) in variables {
            if !is_valid_variable_name(name) {
                violations.push(SecurityViolation::new(
                    ThreatKind::CommandInjection,
                    SecurityLevel::Medium,
                    format!("Variable name '{name}' is not a valid identifier"),
                    name,
                    SOURCE,
                ));
            }
            self.check_nul(value, &format!("variable '{name}'"), &mut violations);
            if value.len() > ceiling {
                violations.push(SecurityViolation::new(
                    ThreatKind::ResourceExhaustion,
                    SecurityLevel::High,
                    format!(
                        "Variable '{}' length {} exceeds the {} ceiling of {} chars",
                        name,
                        value.len(),
                        level,
                        ceiling
                    ),
                    value,
                    SOURCE,
                ));
            }
        }

        violations
    }

    // NUL bytes have no legitimate use in shell or path contexts and are a
    // classic truncation-attack vector; flagged at Critical regardless of
    // the configured level.
    fn check_nul(&self, input: &str, location: &str, out: &mut Vec<SecurityViolation>) {
        if input.contains('\0') {
            out.push(SecurityViolation::new(
                ThreatKind::CommandInjection,
                SecurityLevel::Critical,
                format!("NUL byte in {location}"),
                input,
                SOURCE,
            ));
        }
    }
}
