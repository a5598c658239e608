use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::config::SafetyConfig;
use crate::models::{SanitizedPayload, SecurityLevel, SecurityViolation};

const SOURCE: &str = "template_sanitizer";

/// Substitutes variables into a template at explicit `[NAME]` markers while
/// sweeping both the variable values and the substituted result against the
/// configured dangerous-pattern groups. Matched substrings are stripped, so
/// sanitizing an already-sanitized payload is a no-op.
pub struct TemplateSanitizer {
    config: Arc<SafetyConfig>,
    placeholder: Regex,
}

impl TemplateSanitizer {
    pub fn new(config: Arc<SafetyConfig>) -> Self {
        Self {
            config,
            placeholder: Regex::new(r"\[([A-Za-z_][A-Za-z0-9_]*)\]").expect("placeholder regex"),
        }
    }

    pub fn sanitize(
        &self,
        template: &str,
        variables: &HashMap<String, String>,
    ) -> SanitizedPayload {
        let mut violations = Vec::new();

        let mut sanitized_vars = HashMap::with_capacity(variables.len());
        for (name, value) in variables {
            let cleaned = self.sweep(value, &format!("variable '{name}'"), &mut violations);
            sanitized_vars.insert(name.clone(), cleaned);
        }

        let substituted = self.substitute(template, &sanitized_vars);

        // Second sweep over the assembled result catches injection built by
        // concatenating individually-benign fragments across variables.
        // Matches are stripped here too: leaving them in place would make a
        // second sanitize pass report them again.
        let content = self.sweep(&substituted, "substituted template", &mut violations);

        SanitizedPayload {
            content,
            violations,
        }
    }

    /// Single left-to-right pass. Substituted text is emitted literally and
    /// never rescanned, so a variable value containing `[OTHER]` cannot
    /// trigger second-order expansion. Markers with no matching variable are
    /// left intact.
    fn substitute(&self, template: &str, variables: &HashMap<String, String>) -> String {
        let mut result = String::with_capacity(template.len());
        let mut last = 0;
        for caps in self.placeholder.captures_iter(template) {
            let marker = caps.get(0).expect("group 0 always present");
            result.push_str(&template[last..marker.start()]);
            match variables.get(&caps[1]) {
                Some(value) => result.push_str(value),
                None => result.push_str(marker.as_str()),
            }
            last = marker.end();
        }
        result.push_str(&template[last..]);
        result
    }

    /// Sweep `input` against every configured pattern group, recording a
    /// High violation per match and deleting matched substrings until a
    /// fixed point: deleting one match can butt the halves of another match
    /// together, and a clean output is what makes sanitization idempotent.
    fn sweep(&self, input: &str, location: &str, out: &mut Vec<SecurityViolation>) -> String {
        let mut current = input.to_string();
        loop {
            let before_round = current.clone();
            for group in &self.config.pattern_groups {
                for regex in &group.regexes {
                    let matches: Vec<String> = regex
                        .find_iter(&current)
                        .map(|m| m.as_str().to_string())
                        .filter(|m| !m.is_empty())
                        .collect();
                    if matches.is_empty() {
                        continue;
                    }
                    for matched in &matches {
                        out.push(SecurityViolation::new(
                            group.kind,
                            SecurityLevel::High,
                            format!("Dangerous {} pattern in {location}", group.name),
                            matched,
                            SOURCE,
                        ));
                    }
                    loop {
                        let next = regex.replace_all(&current, "").into_owned();
                        if next == current {
                            break;
                        }
                        current = next;
                    }
                }
            }
            if current == before_round {
                break;
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreatKind;

    fn sanitizer() -> TemplateSanitizer {
        TemplateSanitizer::new(Arc::new(SafetyConfig::builtin()))
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_clean_substitution() {
        let payload = sanitizer().sanitize("echo [USER]", &vars(&[("USER", "Christian")]));
        assert_eq!(payload.content, "echo Christian");
        assert!(payload.violations.is_empty());
    }

    #[test]
    fn test_unmatched_placeholder_left_intact() {
        let payload = sanitizer().sanitize("echo [MISSING]", &HashMap::new());
        assert_eq!(payload.content, "echo [MISSING]");
        assert!(payload.violations.is_empty());
    }

    #[test]
    fn test_path_traversal_stripped_from_variable() {
        let payload = sanitizer().sanitize("cat [FILE]", &vars(&[("FILE", "../../etc/passwd")]));
        assert!(payload
            .violations
            .iter()
            .any(|v| v.kind == ThreatKind::PathTraversal && v.severity == SecurityLevel::High));
        assert!(!payload.content.contains("../"));
    }

    #[test]
    fn test_interleaved_traversal_stripped_to_fixed_point() {
        // Deleting "../" from "..././" leaves "../" again; the sweep must
        // chase that to a fixed point.
        let payload = sanitizer().sanitize("cat [FILE]", &vars(&[("FILE", "..././..././x")]));
        assert!(!payload.content.contains("../"));
    }

    #[test]
    fn test_second_order_placeholder_not_expanded() {
        let payload = sanitizer().sanitize(
            "echo [A] [B]",
            &vars(&[("A", "[B]"), ("B", "harmless")]),
        );
        // [B] arriving through A is literal output, not a marker.
        assert_eq!(payload.content, "echo [B] harmless");
    }

    #[test]
    fn test_cross_variable_assembly_detected() {
        // Each value alone is benign; together they assemble an injection.
        let payload = sanitizer().sanitize(
            "[CMD] [ARGS]",
            &vars(&[("CMD", "rm"), ("ARGS", "-rf /tmp/target")]),
        );
        assert!(payload
            .violations
            .iter()
            .any(|v| v.kind == ThreatKind::CommandInjection
                && v.description.contains("substituted template")));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let first = sanitizer().sanitize(
            "echo [X]; rm -rf [Y]",
            &vars(&[("X", "hello"), ("Y", "/tmp/victim")]),
        );
        let second = sanitizer().sanitize(&first.content, &HashMap::new());
        assert_eq!(second.content, first.content);
        assert!(second.violations.is_empty());
    }

    #[test]
    fn test_command_injection_in_variable_stripped() {
        let payload = sanitizer().sanitize("echo [NAME]", &vars(&[("NAME", "hi; rm -rf /")]));
        assert!(payload
            .violations
            .iter()
            .any(|v| v.kind == ThreatKind::CommandInjection));
        assert!(!payload.content.contains("rm -rf"));
    }
}
