use std::path::Path;
use std::sync::Arc;

use crate::config::SafetyConfig;
use crate::models::{SecurityLevel, SecurityViolation, ThreatKind};

const SOURCE: &str = "command_sanitizer";
const MAX_SUBSTITUTION_DEPTH: usize = 8;

/// Result of a quote-aware pass over one fragment of shell content:
/// top-level command segments, the bodies of command substitutions, and
/// whether quoting/substitution delimiters were balanced.
struct ShellScan {
    segments: Vec<String>,
    substitution_bodies: Vec<String>,
    balanced: bool,
}

/// Whitelist/blacklist command gate. Extracts candidate command tokens from
/// recognized invocation shapes (leading token per segment, tokens after
/// `;`/`&&`/`||`/`|`, command-substitution bodies) and checks them against
/// the configured sets. Blocks known-bad and known-unapproved commands; a
/// clean pass here is necessary, not sufficient.
pub struct CommandSanitizer {
    config: Arc<SafetyConfig>,
}

impl CommandSanitizer {
    pub fn new(config: Arc<SafetyConfig>) -> Self {
        Self { config }
    }

    pub fn validate_commands(&self, content: &str) -> Vec<SecurityViolation> {
        let mut violations = Vec::new();
        self.scan_fragment(content, &mut violations, 0);
        violations
    }

    fn scan_fragment(&self, fragment: &str, out: &mut Vec<SecurityViolation>, depth: usize) {
        if depth > MAX_SUBSTITUTION_DEPTH {
            out.push(SecurityViolation::new(
                ThreatKind::CommandInjection,
                SecurityLevel::High,
                "Command substitution nesting exceeds supported depth",
                fragment,
                SOURCE,
            ));
            return;
        }

        let scan = split_top_level(fragment);
        if !scan.balanced {
            // Content the shell lexer cannot parse is rejected outright
            // rather than sanitized.
            out.push(SecurityViolation::new(
                ThreatKind::CommandInjection,
                SecurityLevel::High,
                "Unparseable shell content (unbalanced quoting or substitution)",
                fragment,
                SOURCE,
            ));
        }

        for body in &scan.substitution_bodies {
            self.scan_fragment(body, out, depth + 1);
        }

        for segment in &scan.segments {
            let segment = segment.trim();
            if segment.is_empty() || segment.starts_with('#') {
                continue;
            }
            match shell_words::split(segment) {
                Err(_) => {
                    out.push(SecurityViolation::new(
                        ThreatKind::CommandInjection,
                        SecurityLevel::High,
                        "Unparseable shell content",
                        segment,
                        SOURCE,
                    ));
                }
                Ok(tokens) => {
                    if let Some(candidate) =
                        tokens.iter().find(|t| !is_env_assignment(t.as_str()))
                    {
                        self.check_command(candidate, segment, out);
                    }
                }
            }
        }
    }

    fn check_command(&self, token: &str, segment: &str, out: &mut Vec<SecurityViolation>) {
        // Placeholder markers are resolved before the post-substitution
        // sweep; checking them as literal commands would be noise.
        if is_placeholder(token) {
            return;
        }

        let name = base_command_name(token);
        if self.config.blacklist.contains(name) {
            out.push(SecurityViolation::new(
                ThreatKind::CommandInjection,
                SecurityLevel::Critical,
                format!("Blacklisted command '{name}'"),
                segment,
                SOURCE,
            ));
        } else if !self.config.whitelist.is_empty() && !self.config.whitelist.contains(name) {
            out.push(SecurityViolation::new(
                ThreatKind::CommandInjection,
                SecurityLevel::High,
                format!("Command '{name}' is not in the approved command list"),
                segment,
                SOURCE,
            ));
        }
    }

    /// Best-effort cleanup of a command string for logging: shell-lexes,
    /// strips shell metacharacters from every token, and re-quotes. Never
    /// used as a safety gate on its own.
    pub fn sanitize_command(&self, command: &str) -> String {
        let tokens = match shell_words::split(command) {
            Ok(tokens) => tokens,
            Err(_) => return String::new(),
        };
        let cleaned: Vec<String> = tokens
            .iter()
            .map(|t| {
                t.chars()
                    .filter(|c| !matches!(c, ';' | '&' | '|' | '`' | '$' | '(' | ')' | '{' | '}'))
                    .collect::<String>()
            })
            .filter(|t| !t.is_empty())
            .collect();
        shell_words::join(cleaned.iter().map(|s| s.as_str()))
    }
}

fn is_env_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn is_placeholder(token: &str) -> bool {
    token.len() > 2
        && token.starts_with('[')
        && token.ends_with(']')
        && token[1..token.len() - 1]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strip any path prefix so `/usr/bin/rm` and `rm` match the same entry.
fn base_command_name(token: &str) -> &str {
    Path::new(token)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(token)
}

fn split_top_level(content: &str) -> ShellScan {
    let mut segments = Vec::new();
    let mut substitution_bodies = Vec::new();
    let mut current = String::new();
    let mut balanced = true;
    let mut in_single = false;
    let mut in_double = false;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_single {
            if c == '\'' {
                in_single = false;
            }
            current.push(c);
            continue;
        }
        if c == '\\' {
            current.push(c);
            if let Some(escaped) = chars.next() {
                current.push(escaped);
            }
            continue;
        }
        if in_double {
            if c == '"' {
                in_double = false;
            } else if c == '`' || (c == '$' && chars.peek() == Some(&'(')) {
                // Substitution inside double quotes still executes.
                let (body, closed) = consume_substitution(c, &mut chars);
                substitution_bodies.push(body);
                balanced &= closed;
                continue;
            }
            current.push(c);
            continue;
        }
        match c {
            '\'' => {
                in_single = true;
                current.push(c);
            }
            '"' => {
                in_double = true;
                current.push(c);
            }
            ';' | '&' | '|' | '\n' => {
                segments.push(std::mem::take(&mut current));
            }
            '`' => {
                let (body, closed) = consume_substitution(c, &mut chars);
                substitution_bodies.push(body);
                balanced &= closed;
            }
            '$' if chars.peek() == Some(&'(') => {
                let (body, closed) = consume_substitution(c, &mut chars);
                substitution_bodies.push(body);
                balanced &= closed;
            }
            _ => current.push(c),
        }
    }

    if in_single || in_double {
        balanced = false;
    }
    segments.push(current);

    ShellScan {
        segments,
        substitution_bodies,
        balanced,
    }
}

/// Consume a `` ` `` or `$(`-opened substitution body. Returns the body and
/// whether the closing delimiter was found.
fn consume_substitution(
    opener: char,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> (String, bool) {
    let mut body = String::new();
    if opener == '`' {
        for c in chars.by_ref() {
            if c == '`' {
                return (body, true);
            }
            body.push(c);
        }
        (body, false)
    } else {
        // opener was '$' with '(' peeked
        chars.next();
        let mut depth = 1usize;
        for c in chars.by_ref() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return (body, true);
                    }
                }
                _ => {}
            }
            body.push(c);
        }
        (body, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> CommandSanitizer {
        CommandSanitizer::new(Arc::new(SafetyConfig::builtin()))
    }

    #[test]
    fn test_whitelisted_command_passes() {
        let violations = sanitizer().validate_commands("echo hello");
        assert!(violations.is_empty());
    }

    #[test]
    fn test_blacklisted_command_is_critical() {
        let violations = sanitizer().validate_commands("; rm -rf /");
        let critical: Vec<_> = violations
            .iter()
            .filter(|v| {
                v.severity == SecurityLevel::Critical && v.kind == ThreatKind::CommandInjection
            })
            .collect();
        assert_eq!(critical.len(), 1);
    }

    #[test]
    fn test_sudo_is_critical_command_injection() {
        let violations = sanitizer().validate_commands("sudo cat /etc/shadow");
        assert!(violations
            .iter()
            .any(|v| v.kind == ThreatKind::CommandInjection
                && v.severity == SecurityLevel::Critical));
    }

    #[test]
    fn test_blacklisted_command_by_full_path() {
        let violations = sanitizer().validate_commands("/usr/bin/rm file.txt");
        assert!(violations
            .iter()
            .any(|v| v.severity == SecurityLevel::Critical));
    }

    #[test]
    fn test_command_after_separator_is_checked() {
        let violations = sanitizer().validate_commands("echo ok && unknowncmd --flag");
        assert!(violations
            .iter()
            .any(|v| v.severity == SecurityLevel::High
                && v.description.contains("unknowncmd")));
    }

    #[test]
    fn test_command_substitution_body_is_checked() {
        let violations = sanitizer().validate_commands("echo $(rm -rf /tmp/x)");
        assert!(violations
            .iter()
            .any(|v| v.severity == SecurityLevel::Critical));
    }

    #[test]
    fn test_backtick_body_is_checked() {
        let violations = sanitizer().validate_commands("echo `sudo id`");
        assert!(violations
            .iter()
            .any(|v| v.severity == SecurityLevel::Critical));
    }

    #[test]
    fn test_quoted_separator_is_data() {
        let violations = sanitizer().validate_commands("echo 'a; b'");
        assert!(violations.is_empty());
    }

    #[test]
    fn test_unbalanced_quote_rejected_as_unparseable() {
        let violations = sanitizer().validate_commands("echo \"unterminated");
        assert!(violations
            .iter()
            .any(|v| v.description.contains("Unparseable")));
    }

    #[test]
    fn test_env_assignment_prefix_skipped() {
        let violations = sanitizer().validate_commands("LANG=C sort file.txt");
        assert!(violations.is_empty());
    }

    #[test]
    fn test_placeholder_token_not_treated_as_command() {
        let violations = sanitizer().validate_commands("echo [USER]");
        assert!(violations.is_empty());
    }

    #[test]
    fn test_sanitize_command_strips_metacharacters() {
        let cleaned = sanitizer().sanitize_command("echo hi; rm -rf /");
        assert!(!cleaned.contains(';'));
        assert!(!cleaned.contains('$'));
    }

    #[test]
    fn test_sanitize_command_unparseable_is_empty() {
        assert_eq!(sanitizer().sanitize_command("echo \"oops"), "");
    }
}
