use regex::Regex;

use crate::models::{SecurityLevel, SecurityViolation, ThreatKind};

const SOURCE: &str = "threat_detector";

/// Composite attack idioms. Each entry targets a construct whose parts can
/// individually pass the whitelist/blacklist and pattern layers but are
/// dangerous in combination. Closed set; extending it is a version bump.
const SIGNATURES: &[(&str, ThreatKind, &str)] = &[
    // A destructive removal chained behind a real command, e.g.
    // `ls; rm -rf /`. Requires a preceding command so a bare leading
    // separator does not double-report what the blacklist already catches.
    (
        "destructive command chain",
        ThreatKind::CommandInjection,
        r"[^\s;&|][^;&|]*(?:;|&&|\|\|)\s*(?:sudo\s+)?rm\s+-[a-zA-Z-]*[rR]",
    ),
    (
        "download piped to interpreter",
        ThreatKind::CodeExecution,
        r"\b(?:curl|wget)\b[^;&|\n]*\|\s*(?:sh|bash|zsh|dash|python\d?|perl|ruby)\b",
    ),
    (
        "encoded payload piped to interpreter",
        ThreatKind::CodeExecution,
        r"\bbase64\s+(?:-d|--decode)\b[^;&|\n]*\|\s*(?:sh|bash|zsh|dash|python\d?)\b",
    ),
    (
        "sensitive file piped to network tool",
        ThreatKind::DataExfiltration,
        r"(?:/etc/passwd|/etc/shadow|id_rsa|\.aws/credentials)[^\n;&|]*\|\s*(?:nc|ncat|netcat|curl|wget)\b",
    ),
    (
        "raw socket redirection",
        ThreatKind::DataExfiltration,
        r"/dev/tcp/",
    ),
    (
        "raw block device write",
        ThreatKind::ResourceExhaustion,
        r"\bdd\b[^\n]*\bof=/dev/(?:sd|hd|nvme|mmcblk)",
    ),
    (
        "fork bomb",
        ThreatKind::ResourceExhaustion,
        r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
    ),
    (
        "privileged shell spawn",
        ThreatKind::PrivilegeEscalation,
        r"\bsudo\s+(?:sh|bash|su)\b",
    ),
    (
        "eval of command substitution",
        ThreatKind::CodeExecution,
        r"\beval\b[^\n]*\$\(",
    ),
];

/// Signature-based scan for known multi-step attack idioms. Distinct from
/// the dangerous-pattern sweeps: every hit here is Critical.
pub struct ThreatDetector {
    signatures: Vec<(String, ThreatKind, Regex)>,
}

impl Default for ThreatDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreatDetector {
    pub fn new() -> Self {
        let signatures = SIGNATURES
            .iter()
            .map(|(name, kind, pattern)| {
                (
                    name.to_string(),
                    *kind,
                    Regex::new(pattern).expect("threat signatures compile"),
                )
            })
            .collect();
        Self { signatures }
    }

    pub fn detect(&self, content: &str) -> Vec<SecurityViolation> {
        let mut violations = Vec::new();
        for (name, kind, regex) in &self.signatures {
            for matched in regex.find_iter(content) {
                violations.push(SecurityViolation::new(
                    *kind,
                    SecurityLevel::Critical,
                    format!("Threat signature matched: {name}"),
                    matched.as_str(),
                    SOURCE,
                ));
            }
        }
        violations
    }
}
