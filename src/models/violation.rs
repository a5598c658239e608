use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::truncation::truncate_blocked_content;

/// Security level, ordered from least to most severe. Used both as the
/// severity of a violation and as the strictness a request is validated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SecurityLevel {
    /// Returns a numeric rank where higher values indicate higher severity.
    /// Low = 0, Medium = 1, High = 2, Critical = 3.
    pub fn rank(&self) -> u8 {
        match self {
            SecurityLevel::Low => 0,
            SecurityLevel::Medium => 1,
            SecurityLevel::High => 2,
            SecurityLevel::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
            SecurityLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(SecurityLevel::Low),
            "medium" => Some(SecurityLevel::Medium),
            "high" => Some(SecurityLevel::High),
            "critical" => Some(SecurityLevel::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of threat a violation reports. Closed set; adding a variant is a
/// framework version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    CommandInjection,
    PathTraversal,
    CodeExecution,
    ResourceExhaustion,
    PrivilegeEscalation,
    DataExfiltration,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::CommandInjection => "command_injection",
            ThreatKind::PathTraversal => "path_traversal",
            ThreatKind::CodeExecution => "code_execution",
            ThreatKind::ResourceExhaustion => "resource_exhaustion",
            ThreatKind::PrivilegeEscalation => "privilege_escalation",
            ThreatKind::DataExfiltration => "data_exfiltration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "command_injection" => Some(ThreatKind::CommandInjection),
            "path_traversal" => Some(ThreatKind::PathTraversal),
            "code_execution" => Some(ThreatKind::CodeExecution),
            "resource_exhaustion" => Some(ThreatKind::ResourceExhaustion),
            "privilege_escalation" => Some(ThreatKind::PrivilegeEscalation),
            "data_exfiltration" => Some(ThreatKind::DataExfiltration),
            _ => None,
        }
    }
}

impl std::fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation finding. Immutable once constructed; the only way to
/// build one is [`SecurityViolation::new`], which truncates the offending
/// content before it is stored anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityViolation {
    pub kind: ThreatKind,
    pub severity: SecurityLevel,
    pub description: String,
    /// The matched content, truncated. Never holds the full payload.
    pub blocked_content: String,
    pub timestamp: DateTime<Utc>,
    /// Which validator produced this violation.
    pub source_location: String,
}

impl SecurityViolation {
    pub fn new(
        kind: ThreatKind,
        severity: SecurityLevel,
        description: impl Into<String>,
        blocked_content: &str,
        source_location: &str,
    ) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            blocked_content: truncate_blocked_content(blocked_content),
            timestamp: Utc::now(),
            source_location: source_location.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(SecurityLevel::Low < SecurityLevel::Medium);
        assert!(SecurityLevel::Medium < SecurityLevel::High);
        assert!(SecurityLevel::High < SecurityLevel::Critical);
    }

    #[test]
    fn test_level_roundtrip() {
        for level in [
            SecurityLevel::Low,
            SecurityLevel::Medium,
            SecurityLevel::High,
            SecurityLevel::Critical,
        ] {
            assert_eq!(SecurityLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(SecurityLevel::parse("extreme"), None);
    }

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!(
            ThreatKind::parse("command_injection"),
            Some(ThreatKind::CommandInjection)
        );
        assert_eq!(ThreatKind::parse("unknown"), None);
    }

    #[test]
    fn test_violation_truncates_blocked_content() {
        let payload = "s".repeat(5_000);
        let violation = SecurityViolation::new(
            ThreatKind::CommandInjection,
            SecurityLevel::Critical,
            "test",
            &payload,
            "test",
        );
        assert!(violation.blocked_content.len() < payload.len());
    }
}
