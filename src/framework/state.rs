use serde::{Deserialize, Serialize};

/// Per-request lifecycle:
/// `Received → Validating → {Rejected | Sanitized} → Snapshotting →
/// Executing → {Committed | RolledBack} → Logged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestState {
    Received,
    Validating,
    Rejected,
    Sanitized,
    Snapshotting,
    Executing,
    Committed,
    RolledBack,
    Logged,
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Rejected => "rejected",
            Self::Sanitized => "sanitized",
            Self::Snapshotting => "snapshotting",
            Self::Executing => "executing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
            Self::Logged => "logged",
        };
        f.write_str(name)
    }
}
