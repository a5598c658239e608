use std::collections::HashSet;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{SecurityLevel, ThreatKind};

/// One named group of dangerous-pattern regexes, all reporting the same
/// threat kind.
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub name: String,
    pub kind: ThreatKind,
    pub regexes: Vec<Regex>,
}

/// Framework settings loaded from `patternguard.yaml`. All fields have
/// defaults so the file itself is optional; the security lists and pattern
/// groups are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory patterns execute in and the rollback manager watches.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    /// Where rollback archives are stored.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    /// Where the audit event log and violation store live.
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,
    /// Base wall-clock ceiling in seconds; stricter levels scale it down.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base address-space ceiling in megabytes.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
    #[serde(default = "default_max_open_files")]
    pub max_open_files: u64,
    #[serde(default = "default_max_processes")]
    pub max_processes: u64,
    /// Levels at which a network-capable sandbox backend may allow network
    /// access. Empty means never.
    #[serde(default)]
    pub network_allowed_levels: Vec<SecurityLevel>,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("./snapshots")
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("./audit")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_memory_mb() -> u64 {
    256
}

fn default_max_open_files() -> u64 {
    64
}

fn default_max_processes() -> u64 {
    64
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            snapshot_dir: default_snapshot_dir(),
            audit_dir: default_audit_dir(),
            timeout_secs: default_timeout_secs(),
            memory_mb: default_memory_mb(),
            max_open_files: default_max_open_files(),
            max_processes: default_max_processes(),
            network_allowed_levels: Vec::new(),
        }
    }
}

/// Immutable framework configuration. Built once at startup and shared by
/// reference; validators never mutate it.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub whitelist: HashSet<String>,
    pub blacklist: HashSet<String>,
    pub pattern_groups: Vec<PatternGroup>,
    pub settings: Settings,
}

/// Maps a pattern-group name from `dangerous_patterns.json` to the threat
/// kind its matches report. The set of recognized groups is closed.
pub fn group_kind(name: &str) -> Option<ThreatKind> {
    match name {
        "command_injection" => Some(ThreatKind::CommandInjection),
        "path_traversal" => Some(ThreatKind::PathTraversal),
        "code_execution" => Some(ThreatKind::CodeExecution),
        _ => None,
    }
}

const DEFAULT_WHITELIST: &[&str] = &[
    "echo", "printf", "cat", "ls", "pwd", "true", "false", "test", "date", "env", "head", "tail",
    "wc", "sort", "uniq", "grep", "sed", "awk", "cut", "tr", "basename", "dirname", "mkdir",
    "touch", "cp", "mv", "sleep",
];

const DEFAULT_BLACKLIST: &[&str] = &[
    "rm", "sudo", "su", "doas", "dd", "mkfs", "shutdown", "reboot", "halt", "poweroff", "eval",
    "exec", "chown", "chmod", "kill", "killall", "nc", "ncat", "netcat",
];

pub(crate) const DEFAULT_PATTERN_GROUPS: &[(&str, &[&str])] = &[
    (
        "command_injection",
        &[
            r";\s*\w+",
            r"&&\s*\w+",
            r"\|\|\s*\w+",
            r"\|\s*(?:sh|bash|zsh|dash)\b",
            r"\$\([^)]*\)",
            r"`[^`]*`",
            r"\brm\s+-[a-zA-Z]+\b",
        ],
    ),
    (
        "path_traversal",
        &[
            r"\.\./",
            r"\.\.\\",
            r"/etc/(?:passwd|shadow|sudoers)",
            r"~root\b",
        ],
    ),
    (
        "code_execution",
        &[
            r"\beval\s*\(",
            r"\bexec\s*\(",
            r"__import__",
            r"\bos\.system\b",
            r"\bsubprocess\.",
            r"(?i)<\s*script",
            r"(?i)javascript:",
        ],
    ),
];

impl SafetyConfig {
    /// Embedded defaults mirroring the shipped `config/` files. Intended for
    /// tests and for embedding the framework without an operator config
    /// directory; file-based loading still fails closed.
    pub fn builtin() -> Self {
        let pattern_groups = DEFAULT_PATTERN_GROUPS
            .iter()
            .map(|(name, patterns)| PatternGroup {
                name: name.to_string(),
                kind: group_kind(name).expect("builtin group names are known"),
                regexes: patterns
                    .iter()
                    .map(|p| Regex::new(p).expect("builtin patterns compile"))
                    .collect(),
            })
            .collect();

        Self {
            whitelist: DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect(),
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            pattern_groups,
            settings: Settings::default(),
        }
    }
}
