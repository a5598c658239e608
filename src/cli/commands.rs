use std::collections::HashMap;

use clap::{Args, Parser, Subcommand};

use crate::errors::FrameworkError;
use crate::models::{SecurityLevel, SecurityViolation, ThreatKind};

#[derive(Parser)]
#[command(name = "patternguard", version, about = "Pattern safety framework")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and execute a pattern template
    Run(RunArgs),
    /// Validate a template without executing it
    Validate(RunArgs),
    /// Query the recorded violation history
    History(HistoryArgs),
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Template content with [NAME] placeholder markers
    pub template: String,

    /// Variable binding as KEY=VALUE (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Security level: low, medium, high, critical
    #[arg(short, long, default_value = "medium")]
    pub level: String,

    /// Configuration directory
    #[arg(short, long, default_value = "./config")]
    pub config: String,

    /// Emit JSON instead of human-readable output
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct HistoryArgs {
    /// Minimum severity: low, medium, high, critical
    #[arg(long)]
    pub severity: Option<String>,

    /// Threat kind, e.g. command_injection
    #[arg(long)]
    pub kind: Option<String>,

    /// Only violations recorded in the last N days
    #[arg(long)]
    pub days: Option<i64>,

    /// Configuration directory
    #[arg(short, long, default_value = "./config")]
    pub config: String,

    /// Emit JSON instead of human-readable output
    #[arg(long)]
    pub json: bool,
}

pub fn parse_level(input: &str) -> Result<SecurityLevel, FrameworkError> {
    SecurityLevel::parse(input).ok_or_else(|| {
        FrameworkError::Config(format!(
            "Invalid security level '{input}' (expected low, medium, high, or critical)"
        ))
    })
}

pub fn parse_kind(input: &str) -> Result<ThreatKind, FrameworkError> {
    ThreatKind::parse(input)
        .ok_or_else(|| FrameworkError::Config(format!("Unknown threat kind '{input}'")))
}

pub fn parse_vars(pairs: &[String]) -> Result<HashMap<String, String>, FrameworkError> {
    let mut variables = HashMap::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            FrameworkError::Config(format!("Invalid variable binding '{pair}' (expected KEY=VALUE)"))
        })?;
        variables.insert(key.to_string(), value.to_string());
    }
    Ok(variables)
}

pub fn render_violations(violations: &[SecurityViolation]) {
    for v in violations {
        println!(
            "  [{}] {} ({}): {}",
            v.severity, v.kind, v.source_location, v.description
        );
        if !v.blocked_content.is_empty() {
            println!("      blocked: {}", v.blocked_content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vars_valid() {
        let vars = parse_vars(&["USER=Christian".to_string(), "HOST=example".to_string()]).unwrap();
        assert_eq!(vars.get("USER").map(String::as_str), Some("Christian"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_parse_vars_value_may_contain_equals() {
        let vars = parse_vars(&["QUERY=a=b".to_string()]).unwrap();
        assert_eq!(vars.get("QUERY").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_parse_vars_missing_equals_rejected() {
        assert!(parse_vars(&["NOVALUE".to_string()]).is_err());
    }

    #[test]
    fn test_parse_level_rejects_unknown() {
        assert!(parse_level("medium").is_ok());
        assert!(parse_level("paranoid").is_err());
    }
}
