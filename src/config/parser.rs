use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use regex::Regex;
use tracing::info;

use crate::errors::FrameworkError;

use super::schema::PATTERNS_SCHEMA;
use super::types::{group_kind, PatternGroup, SafetyConfig, Settings};

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576;

/// Load the framework configuration from an operator-controlled directory.
///
/// The command lists and the dangerous-pattern file are mandatory: a missing
/// or unparseable one aborts construction, so the framework can never come up
/// in a state where it would validate content as safe without its gates.
/// `patternguard.yaml` is optional; absent fields take defaults.
pub async fn load_config(dir: &Path) -> Result<SafetyConfig, FrameworkError> {
    if !dir.is_dir() {
        return Err(FrameworkError::Config(format!(
            "Config directory not found: {}",
            dir.display()
        )));
    }

    let whitelist = load_command_list(&dir.join("command_whitelist.txt")).await?;
    let blacklist = load_command_list(&dir.join("command_blacklist.txt")).await?;
    let pattern_groups = load_pattern_groups(&dir.join("dangerous_patterns.json")).await?;
    let settings = load_settings(&dir.join("patternguard.yaml")).await?;

    info!(
        whitelist = whitelist.len(),
        blacklist = blacklist.len(),
        pattern_groups = pattern_groups.len(),
        "Security configuration loaded"
    );

    Ok(SafetyConfig {
        whitelist,
        blacklist,
        pattern_groups,
        settings,
    })
}

async fn read_capped(path: &Path) -> Result<String, FrameworkError> {
    if !path.exists() {
        return Err(FrameworkError::Config(format!(
            "Required config file not found: {}",
            path.display()
        )));
    }
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_FILE_BYTES {
        return Err(FrameworkError::Config(format!(
            "Config file exceeds 1MB limit: {}",
            path.display()
        )));
    }
    Ok(tokio::fs::read_to_string(path).await?)
}

/// Parse a newline-delimited command list. Blank lines and `#` comments are
/// skipped; names are kept verbatim (matching is by basename, case-sensitive).
async fn load_command_list(path: &Path) -> Result<HashSet<String>, FrameworkError> {
    let content = read_capped(path).await?;
    let mut commands = HashSet::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.contains(char::is_whitespace) {
            return Err(FrameworkError::Config(format!(
                "Command list entry contains whitespace: '{}' in {}",
                trimmed,
                path.display()
            )));
        }
        commands.insert(trimmed.to_string());
    }
    Ok(commands)
}

async fn load_pattern_groups(path: &Path) -> Result<Vec<PatternGroup>, FrameworkError> {
    let content = read_capped(path).await?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| FrameworkError::Config(format!("Invalid dangerous_patterns.json: {e}")))?;

    validate_patterns_schema(&json)?;

    // BTreeMap keeps group iteration order stable across loads.
    let raw: BTreeMap<String, Vec<String>> = serde_json::from_value(json)
        .map_err(|e| FrameworkError::Config(format!("Invalid pattern group structure: {e}")))?;

    let mut groups = Vec::new();
    for (name, patterns) in raw {
        let kind = group_kind(&name).ok_or_else(|| {
            FrameworkError::Config(format!("Unrecognized pattern group: '{name}'"))
        })?;
        let mut regexes = Vec::new();
        for pattern in &patterns {
            let regex = Regex::new(pattern).map_err(|e| {
                FrameworkError::Config(format!("Invalid regex in group '{name}': {e}"))
            })?;
            regexes.push(regex);
        }
        groups.push(PatternGroup {
            name,
            kind,
            regexes,
        });
    }
    Ok(groups)
}

fn validate_patterns_schema(json: &serde_json::Value) -> Result<(), FrameworkError> {
    let compiled = jsonschema::JSONSchema::compile(&PATTERNS_SCHEMA)
        .map_err(|e| FrameworkError::Config(format!("Schema compilation error: {e}")))?;

    if let Err(errors) = compiled.validate(json) {
        let messages: Vec<String> = errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        return Err(FrameworkError::Config(format!(
            "dangerous_patterns.json failed schema validation: {}",
            messages.join("; ")
        )));
    }
    Ok(())
}

async fn load_settings(path: &Path) -> Result<Settings, FrameworkError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = read_capped(path).await?;
    let settings: Settings = serde_yaml::from_str(&content)?;
    Ok(settings)
}
