use std::path::Path;

use crate::config::load_config;
use crate::errors::FrameworkError;
use crate::framework::SafetyFramework;

use super::commands::{parse_level, parse_vars, render_violations, RunArgs};

pub async fn handle_validate(args: RunArgs) -> Result<u8, FrameworkError> {
    let config = load_config(Path::new(&args.config)).await?;
    let level = parse_level(&args.level)?;
    let variables = parse_vars(&args.vars)?;

    let framework = SafetyFramework::new(config).await?;
    let report = framework.validate(&args.template, &variables, level);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_safe {
        println!("SAFE at level {level}");
        if !report.violations.is_empty() {
            println!("Non-blocking violations:");
            render_violations(&report.violations);
        }
        println!("Sanitized payload:");
        println!("{}", report.sanitized_content);
    } else {
        println!("REJECTED at level {level}");
        render_violations(&report.violations);
    }

    Ok(if report.is_safe { 0 } else { 4 })
}
