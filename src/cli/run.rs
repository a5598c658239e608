use std::path::Path;

use crate::config::load_config;
use crate::errors::FrameworkError;
use crate::framework::SafetyFramework;
use crate::models::{ExecutionOutcome, ExecutionRequest};

use super::commands::{parse_level, parse_vars, render_violations, RunArgs};

pub async fn handle_run(args: RunArgs) -> Result<u8, FrameworkError> {
    let config = load_config(Path::new(&args.config)).await?;
    let level = parse_level(&args.level)?;
    let variables = parse_vars(&args.vars)?;
    let request = ExecutionRequest::new(args.template.as_str(), variables, level);

    let framework = SafetyFramework::new(config).await?;

    // Ctrl-C becomes explicit cancellation reaching the sandbox wait loop,
    // which kills the whole sandboxed process group.
    let cancel = framework.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = framework.submit_request(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Execution: {}", result.execution_id);
        println!("Outcome:   {}", result.outcome);
        if let Some(code) = result.exit_status {
            println!("Exit:      {code}");
        }
        if !result.violations.is_empty() {
            println!("Violations:");
            render_violations(&result.violations);
        }
        if !result.stdout.is_empty() {
            println!("--- stdout ---");
            print!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            println!("--- stderr ---");
            print!("{}", result.stderr);
        }
    }

    Ok(match result.outcome {
        ExecutionOutcome::Completed => 0,
        ExecutionOutcome::Rejected => 4,
        _ => 5,
    })
}
