use clap::Parser;
use tracing_subscriber::EnvFilter;

use patternguard::cli;
use patternguard::errors::FrameworkError;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .init();

    let result = match cli.command {
        cli::Commands::Run(args) => cli::run::handle_run(args).await,
        cli::Commands::Validate(args) => cli::validate::handle_validate(args).await,
        cli::Commands::History(args) => cli::history::handle_history(args).await,
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code as i32),
        Err(e) => {
            eprintln!("Error: {}", e);
            let exit_code = match &e {
                FrameworkError::Config(_) => 2,
                FrameworkError::Sandbox(_) => 3,
                _ => 1,
            };
            std::process::exit(exit_code);
        }
    }
}
