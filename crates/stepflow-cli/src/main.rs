//! Stepflow CLI entry point.
//!
//! Binary name: `stepflow`
//!
//! Parses CLI arguments, initializes tracing on standard error (standard
//! output carries exactly one JSON result line), and dispatches to the
//! subcommand handler. Any unexpected internal error is caught here and
//! reported as a JSON line on stderr with exit 40.

mod cli;
mod commands;
mod events;
mod expression;
mod host;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,stepflow=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            execution_id,
            workflow_hash,
            workspace,
        } => commands::run::execute(execution_id, workflow_hash, workspace).await,

        Commands::Resume {
            execution_id,
            resume_token,
            decision,
            workflow_hash,
            workspace,
        } => {
            commands::resume::execute(execution_id, resume_token, decision, workflow_hash, workspace)
                .await
        }

        Commands::Validate {
            workflow_path,
            workflow_json,
        } => commands::validate::execute(workflow_path, workflow_json).await,

        Commands::Propose {
            workflow_id,
            base_hash,
            intent,
        } => commands::propose::execute(workflow_id, base_hash, intent),
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!(
                "{}",
                serde_json::json!({ "type": "error", "error": err.to_string() })
            );
            commands::EXIT_EXECUTION
        }
    };
    std::process::exit(code);
}
