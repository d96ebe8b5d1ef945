//! CLI argument definitions for the `stepflow` binary.
//!
//! Uses clap derive macros. Required flags are declared optional here and
//! checked in the command handlers, so a missing flag exits with the usage
//! code (20) and a plain message instead of clap's own error path.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Compile and execute JSON workflow definitions.
#[derive(Parser)]
#[command(name = "stepflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Suppress all logging except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed logging (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile and execute a workflow; payload read from standard input.
    Run {
        /// Caller-supplied opaque execution id.
        #[arg(long)]
        execution_id: Option<String>,

        /// Expected content hash of the workflow (bare hex or sha256:-prefixed).
        #[arg(long)]
        workflow_hash: Option<String>,

        /// Directory bash steps run in; also the workflow lookup root.
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Resume a suspended execution at its approval checkpoint.
    Resume {
        /// Execution id of the suspended run.
        #[arg(long)]
        execution_id: Option<String>,

        /// Token minted when the run suspended.
        #[arg(long)]
        resume_token: Option<String>,

        /// The reviewer's decision.
        #[arg(long, value_enum, default_value = "approve")]
        decision: Decision,

        /// Required for approve; deny needs no workflow content.
        #[arg(long)]
        workflow_hash: Option<String>,

        /// Required for approve.
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Compile a workflow and report its hash and step order.
    Validate {
        /// Path to a file containing the workflow JSON.
        #[arg(long)]
        workflow_path: Option<PathBuf>,

        /// Inline workflow JSON; the value "-" reads standard input.
        #[arg(long)]
        workflow_json: Option<String>,
    },

    /// Package a change intent into a proposal record for review.
    Propose {
        /// Id of the workflow the proposal targets.
        #[arg(long)]
        workflow_id: Option<String>,

        /// Hash of the definition the proposal is based on.
        #[arg(long)]
        base_hash: Option<String>,

        /// Natural-language description of the desired change.
        #[arg(long)]
        intent: Option<String>,
    },
}

/// Reviewer decision for `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Decision {
    Approve,
    Deny,
}
