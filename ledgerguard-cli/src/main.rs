//! Ledgerguard CLI - condition policies for finance automation in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod output;

use commands::{catalog, logs, payload, policy};

/// Ledgerguard - build, check and store condition policies
#[derive(Parser)]
#[command(name = "lg", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where to read a policy payload from
#[derive(Args)]
struct PayloadArgs {
    /// Policy JSON (canonical object, legacy array, or JSON-encoded string)
    payload: Option<String>,
    /// Read the payload from a file
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the field and operator catalogs
    Catalog {
        /// Load a catalog file instead of the configured one
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a policy as a one-line summary
    Format {
        #[command(flatten)]
        input: PayloadArgs,
    },

    /// Rewrite any accepted payload shape as canonical policy JSON
    Normalize {
        #[command(flatten)]
        input: PayloadArgs,
    },

    /// Check whether a policy could be saved
    Validate {
        #[command(flatten)]
        input: PayloadArgs,
        /// Minimum number of conditions (overrides settings)
        #[arg(long)]
        min_conditions: Option<usize>,
    },

    /// Manage policy-bearing records
    Policy {
        #[command(subcommand)]
        command: policy::PolicyCommands,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Catalog { file, json } => catalog::run(file.as_deref(), json),
        Commands::Format { input } => {
            payload::run_format(input.payload.as_deref(), input.file.as_deref(), input.json)
        }
        Commands::Normalize { input } => {
            payload::run_normalize(input.payload.as_deref(), input.file.as_deref(), input.json)
        }
        Commands::Validate { input, min_conditions } => payload::run_validate(
            input.payload.as_deref(),
            input.file.as_deref(),
            min_conditions,
            input.json,
        ),
        Commands::Policy { command } => policy::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
