//! CRMSync CLI
//!
//! Command-line tools for inspecting CRMSync behavior offline.
//!
//! # Commands
//!
//! - `compare` - Compare two field values the way the sync engine does
//! - `check-config` - Validate a sync configuration file
//! - `replay` - Replay a sync scenario against in-memory collaborators

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CRMSync command-line tools.
#[derive(Parser)]
#[command(name = "crmsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two field values semantically
    Compare {
        /// First value, as JSON (bare words are taken as text)
        left: String,

        /// Second value, as JSON (bare words are taken as text)
        right: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate a sync configuration file
    CheckConfig {
        /// Path to the JSON configuration
        path: PathBuf,
    },

    /// Replay a scenario file against in-memory collaborators
    Replay {
        /// Path to the JSON scenario
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compare {
            left,
            right,
            format,
        } => {
            commands::compare::run(&left, &right, &format)?;
        }
        Commands::CheckConfig { path } => {
            commands::check_config::run(&path)?;
        }
        Commands::Replay { path, format } => {
            commands::replay::run(&path, &format)?;
        }
        Commands::Version => {
            println!("CRMSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
