// SPDX-License-Identifier: AGPL-3.0-or-later
//! Uniform File Layer CLI
//!
//! Reads files through any registered protocol, including paths that run
//! through archives.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "ufl")]
#[command(author, version, about = "Uniform File Layer - one file interface for every backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List directory or archive contents
    #[command(alias = "dir")]
    Ls {
        /// Location or local path (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Long format with details
        #[arg(short, long)]
        long: bool,

        /// Show all files including hidden
        #[arg(short, long)]
        all: bool,

        /// Human-readable sizes
        #[arg(short = 'H', long)]
        human: bool,
    },

    /// Display file contents
    Cat {
        /// File to display
        path: String,
    },

    /// Show file information
    Stat {
        /// Path to inspect
        path: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered protocol schemes
    Schemes,

    /// List archive formats
    Formats,

    /// Print the effective configuration as TOML
    Config,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(level),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = match commands::Context::load(cli.config.as_deref()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Ls { path, long, all, human } => commands::ls(&ctx, &path, long, all, human).await,
        Commands::Cat { path } => commands::cat(&ctx, &path).await,
        Commands::Stat { path, json } => commands::stat(&ctx, &path, json).await,
        Commands::Schemes => commands::schemes(&ctx),
        Commands::Formats => commands::formats(&ctx),
        Commands::Config => commands::config(&ctx),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
