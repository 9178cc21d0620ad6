//! Packcraft CLI - build and publish package versions.
//!
//! Wires the library's HTTP registry client, GitHub fetcher, source
//! converter and config-backed org provider into the publisher.

mod commands;
mod error;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::build::BuildArgs;
use commands::common::GlobalArgs;
use commands::config::ConfigCommands;

#[derive(Debug, Parser)]
#[command(name = "packcraft", version, about = "Build and publish package versions")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a package version and wait until it is ready
    Build(BuildArgs),

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build(args) => commands::build::run(args, &cli.global),
        Commands::Config { command } => commands::config::run(command, &cli.global),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
