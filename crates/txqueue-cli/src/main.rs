//! txqueue CLI: the `txqueue` command.

mod cli;
mod commands;
mod config;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use config::SoakOverrides;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Soak {
            config,
            threads,
            iterations,
            workload,
            json,
        } => commands::soak::run(
            config,
            SoakOverrides {
                threads,
                iterations,
                workload,
                log_level: cli.log_level,
            },
            json,
        ),

        Commands::Walkthrough { json } => commands::walkthrough::run(cli.log_level, json),
    }
}
