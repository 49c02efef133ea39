use crate::config::Workload;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "txqueue",
    about = "txqueue: exercise the reservation queue from many threads",
    version
)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset (overrides the config file)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a concurrent workload and check the final queue counts
    Soak {
        /// Path to a TOML soak config
        #[arg(long)]
        config: Option<String>,

        /// Worker threads released together once all are spawned
        #[arg(long)]
        threads: Option<usize>,

        /// Iterations per worker
        #[arg(long)]
        iterations: Option<usize>,

        /// Per-iteration workload
        #[arg(long, value_enum)]
        workload: Option<Workload>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Step through reserve, discard and close on a fresh queue
    Walkthrough {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
