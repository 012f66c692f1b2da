use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spnet", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a network file and report every issue found
    Validate {
        /// Path to the network file (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        network_file: PathBuf,
        /// Print the diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a load flow and print the result tables
    Solve {
        /// Path to the network file (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        network_file: PathBuf,
        /// Solver configuration (TOML, `[solver]` section)
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
        /// Maximum number of iterations
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Convergence threshold on the potentials (V)
        #[arg(long)]
        tolerance: Option<f64>,
        /// Start from propagated potentials instead of the last solution
        #[arg(long)]
        cold: bool,
        /// Linear backend (gauss, faer)
        #[arg(long)]
        backend: Option<String>,
        /// Write the solved network, results included, to this file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
        /// Write the results dictionary to this file
        #[arg(long, value_hint = ValueHint::FilePath)]
        results: Option<PathBuf>,
        /// Include the derived quantities in the results dictionary
        #[arg(long)]
        full: bool,
    },
    /// Graph utilities
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Find the galvanic islands of a network
    Islands {
        /// Path to the network file (JSON)
        network_file: PathBuf,
        /// Emit the island of every bus
        #[arg(long)]
        emit: bool,
    },
    /// Export the bus/branch graph
    Export {
        /// Path to the network file (JSON)
        network_file: PathBuf,
        /// Output format (dot, graphviz)
        #[arg(long, default_value = "dot")]
        format: String,
        /// Optional output file path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
