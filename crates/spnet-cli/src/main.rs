use anyhow::Result;
use clap::Parser;
use spnet_cli::{Cli, Commands};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries the tables and the graphs
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    debug!("spnet {} running {:?}", env!("CARGO_PKG_VERSION"), cli.command);

    match &cli.command {
        Commands::Validate { network_file, json } => commands::validate::handle(network_file, *json),
        Commands::Solve {
            network_file,
            config,
            max_iterations,
            tolerance,
            cold,
            backend,
            out,
            results,
            full,
        } => commands::solve::handle(&commands::solve::SolveArgs {
            network_file,
            config: config.as_deref(),
            overrides: spnet_cli::SolverOverrides {
                max_iterations: *max_iterations,
                tolerance: *tolerance,
                cold: *cold,
                backend: backend.clone(),
            },
            out: out.as_deref(),
            results: results.as_deref(),
            full: *full,
        }),
        Commands::Graph { command } => commands::graph::handle(command),
    }
}
