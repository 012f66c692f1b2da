pub mod cli;
pub mod config;
pub mod tables;

pub use cli::{Cli, Commands, GraphCommands};
pub use config::{load_config, resolve_solver_config, SolverOverrides, SpnetConfig};
