//! # spnet-io: JSON persistence of networks
//!
//! Reads and writes the version 2 JSON network document.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spnet_core::SolverConfig;
//!
//! fn main() -> spnet_core::SpnetResult<()> {
//!     let (mut grid, net) = spnet_io::from_json_file("network.json")?;
//!     grid.solve_load_flow(net, &SolverConfig::default())?;
//!     spnet_io::to_json_file(&grid, net, "solved.json", true)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Document Layout
//!
//! | Key | Content |
//! |-----|---------|
//! | `version` | `2` |
//! | `is_multiphase` | `false` |
//! | `buses`, `lines`, `transformers`, `switches`, `loads`, `sources` | element arrays, in network order |
//! | `lines_params`, `transformers_params` | shared parameters, one per id, sorted by id |
//!
//! Each element may carry a `results` object. Results are written only for a
//! network with valid results and read back only when every element has them.
//!
//! ## Round Trip
//!
//! Reading a written document and writing it again yields the same JSON, with
//! or without results.

use std::fs;
use std::path::Path;

use spnet_core::{Grid, NetworkId, SpnetError, SpnetResult};
use tracing::info;

pub mod export;
pub mod import;
pub mod results;
pub mod schema;

pub use export::{network_to_document, network_to_value};
pub use import::{network_from_document, network_from_value};
pub use results::results_to_value;
pub use schema::{NetworkDocument, NETWORK_JSON_VERSION};

/// Logs `msg` at error level and wraps it into the given variant.
pub(crate) fn raise<T>(variant: fn(String) -> SpnetError, msg: String) -> SpnetResult<T> {
    tracing::error!("{msg}");
    Err(variant(msg))
}

/// Writes `net` as pretty-printed JSON.
pub fn to_json_file(
    grid: &Grid,
    net: NetworkId,
    path: impl AsRef<Path>,
    include_results: bool,
) -> SpnetResult<()> {
    let path = path.as_ref();
    let value = network_to_value(grid, net, include_results)?;
    fs::write(path, serde_json::to_string_pretty(&value)?)?;
    info!("wrote network #{} to {}", net.value(), path.display());
    Ok(())
}

/// Reads a network document into a new grid.
pub fn from_json_file(path: impl AsRef<Path>) -> SpnetResult<(Grid, NetworkId)> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let value = serde_json::from_str(&text)?;
    info!("reading network from {}", path.display());
    network_from_value(value)
}
