pub mod graph;
pub mod solve;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use spnet_core::{Grid, NetworkId};

/// Reads a network file, naming the file in the error.
pub fn load_network(path: &Path) -> Result<(Grid, NetworkId)> {
    spnet_io::from_json_file(path).with_context(|| format!("loading network {}", path.display()))
}
