use std::path::Path;

use anyhow::{bail, Result};
use spnet_core::Diagnostics;
use tracing::info;

pub fn handle(network_file: &Path, json: bool) -> Result<()> {
    let mut diagnostics = Diagnostics::new();
    match spnet_io::from_json_file(network_file) {
        Ok((grid, net)) => grid.validate_into(net, &mut diagnostics)?,
        // The network is checked while it is read
        Err(err) => diagnostics.add_spnet_error("network", &err),
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        print!("{diagnostics}");
    }

    if diagnostics.has_errors() {
        bail!(
            "{} is not a valid network ({})",
            network_file.display(),
            diagnostics.summary()
        );
    }
    info!("{} is a valid network", network_file.display());
    Ok(())
}
