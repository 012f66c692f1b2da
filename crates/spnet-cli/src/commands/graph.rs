use std::fs;

use anyhow::Result;
use spnet_cli::GraphCommands;
use spnet_core::graph_utils;

use super::load_network;

pub fn handle(command: &GraphCommands) -> Result<()> {
    match command {
        GraphCommands::Islands { network_file, emit } => {
            let (grid, net) = load_network(network_file)?;
            let analysis = graph_utils::find_islands(&grid, net)?;
            for summary in &analysis.islands {
                println!(
                    "Island {}: {} bus(es)",
                    summary.island_id, summary.node_count
                );
            }
            if *emit {
                println!("\nBus -> island assignments:");
                for assignment in &analysis.assignments {
                    println!(
                        "  idx {:>3}: {:<20} -> island {}",
                        assignment.node_index, assignment.label, assignment.island_id
                    );
                }
            }
            Ok(())
        }
        GraphCommands::Export {
            network_file,
            format,
            out,
        } => {
            let (grid, net) = load_network(network_file)?;
            let dot = graph_utils::export_graph(&grid, net, format)?;
            if let Some(path) = out {
                fs::write(path, &dot)?;
                println!("Graph exported to {}", path.display());
            } else {
                println!("{dot}");
            }
            Ok(())
        }
    }
}
