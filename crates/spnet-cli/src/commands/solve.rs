use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use spnet_cli::{resolve_solver_config, tables, SolverOverrides};
use spnet_core::StartKind;
use tracing::info;

use super::load_network;

pub struct SolveArgs<'a> {
    pub network_file: &'a Path,
    pub config: Option<&'a Path>,
    pub overrides: SolverOverrides,
    pub out: Option<&'a Path>,
    pub results: Option<&'a Path>,
    pub full: bool,
}

pub fn handle(args: &SolveArgs<'_>) -> Result<()> {
    let config = resolve_solver_config(args.config, &args.overrides)?;
    let (mut grid, net) = load_network(args.network_file)?;
    info!(
        "solving {} with the {} backend",
        args.network_file.display(),
        config.backend.as_str()
    );

    let report = grid
        .solve_load_flow(net, &config)
        .with_context(|| format!("solving {}", args.network_file.display()))?;
    let start = match grid.network_info(net)?.last_plan.map(|plan| plan.kind) {
        Some(StartKind::Warm) => "warm",
        _ => "cold",
    };
    println!(
        "Load flow converged in {} iteration(s) (residual {:.3e} V, {start} start)",
        report.iterations, report.residual
    );
    println!();
    print!("{}", tables::render_results(&grid, net)?);

    if let Some(path) = args.out {
        spnet_io::to_json_file(&grid, net, path, true)?;
        println!("Network written to {}", path.display());
    }
    if let Some(path) = args.results {
        let value = spnet_io::results_to_value(&grid, net, args.full)?;
        fs::write(path, serde_json::to_string_pretty(&value)?)?;
        println!("Results written to {}", path.display());
    }
    Ok(())
}
