//! Plain-text result tables of `spnet solve`.

use std::io::Write;

use anyhow::Result;
use num_complex::Complex64;
use spnet_core::{formulas, Grid, NetworkId};
use tabwriter::TabWriter;

fn angle(value: Complex64) -> f64 {
    value.arg().to_degrees()
}

fn flag(violated: Option<bool>) -> &'static str {
    match violated {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    }
}

fn percent(loading: Option<f64>) -> String {
    loading.map_or_else(|| "-".to_string(), |l| format!("{:.1}", l * 100.0))
}

/// One table per element kind, skipping empty ones, then the power balance
/// of the network.
pub fn render_results(grid: &Grid, net: NetworkId) -> Result<String> {
    let mut writer = TabWriter::new(Vec::new()).padding(2);

    writeln!(writer, "BUS\t|V| (V)\tANGLE (deg)\tVIOLATED")?;
    for row in grid.res_buses_voltages(net)? {
        writeln!(
            writer,
            "{}\t{:.2}\t{:.3}\t{}",
            row.id,
            row.voltage.norm(),
            angle(row.voltage),
            flag(row.violated)
        )?;
    }

    let lines = grid.res_lines(net)?;
    if !lines.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "LINE\t|I1| (A)\t|I2| (A)\tLOSSES (W)\tLOADING (%)\tVIOLATED")?;
        for row in lines {
            writeln!(
                writer,
                "{}\t{:.3}\t{:.3}\t{:.2}\t{}\t{}",
                row.id,
                row.current1.norm(),
                row.current2.norm(),
                (row.power1 + row.power2).re,
                percent(row.loading),
                flag(row.violated)
            )?;
        }
    }

    let transformers = grid.res_transformers(net)?;
    if !transformers.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "TRANSFORMER\t|S1| (VA)\t|S2| (VA)\tLOSSES (W)\tLOADING (%)\tVIOLATED")?;
        for row in transformers {
            writeln!(
                writer,
                "{}\t{:.1}\t{:.1}\t{:.2}\t{}\t{}",
                row.id,
                row.power1.norm(),
                row.power2.norm(),
                (row.power1 + row.power2).re,
                percent(Some(row.loading)),
                flag(Some(row.violated))
            )?;
        }
    }

    let switches = grid.res_switches(net)?;
    if !switches.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "SWITCH\t|I| (A)")?;
        for row in switches {
            writeln!(writer, "{}\t{:.3}", row.id, row.current1.norm())?;
        }
    }

    let loads = grid.res_loads(net)?;
    if !loads.is_empty() {
        let flexible = grid.res_loads_flexible_powers(net)?;
        writeln!(writer)?;
        writeln!(writer, "LOAD\tTYPE\tP (W)\tQ (VAr)\t|V| (V)\tFLEXIBLE P (W)")?;
        for row in loads {
            let flexible = flexible
                .iter()
                .find(|f| f.id == row.id)
                .map_or_else(|| "-".to_string(), |f| format!("{:.1}", f.flexible_power.re));
            writeln!(
                writer,
                "{}\t{}\t{:.1}\t{:.1}\t{:.2}\t{}",
                row.id,
                row.load_type,
                row.power.re,
                row.power.im,
                formulas::voltage(row.potential).norm(),
                flexible
            )?;
        }
    }

    writeln!(writer)?;
    writeln!(writer, "SOURCE\tP (W)\tQ (VAr)")?;
    for row in grid.res_sources(net)? {
        writeln!(writer, "{}\t{:.1}\t{:.1}", row.id, row.power.re, row.power.im)?;
    }

    let balance = grid.res_power_balance(net)?;
    writeln!(writer)?;
    writeln!(writer, "Power balance\t{:.3e} W\t{:.3e} VAr", balance.re, balance.im)?;
    writer.flush()?;
    Ok(String::from_utf8(writer.into_inner()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spnet_core::{Bus, Line, LineParameters, Load, SolverConfig, VoltageSource};
    use std::sync::Arc;

    #[test]
    fn test_tables_list_every_element() {
        let mut grid = Grid::new();
        let b0 = grid.add_bus(Bus::new("b0"));
        let b1 = grid.add_bus(Bus::new("b1"));
        let params = Arc::new(LineParameters::new("lp", Complex64::new(0.5, 0.1), None));
        grid.add_line(Line::new("feeder", params, 1.0).unwrap(), b0, b1)
            .unwrap();
        grid.add_load(Load::power("house", Complex64::new(2e3, 0.0)), b1)
            .unwrap();
        grid.add_source(VoltageSource::new("vs", Complex64::new(400.0, 0.0)), b0)
            .unwrap();
        let net = grid.network_from_element(b0).unwrap();
        grid.solve_load_flow(net, &SolverConfig::default()).unwrap();

        let text = render_results(&grid, net).unwrap();
        assert!(text.contains("feeder"));
        assert!(text.contains("house"));
        assert!(text.contains("power"));
        assert!(text.contains("Power balance"));
        // No transformer nor switch in this network
        assert!(!text.contains("TRANSFORMER"));
        assert!(!text.contains("SWITCH"));
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(flag(None), "-");
        assert_eq!(flag(Some(true)), "yes");
        assert_eq!(percent(Some(0.5)), "50.0");
        assert_eq!(percent(None), "-");
        assert!((angle(Complex64::new(0.0, 1.0)) - 90.0).abs() < 1e-12);
    }
}
