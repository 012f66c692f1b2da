//! Results of a network as a JSON dictionary, one array per element kind.

use num_complex::Complex64;
use serde::Serialize;
use serde_json::{Map, Value};
use spnet_core::{Grid, LoadType, NetworkId, SpnetResult};

#[derive(Serialize)]
struct BusEntry {
    id: String,
    potential: Complex64,
}

#[derive(Serialize)]
struct BranchEntry {
    id: String,
    current1: Complex64,
    current2: Complex64,
}

#[derive(Serialize)]
struct LoadEntry {
    id: String,
    #[serde(rename = "type")]
    load_type: LoadType,
    current: Complex64,
    potential: Complex64,
    #[serde(skip_serializing_if = "Option::is_none")]
    flexible_power: Option<Complex64>,
}

#[derive(Serialize)]
struct SourceEntry {
    id: String,
    current: Complex64,
    potential: Complex64,
}

#[derive(Serialize)]
struct FullBusEntry {
    id: String,
    potential: Complex64,
    voltage: Complex64,
    min_voltage: Option<f64>,
    max_voltage: Option<f64>,
    violated: Option<bool>,
}

fn insert<T: Serialize>(map: &mut Map<String, Value>, key: &str, rows: T) -> SpnetResult<()> {
    map.insert(key.to_string(), serde_json::to_value(rows)?);
    Ok(())
}

/// Results of every element of `net`.
///
/// The short form holds what the solver produced: bus potentials, branch
/// currents, load and source currents and potentials. `full` adds the
/// derived quantities of the result tables. Stale results are returned with
/// one warning per table.
pub fn results_to_value(grid: &Grid, net: NetworkId, full: bool) -> SpnetResult<Value> {
    let mut map = Map::new();
    let buses = grid.res_buses(net)?;
    let lines = grid.res_lines(net)?;
    let transformers = grid.res_transformers(net)?;
    let switches = grid.res_switches(net)?;
    let loads = grid.res_loads(net)?;
    let flexible = grid.res_loads_flexible_powers(net)?;
    let sources = grid.res_sources(net)?;

    if full {
        let voltages = grid.res_buses_voltages(net)?;
        let buses: Vec<FullBusEntry> = buses
            .into_iter()
            .zip(voltages)
            .map(|(bus, voltage)| FullBusEntry {
                id: bus.id,
                potential: bus.potential,
                voltage: voltage.voltage,
                min_voltage: voltage.min_voltage,
                max_voltage: voltage.max_voltage,
                violated: voltage.violated,
            })
            .collect();
        insert(&mut map, "buses", buses)?;
        insert(&mut map, "lines", lines)?;
        insert(&mut map, "transformers", transformers)?;
        insert(&mut map, "switches", switches)?;
        insert(&mut map, "loads", loads)?;
        insert(&mut map, "loads_flexible_powers", flexible)?;
        insert(&mut map, "sources", sources)?;
        return Ok(Value::Object(map));
    }

    let buses: Vec<BusEntry> = buses
        .into_iter()
        .map(|row| BusEntry {
            id: row.id,
            potential: row.potential,
        })
        .collect();
    insert(&mut map, "buses", buses)?;
    let branch = |id: String, current1, current2| BranchEntry {
        id,
        current1,
        current2,
    };
    insert(
        &mut map,
        "lines",
        lines
            .into_iter()
            .map(|row| branch(row.id, row.current1, row.current2))
            .collect::<Vec<_>>(),
    )?;
    insert(
        &mut map,
        "transformers",
        transformers
            .into_iter()
            .map(|row| branch(row.id, row.current1, row.current2))
            .collect::<Vec<_>>(),
    )?;
    insert(
        &mut map,
        "switches",
        switches
            .into_iter()
            .map(|row| branch(row.id, row.current1, row.current2))
            .collect::<Vec<_>>(),
    )?;
    let loads: Vec<LoadEntry> = loads
        .into_iter()
        .map(|row| LoadEntry {
            flexible_power: flexible
                .iter()
                .find(|f| f.id == row.id)
                .map(|f| f.flexible_power),
            id: row.id,
            load_type: row.load_type,
            current: row.current,
            potential: row.potential,
        })
        .collect();
    insert(&mut map, "loads", loads)?;
    let sources: Vec<SourceEntry> = sources
        .into_iter()
        .map(|row| SourceEntry {
            id: row.id,
            current: row.current,
            potential: row.potential,
        })
        .collect();
    insert(&mut map, "sources", sources)?;
    Ok(Value::Object(map))
}
