//! Network → JSON document.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use spnet_core::{
    Branch, ElementKey, Grid, LineParameters, LoadKind, NetworkId, SpnetError, SpnetResult,
    TransformerParameters,
};
use tracing::debug;

use crate::raise;
use crate::schema::{
    to_matrix, BranchResultsData, BusData, BusResultsData, LeafResultsData, LineData,
    LineParametersData, LoadData, NetworkDocument, SourceData, SwitchData, TransformerData,
    TransformerParametersData, NETWORK_JSON_VERSION,
};

/// Serializes a network.
///
/// With `include_results`, every element carries its results. A network that
/// was never solved is written without results; a network whose results are
/// stale fails with `BadLoadFlowResult`.
pub fn network_to_document(
    grid: &Grid,
    net: NetworkId,
    include_results: bool,
) -> SpnetResult<NetworkDocument> {
    let include_results = include_results && grid.has_results(net)?;
    if include_results && !grid.has_valid_results(net)? {
        return raise(
            SpnetError::BadLoadFlowResult,
            "The results of the network are outdated. Please re-run a load flow before \
             serializing them."
                .to_string(),
        );
    }

    let mut doc = NetworkDocument {
        version: NETWORK_JSON_VERSION,
        is_multiphase: false,
        buses: Vec::new(),
        lines: Vec::new(),
        transformers: Vec::new(),
        switches: Vec::new(),
        loads: Vec::new(),
        sources: Vec::new(),
        lines_params: Vec::new(),
        transformers_params: Vec::new(),
    };
    let mut lines_params: BTreeMap<String, Arc<LineParameters>> = BTreeMap::new();
    let mut transformers_params: BTreeMap<String, Arc<TransformerParameters>> = BTreeMap::new();

    for &key in grid.network_buses(net)? {
        let bus = grid.bus(key)?;
        doc.buses.push(BusData {
            id: bus.id().to_string(),
            potential: bus.potential().filter(|_| bus.is_initialized_by_user()),
            nominal_voltage: bus.nominal_voltage(),
            min_voltage_level: bus.min_voltage_level(),
            max_voltage_level: bus.max_voltage_level(),
            results: include_results
                .then(|| grid.res_bus_potential(key))
                .transpose()?
                .map(|potential| BusResultsData { potential }),
        });

        // Loads follow the order of the bus ledgers
        for element in grid.connected_elements(key)? {
            let ElementKey::Load(load_key) = *element else {
                continue;
            };
            let load = grid.load(load_key)?;
            let mut data = LoadData {
                id: load.id().to_string(),
                bus: bus.id().to_string(),
                load_type: load.load_type(),
                power: None,
                current: None,
                impedance: None,
                flexible_param: None,
                results: None,
            };
            match load.kind() {
                LoadKind::Power { power, flexible } => {
                    data.power = Some(*power);
                    data.flexible_param = flexible.clone();
                }
                LoadKind::Current { current } => data.current = Some(*current),
                LoadKind::Impedance { impedance } => data.impedance = Some(*impedance),
            }
            if include_results {
                data.results = Some(LeafResultsData {
                    current: grid.res_load_current(load_key)?,
                    potential: grid.res_load_potential(load_key)?,
                    flexible_power: if load.is_flexible() {
                        Some(grid.res_load_flexible_power(load_key)?)
                    } else {
                        None
                    },
                });
            }
            doc.loads.push(data);
        }
    }

    for &key in grid.network_branches(net)? {
        let (bus1, bus2) = grid.branch_buses(key)?;
        let bus1 = grid.bus(bus1)?.id().to_string();
        let bus2 = grid.bus(bus2)?.id().to_string();
        let results = include_results
            .then(|| grid.res_branch_currents(key))
            .transpose()?
            .map(|(current1, current2)| BranchResultsData { current1, current2 });
        match grid.branch(key)? {
            Branch::Line(line) => {
                insert_shared(&mut lines_params, line.parameters(), |id| {
                    SpnetError::JsonLineParametersDuplicates(format!(
                        "There are line parameters with duplicate IDs: '{id}'."
                    ))
                })?;
                doc.lines.push(LineData {
                    id: line.id().to_string(),
                    bus1,
                    bus2,
                    length: line.length(),
                    params_id: line.parameters().id().to_string(),
                    max_loading: line.max_loading(),
                    results,
                });
            }
            Branch::Transformer(transformer) => {
                insert_shared(&mut transformers_params, transformer.parameters(), |id| {
                    SpnetError::JsonTransformerParametersDuplicates(format!(
                        "There are transformer parameters with duplicate IDs: '{id}'."
                    ))
                })?;
                doc.transformers.push(TransformerData {
                    id: transformer.id().to_string(),
                    bus1,
                    bus2,
                    params_id: transformer.parameters().id().to_string(),
                    tap: transformer.tap(),
                    max_loading: transformer.max_loading(),
                    results,
                });
            }
            Branch::Switch(switch) => doc.switches.push(SwitchData {
                id: switch.id().to_string(),
                bus1,
                bus2,
                results,
            }),
        }
    }

    for &key in grid.network_sources(net)? {
        let source = grid.source(key)?;
        doc.sources.push(SourceData {
            id: source.id().to_string(),
            bus: grid.bus(grid.source_bus(key)?)?.id().to_string(),
            voltage: source.voltage(),
            results: if include_results {
                Some(LeafResultsData {
                    current: grid.res_source_current(key)?,
                    potential: grid.res_source_potential(key)?,
                    flexible_power: None,
                })
            } else {
                None
            },
        });
    }

    doc.lines_params = lines_params
        .values()
        .map(|params| LineParametersData {
            id: params.id().to_string(),
            z_line: to_matrix(params.z_line()),
            y_shunt: params.y_shunt().map(to_matrix),
            ampacity: params.ampacity(),
            line_type: params.line_type().map(str::to_string),
            material: params.material().map(str::to_string),
            section: params.section(),
        })
        .collect();
    doc.transformers_params = transformers_params
        .values()
        .map(|params| TransformerParametersData {
            id: params.id().to_string(),
            z2: params.z2(),
            ym: params.ym(),
            k: params.k(),
            sn: params.sn(),
            uhv: params.uhv(),
            ulv: params.ulv(),
        })
        .collect();

    debug!(
        buses = doc.buses.len(),
        loads = doc.loads.len(),
        include_results,
        "serialized network #{}",
        net.value()
    );
    Ok(doc)
}

pub fn network_to_value(grid: &Grid, net: NetworkId, include_results: bool) -> SpnetResult<Value> {
    Ok(serde_json::to_value(network_to_document(grid, net, include_results)?)?)
}

/// Shared parameters are written once per id. Two different objects under
/// the same id are an error.
fn insert_shared<P>(
    params: &mut BTreeMap<String, Arc<P>>,
    candidate: &Arc<P>,
    duplicate: impl Fn(&str) -> SpnetError,
) -> SpnetResult<()>
where
    P: PartialEq + HasId,
{
    let id = candidate.id();
    match params.get(id) {
        Some(existing) if Arc::ptr_eq(existing, candidate) || **existing == **candidate => Ok(()),
        Some(_) => {
            let err = duplicate(id);
            tracing::error!("{err}");
            Err(err)
        }
        None => {
            params.insert(id.to_string(), Arc::clone(candidate));
            Ok(())
        }
    }
}

trait HasId {
    fn id(&self) -> &str;
}

impl HasId for LineParameters {
    fn id(&self) -> &str {
        LineParameters::id(self)
    }
}

impl HasId for TransformerParameters {
    fn id(&self) -> &str {
        TransformerParameters::id(self)
    }
}
