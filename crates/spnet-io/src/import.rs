//! JSON document → network.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use spnet_core::{
    BranchKey, BranchResults, Bus, BusKey, BusResults, ElementCollections, ElementKey,
    ElementResults, Grid, LeafResults, Line, LineParameters, Load, LoadType, NetworkId,
    SpnetError, SpnetResult, Switch, Transformer, TransformerParameters, VoltageSource,
};
use tracing::{debug, info};

use crate::raise;
use crate::schema::{
    from_matrix, BranchResultsData, ComplexMatrix, LeafResultsData, LineParametersData, LoadData,
    NetworkDocument, TransformerParametersData, NETWORK_JSON_VERSION,
};

fn bad_format<T>(msg: String) -> SpnetResult<T> {
    raise(SpnetError::BadJsonFormat, msg)
}

/// Checks `version` and `is_multiphase` before reading the rest.
fn check_header(value: &Value) -> SpnetResult<()> {
    let Some(object) = value.as_object() else {
        return bad_format("The network document must be a JSON object.".to_string());
    };
    match object.get("version").and_then(Value::as_u64) {
        Some(version) if version == u64::from(NETWORK_JSON_VERSION) => {}
        Some(version) => {
            return bad_format(format!(
                "Unsupported network file version {version}: only version \
                 {NETWORK_JSON_VERSION} can be read."
            ))
        }
        None => return bad_format("The network document has no valid 'version'.".to_string()),
    }
    if object.get("is_multiphase").and_then(Value::as_bool) != Some(false) {
        return bad_format(
            "Only single-phase-equivalent networks ('is_multiphase': false) can be read."
                .to_string(),
        );
    }
    Ok(())
}

pub fn network_from_value(value: Value) -> SpnetResult<(Grid, NetworkId)> {
    check_header(&value)?;
    let doc: NetworkDocument = serde_json::from_value(value)?;
    network_from_document(doc)
}

/// Builds a grid holding the single network of `doc`.
///
/// When every element carries results, they are restored and the network
/// has valid results. Otherwise the network has no results.
pub fn network_from_document(doc: NetworkDocument) -> SpnetResult<(Grid, NetworkId)> {
    if doc.version != NETWORK_JSON_VERSION || doc.is_multiphase {
        return bad_format(format!(
            "Unsupported network document (version {}, multiphase {}).",
            doc.version, doc.is_multiphase
        ));
    }

    let mut lines_params = HashMap::new();
    for data in &doc.lines_params {
        let params = Arc::new(line_parameters(data)?);
        if lines_params.insert(data.id.clone(), params).is_some() {
            return raise(
                SpnetError::JsonLineParametersDuplicates,
                format!("There are line parameters with duplicate IDs: '{}'.", data.id),
            );
        }
    }
    let mut transformers_params = HashMap::new();
    for data in &doc.transformers_params {
        let params = Arc::new(transformer_parameters(data)?);
        if transformers_params.insert(data.id.clone(), params).is_some() {
            return raise(
                SpnetError::JsonTransformerParametersDuplicates,
                format!("There are transformer parameters with duplicate IDs: '{}'.", data.id),
            );
        }
    }

    let mut grid = Grid::new();
    let mut collections = ElementCollections::new();
    let mut results: Vec<(ElementKey, ElementResults)> = Vec::new();
    let mut missing = 0usize;

    let mut buses: HashMap<&str, BusKey> = HashMap::new();
    for data in &doc.buses {
        let mut bus = Bus::new(&data.id);
        if let Some(potential) = data.potential {
            bus = bus.with_potential(potential);
        }
        if let Some(nominal_voltage) = data.nominal_voltage {
            bus = bus.with_nominal_voltage(nominal_voltage);
        }
        let bus = bus.with_voltage_levels(data.min_voltage_level, data.max_voltage_level)?;
        let key = grid.add_bus(bus);
        if buses.insert(&data.id, key).is_some() {
            return bad_format(format!("The bus '{}' is defined several times.", data.id));
        }
        collections.buses.push((data.id.clone(), key));
        match data.results {
            Some(r) => results.push((
                key.into(),
                ElementResults::Bus(BusResults {
                    potential: r.potential,
                }),
            )),
            None => missing += 1,
        }
    }
    let bus_of = |element: &str, id: &str| -> SpnetResult<BusKey> {
        match buses.get(id) {
            Some(&key) => Ok(key),
            None => bad_format(format!("The element '{element}' refers to the unknown bus '{id}'.")),
        }
    };

    for data in &doc.lines {
        let Some(params) = lines_params.get(&data.params_id) else {
            return bad_format(format!(
                "The line '{}' refers to the unknown line parameters '{}'.",
                data.id, data.params_id
            ));
        };
        let line = Line::new(&data.id, Arc::clone(params), data.length)?
            .with_max_loading(data.max_loading)?;
        let key = grid.add_line(
            line,
            bus_of(&data.id, &data.bus1)?,
            bus_of(&data.id, &data.bus2)?,
        )?;
        collections.lines.push((data.id.clone(), key));
        push_branch_results(&mut results, &mut missing, key, data.results);
    }
    for data in &doc.transformers {
        let Some(params) = transformers_params.get(&data.params_id) else {
            return bad_format(format!(
                "The transformer '{}' refers to the unknown transformer parameters '{}'.",
                data.id, data.params_id
            ));
        };
        let transformer = Transformer::new(&data.id, Arc::clone(params))
            .with_tap(data.tap)
            .with_max_loading(data.max_loading)?;
        let key = grid.add_transformer(
            transformer,
            bus_of(&data.id, &data.bus1)?,
            bus_of(&data.id, &data.bus2)?,
        )?;
        collections.transformers.push((data.id.clone(), key));
        push_branch_results(&mut results, &mut missing, key, data.results);
    }
    for data in &doc.switches {
        let key = grid.add_switch(
            Switch::new(&data.id),
            bus_of(&data.id, &data.bus1)?,
            bus_of(&data.id, &data.bus2)?,
        )?;
        collections.switches.push((data.id.clone(), key));
        push_branch_results(&mut results, &mut missing, key, data.results);
    }
    for data in &doc.loads {
        let key = grid.add_load(load(data)?, bus_of(&data.id, &data.bus)?)?;
        collections.loads.push((data.id.clone(), key));
        match data.results {
            Some(r) => results.push((key.into(), ElementResults::Load(leaf_results(r)))),
            None => missing += 1,
        }
    }
    for data in &doc.sources {
        let source = VoltageSource::new(&data.id, data.voltage);
        let key = grid.add_source(source, bus_of(&data.id, &data.bus)?)?;
        collections.sources.push((data.id.clone(), key));
        match data.results {
            Some(r) => results.push((key.into(), ElementResults::Source(leaf_results(r)))),
            None => missing += 1,
        }
    }

    let net = grid.create_network(collections)?;
    if !results.is_empty() {
        if missing > 0 {
            debug!("{missing} elements have no results, the results are ignored");
        }
        grid.restore_results(net, results)?;
    }
    info!(
        buses = doc.buses.len(),
        branches = doc.lines.len() + doc.transformers.len() + doc.switches.len(),
        loads = doc.loads.len(),
        sources = doc.sources.len(),
        "read network from JSON"
    );
    Ok((grid, net))
}

fn push_branch_results(
    results: &mut Vec<(ElementKey, ElementResults)>,
    missing: &mut usize,
    key: BranchKey,
    data: Option<BranchResultsData>,
) {
    match data {
        Some(r) => results.push((
            key.into(),
            ElementResults::Branch(BranchResults {
                current1: r.current1,
                current2: r.current2,
            }),
        )),
        None => *missing += 1,
    }
}

fn leaf_results(data: LeafResultsData) -> LeafResults {
    LeafResults {
        current: data.current,
        potential: data.potential,
        flexible_power: data.flexible_power,
    }
}

fn line_parameters(data: &LineParametersData) -> SpnetResult<LineParameters> {
    let joined = |name: &str, matrix: &ComplexMatrix, variant: fn(String) -> SpnetError| {
        match from_matrix(matrix) {
            Some(joined) => Ok(joined),
            None => raise(
                variant,
                format!(
                    "The real and imaginary parts of {name} differ in shape for line parameters \
                     '{}'.",
                    data.id
                ),
            ),
        }
    };
    let z_line = joined("z_line", &data.z_line, SpnetError::BadZLineShape)?;
    let y_shunt = match &data.y_shunt {
        Some(y) => Some(joined("y_shunt", y, SpnetError::BadYShuntShape)?),
        None => None,
    };
    let mut params = LineParameters::from_matrices(&data.id, &z_line, y_shunt.as_deref())?;
    if let Some(ampacity) = data.ampacity {
        params = params.with_ampacity(ampacity);
    }
    if let Some(line_type) = &data.line_type {
        params = params.with_line_type(line_type);
    }
    if let Some(material) = &data.material {
        params = params.with_material(material);
    }
    if let Some(section) = data.section {
        params = params.with_section(section);
    }
    Ok(params)
}

fn transformer_parameters(data: &TransformerParametersData) -> SpnetResult<TransformerParameters> {
    TransformerParameters::new(&data.id, data.uhv, data.ulv, data.sn, data.z2, data.ym)?
        .with_ratio(data.k)
}

fn load(data: &LoadData) -> SpnetResult<Load> {
    let value = match data.load_type {
        LoadType::Power => data.power,
        LoadType::Current => data.current,
        LoadType::Impedance => data.impedance,
    };
    let Some(value) = value else {
        return bad_format(format!(
            "The load '{}' of type '{}' has no '{}' value.",
            data.id, data.load_type, data.load_type
        ));
    };
    match (data.load_type, &data.flexible_param) {
        (LoadType::Power, Some(flexible)) => {
            Load::flexible(&data.id, value, flexible.clone().validated()?)
        }
        (LoadType::Power, None) => Ok(Load::power(&data.id, value)),
        (_, Some(_)) => bad_format(format!(
            "The load '{}' is of type '{}' and cannot be flexible.",
            data.id, data.load_type
        )),
        (LoadType::Current, None) => Ok(Load::current(&data.id, value)),
        (LoadType::Impedance, None) => Load::impedance(&data.id, value),
    }
}
