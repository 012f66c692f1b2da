//! Reading and writing networks as JSON documents

use std::sync::Arc;

use num_complex::Complex64;
use serde_json::{json, Value};
use spnet_core::*;
use spnet_io::{
    from_json_file, network_from_value, network_to_document, network_to_value, results_to_value,
    to_json_file,
};

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

/// MV source, transformer, a line with and a line without shunt, a switch,
/// one load of each type and a flexible load
fn feeder() -> (Grid, NetworkId) {
    let mut grid = Grid::new();
    let mv = grid.add_bus(Bus::new("mv").with_potential(c(20e3 / 3f64.sqrt(), 0.0)));
    let lv = grid.add_bus(
        Bus::new("lv")
            .with_nominal_voltage(400.0)
            .with_voltage_levels(Some(0.9), Some(1.1))
            .unwrap(),
    );
    let a = grid.add_bus(Bus::new("a"));
    let b = grid.add_bus(Bus::new("b"));
    let d = grid.add_bus(Bus::new("d"));

    let tp = Arc::new(
        TransformerParameters::new("tp", 20e3, 400.0, 160e3, c(0.03, 0.08), c(1e-7, -1e-6)).unwrap(),
    );
    let shunt = Arc::new(
        LineParameters::new("shunt", c(0.2, 0.1), Some(c(0.0, 2e-4)))
            .with_ampacity(200.0)
            .with_material("AL")
            .with_section(150.0),
    );
    let plain = Arc::new(LineParameters::new("plain", c(0.4, 0.1), None));

    let source = grid
        .add_source(VoltageSource::new("vs", c(20e3, 0.0)), mv)
        .unwrap();
    grid.add_transformer(Transformer::new("tr", tp).with_tap(1.025), mv, lv)
        .unwrap();
    grid.add_line(
        Line::new("l1", shunt, 0.4).unwrap().with_max_loading(0.8).unwrap(),
        lv,
        a,
    )
    .unwrap();
    grid.add_line(Line::new("l2", plain, 0.1).unwrap(), a, b)
        .unwrap();
    grid.add_switch(Switch::new("sw"), b, d).unwrap();

    grid.add_load(Load::power("p", c(6e3, 1e3)), a).unwrap();
    grid.add_load(Load::current("i", c(5.0, -1.0)), b).unwrap();
    grid.add_load(Load::impedance("z", c(50.0, 5.0)).unwrap(), d)
        .unwrap();
    let fp = FlexibleParameter::p_max_u_production(420.0, 440.0, 8e3).unwrap();
    grid.add_load(Load::flexible("pv", c(-4e3, 0.0), fp).unwrap(), b)
        .unwrap();

    let net = grid.network_from_element(source).unwrap();
    (grid, net)
}

fn solved_feeder() -> (Grid, NetworkId) {
    let (mut grid, net) = feeder();
    grid.solve_load_flow(net, &SolverConfig::default()).unwrap();
    (grid, net)
}

#[test]
fn round_trip_without_results() {
    let (grid, net) = feeder();
    let first = network_to_value(&grid, net, true).unwrap();
    assert!(first["buses"][0].get("results").is_none());
    assert_eq!(first["version"], json!(2));
    assert_eq!(first["is_multiphase"], json!(false));

    let (read, read_net) = network_from_value(first.clone()).unwrap();
    assert!(!read.has_results(read_net).unwrap());
    assert_eq!(network_to_value(&read, read_net, true).unwrap(), first);
}

#[test]
fn round_trip_with_results() {
    let (grid, net) = solved_feeder();
    let first = network_to_value(&grid, net, true).unwrap();
    assert!(first["lines"][0]["results"]["current1"].is_array());
    assert!(first["loads"][2]["results"]["flexible_power"].is_array());

    let (read, read_net) = network_from_value(first.clone()).unwrap();
    assert!(read.has_valid_results(read_net).unwrap());
    assert_eq!(network_to_value(&read, read_net, true).unwrap(), first);

    let load = read.find_load(read_net, "p").unwrap();
    let original = grid.find_load(net, "p").unwrap();
    assert_eq!(
        read.res_load_power(load).unwrap(),
        grid.res_load_power(original).unwrap()
    );
}

#[test]
fn elements_follow_network_order() {
    let (grid, net) = feeder();
    let doc = network_to_document(&grid, net, false).unwrap();
    let ids = |items: Vec<&str>| items.into_iter().map(str::to_string).collect::<Vec<_>>();
    assert_eq!(
        doc.buses.iter().map(|b| b.id.clone()).collect::<Vec<_>>(),
        ids(vec!["mv", "lv", "a", "b", "d"])
    );
    assert_eq!(
        doc.loads.iter().map(|l| l.id.clone()).collect::<Vec<_>>(),
        ids(vec!["p", "i", "pv", "z"])
    );
    // Shared parameters are sorted by id
    assert_eq!(
        doc.lines_params.iter().map(|p| p.id.clone()).collect::<Vec<_>>(),
        ids(vec!["plain", "shunt"])
    );
    assert_eq!(doc.transformers[0].tap, 1.025);
    assert_eq!(doc.lines[0].max_loading, 0.8);
}

#[test]
fn line_parameters_layout() {
    let (grid, net) = feeder();
    let value = network_to_value(&grid, net, false).unwrap();
    let params = value["lines_params"].as_array().unwrap();
    assert_eq!(
        params[0],
        json!({"id": "plain", "z_line": [[[0.4]], [[0.1]]]})
    );
    assert_eq!(params[1]["y_shunt"], json!([[[0.0]], [[2e-4]]]));
    assert_eq!(params[1]["ampacity"], json!(200.0));
    assert_eq!(params[1]["material"], json!("AL"));

    let (read, read_net) = network_from_value(value).unwrap();
    let l1 = read.find_line(read_net, "l1").unwrap();
    let l2 = read.find_line(read_net, "l2").unwrap();
    assert!(read.line(l1).unwrap().with_shunt());
    assert!(!read.line(l2).unwrap().with_shunt());
}

#[test]
fn only_user_potentials_are_written() {
    let (grid, net) = feeder();
    let value = network_to_value(&grid, net, false).unwrap();
    assert!(value["buses"][0]["potential"].is_array());
    assert!(value["buses"][1].get("potential").is_none());
    assert_eq!(value["buses"][1]["nominal_voltage"], json!(400.0));
}

#[test]
fn unsolved_network_is_written_without_results() {
    let (grid, net) = feeder();
    let value = network_to_value(&grid, net, true).unwrap();
    for kind in ["buses", "lines", "transformers", "switches", "loads", "sources"] {
        for element in value[kind].as_array().unwrap() {
            assert!(element.get("results").is_none(), "{kind}: {element}");
        }
    }
}

#[test]
fn stale_results_cannot_be_written() {
    let (mut grid, net) = solved_feeder();
    let load = grid.find_load(net, "p").unwrap();
    grid.set_load_power(load, c(7e3, 1e3)).unwrap();

    let err = network_to_value(&grid, net, true).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadLoadFlowResult);
    // Without results the network is still written
    assert!(network_to_value(&grid, net, false).is_ok());
}

#[test]
fn partial_results_are_dropped() {
    let (grid, net) = solved_feeder();
    let mut value = network_to_value(&grid, net, true).unwrap();
    value["loads"][0].as_object_mut().unwrap().remove("results");

    let (read, read_net) = network_from_value(value).unwrap();
    assert!(!read.has_results(read_net).unwrap());
    let bus = read.find_bus(read_net, "lv").unwrap();
    assert_eq!(
        read.res_bus_potential(bus).unwrap_err().code(),
        ErrorCode::LoadFlowNotRun
    );
}

#[test]
fn conflicting_shared_parameters_cannot_be_written() {
    let mut grid = Grid::new();
    let b0 = grid.add_bus(Bus::new("b0"));
    let b1 = grid.add_bus(Bus::new("b1"));
    let b2 = grid.add_bus(Bus::new("b2"));
    let first = Arc::new(LineParameters::new("lp", c(0.1, 0.0), None));
    let second = Arc::new(LineParameters::new("lp", c(0.2, 0.0), None));
    grid.add_line(Line::new("l1", first, 1.0).unwrap(), b0, b1)
        .unwrap();
    grid.add_line(Line::new("l2", second, 1.0).unwrap(), b1, b2)
        .unwrap();
    grid.add_source(VoltageSource::new("vs", c(400.0, 0.0)), b0)
        .unwrap();
    let net = grid.network_from_element(b0).unwrap();

    let err = network_to_value(&grid, net, false).unwrap_err();
    assert_eq!(err.code(), ErrorCode::JsonLineParametersDuplicates);
    assert_eq!(
        err.to_string(),
        "There are line parameters with duplicate IDs: 'lp'."
    );
}

#[test]
fn equal_shared_parameters_are_written_once() {
    let mut grid = Grid::new();
    let b0 = grid.add_bus(Bus::new("b0"));
    let b1 = grid.add_bus(Bus::new("b1"));
    let b2 = grid.add_bus(Bus::new("b2"));
    for (id, from, to) in [("l1", b0, b1), ("l2", b1, b2)] {
        let params = Arc::new(LineParameters::new("lp", c(0.1, 0.0), None));
        grid.add_line(Line::new(id, params, 1.0).unwrap(), from, to)
            .unwrap();
    }
    grid.add_source(VoltageSource::new("vs", c(400.0, 0.0)), b0)
        .unwrap();
    let net = grid.network_from_element(b0).unwrap();

    let doc = network_to_document(&grid, net, false).unwrap();
    assert_eq!(doc.lines_params.len(), 1);
}

fn minimal_document() -> Value {
    json!({
        "version": 2,
        "is_multiphase": false,
        "buses": [{"id": "b0"}, {"id": "b1"}],
        "lines": [
            {"id": "l", "bus1": "b0", "bus2": "b1", "length": 1.0, "params_id": "lp"}
        ],
        "transformers": [],
        "switches": [],
        "loads": [{"id": "load", "bus": "b1", "type": "power", "power": [1000.0, 0.0]}],
        "sources": [{"id": "vs", "bus": "b0", "voltage": [400.0, 0.0]}],
        "lines_params": [{"id": "lp", "z_line": [[[0.5]], [[0.1]]]}],
        "transformers_params": []
    })
}

#[test]
fn minimal_document_is_solvable() {
    let (mut grid, net) = network_from_value(minimal_document()).unwrap();
    grid.solve_load_flow(net, &SolverConfig::default()).unwrap();
    let load = grid.find_load(net, "load").unwrap();
    assert!((grid.res_load_power(load).unwrap() - c(1000.0, 0.0)).norm() < 1e-3);
}

#[test]
fn unsupported_headers_are_rejected() {
    let mut old = minimal_document();
    old["version"] = json!(1);
    assert_eq!(
        network_from_value(old).unwrap_err().code(),
        ErrorCode::BadJsonFormat
    );

    let mut multiphase = minimal_document();
    multiphase["is_multiphase"] = json!(true);
    assert_eq!(
        network_from_value(multiphase).unwrap_err().code(),
        ErrorCode::BadJsonFormat
    );
}

#[test]
fn duplicated_parameters_in_document_are_rejected() {
    let mut doc = minimal_document();
    doc["lines_params"] = json!([
        {"id": "lp", "z_line": [[[0.5]], [[0.1]]]},
        {"id": "lp", "z_line": [[[0.6]], [[0.1]]]}
    ]);
    assert_eq!(
        network_from_value(doc).unwrap_err().code(),
        ErrorCode::JsonLineParametersDuplicates
    );
}

#[test]
fn dangling_references_are_rejected() {
    let mut unknown_bus = minimal_document();
    unknown_bus["loads"][0]["bus"] = json!("nowhere");
    assert_eq!(
        network_from_value(unknown_bus).unwrap_err().code(),
        ErrorCode::BadJsonFormat
    );

    let mut unknown_params = minimal_document();
    unknown_params["lines"][0]["params_id"] = json!("missing");
    assert_eq!(
        network_from_value(unknown_params).unwrap_err().code(),
        ErrorCode::BadJsonFormat
    );
}

#[test]
fn malformed_line_matrices_are_rejected() {
    let mut doc = minimal_document();
    doc["lines_params"][0]["z_line"] = json!([[[0.5, 0.1]], [[0.1, 0.0]]]);
    assert_eq!(
        network_from_value(doc).unwrap_err().code(),
        ErrorCode::BadZLineShape
    );
}

#[test]
fn file_round_trip() {
    let (grid, net) = solved_feeder();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("network.json");
    to_json_file(&grid, net, &path, true).unwrap();

    let (read, read_net) = from_json_file(&path).unwrap();
    assert!(read.has_valid_results(read_net).unwrap());
    assert_eq!(
        network_to_value(&read, read_net, true).unwrap(),
        network_to_value(&grid, net, true).unwrap()
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Io);
}

#[test]
fn results_dictionary_short_and_full() {
    let (grid, net) = solved_feeder();

    let short = results_to_value(&grid, net, false).unwrap();
    assert_eq!(short["buses"].as_array().unwrap().len(), 5);
    assert!(short["buses"][0].get("voltage").is_none());
    assert_eq!(short["loads"][2]["id"], json!("pv"));
    assert!(short["loads"][2]["flexible_power"].is_array());
    assert!(short["loads"][0].get("flexible_power").is_none());
    assert_eq!(short["switches"][0]["id"], json!("sw"));
    assert!(short.get("loads_flexible_powers").is_none());

    let full = results_to_value(&grid, net, true).unwrap();
    assert!(full["buses"][1]["voltage"].is_array());
    assert_eq!(full["buses"][1]["violated"], json!(false));
    assert_eq!(full["loads_flexible_powers"].as_array().unwrap().len(), 1);
}
