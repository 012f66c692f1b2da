//! Result staleness and warm-start decisions across a network's life

use num_complex::Complex64;
use spnet_core::*;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

const OUTDATED: &str = "may be outdated";

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

/// In-memory log sink shared with the subscriber
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with warnings captured, returns its output and the log text.
fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(Level::WARN)
        .with_ansi(false)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, captured.text())
}

struct Feeder {
    grid: Grid,
    net: NetworkId,
    bus1: BusKey,
    line: BranchKey,
    load: LoadKey,
}

fn feeder() -> Feeder {
    let mut grid = Grid::new();
    let bus0 = grid.add_bus(Bus::new("bus0"));
    let bus1 = grid.add_bus(Bus::new("bus1"));
    let params = Arc::new(LineParameters::new("lp", c(0.5, 0.2), None));
    let line = grid
        .add_line(Line::new("line", params, 2.0).unwrap(), bus0, bus1)
        .unwrap();
    let load = grid.add_load(Load::power("load", c(20e3, 5e3)), bus1).unwrap();
    grid.add_source(VoltageSource::new("vs", c(400.0, 0.0)), bus0)
        .unwrap();
    let net = grid.network_from_element(bus0).unwrap();
    Feeder {
        grid,
        net,
        bus1,
        line,
        load,
    }
}

/// Dense engine keeping every starting vector it is given
struct Recording {
    inner: DenseEngine,
    starts: Arc<Mutex<Vec<Vec<Complex64>>>>,
}

impl LoadFlowEngine for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn assemble(&mut self, model: &NetworkModel) -> SpnetResult<()> {
        self.inner.assemble(model)
    }

    fn solve(&mut self, initial: &[Complex64], config: &SolverConfig) -> SpnetResult<SolveReport> {
        self.starts.lock().unwrap().push(initial.to_vec());
        self.inner.solve(initial, config)
    }

    fn bus_potential(&self, bus: usize) -> SpnetResult<Complex64> {
        self.inner.bus_potential(bus)
    }

    fn branch_currents(&self, branch: usize) -> SpnetResult<(Complex64, Complex64)> {
        self.inner.branch_currents(branch)
    }

    fn load_current(&self, load: usize) -> SpnetResult<Complex64> {
        self.inner.load_current(load)
    }

    fn source_current(&self, source: usize) -> SpnetResult<Complex64> {
        self.inner.source_current(source)
    }

    fn flexible_power(&self, load: usize) -> SpnetResult<Option<Complex64>> {
        self.inner.flexible_power(load)
    }
}

fn record_starts(f: &mut Feeder) -> Arc<Mutex<Vec<Vec<Complex64>>>> {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let engine = Recording {
        inner: DenseEngine::new(),
        starts: starts.clone(),
    };
    f.grid.set_engine(f.net, Box::new(engine)).unwrap();
    starts
}

fn last_plan(f: &Feeder) -> StartPlan {
    f.grid.network_info(f.net).unwrap().last_plan.unwrap()
}

#[test]
fn first_solve_starts_from_propagated_potentials() {
    let mut f = feeder();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();

    let plan = last_plan(&f);
    assert_eq!(plan.kind, StartKind::Warm);
    assert!(!plan.propagate_potentials);
    assert!(!plan.converged_start);
    let info = f.grid.network_info(f.net).unwrap();
    assert_eq!(info.propagations, 1);
    assert_eq!(info.resets, 0);
    assert_eq!(info.solves, 1);
    assert_eq!(info.engine, "dense");
}

#[test]
fn warm_solve_of_valid_results_keeps_potentials() {
    let mut f = feeder();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let before = f.grid.res_bus_potential(f.bus1).unwrap();

    let report = f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let plan = last_plan(&f);
    assert_eq!(plan.kind, StartKind::Warm);
    assert!(plan.converged_start);
    assert!(!plan.reset_inputs);
    assert_eq!(report.iterations, 1);
    assert_eq!(f.grid.network_info(f.net).unwrap().propagations, 1);
    assert!((f.grid.res_bus_potential(f.bus1).unwrap() - before).norm() < 1e-8);
}

#[test]
fn cold_solve_always_resets() {
    let mut f = feeder();
    let cold = SolverConfig {
        warm_start: false,
        ..SolverConfig::default()
    };
    f.grid.solve_load_flow(f.net, &cold).unwrap();
    f.grid.solve_load_flow(f.net, &cold).unwrap();

    let plan = last_plan(&f);
    assert_eq!(plan.kind, StartKind::Cold);
    assert!(plan.reset_inputs);
    assert_eq!(f.grid.network_info(f.net).unwrap().resets, 2);
}

#[test]
fn new_element_forces_propagation() {
    let mut f = feeder();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();

    let bus2 = f.grid.add_bus(Bus::new("bus2"));
    let params = Arc::new(LineParameters::new("lp", c(0.5, 0.2), None));
    f.grid
        .add_line(Line::new("line2", params, 1.0).unwrap(), f.bus1, bus2)
        .unwrap();
    assert!(!f.grid.is_topology_valid(f.net).unwrap());
    assert_eq!(f.grid.network_of(bus2).unwrap(), Some(f.net));
    assert_eq!(f.grid.result_state(f.load).unwrap(), ResultState::Stale);

    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let plan = last_plan(&f);
    assert!(plan.propagate_potentials);
    assert_eq!(plan.kind, StartKind::Cold);
    assert_eq!(f.grid.network_info(f.net).unwrap().propagations, 2);
    assert!(f.grid.is_topology_valid(f.net).unwrap());
    assert!(f.grid.res_bus_voltage(bus2).unwrap().norm() < 400.0);
}

#[test]
fn topology_change_starts_from_propagated_potentials() {
    let mut f = feeder();
    let starts = record_starts(&mut f);
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let propagated = f.grid.bus(f.bus1).unwrap().potential().unwrap();
    let converged = f.grid.res_bus_potential(f.bus1).unwrap();
    assert!((converged - propagated).norm() > 1.0);

    let bus2 = f.grid.add_bus(Bus::new("bus2"));
    let params = Arc::new(LineParameters::new("lp", c(0.5, 0.2), None));
    f.grid
        .add_line(Line::new("line2", params, 1.0).unwrap(), f.bus1, bus2)
        .unwrap();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    assert_eq!(last_plan(&f).kind, StartKind::Cold);

    let starts = starts.lock().unwrap();
    assert_eq!(starts.len(), 2);
    // Members are bus0, bus1 then bus2
    let start = &starts[1];
    assert_eq!(start.len(), 3);
    assert!((start[1] - propagated).norm() < 1e-9);
    assert!((start[2] - propagated).norm() < 1e-9);
}

#[test]
fn stale_results_warn_on_every_access() {
    let mut f = feeder();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let fresh = f.grid.res_load_power(f.load).unwrap();

    f.grid.set_load_power(f.load, c(10e3, 0.0)).unwrap();
    assert_eq!(f.grid.result_state(f.load).unwrap(), ResultState::Stale);
    assert!(!f.grid.has_valid_results(f.net).unwrap());

    let grid = &f.grid;
    let ((first, second), logs) = capture_warnings(|| {
        (
            grid.res_load_power(f.load).unwrap(),
            grid.res_load_power(f.load).unwrap(),
        )
    });
    assert_eq!(first, fresh);
    assert_eq!(second, fresh);
    assert!(first.re.is_finite() && first.im.is_finite());
    assert_eq!(logs.matches(OUTDATED).count(), 2, "{logs}");
    assert!(logs.contains("The results of load 'load' may be outdated."));

    // One warning per table, not per row
    let (_, logs) = capture_warnings(|| grid.res_buses(f.net).unwrap());
    assert_eq!(logs.matches(OUTDATED).count(), 1, "{logs}");
    assert!(logs.contains("The results of this network may be outdated."));

    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let grid = &f.grid;
    let (power, logs) = capture_warnings(|| grid.res_load_power(f.load).unwrap());
    assert!((power - c(10e3, 0.0)).norm() < 1e-6);
    assert!(!logs.contains(OUTDATED), "{logs}");
    assert_eq!(grid.result_state(f.load).unwrap(), ResultState::Fresh);
}

#[test]
fn limits_do_not_invalidate_results() {
    let mut f = feeder();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();

    f.grid.set_bus_nominal_voltage(f.bus1, Some(400.0)).unwrap();
    f.grid.set_line_max_loading(f.line, 0.8).unwrap();
    assert!(f.grid.has_valid_results(f.net).unwrap());

    f.grid.set_line_length(f.line, 3.0).unwrap();
    assert!(!f.grid.has_valid_results(f.net).unwrap());
}

#[test]
fn replacing_shared_parameters_invalidates() {
    let mut f = feeder();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let before = f.grid.res_bus_voltage(f.bus1).unwrap().norm();

    let heavier = Arc::new(LineParameters::new("lp", c(0.8, 0.3), None));
    assert_eq!(f.grid.replace_line_parameters(heavier).unwrap(), 1);
    assert_eq!(f.grid.result_state(f.bus1).unwrap(), ResultState::Stale);

    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    assert!(f.grid.res_bus_voltage(f.bus1).unwrap().norm() < before);
}

#[test]
fn disconnected_load_is_unusable() {
    let mut f = feeder();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();

    f.grid.disconnect(f.load).unwrap();
    assert!(!f.grid.is_topology_valid(f.net).unwrap());
    let err = f.grid.res_load_power(f.load).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DisconnectedElement);
    assert_eq!(
        err.to_string(),
        "The load 'load' is disconnected and cannot be used anymore."
    );
    assert_eq!(f.grid.network_loads(f.net).unwrap().len(), 0);

    // Without its load the feeder carries no current
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let (i1, _) = f.grid.res_branch_currents(f.line).unwrap();
    assert!(i1.norm() < 1e-9);
}

#[test]
fn failed_solve_keeps_previous_results() {
    let mut f = feeder();
    f.grid.solve_load_flow(f.net, &SolverConfig::default()).unwrap();
    let before = f.grid.res_load_power(f.load).unwrap();

    f.grid.set_load_power(f.load, c(30e3, 0.0)).unwrap();
    let strict = SolverConfig {
        max_iterations: 1,
        tolerance: 1e-300,
        ..SolverConfig::default()
    };
    let err = f.grid.solve_load_flow(f.net, &strict).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoLoadFlowConvergence);
    assert_eq!(f.grid.result_state(f.load).unwrap(), ResultState::Stale);
    assert_eq!(f.grid.res_load_power(f.load).unwrap(), before);
}
