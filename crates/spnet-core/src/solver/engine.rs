//! Boundary between the network model and the numerical load flow engine.
//!
//! The network compiles its elements into a [`NetworkModel`] of per-phase
//! quantities indexed by position, hands it to an engine once, then asks the
//! engine to solve from a vector of starting potentials as many times as
//! needed. After a successful solve, the network reads back per-element
//! values through the accessor methods.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::SpnetResult;
use crate::flexible::FlexibleParameter;
use crate::solver::registry::BackendKind;

/// Tunables of a load flow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Convergence threshold on the potential update (V)
    pub tolerance: f64,
    pub warm_start: bool,
    pub backend: BackendKind,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-8,
            warm_start: true,
            backend: BackendKind::default(),
        }
    }
}

/// Outcome of a converged solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    pub residual: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BranchModelKind {
    Line {
        z: Complex64,
        y: Option<Complex64>,
    },
    Transformer {
        z2: Complex64,
        ym: Complex64,
        ratio: Complex64,
    },
    Switch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchModel {
    pub bus1: usize,
    pub bus2: usize,
    pub kind: BranchModelKind,
}

/// Per-phase load model.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadModelKind {
    /// Per-phase power (VA)
    Power(Complex64),
    /// Per-phase current (A)
    Current(Complex64),
    /// Per-phase impedance (Ω)
    Impedance(Complex64),
    /// Total commanded power and its control
    Flexible {
        power: Complex64,
        parameter: FlexibleParameter,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadModel {
    pub bus: usize,
    pub kind: LoadModelKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceModel {
    pub bus: usize,
    /// Imposed phase-to-ground potential (V)
    pub potential: Complex64,
}

/// Compiled electrical model of one network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkModel {
    pub n_buses: usize,
    pub branches: Vec<BranchModel>,
    pub loads: Vec<LoadModel>,
    pub sources: Vec<SourceModel>,
}

/// A load flow engine.
///
/// All currents are per phase and oriented from the bus into the element.
pub trait LoadFlowEngine: Send {
    fn name(&self) -> &'static str;

    /// Compiles the model. Called again whenever the model changed.
    fn assemble(&mut self, model: &NetworkModel) -> SpnetResult<()>;

    /// Iterates from `initial` (one potential per bus) until convergence.
    fn solve(&mut self, initial: &[Complex64], config: &SolverConfig) -> SpnetResult<SolveReport>;

    fn bus_potential(&self, bus: usize) -> SpnetResult<Complex64>;

    fn branch_currents(&self, branch: usize) -> SpnetResult<(Complex64, Complex64)>;

    fn load_current(&self, load: usize) -> SpnetResult<Complex64>;

    fn source_current(&self, source: usize) -> SpnetResult<Complex64>;

    /// Total power drawn by a flexible load (VA), `None` for other loads.
    fn flexible_power(&self, load: usize) -> SpnetResult<Option<Complex64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_config_defaults_fill_missing_fields() {
        let config: SolverConfig = serde_json::from_str(r#"{"max_iterations": 10}"#).unwrap();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.tolerance, 1e-8);
        assert!(config.warm_start);
        assert_eq!(config.backend, BackendKind::Gauss);
    }
}
