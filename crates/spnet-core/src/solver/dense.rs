//! Reference load flow engine on a dense nodal admittance matrix.
//!
//! Buses joined by switches are merged into one electrical node. Nodes that
//! carry a voltage source have a fixed potential, the others are found by the
//! fixed-point iteration
//!
//! ```text
//! Y_uu · V_u = -I_load(V_u) - Y_us · V_s
//! ```
//!
//! which stops when the largest potential update falls under the tolerance.

use num_complex::Complex64;
use petgraph::unionfind::UnionFind;
use tracing::{debug, info};

use crate::error::{raise, SpnetError, SpnetResult};
use crate::formulas::{line_currents, transformer_admittance, transformer_currents, SQRT_3};
use crate::solver::engine::{
    BranchModelKind, LoadFlowEngine, LoadModelKind, NetworkModel, SolveReport, SolverConfig,
};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

#[derive(Debug, Clone)]
struct Assembled {
    model: NetworkModel,
    /// Electrical node of each bus
    node_of: Vec<usize>,
    /// Imposed potential of each node, if any
    fixed: Vec<Option<Complex64>>,
    /// Nodes with an unknown potential, in matrix order
    unknown: Vec<usize>,
    y: Vec<Vec<Complex64>>,
}

#[derive(Debug, Clone, Default)]
struct Solution {
    potentials: Vec<Complex64>,
    branch_currents: Vec<(Complex64, Complex64)>,
    load_currents: Vec<Complex64>,
    source_currents: Vec<Complex64>,
    flexible_powers: Vec<Option<Complex64>>,
}

#[derive(Debug, Clone, Default)]
pub struct DenseEngine {
    assembled: Option<Assembled>,
    solution: Option<Solution>,
}

impl DenseEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn solution(&self) -> SpnetResult<&Solution> {
        match &self.solution {
            Some(solution) => Ok(solution),
            None => raise(
                SpnetError::LoadFlowNotRun,
                "The load flow results are not available because the load flow has not been run \
                 yet."
                    .to_string(),
            ),
        }
    }
}

fn out_of_range<T>(what: &str, index: usize) -> SpnetResult<T> {
    raise(
        SpnetError::Other,
        format!("The engine has no {what} at index {index}."),
    )
}

/// Per-phase current of a load and, for flexible loads, the total power drawn.
fn load_current(kind: &LoadModelKind, v: Complex64) -> (Complex64, Option<Complex64>) {
    match kind {
        LoadModelKind::Power(s) => (power_current(*s, v), None),
        LoadModelKind::Current(i) => (*i, None),
        LoadModelKind::Impedance(z) => (v / z, None),
        LoadModelKind::Flexible { power, parameter } => {
            let s = parameter.compute_power(v.norm() * SQRT_3, *power);
            (power_current(s / 3.0, v), Some(s))
        }
    }
}

fn power_current(s: Complex64, v: Complex64) -> Complex64 {
    if v.norm() == 0.0 {
        ZERO
    } else {
        (s / v).conj()
    }
}

impl LoadFlowEngine for DenseEngine {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn assemble(&mut self, model: &NetworkModel) -> SpnetResult<()> {
        let n = model.n_buses;
        let bad_bus = model
            .branches
            .iter()
            .flat_map(|b| [b.bus1, b.bus2])
            .chain(model.loads.iter().map(|l| l.bus))
            .chain(model.sources.iter().map(|s| s.bus))
            .find(|&bus| bus >= n);
        if let Some(bus) = bad_bus {
            return out_of_range("bus", bus);
        }

        // Merge switch groups
        let mut uf = UnionFind::<usize>::new(n);
        for branch in &model.branches {
            if branch.kind == BranchModelKind::Switch && !uf.union(branch.bus1, branch.bus2) {
                return raise(
                    SpnetError::SwitchesLoop,
                    format!(
                        "There is a loop of switches involving the buses #{} and #{}. It is not \
                         allowed.",
                        branch.bus1, branch.bus2
                    ),
                );
            }
        }
        let labels = uf.into_labeling();
        let mut node_index = vec![usize::MAX; n];
        let mut node_of = Vec::with_capacity(n);
        let mut n_nodes = 0;
        for &label in &labels {
            if node_index[label] == usize::MAX {
                node_index[label] = n_nodes;
                n_nodes += 1;
            }
            node_of.push(node_index[label]);
        }

        let mut fixed = vec![None; n_nodes];
        for source in &model.sources {
            let node = node_of[source.bus];
            if fixed[node].is_some() {
                return raise(
                    SpnetError::BadVoltageSourcesConnection,
                    format!(
                        "Several voltage sources are connected to bus #{} or to buses switched \
                         to it. It is not allowed.",
                        source.bus
                    ),
                );
            }
            fixed[node] = Some(source.potential);
        }

        let mut y = vec![vec![ZERO; n_nodes]; n_nodes];
        for (index, branch) in model.branches.iter().enumerate() {
            let (a, b) = (node_of[branch.bus1], node_of[branch.bus2]);
            let two_port = match &branch.kind {
                BranchModelKind::Switch => continue,
                BranchModelKind::Line { z, y: shunt } => {
                    if z.norm() == 0.0 {
                        return raise(
                            SpnetError::Other,
                            format!("The line at index {index} has a null series impedance."),
                        );
                    }
                    let ys = z.inv();
                    let half = shunt.unwrap_or(ZERO) / 2.0;
                    [[ys + half, -ys], [-ys, ys + half]]
                }
                BranchModelKind::Transformer { z2, ym, ratio } => {
                    if z2.norm() == 0.0 {
                        return raise(
                            SpnetError::Other,
                            format!("The transformer at index {index} has a null impedance."),
                        );
                    }
                    transformer_admittance(*z2, *ym, *ratio)
                }
            };
            y[a][a] += two_port[0][0];
            y[a][b] += two_port[0][1];
            y[b][a] += two_port[1][0];
            y[b][b] += two_port[1][1];
        }

        let unknown = (0..n_nodes).filter(|&node| fixed[node].is_none()).collect();
        debug!(
            buses = n,
            nodes = n_nodes,
            branches = model.branches.len(),
            "assembled dense admittance matrix"
        );
        self.assembled = Some(Assembled {
            model: model.clone(),
            node_of,
            fixed,
            unknown,
            y,
        });
        self.solution = None;
        Ok(())
    }

    fn solve(&mut self, initial: &[Complex64], config: &SolverConfig) -> SpnetResult<SolveReport> {
        self.solution = None;
        let Some(asm) = &self.assembled else {
            return raise(
                SpnetError::Other,
                "The engine must be assembled before solving.".to_string(),
            );
        };
        let model = &asm.model;
        if initial.len() != model.n_buses {
            return raise(
                SpnetError::Other,
                format!(
                    "Expected {} initial potentials, got {}.",
                    model.n_buses,
                    initial.len()
                ),
            );
        }
        let backend = config.backend.build_backend();
        let n_nodes = asm.fixed.len();

        // Starting point, one potential per node
        let fallback = model
            .sources
            .first()
            .map_or(Complex64::new(1.0, 0.0), |s| s.potential);
        let mut v = vec![ZERO; n_nodes];
        for (bus, &potential) in initial.iter().enumerate() {
            let node = asm.node_of[bus];
            if v[node] == ZERO {
                v[node] = potential;
            }
        }
        for (node, value) in v.iter_mut().enumerate() {
            if let Some(fixed) = asm.fixed[node] {
                *value = fixed;
            } else if *value == ZERO {
                *value = fallback;
            }
        }

        let y_uu: Vec<Vec<Complex64>> = asm
            .unknown
            .iter()
            .map(|&row| asm.unknown.iter().map(|&col| asm.y[row][col]).collect())
            .collect();
        let fixed_nodes: Vec<(usize, Complex64)> = asm
            .fixed
            .iter()
            .enumerate()
            .filter_map(|(node, fixed)| fixed.map(|value| (node, value)))
            .collect();

        let mut residual = f64::INFINITY;
        let mut iterations = 0;
        while iterations < config.max_iterations {
            iterations += 1;
            let mut injections = vec![ZERO; n_nodes];
            for load in &model.loads {
                let node = asm.node_of[load.bus];
                injections[node] += load_current(&load.kind, v[node]).0;
            }
            let rhs: Vec<Complex64> = asm
                .unknown
                .iter()
                .map(|&row| {
                    let coupling: Complex64 = fixed_nodes
                        .iter()
                        .map(|&(col, value)| asm.y[row][col] * value)
                        .sum();
                    -injections[row] - coupling
                })
                .collect();
            let next = backend.solve(&y_uu, &rhs)?;

            residual = 0.0;
            for (&node, value) in asm.unknown.iter().zip(next) {
                residual = residual.max((value - v[node]).norm());
                v[node] = value;
            }
            debug!(iteration = iterations, residual, "load flow iteration");
            if residual < config.tolerance {
                break;
            }
        }
        if residual >= config.tolerance {
            return raise(
                SpnetError::NoLoadFlowConvergence,
                format!(
                    "The load flow did not converge after {iterations} iterations. The norm of \
                     the residuals is {residual:.5e}."
                ),
            );
        }
        info!(
            engine = self.name(),
            backend = backend.name(),
            iterations,
            residual,
            "load flow converged"
        );

        self.solution = Some(currents_at(asm, &v));
        Ok(SolveReport {
            iterations,
            residual,
        })
    }

    fn bus_potential(&self, bus: usize) -> SpnetResult<Complex64> {
        match self.solution()?.potentials.get(bus) {
            Some(&potential) => Ok(potential),
            None => out_of_range("bus", bus),
        }
    }

    fn branch_currents(&self, branch: usize) -> SpnetResult<(Complex64, Complex64)> {
        match self.solution()?.branch_currents.get(branch) {
            Some(&currents) => Ok(currents),
            None => out_of_range("branch", branch),
        }
    }

    fn load_current(&self, load: usize) -> SpnetResult<Complex64> {
        match self.solution()?.load_currents.get(load) {
            Some(&current) => Ok(current),
            None => out_of_range("load", load),
        }
    }

    fn source_current(&self, source: usize) -> SpnetResult<Complex64> {
        match self.solution()?.source_currents.get(source) {
            Some(&current) => Ok(current),
            None => out_of_range("source", source),
        }
    }

    fn flexible_power(&self, load: usize) -> SpnetResult<Option<Complex64>> {
        match self.solution()?.flexible_powers.get(load) {
            Some(&power) => Ok(power),
            None => out_of_range("load", load),
        }
    }
}

/// Element currents at the converged node potentials `v`.
fn currents_at(asm: &Assembled, v: &[Complex64]) -> Solution {
    let model = &asm.model;
    let potentials: Vec<Complex64> = asm.node_of.iter().map(|&node| v[node]).collect();

    // Current leaving each bus into its non-switch elements
    let mut demand = vec![ZERO; model.n_buses];

    let mut branch_currents = vec![(ZERO, ZERO); model.branches.len()];
    for (index, branch) in model.branches.iter().enumerate() {
        let (v1, v2) = (potentials[branch.bus1], potentials[branch.bus2]);
        let currents = match &branch.kind {
            BranchModelKind::Line { z, y } => line_currents(*z, *y, v1, v2),
            BranchModelKind::Transformer { z2, ym, ratio } => {
                transformer_currents(*z2, *ym, *ratio, v1, v2)
            }
            BranchModelKind::Switch => continue,
        };
        demand[branch.bus1] += currents.0;
        demand[branch.bus2] += currents.1;
        branch_currents[index] = currents;
    }

    let mut load_currents = Vec::with_capacity(model.loads.len());
    let mut flexible_powers = Vec::with_capacity(model.loads.len());
    for load in &model.loads {
        let (current, flexible) = load_current(&load.kind, potentials[load.bus]);
        demand[load.bus] += current;
        load_currents.push(current);
        flexible_powers.push(flexible);
    }

    // A source balances the whole switch group it belongs to
    let mut node_demand = vec![ZERO; asm.fixed.len()];
    for (bus, &d) in demand.iter().enumerate() {
        node_demand[asm.node_of[bus]] += d;
    }
    let mut source_currents = Vec::with_capacity(model.sources.len());
    for source in &model.sources {
        let current = -node_demand[asm.node_of[source.bus]];
        demand[source.bus] += current;
        source_currents.push(current);
    }

    // Switch currents by accumulating demand over each switch tree
    let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); model.n_buses];
    for (index, branch) in model.branches.iter().enumerate() {
        if branch.kind == BranchModelKind::Switch {
            adjacency[branch.bus1].push((index, branch.bus2));
            adjacency[branch.bus2].push((index, branch.bus1));
        }
    }
    let mut visited = vec![false; model.n_buses];
    let mut parent: Vec<Option<(usize, usize)>> = vec![None; model.n_buses];
    let mut subtotal = demand;
    for root in 0..model.n_buses {
        if visited[root] || adjacency[root].is_empty() {
            continue;
        }
        visited[root] = true;
        let mut order = vec![root];
        let mut cursor = 0;
        while cursor < order.len() {
            let bus = order[cursor];
            cursor += 1;
            for &(switch, other) in &adjacency[bus] {
                if !visited[other] {
                    visited[other] = true;
                    parent[other] = Some((switch, bus));
                    order.push(other);
                }
            }
        }
        for &bus in order.iter().rev() {
            if let Some((switch, up)) = parent[bus] {
                let flow = subtotal[bus];
                subtotal[up] += flow;
                branch_currents[switch] = if model.branches[switch].bus1 == up {
                    (flow, -flow)
                } else {
                    (-flow, flow)
                };
            }
        }
    }

    Solution {
        potentials,
        branch_currents,
        load_currents,
        source_currents,
        flexible_powers,
    }
}
