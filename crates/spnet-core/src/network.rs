//! Networks: validated connected components of the grid, and the load flow.
//!
//! A network is created from explicit element collections with
//! [`Grid::create_network`], or from one seed element with
//! [`Grid::network_from_element`]. Creation validates the topology and
//! propagates initial potentials from the sources. Afterwards the network
//! keeps two flags:
//!
//! - `topology_valid`, cleared when an element is absorbed or disconnected and
//!   re-established lazily by the next solve;
//! - `results_valid`, cleared by any change of an electrical parameter and set
//!   by a successful solve.
//!
//! How a solve starts is decided by [`plan_start`] from these two flags and the
//! requested warm start.

use std::collections::{HashMap, HashSet, VecDeque};

use num_complex::Complex64;
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use tracing::{debug, info};

use crate::branch::Branch;
use crate::diagnostics::Diagnostics;
use crate::element::{BranchKey, BusKey, ElementKey, ElementKind, LoadKey, NetworkId, SourceKey};
use crate::error::{raise, SpnetError, SpnetResult};
use crate::grid::{collision, Grid};
use crate::load::LoadKind;
use crate::solver::dense::DenseEngine;
use crate::solver::engine::{
    BranchModel, BranchModelKind, LoadFlowEngine, LoadModel, LoadModelKind, NetworkModel,
    SolveReport, SolverConfig, SourceModel,
};
use crate::state::{
    plan_start, BranchResults, BusResults, ElementResults, LeafResults, StartPlan,
};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Element collections a network is built from, keyed by element id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementCollections {
    pub buses: Vec<(String, BusKey)>,
    pub lines: Vec<(String, BranchKey)>,
    pub transformers: Vec<(String, BranchKey)>,
    pub switches: Vec<(String, BranchKey)>,
    pub loads: Vec<(String, LoadKey)>,
    pub sources: Vec<(String, SourceKey)>,
}

impl ElementCollections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
            && self.lines.is_empty()
            && self.transformers.is_empty()
            && self.switches.is_empty()
            && self.loads.is_empty()
            && self.sources.is_empty()
    }

    /// Registers `key` under its own id, in the collection of its kind.
    pub fn insert(&mut self, grid: &Grid, key: impl Into<ElementKey>) -> SpnetResult<()> {
        let key = key.into();
        let id = grid.element_id(key)?.to_string();
        match key {
            ElementKey::Bus(k) => self.buses.push((id, k)),
            ElementKey::Branch(k) => match grid.branch(k)? {
                Branch::Line(_) => self.lines.push((id, k)),
                Branch::Transformer(_) => self.transformers.push((id, k)),
                Branch::Switch(_) => self.switches.push((id, k)),
            },
            ElementKey::Load(k) => self.loads.push((id, k)),
            ElementKey::Source(k) => self.sources.push((id, k)),
        }
        Ok(())
    }

    pub fn from_keys(grid: &Grid, keys: impl IntoIterator<Item = ElementKey>) -> SpnetResult<Self> {
        let mut collections = Self::new();
        for key in keys {
            collections.insert(grid, key)?;
        }
        Ok(collections)
    }
}

/// Members of a network, in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Members {
    pub(crate) buses: Vec<BusKey>,
    pub(crate) branches: Vec<BranchKey>,
    pub(crate) loads: Vec<LoadKey>,
    pub(crate) sources: Vec<SourceKey>,
}

impl Members {
    fn from_collections(collections: &ElementCollections) -> Self {
        fn unique<K: Copy + PartialEq>(keys: impl Iterator<Item = K>) -> Vec<K> {
            let mut result: Vec<K> = Vec::new();
            for key in keys {
                if !result.contains(&key) {
                    result.push(key);
                }
            }
            result
        }
        Self {
            buses: unique(collections.buses.iter().map(|(_, k)| *k)),
            branches: unique(
                collections
                    .lines
                    .iter()
                    .chain(&collections.transformers)
                    .chain(&collections.switches)
                    .map(|(_, k)| *k),
            ),
            loads: unique(collections.loads.iter().map(|(_, k)| *k)),
            sources: unique(collections.sources.iter().map(|(_, k)| *k)),
        }
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = ElementKey> + '_ {
        self.buses
            .iter()
            .map(|&k| ElementKey::Bus(k))
            .chain(self.branches.iter().map(|&k| ElementKey::Branch(k)))
            .chain(self.loads.iter().map(|&k| ElementKey::Load(k)))
            .chain(self.sources.iter().map(|&k| ElementKey::Source(k)))
    }

    fn len(&self) -> usize {
        self.buses.len() + self.branches.len() + self.loads.len() + self.sources.len()
    }
}

/// Counters and last decisions of a network, for inspection and tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkInfo {
    pub engine: String,
    /// Potential propagations, including the one done at creation
    pub propagations: usize,
    /// Cold starts that discarded the working potentials
    pub resets: usize,
    pub solves: usize,
    pub last_plan: Option<StartPlan>,
    pub last_report: Option<SolveReport>,
}

pub(crate) struct NetworkState {
    pub(crate) members: Members,
    pub(crate) topology_valid: bool,
    pub(crate) results_valid: bool,
    /// The engine must be re-assembled before the next solve
    pub(crate) model_dirty: bool,
    pub(crate) engine: Box<dyn LoadFlowEngine>,
    pub(crate) info: NetworkInfo,
}

impl NetworkState {
    fn new(members: Members) -> Self {
        let engine: Box<dyn LoadFlowEngine> = Box::new(DenseEngine::new());
        Self {
            members,
            topology_valid: false,
            results_valid: false,
            model_dirty: true,
            info: NetworkInfo {
                engine: engine.name().to_string(),
                ..NetworkInfo::default()
            },
            engine,
        }
    }

    pub(crate) fn members(&self) -> impl Iterator<Item = ElementKey> + '_ {
        self.members.keys()
    }

    pub(crate) fn insert(&mut self, key: ElementKey) {
        match key {
            ElementKey::Bus(k) => self.members.buses.push(k),
            ElementKey::Branch(k) => self.members.branches.push(k),
            ElementKey::Load(k) => self.members.loads.push(k),
            ElementKey::Source(k) => self.members.sources.push(k),
        }
    }

    pub(crate) fn remove(&mut self, key: ElementKey) {
        match key {
            ElementKey::Bus(k) => self.members.buses.retain(|b| *b != k),
            ElementKey::Branch(k) => self.members.branches.retain(|b| *b != k),
            ElementKey::Load(k) => self.members.loads.retain(|l| *l != k),
            ElementKey::Source(k) => self.members.sources.retain(|s| *s != k),
        }
    }

    pub(crate) fn invalidate_topology(&mut self) {
        self.topology_valid = false;
        self.invalidate_results();
    }

    pub(crate) fn invalidate_results(&mut self) {
        self.results_valid = false;
        self.model_dirty = true;
    }
}

/// Class-like label used in connectivity messages, e.g. `Bus('b1')`.
fn label(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Bus => "Bus",
        ElementKind::Line => "Line",
        ElementKind::Transformer => "Transformer",
        ElementKind::Switch => "Switch",
        ElementKind::Load => "Load",
        ElementKind::Source => "VoltageSource",
    }
}

fn id_mismatch<T>(variant: fn(String) -> SpnetError, kind: &str, actual: &str, key: &str) -> SpnetResult<T> {
    raise(
        variant,
        format!("{kind} ID '{actual}' does not match its key in the dictionary '{key}'."),
    )
}

impl Grid {
    // ========================================================================
    // Network access
    // ========================================================================

    pub(crate) fn network_state(&self, net: NetworkId) -> SpnetResult<&NetworkState> {
        match self.networks.get(net.value()) {
            Some(state) => Ok(state),
            None => raise(
                SpnetError::BadElementObject,
                format!("Unknown network #{} in this grid.", net.value()),
            ),
        }
    }

    pub(crate) fn network_state_mut(&mut self, net: NetworkId) -> SpnetResult<&mut NetworkState> {
        match self.networks.get_mut(net.value()) {
            Some(state) => Ok(state),
            None => raise(
                SpnetError::BadElementObject,
                format!("Unknown network #{} in this grid.", net.value()),
            ),
        }
    }

    pub fn network_ids(&self) -> impl Iterator<Item = NetworkId> + '_ {
        (0..self.networks.len()).map(NetworkId::new)
    }

    pub fn network_buses(&self, net: NetworkId) -> SpnetResult<&[BusKey]> {
        Ok(&self.network_state(net)?.members.buses)
    }

    /// Every branch of the network, whatever its kind.
    pub fn network_branches(&self, net: NetworkId) -> SpnetResult<&[BranchKey]> {
        Ok(&self.network_state(net)?.members.branches)
    }

    fn network_branches_of(&self, net: NetworkId, kind: ElementKind) -> SpnetResult<Vec<BranchKey>> {
        let mut result = Vec::new();
        for &key in self.network_branches(net)? {
            if self.branch(key)?.kind() == kind {
                result.push(key);
            }
        }
        Ok(result)
    }

    pub fn network_lines(&self, net: NetworkId) -> SpnetResult<Vec<BranchKey>> {
        self.network_branches_of(net, ElementKind::Line)
    }

    pub fn network_transformers(&self, net: NetworkId) -> SpnetResult<Vec<BranchKey>> {
        self.network_branches_of(net, ElementKind::Transformer)
    }

    pub fn network_switches(&self, net: NetworkId) -> SpnetResult<Vec<BranchKey>> {
        self.network_branches_of(net, ElementKind::Switch)
    }

    pub fn network_loads(&self, net: NetworkId) -> SpnetResult<&[LoadKey]> {
        Ok(&self.network_state(net)?.members.loads)
    }

    pub fn network_sources(&self, net: NetworkId) -> SpnetResult<&[SourceKey]> {
        Ok(&self.network_state(net)?.members.sources)
    }

    pub fn network_info(&self, net: NetworkId) -> SpnetResult<&NetworkInfo> {
        Ok(&self.network_state(net)?.info)
    }

    pub fn is_topology_valid(&self, net: NetworkId) -> SpnetResult<bool> {
        Ok(self.network_state(net)?.topology_valid)
    }

    /// Results exist and reflect the current parameters.
    pub fn has_valid_results(&self, net: NetworkId) -> SpnetResult<bool> {
        Ok(self.has_results(net)? && self.network_state(net)?.results_valid)
    }

    /// Some results have been published, fresh or not.
    pub fn has_results(&self, net: NetworkId) -> SpnetResult<bool> {
        let members = &self.network_state(net)?.members;
        Ok(members
            .buses
            .iter()
            .any(|bus| self.buses[bus.value()].results.is_some()))
    }

    /// Replaces the load flow engine of a network.
    pub fn set_engine(&mut self, net: NetworkId, engine: Box<dyn LoadFlowEngine>) -> SpnetResult<()> {
        let state = self.network_state_mut(net)?;
        debug!("Network #{} now uses the '{}' engine", net.value(), engine.name());
        state.info.engine = engine.name().to_string();
        state.engine = engine;
        state.model_dirty = true;
        Ok(())
    }

    fn find_member(&self, net: NetworkId, kind: ElementKind, id: &str) -> SpnetResult<ElementKey> {
        for key in self.network_state(net)?.members() {
            if self.element_kind(key)? == kind && self.element_id(key)? == id {
                return Ok(key);
            }
        }
        raise(
            SpnetError::UnknownElement,
            format!("The {kind} '{id}' is not part of the network."),
        )
    }

    pub fn find_bus(&self, net: NetworkId, id: &str) -> SpnetResult<BusKey> {
        match self.find_member(net, ElementKind::Bus, id)? {
            ElementKey::Bus(key) => Ok(key),
            _ => raise(SpnetError::Other, format!("Bad key for bus '{id}'.")),
        }
    }

    fn find_branch(&self, net: NetworkId, kind: ElementKind, id: &str) -> SpnetResult<BranchKey> {
        match self.find_member(net, kind, id)? {
            ElementKey::Branch(key) => Ok(key),
            _ => raise(SpnetError::Other, format!("Bad key for {kind} '{id}'.")),
        }
    }

    pub fn find_line(&self, net: NetworkId, id: &str) -> SpnetResult<BranchKey> {
        self.find_branch(net, ElementKind::Line, id)
    }

    pub fn find_transformer(&self, net: NetworkId, id: &str) -> SpnetResult<BranchKey> {
        self.find_branch(net, ElementKind::Transformer, id)
    }

    pub fn find_switch(&self, net: NetworkId, id: &str) -> SpnetResult<BranchKey> {
        self.find_branch(net, ElementKind::Switch, id)
    }

    pub fn find_load(&self, net: NetworkId, id: &str) -> SpnetResult<LoadKey> {
        match self.find_member(net, ElementKind::Load, id)? {
            ElementKey::Load(key) => Ok(key),
            _ => raise(SpnetError::Other, format!("Bad key for load '{id}'.")),
        }
    }

    pub fn find_source(&self, net: NetworkId, id: &str) -> SpnetResult<SourceKey> {
        match self.find_member(net, ElementKind::Source, id)? {
            ElementKey::Source(key) => Ok(key),
            _ => raise(SpnetError::Other, format!("Bad key for voltage source '{id}'.")),
        }
    }

    // ========================================================================
    // Creation and validation
    // ========================================================================

    /// Validates `collections` and turns them into a network.
    ///
    /// On failure no element is assigned.
    pub fn create_network(&mut self, collections: ElementCollections) -> SpnetResult<NetworkId> {
        if collections.is_empty() {
            return raise(
                SpnetError::EmptyNetwork,
                "Cannot create a network without elements.".to_string(),
            );
        }
        let members = Members::from_collections(&collections);
        self.check_unknown(&members)?;
        self.check_ids(&collections)?;
        self.check_topology(&members, None)?;

        let net = NetworkId::new(self.networks.len());
        for key in members.keys() {
            self.set_network(key, Some(net));
        }
        info!(
            "Created network #{} with {} buses, {} branches, {} loads and {} sources",
            net.value(),
            members.buses.len(),
            members.branches.len(),
            members.loads.len(),
            members.sources.len()
        );
        self.networks.push(NetworkState::new(members));
        self.propagate_potentials(net)?;
        let state = self.network_state_mut(net)?;
        state.topology_valid = true;
        state.info.propagations += 1;
        Ok(net)
    }

    /// Builds a network from every element reachable from `seed`.
    pub fn network_from_element(&mut self, seed: impl Into<ElementKey>) -> SpnetResult<NetworkId> {
        let seed = seed.into();
        let mut visited = HashSet::from([seed]);
        let mut queue = VecDeque::from([seed]);
        let mut reached = Vec::new();
        while let Some(key) = queue.pop_front() {
            reached.push(key);
            for &other in self.connected_elements(key)? {
                if visited.insert(other) {
                    queue.push_back(other);
                }
            }
        }
        let collections = ElementCollections::from_keys(self, reached)?;
        self.create_network(collections)
    }

    /// Every element connected to a member must be a member too.
    fn check_unknown(&self, members: &Members) -> SpnetResult<()> {
        let known: HashSet<ElementKey> = members.keys().collect();
        for key in members.keys() {
            for &other in self.ledger(key)?.0 {
                if !known.contains(&other) {
                    return raise(
                        SpnetError::UnknownElement,
                        format!(
                            "The {} '{}' is connected to the {} '{}' but has not been added to \
                             the network. It must be added to the element collections.",
                            self.element_kind(other)?,
                            self.element_id(other)?,
                            self.element_kind(key)?,
                            self.element_id(key)?
                        ),
                    );
                }
            }
        }
        Ok(())
    }

    fn check_ids(&self, collections: &ElementCollections) -> SpnetResult<()> {
        let mut seen: HashMap<(ElementKind, String), ElementKey> = HashMap::new();
        let mut register = |kind: ElementKind, id: &str, key: ElementKey| -> SpnetResult<()> {
            match seen.get(&(kind, id.to_string())) {
                Some(existing) if *existing != key => collision(kind, id),
                _ => {
                    seen.insert((kind, id.to_string()), key);
                    Ok(())
                }
            }
        };

        for (id, key) in &collections.buses {
            let bus = self.bus(*key)?;
            if bus.id() != id {
                return id_mismatch(SpnetError::BadBusId, "Bus", bus.id(), id);
            }
            register(ElementKind::Bus, bus.id(), (*key).into())?;
        }
        for (expected, entries) in [
            (ElementKind::Line, &collections.lines),
            (ElementKind::Transformer, &collections.transformers),
            (ElementKind::Switch, &collections.switches),
        ] {
            for (id, key) in entries {
                let branch = self.branch(*key)?;
                if branch.kind() != expected {
                    return raise(
                        SpnetError::BadBranchType,
                        format!(
                            "The branch '{}' is a {} and cannot be registered as a {expected}.",
                            branch.id(),
                            branch.kind()
                        ),
                    );
                }
                if branch.id() != id {
                    return id_mismatch(SpnetError::BadBranchId, label(expected), branch.id(), id);
                }
                register(expected, branch.id(), (*key).into())?;
            }
        }
        for (id, key) in &collections.loads {
            let load = self.load(*key)?;
            if load.id() != id {
                return id_mismatch(SpnetError::BadLoadId, "Load", load.id(), id);
            }
            register(ElementKind::Load, load.id(), (*key).into())?;
        }
        for (id, key) in &collections.sources {
            let source = self.source(*key)?;
            if source.id() != id {
                return id_mismatch(SpnetError::BadSourceId, "Source", source.id(), id);
            }
            register(ElementKind::Source, source.id(), (*key).into())?;
        }
        Ok(())
    }

    /// Ownership, sources and connectivity checks, shared by creation and the
    /// lazy re-validation before a solve.
    fn check_topology(&self, members: &Members, owner: Option<NetworkId>) -> SpnetResult<()> {
        for key in members.keys() {
            let network = self.ledger(key)?.1;
            if network.is_some() && network != owner {
                return raise(
                    SpnetError::SeveralNetworks,
                    format!(
                        "The {} '{}' is already assigned to another network.",
                        self.element_kind(key)?,
                        self.element_id(key)?
                    ),
                );
            }
        }

        if members.sources.is_empty() {
            return raise(
                SpnetError::NoVoltageSource,
                "There is no voltage source provided in the network, you must provide at least \
                 one."
                    .to_string(),
            );
        }

        let index: HashMap<BusKey, usize> = members
            .buses
            .iter()
            .enumerate()
            .map(|(i, &bus)| (bus, i))
            .collect();
        let mut components = UnionFind::new(members.buses.len());
        for &branch in &members.branches {
            let (bus1, bus2) = self.branch_buses(branch)?;
            if let (Some(&i), Some(&j)) = (index.get(&bus1), index.get(&bus2)) {
                components.union(i, j);
            }
        }
        let mut sourced = HashSet::new();
        for &source in &members.sources {
            if let Some(&i) = index.get(&self.source_bus(source)?) {
                sourced.insert(components.find(i));
            }
        }

        let mut orphans = Vec::new();
        for (i, &bus) in members.buses.iter().enumerate() {
            if !sourced.contains(&components.find(i)) {
                orphans.push(format!("Bus('{}')", self.bus(bus)?.id()));
            }
        }
        for &key in &members.branches {
            let (bus1, _) = self.branch_buses(key)?;
            if index.get(&bus1).is_some_and(|&i| !sourced.contains(&components.find(i))) {
                let branch = self.branch(key)?;
                orphans.push(format!("{}('{}')", label(branch.kind()), branch.id()));
            }
        }
        if !orphans.is_empty() {
            return raise(
                SpnetError::PoorlyConnectedElement,
                format!(
                    "The elements [{}] are not electrically connected to a voltage source.",
                    orphans.join(", ")
                ),
            );
        }
        Ok(())
    }

    /// Collects non-fatal findings about a network, plus the topology error
    /// that would stop the next solve, if any.
    pub fn validate_into(&self, net: NetworkId, diagnostics: &mut Diagnostics) -> SpnetResult<()> {
        let state = self.network_state(net)?;
        if let Err(err) = self.check_topology(&state.members, Some(net)) {
            diagnostics.add_spnet_error("topology", &err);
        }

        for &key in &state.members.buses {
            let bus = self.bus(key)?;
            let entity = format!("Bus '{}'", bus.id());
            if bus.has_limits() && bus.nominal_voltage().is_none() {
                diagnostics.add_warning_with_entity(
                    "limits",
                    "Voltage levels are set without a nominal voltage",
                    &entity,
                );
            }
            let has_branch = self.buses[key.value()]
                .connected
                .iter()
                .any(|other| matches!(other, ElementKey::Branch(_)));
            if !has_branch && state.members.buses.len() > 1 {
                diagnostics.add_warning_with_entity("topology", "Bus is not connected to any branch", &entity);
            }
        }

        for &key in &state.members.branches {
            match self.branch(key)? {
                Branch::Line(line) if line.max_current().is_none() => {
                    diagnostics.add_warning_with_entity(
                        "line",
                        "Line parameters have no ampacity, the loading cannot be computed",
                        &format!("Line '{}'", line.id()),
                    );
                }
                Branch::Transformer(transformer) => {
                    let (low, high) = crate::branch::TAP_RANGE;
                    if transformer.tap() < low || transformer.tap() > high {
                        diagnostics.add_warning_with_entity(
                            "transformer",
                            &format!(
                                "Tap {:.2} is outside the usual range [{low}, {high}]",
                                transformer.tap()
                            ),
                            &format!("Transformer '{}'", transformer.id()),
                        );
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ========================================================================
    // Load flow
    // ========================================================================

    /// Gives every uninitialized bus the potential of the nearest source,
    /// scaled across transformers. Returns the number of buses initialized.
    fn propagate_potentials(&mut self, net: NetworkId) -> SpnetResult<usize> {
        let mut starts = Vec::new();
        for &source in &self.network_state(net)?.members.sources {
            let slot = self.source_slot(source)?;
            if let Some(bus) = slot.item.bus {
                starts.push((bus, slot.item.source.potential()));
            }
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for (bus, potential) in starts {
            if visited.insert(bus) {
                queue.push_back((bus, potential));
            }
        }

        let mut initialized = 0;
        while let Some((bus, potential)) = queue.pop_front() {
            let entry = &mut self.buses[bus.value()].item.bus;
            if !entry.is_initialized() {
                entry.initialize(potential);
                initialized += 1;
            }

            let mut next = Vec::new();
            for key in &self.buses[bus.value()].connected {
                if let ElementKey::Branch(branch) = key {
                    let entry = &self.branches[branch.value()].item;
                    let forward = entry.bus1 == bus;
                    let other = if forward { entry.bus2 } else { entry.bus1 };
                    let value = match &entry.branch {
                        Branch::Transformer(transformer) if forward => potential * transformer.ratio(),
                        Branch::Transformer(transformer) => potential / transformer.ratio(),
                        _ => potential,
                    };
                    next.push((other, value));
                }
            }
            for (other, value) in next {
                if visited.insert(other) {
                    queue.push_back((other, value));
                }
            }
        }
        debug!(
            "Propagated potentials in network #{}: {initialized} bus(es) initialized",
            net.value()
        );
        Ok(initialized)
    }

    /// Discards the working potentials of a network.
    fn reset_inputs(&mut self, net: NetworkId) -> SpnetResult<()> {
        let buses = self.network_state(net)?.members.buses.clone();
        for bus in buses {
            self.buses[bus.value()].item.working = None;
        }
        Ok(())
    }

    fn bus_index(&self, net: NetworkId) -> SpnetResult<HashMap<BusKey, usize>> {
        Ok(self
            .network_state(net)?
            .members
            .buses
            .iter()
            .enumerate()
            .map(|(i, &bus)| (bus, i))
            .collect())
    }

    fn position(index: &HashMap<BusKey, usize>, bus: BusKey) -> SpnetResult<usize> {
        match index.get(&bus) {
            Some(&i) => Ok(i),
            None => raise(
                SpnetError::UnknownElement,
                format!("The bus #{} is not part of the network.", bus.value()),
            ),
        }
    }

    /// Compiles the per-phase model handed to the engine.
    pub(crate) fn build_model(&self, net: NetworkId) -> SpnetResult<NetworkModel> {
        let members = &self.network_state(net)?.members;
        let index = self.bus_index(net)?;

        let mut branches = Vec::with_capacity(members.branches.len());
        for &key in &members.branches {
            let entry = &self.branch_slot(key)?.item;
            let kind = match &entry.branch {
                Branch::Line(line) => BranchModelKind::Line {
                    z: line.z_line(),
                    y: line.y_shunt(),
                },
                Branch::Transformer(transformer) => BranchModelKind::Transformer {
                    z2: transformer.parameters().z2(),
                    ym: transformer.parameters().ym(),
                    ratio: transformer.ratio(),
                },
                Branch::Switch(_) => BranchModelKind::Switch,
            };
            branches.push(BranchModel {
                bus1: Self::position(&index, entry.bus1)?,
                bus2: Self::position(&index, entry.bus2)?,
                kind,
            });
        }

        let mut loads = Vec::with_capacity(members.loads.len());
        for &key in &members.loads {
            let kind = match self.load(key)?.kind() {
                LoadKind::Power {
                    power,
                    flexible: Some(parameter),
                } => LoadModelKind::Flexible {
                    power: *power,
                    parameter: parameter.clone(),
                },
                LoadKind::Power {
                    power,
                    flexible: None,
                } => LoadModelKind::Power(*power / 3.0),
                LoadKind::Current { current } => LoadModelKind::Current(*current / 3.0),
                LoadKind::Impedance { impedance } => LoadModelKind::Impedance(*impedance),
            };
            loads.push(LoadModel {
                bus: Self::position(&index, self.load_bus(key)?)?,
                kind,
            });
        }

        let mut sources = Vec::with_capacity(members.sources.len());
        for &key in &members.sources {
            sources.push(SourceModel {
                bus: Self::position(&index, self.source_bus(key)?)?,
                potential: self.source(key)?.potential(),
            });
        }

        Ok(NetworkModel {
            n_buses: members.buses.len(),
            branches,
            loads,
            sources,
        })
    }

    /// Last converged potential, else the initial one, else zero. Converged
    /// potentials are dropped whenever the potentials are propagated again.
    fn initial_potentials(&self, net: NetworkId) -> SpnetResult<Vec<Complex64>> {
        Ok(self
            .network_state(net)?
            .members
            .buses
            .iter()
            .map(|bus| {
                let entry = &self.buses[bus.value()].item;
                entry.working.or(entry.bus.potential()).unwrap_or(ZERO)
            })
            .collect())
    }

    /// Reads every element result of a network from its engine.
    fn refresh(&self, net: NetworkId) -> SpnetResult<Vec<(ElementKey, ElementResults)>> {
        let state = self.network_state(net)?;
        let engine = state.engine.as_ref();
        let index = self.bus_index(net)?;
        let mut results = Vec::with_capacity(state.members.len());

        let mut potentials = Vec::with_capacity(state.members.buses.len());
        for (i, &bus) in state.members.buses.iter().enumerate() {
            let potential = engine.bus_potential(i)?;
            potentials.push(potential);
            results.push((bus.into(), ElementResults::Bus(BusResults { potential })));
        }
        for (i, &branch) in state.members.branches.iter().enumerate() {
            let (current1, current2) = engine.branch_currents(i)?;
            results.push((
                branch.into(),
                ElementResults::Branch(BranchResults { current1, current2 }),
            ));
        }
        for (i, &load) in state.members.loads.iter().enumerate() {
            let bus = Self::position(&index, self.load_bus(load)?)?;
            results.push((
                load.into(),
                ElementResults::Load(LeafResults {
                    current: engine.load_current(i)? * 3.0,
                    potential: potentials[bus],
                    flexible_power: engine.flexible_power(i)?,
                }),
            ));
        }
        for (i, &source) in state.members.sources.iter().enumerate() {
            let bus = Self::position(&index, self.source_bus(source)?)?;
            results.push((
                source.into(),
                ElementResults::Source(LeafResults {
                    current: engine.source_current(i)? * 3.0,
                    potential: potentials[bus],
                    flexible_power: None,
                }),
            ));
        }
        Ok(results)
    }

    fn apply_results(&mut self, results: Vec<(ElementKey, ElementResults)>) {
        for (key, result) in results {
            match (key, result) {
                (ElementKey::Bus(k), ElementResults::Bus(r)) => {
                    let slot = &mut self.buses[k.value()];
                    slot.item.working = Some(r.potential);
                    slot.results = Some(r);
                }
                (ElementKey::Branch(k), ElementResults::Branch(r)) => {
                    self.branches[k.value()].results = Some(r);
                }
                (ElementKey::Load(k), ElementResults::Load(r)) => {
                    self.loads[k.value()].results = Some(r);
                }
                (ElementKey::Source(k), ElementResults::Source(r)) => {
                    self.sources[k.value()].results = Some(r);
                }
                _ => {}
            }
        }
    }

    /// Runs a load flow on `net` and publishes the results of every element.
    ///
    /// On failure nothing is published and the previous results, if any, are
    /// kept as they were.
    pub fn solve_load_flow(&mut self, net: NetworkId, config: &SolverConfig) -> SpnetResult<SolveReport> {
        let (topology_valid, results_valid) = {
            let state = self.network_state(net)?;
            (state.topology_valid, state.results_valid)
        };
        if !topology_valid {
            let members = self.network_state(net)?.members.clone();
            self.check_topology(&members, Some(net))?;
        }

        let plan = plan_start(topology_valid, results_valid, config.warm_start);
        info!(
            "Solving the load flow of network #{} ({:?} start, {} backend)",
            net.value(),
            plan.kind,
            config.backend.as_str()
        );
        if plan.propagate_potentials {
            // Converged potentials belong to the previous topology
            self.reset_inputs(net)?;
            self.propagate_potentials(net)?;
            let state = self.network_state_mut(net)?;
            state.topology_valid = true;
            state.model_dirty = true;
            state.info.propagations += 1;
        }
        if plan.reset_inputs {
            self.reset_inputs(net)?;
            self.network_state_mut(net)?.info.resets += 1;
        }

        if self.network_state(net)?.model_dirty {
            let model = self.build_model(net)?;
            let state = self.network_state_mut(net)?;
            state.engine.assemble(&model)?;
            state.model_dirty = false;
        }

        let initial = self.initial_potentials(net)?;
        let report = self.network_state_mut(net)?.engine.solve(&initial, config)?;
        let results = self.refresh(net)?;
        self.apply_results(results);

        let state = self.network_state_mut(net)?;
        state.results_valid = true;
        state.info.solves += 1;
        state.info.last_plan = Some(plan);
        state.info.last_report = Some(report);
        info!(
            "Load flow of network #{} converged in {} iterations (residual {:.3e})",
            net.value(),
            report.iterations,
            report.residual
        );
        Ok(report)
    }

    /// Attaches previously computed results, e.g. read from a file.
    ///
    /// The results become valid only if every member of the network has one.
    /// Otherwise all results of the network are dropped.
    pub fn restore_results(
        &mut self,
        net: NetworkId,
        results: Vec<(ElementKey, ElementResults)>,
    ) -> SpnetResult<()> {
        let members: HashSet<ElementKey> = self.network_state(net)?.members().collect();
        let mut provided = HashSet::new();
        for (key, result) in &results {
            if !members.contains(key) {
                return raise(
                    SpnetError::UnknownElement,
                    format!(
                        "The {} '{}' is not part of the network.",
                        self.element_kind(*key)?,
                        self.element_id(*key)?
                    ),
                );
            }
            let matching = matches!(
                (key, result),
                (ElementKey::Bus(_), ElementResults::Bus(_))
                    | (ElementKey::Branch(_), ElementResults::Branch(_))
                    | (ElementKey::Load(_), ElementResults::Load(_))
                    | (ElementKey::Source(_), ElementResults::Source(_))
            );
            if !matching {
                return raise(
                    SpnetError::BadLoadFlowResult,
                    format!(
                        "The results given for the {} '{}' are of the wrong kind.",
                        self.element_kind(*key)?,
                        self.element_id(*key)?
                    ),
                );
            }
            provided.insert(*key);
        }

        if members.iter().all(|key| provided.contains(key)) {
            self.apply_results(results);
            self.network_state_mut(net)?.results_valid = true;
            debug!("Restored the results of network #{}", net.value());
        } else {
            for key in &members {
                match *key {
                    ElementKey::Bus(k) => {
                        let slot = &mut self.buses[k.value()];
                        slot.results = None;
                        slot.item.working = None;
                    }
                    ElementKey::Branch(k) => self.branches[k.value()].results = None,
                    ElementKey::Load(k) => self.loads[k.value()].results = None,
                    ElementKey::Source(k) => self.sources[k.value()].results = None,
                }
            }
            self.network_state_mut(net)?.results_valid = false;
            debug!(
                "Dropped the partial results of network #{} ({} of {} elements)",
                net.value(),
                provided.len(),
                members.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{Line, Switch};
    use crate::bus::Bus;
    use crate::error::ErrorCode;
    use crate::load::Load;
    use crate::parameters::LineParameters;
    use crate::source::VoltageSource;
    use crate::state::StartKind;
    use std::sync::Arc;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    struct Small {
        grid: Grid,
        b0: BusKey,
        b1: BusKey,
        line: BranchKey,
        load: LoadKey,
        source: SourceKey,
    }

    fn keys(s: &Small) -> Vec<ElementKey> {
        vec![
            ElementKey::from(s.b0),
            ElementKey::from(s.b1),
            ElementKey::from(s.line),
            ElementKey::from(s.load),
            ElementKey::from(s.source),
        ]
    }

    fn small() -> Small {
        let mut grid = Grid::new();
        let b0 = grid.add_bus(Bus::new("bus0"));
        let b1 = grid.add_bus(Bus::new("bus1"));
        let params = Arc::new(LineParameters::new("lp", c(10.0, 0.0), None));
        let line = grid.add_line(Line::new("line", params, 1.0).unwrap(), b0, b1).unwrap();
        let load = grid.add_load(Load::power("load", c(100.0, 0.0)), b1).unwrap();
        let source = grid.add_source(VoltageSource::new("vs", c(20000.0, 0.0)), b0).unwrap();
        Small {
            grid,
            b0,
            b1,
            line,
            load,
            source,
        }
    }

    #[test]
    fn test_create_network_assigns_and_propagates() {
        let mut s = small();
        let net = s.grid.network_from_element(s.b0).unwrap();

        assert_eq!(s.grid.network_of(s.load).unwrap(), Some(net));
        assert_eq!(s.grid.network_buses(net).unwrap().len(), 2);
        assert!(s.grid.is_topology_valid(net).unwrap());
        assert!(!s.grid.has_results(net).unwrap());

        let expected = c(20000.0 / crate::formulas::SQRT_3, 0.0);
        for bus in [s.b0, s.b1] {
            let bus = s.grid.bus(bus).unwrap();
            assert_eq!(bus.potential(), Some(expected));
            assert!(!bus.is_initialized_by_user());
        }
        assert_eq!(s.grid.network_info(net).unwrap().propagations, 1);
        assert_eq!(s.grid.find_line(net, "line").unwrap(), s.line);
        assert_eq!(s.grid.find_source(net, "vs").unwrap(), s.source);
        assert_eq!(
            s.grid.find_load(net, "nope").unwrap_err().code(),
            ErrorCode::UnknownElement
        );
    }

    #[test]
    fn test_empty_network() {
        let mut grid = Grid::new();
        let err = grid.create_network(ElementCollections::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyNetwork);
    }

    #[test]
    fn test_missing_element_is_named() {
        let mut s = small();
        let mut collections = ElementCollections::new();
        collections.insert(&s.grid, s.b0).unwrap();
        collections.insert(&s.grid, s.line).unwrap();
        collections.insert(&s.grid, s.source).unwrap();

        let err = s.grid.create_network(collections).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownElement);
        let msg = err.to_string();
        assert!(msg.contains("'bus1'"), "{msg}");
        assert!(msg.contains("but has not been added to the network"));
        assert_eq!(s.grid.network_of(s.b0).unwrap(), None);
    }

    #[test]
    fn test_id_mismatch() {
        let mut s = small();
        let mut collections = ElementCollections::from_keys(&s.grid, keys(&s)).unwrap();
        collections.buses[0].0 = "foo".to_string();

        let err = s.grid.create_network(collections.clone()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBusId);
        assert_eq!(
            err.to_string(),
            "Bus ID 'bus0' does not match its key in the dictionary 'foo'."
        );

        collections.buses[0].0 = "bus0".to_string();
        collections.switches.push(collections.lines[0].clone());
        let err = s.grid.create_network(collections).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBranchType);
    }

    #[test]
    fn test_no_voltage_source() {
        let mut s = small();
        s.grid.disconnect(s.source).unwrap();
        let err = s.grid.network_from_element(s.b0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoVoltageSource);
        assert_eq!(
            err.to_string(),
            "There is no voltage source provided in the network, you must provide at least one."
        );
    }

    #[test]
    fn test_poorly_connected_elements_are_listed() {
        let mut s = small();
        let b3 = s.grid.add_bus(Bus::new("b3"));
        let b4 = s.grid.add_bus(Bus::new("b4"));
        let params = Arc::new(LineParameters::new("lp", c(10.0, 0.0), None));
        let l2 = s.grid.add_line(Line::new("l2", params, 1.0).unwrap(), b3, b4).unwrap();
        let mut collections = ElementCollections::from_keys(&s.grid, keys(&s)).unwrap();
        for key in [ElementKey::from(b3), ElementKey::from(b4), ElementKey::from(l2)] {
            collections.insert(&s.grid, key).unwrap();
        }

        let err = s.grid.create_network(collections).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PoorlyConnectedElement);
        assert_eq!(
            err.to_string(),
            "The elements [Bus('b3'), Bus('b4'), Line('l2')] are not electrically connected to a \
             voltage source."
        );
    }

    #[test]
    fn test_element_cannot_join_two_networks() {
        let mut s = small();
        s.grid.network_from_element(s.b0).unwrap();
        let err = s.grid.network_from_element(s.b1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SeveralNetworks);

        let b2 = s.grid.add_bus(Bus::new("b2"));
        s.grid
            .add_source(VoltageSource::new("vs2", c(400.0, 0.0)), b2)
            .unwrap();
        let net2 = s.grid.network_from_element(b2).unwrap();
        assert_eq!(net2.value(), 1);

        let err = s.grid.add_switch(Switch::new("sw"), s.b1, b2).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SeveralNetworks);
        assert_eq!(
            err.to_string(),
            "The bus 'b2' is already assigned to another network."
        );
    }

    #[test]
    fn test_absorption_and_collisions() {
        let mut s = small();
        let net = s.grid.network_from_element(s.b0).unwrap();

        // A new bus chain is absorbed through the new line
        let b2 = s.grid.add_bus(Bus::new("b2"));
        let l2_load = s.grid.add_load(Load::power("load2", c(50.0, 0.0)), b2).unwrap();
        let params = Arc::new(LineParameters::new("lp", c(10.0, 0.0), None));
        s.grid
            .add_line(Line::new("l2", params.clone(), 1.0).unwrap(), s.b1, b2)
            .unwrap();
        assert_eq!(s.grid.network_of(b2).unwrap(), Some(net));
        assert_eq!(s.grid.network_of(l2_load).unwrap(), Some(net));
        assert!(!s.grid.is_topology_valid(net).unwrap());

        let err = s
            .grid
            .add_load(Load::power("load", c(1.0, 0.0)), b2)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadElementObject);
        assert_eq!(
            err.to_string(),
            "A load of ID 'load' is already connected to the network. Disconnect the old load \
             first if you meant to replace it."
        );

        let b3 = s.grid.add_bus(Bus::new("bus0"));
        let err = s
            .grid
            .add_line(Line::new("l3", params, 1.0).unwrap(), b2, b3)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadElementObject);
        assert_eq!(s.grid.network_of(b3).unwrap(), None);

        // Replacing after a disconnection is fine
        s.grid.disconnect(s.load).unwrap();
        let load = s.grid.add_load(Load::power("load", c(1.0, 0.0)), b2).unwrap();
        assert_eq!(s.grid.find_load(net, "load").unwrap(), load);
    }

    #[test]
    fn test_small_network_load_flow() {
        let mut s = small();
        let net = s.grid.network_from_element(s.b0).unwrap();
        let report = s.grid.solve_load_flow(net, &SolverConfig::default()).unwrap();
        assert!(report.iterations >= 1);

        let info = s.grid.network_info(net).unwrap();
        assert_eq!(info.solves, 1);
        assert_eq!(info.last_plan.map(|plan| plan.kind), Some(StartKind::Warm));
        assert!(s.grid.has_valid_results(net).unwrap());
        assert!(s.grid.buses[s.b1.value()].item.working.is_some());
    }

    #[test]
    fn test_restore_partial_results_drops_everything() {
        let mut s = small();
        let net = s.grid.network_from_element(s.b0).unwrap();
        s.grid.solve_load_flow(net, &SolverConfig::default()).unwrap();

        let partial = vec![(
            ElementKey::Bus(s.b0),
            ElementResults::Bus(BusResults {
                potential: c(1.0, 0.0),
            }),
        )];
        s.grid.restore_results(net, partial).unwrap();
        assert!(!s.grid.has_results(net).unwrap());
        assert!(!s.grid.has_valid_results(net).unwrap());

        let wrong = vec![(
            ElementKey::Bus(s.b0),
            ElementResults::Branch(BranchResults {
                current1: ZERO,
                current2: ZERO,
            }),
        )];
        let err = s.grid.restore_results(net, wrong).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadLoadFlowResult);
    }

    #[test]
    fn test_validate_into_collects_warnings() {
        let mut s = small();
        s.grid
            .set_bus_voltage_levels(s.b1, Some(0.9), Some(1.1))
            .unwrap();
        let net = s.grid.network_from_element(s.b0).unwrap();

        let mut diagnostics = Diagnostics::new();
        s.grid.validate_into(net, &mut diagnostics).unwrap();
        assert!(!diagnostics.has_errors());
        assert_eq!(diagnostics.issues_by_category("limits").count(), 1);
        assert_eq!(diagnostics.issues_by_category("line").count(), 1);
    }
}
