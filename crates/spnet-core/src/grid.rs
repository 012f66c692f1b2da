//! The element arena.
//!
//! A [`Grid`] owns every bus, branch, load and source, whether or not it
//! belongs to a network. Connecting an element to a bus of a network absorbs
//! it, together with everything newly reachable through it, into that network.
//! Networks are therefore always whole connected components of the arena.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use num_complex::Complex64;
use tracing::debug;

use crate::branch::{Branch, Line, Switch, Transformer};
use crate::bus::Bus;
use crate::element::{
    BranchEntry, BranchKey, BusEntry, BusKey, ElementKey, ElementKind, LoadEntry, LoadKey,
    NetworkId, Slot, SourceEntry, SourceKey,
};
use crate::error::{raise, SpnetError, SpnetResult};
use crate::flexible::FlexibleParameter;
use crate::load::Load;
use crate::network::NetworkState;
use crate::parameters::{LineParameters, TransformerParameters};
use crate::source::VoltageSource;
use crate::state::{BranchResults, BusResults, LeafResults};

/// Relative tolerance under which two voltage limits are considered equal.
const LIMIT_TOLERANCE: f64 = 1e-9;

pub struct Grid {
    pub(crate) buses: Vec<Slot<BusEntry, BusResults>>,
    pub(crate) branches: Vec<Slot<BranchEntry, BranchResults>>,
    pub(crate) loads: Vec<Slot<LoadEntry, LeafResults>>,
    pub(crate) sources: Vec<Slot<SourceEntry, LeafResults>>,
    pub(crate) networks: Vec<NetworkState>,
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("buses", &self.buses.len())
            .field("branches", &self.branches.len())
            .field("loads", &self.loads.len())
            .field("sources", &self.sources.len())
            .field("networks", &self.networks.len())
            .finish_non_exhaustive()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_key<T>(kind: ElementKind, index: usize) -> SpnetResult<T> {
    raise(
        SpnetError::BadElementObject,
        format!("Unknown element: there is no {kind} at index {index} in this grid."),
    )
}

fn disconnected<T>(kind: ElementKind, id: &str) -> SpnetResult<T> {
    raise(
        SpnetError::DisconnectedElement,
        format!("The {kind} '{id}' is disconnected and cannot be used anymore."),
    )
}

fn wrong_branch<T>(branch: &Branch, expected: ElementKind) -> SpnetResult<T> {
    raise(
        SpnetError::BadBranchType,
        format!(
            "The branch '{}' is a {}, not a {expected}.",
            branch.id(),
            branch.kind()
        ),
    )
}

pub(crate) fn collision<T>(kind: ElementKind, id: &str) -> SpnetResult<T> {
    let msg = match kind {
        ElementKind::Load | ElementKind::Source => {
            let name = if kind == ElementKind::Load { "load" } else { "source" };
            format!(
                "A {name} of ID '{id}' is already connected to the network. Disconnect the old \
                 {name} first if you meant to replace it."
            )
        }
        _ => format!("A {kind} of ID '{id}' is already connected to the network."),
    };
    raise(SpnetError::BadElementObject, msg)
}

fn check_limit(name: &str, value: Option<f64>, existing: Option<f64>, from: &Bus, to: &Bus) -> SpnetResult<()> {
    if let (Some(value), Some(existing)) = (value, existing) {
        if (value - existing).abs() > LIMIT_TOLERANCE * value.abs().max(existing.abs()) {
            return raise(
                SpnetError::BadVoltages,
                format!(
                    "Cannot propagate the {name} ({value}) of bus '{}' to bus '{}' with different \
                     {name} ({existing}).",
                    from.id(),
                    to.id()
                ),
            );
        }
    }
    Ok(())
}

impl Grid {
    pub fn new() -> Self {
        Self {
            buses: Vec::new(),
            branches: Vec::new(),
            loads: Vec::new(),
            sources: Vec::new(),
            networks: Vec::new(),
        }
    }

    // ========================================================================
    // Slot access
    // ========================================================================

    pub(crate) fn bus_slot(&self, key: BusKey) -> SpnetResult<&Slot<BusEntry, BusResults>> {
        match self.buses.get(key.value()) {
            Some(slot) => Ok(slot),
            None => unknown_key(ElementKind::Bus, key.value()),
        }
    }

    pub(crate) fn bus_slot_mut(&mut self, key: BusKey) -> SpnetResult<&mut Slot<BusEntry, BusResults>> {
        match self.buses.get_mut(key.value()) {
            Some(slot) => Ok(slot),
            None => unknown_key(ElementKind::Bus, key.value()),
        }
    }

    pub(crate) fn branch_slot(&self, key: BranchKey) -> SpnetResult<&Slot<BranchEntry, BranchResults>> {
        match self.branches.get(key.value()) {
            Some(slot) => Ok(slot),
            None => unknown_key(ElementKind::Line, key.value()),
        }
    }

    fn branch_slot_mut(&mut self, key: BranchKey) -> SpnetResult<&mut Slot<BranchEntry, BranchResults>> {
        match self.branches.get_mut(key.value()) {
            Some(slot) => Ok(slot),
            None => unknown_key(ElementKind::Line, key.value()),
        }
    }

    /// Load slot, disconnected or not.
    fn raw_load_slot(&self, key: LoadKey) -> SpnetResult<&Slot<LoadEntry, LeafResults>> {
        match self.loads.get(key.value()) {
            Some(slot) => Ok(slot),
            None => unknown_key(ElementKind::Load, key.value()),
        }
    }

    fn raw_source_slot(&self, key: SourceKey) -> SpnetResult<&Slot<SourceEntry, LeafResults>> {
        match self.sources.get(key.value()) {
            Some(slot) => Ok(slot),
            None => unknown_key(ElementKind::Source, key.value()),
        }
    }

    pub(crate) fn load_slot(&self, key: LoadKey) -> SpnetResult<&Slot<LoadEntry, LeafResults>> {
        let slot = self.raw_load_slot(key)?;
        if slot.item.bus.is_none() {
            return disconnected(ElementKind::Load, slot.item.load.id());
        }
        Ok(slot)
    }

    fn load_slot_mut(&mut self, key: LoadKey) -> SpnetResult<&mut Slot<LoadEntry, LeafResults>> {
        let slot = match self.loads.get_mut(key.value()) {
            Some(slot) => slot,
            None => return unknown_key(ElementKind::Load, key.value()),
        };
        if slot.item.bus.is_none() {
            return disconnected(ElementKind::Load, slot.item.load.id());
        }
        Ok(slot)
    }

    pub(crate) fn source_slot(&self, key: SourceKey) -> SpnetResult<&Slot<SourceEntry, LeafResults>> {
        let slot = self.raw_source_slot(key)?;
        if slot.item.bus.is_none() {
            return disconnected(ElementKind::Source, slot.item.source.id());
        }
        Ok(slot)
    }

    fn source_slot_mut(&mut self, key: SourceKey) -> SpnetResult<&mut Slot<SourceEntry, LeafResults>> {
        let slot = match self.sources.get_mut(key.value()) {
            Some(slot) => slot,
            None => return unknown_key(ElementKind::Source, key.value()),
        };
        if slot.item.bus.is_none() {
            return disconnected(ElementKind::Source, slot.item.source.id());
        }
        Ok(slot)
    }

    /// Ledger and owner of any element, including disconnected leaves.
    pub(crate) fn ledger(&self, key: ElementKey) -> SpnetResult<(&[ElementKey], Option<NetworkId>)> {
        Ok(match key {
            ElementKey::Bus(k) => {
                let slot = self.bus_slot(k)?;
                (&slot.connected[..], slot.network)
            }
            ElementKey::Branch(k) => {
                let slot = self.branch_slot(k)?;
                (&slot.connected[..], slot.network)
            }
            ElementKey::Load(k) => {
                let slot = self.raw_load_slot(k)?;
                (&slot.connected[..], slot.network)
            }
            ElementKey::Source(k) => {
                let slot = self.raw_source_slot(k)?;
                (&slot.connected[..], slot.network)
            }
        })
    }

    pub(crate) fn set_network(&mut self, key: ElementKey, network: Option<NetworkId>) {
        match key {
            ElementKey::Bus(k) => {
                if let Some(slot) = self.buses.get_mut(k.value()) {
                    slot.network = network;
                }
            }
            ElementKey::Branch(k) => {
                if let Some(slot) = self.branches.get_mut(k.value()) {
                    slot.network = network;
                }
            }
            ElementKey::Load(k) => {
                if let Some(slot) = self.loads.get_mut(k.value()) {
                    slot.network = network;
                }
            }
            ElementKey::Source(k) => {
                if let Some(slot) = self.sources.get_mut(k.value()) {
                    slot.network = network;
                }
            }
        }
    }

    /// Errors on disconnected leaves.
    fn check_live(&self, key: ElementKey) -> SpnetResult<()> {
        match key {
            ElementKey::Load(k) => self.load_slot(k).map(|_| ()),
            ElementKey::Source(k) => self.source_slot(k).map(|_| ()),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Element info
    // ========================================================================

    pub fn element_kind(&self, key: impl Into<ElementKey>) -> SpnetResult<ElementKind> {
        Ok(match key.into() {
            ElementKey::Bus(k) => {
                self.bus_slot(k)?;
                ElementKind::Bus
            }
            ElementKey::Branch(k) => self.branch_slot(k)?.item.branch.kind(),
            ElementKey::Load(k) => {
                self.raw_load_slot(k)?;
                ElementKind::Load
            }
            ElementKey::Source(k) => {
                self.raw_source_slot(k)?;
                ElementKind::Source
            }
        })
    }

    /// Id of any element, including disconnected ones.
    pub fn element_id(&self, key: impl Into<ElementKey>) -> SpnetResult<&str> {
        Ok(match key.into() {
            ElementKey::Bus(k) => self.bus_slot(k)?.item.bus.id(),
            ElementKey::Branch(k) => self.branch_slot(k)?.item.branch.id(),
            ElementKey::Load(k) => self.raw_load_slot(k)?.item.load.id(),
            ElementKey::Source(k) => self.raw_source_slot(k)?.item.source.id(),
        })
    }

    /// Elements touched by `key`, in connection order.
    pub fn connected_elements(&self, key: impl Into<ElementKey>) -> SpnetResult<&[ElementKey]> {
        let key = key.into();
        self.check_live(key)?;
        Ok(self.ledger(key)?.0)
    }

    pub fn network_of(&self, key: impl Into<ElementKey>) -> SpnetResult<Option<NetworkId>> {
        let key = key.into();
        self.check_live(key)?;
        Ok(self.ledger(key)?.1)
    }

    pub fn bus(&self, key: BusKey) -> SpnetResult<&Bus> {
        Ok(&self.bus_slot(key)?.item.bus)
    }

    pub fn branch(&self, key: BranchKey) -> SpnetResult<&Branch> {
        Ok(&self.branch_slot(key)?.item.branch)
    }

    pub fn line(&self, key: BranchKey) -> SpnetResult<&Line> {
        let branch = self.branch(key)?;
        match branch {
            Branch::Line(line) => Ok(line),
            other => wrong_branch(other, ElementKind::Line),
        }
    }

    pub fn transformer(&self, key: BranchKey) -> SpnetResult<&Transformer> {
        let branch = self.branch(key)?;
        match branch {
            Branch::Transformer(transformer) => Ok(transformer),
            other => wrong_branch(other, ElementKind::Transformer),
        }
    }

    pub fn branch_buses(&self, key: BranchKey) -> SpnetResult<(BusKey, BusKey)> {
        let entry = &self.branch_slot(key)?.item;
        Ok((entry.bus1, entry.bus2))
    }

    pub fn load(&self, key: LoadKey) -> SpnetResult<&Load> {
        Ok(&self.load_slot(key)?.item.load)
    }

    pub fn load_bus(&self, key: LoadKey) -> SpnetResult<BusKey> {
        let slot = self.load_slot(key)?;
        match slot.item.bus {
            Some(bus) => Ok(bus),
            None => disconnected(ElementKind::Load, slot.item.load.id()),
        }
    }

    pub fn source(&self, key: SourceKey) -> SpnetResult<&VoltageSource> {
        Ok(&self.source_slot(key)?.item.source)
    }

    pub fn source_bus(&self, key: SourceKey) -> SpnetResult<BusKey> {
        let slot = self.source_slot(key)?;
        match slot.item.bus {
            Some(bus) => Ok(bus),
            None => disconnected(ElementKind::Source, slot.item.source.id()),
        }
    }

    pub fn bus_keys(&self) -> impl Iterator<Item = BusKey> + '_ {
        (0..self.buses.len()).map(BusKey::new)
    }

    pub fn branch_keys(&self) -> impl Iterator<Item = BranchKey> + '_ {
        (0..self.branches.len()).map(BranchKey::new)
    }

    /// Keys of the loads that are still connected.
    pub fn load_keys(&self) -> impl Iterator<Item = LoadKey> + '_ {
        self.loads
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.item.bus.is_some())
            .map(|(index, _)| LoadKey::new(index))
    }

    pub fn source_keys(&self) -> impl Iterator<Item = SourceKey> + '_ {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.item.bus.is_some())
            .map(|(index, _)| SourceKey::new(index))
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn add_bus(&mut self, bus: Bus) -> BusKey {
        let key = BusKey::new(self.buses.len());
        debug!("Added bus '{}'", bus.id());
        self.buses.push(Slot::new(BusEntry { bus, working: None }));
        key
    }

    pub fn add_line(&mut self, line: Line, bus1: BusKey, bus2: BusKey) -> SpnetResult<BranchKey> {
        self.add_branch(Branch::Line(line), bus1, bus2)
    }

    pub fn add_transformer(
        &mut self,
        transformer: Transformer,
        bus1: BusKey,
        bus2: BusKey,
    ) -> SpnetResult<BranchKey> {
        self.add_branch(Branch::Transformer(transformer), bus1, bus2)
    }

    /// Fails with `SwitchesLoop` if the buses are already joined by switches,
    /// and with `BadVoltageSourcesConnection` if both sides carry a source.
    pub fn add_switch(&mut self, switch: Switch, bus1: BusKey, bus2: BusKey) -> SpnetResult<BranchKey> {
        self.add_branch(Branch::Switch(switch), bus1, bus2)
    }

    pub fn add_branch(&mut self, branch: Branch, bus1: BusKey, bus2: BusKey) -> SpnetResult<BranchKey> {
        self.bus_slot(bus1)?;
        self.bus_slot(bus2)?;
        if branch.kind() == ElementKind::Switch {
            self.check_switch(branch.id(), bus1, bus2)?;
        }

        let network = self.joint_network(bus1, bus2)?;
        let mut absorbed = match network {
            Some(net) => {
                let seeds: Vec<ElementKey> = [bus1, bus2]
                    .into_iter()
                    .filter(|bus| self.buses[bus.value()].network.is_none())
                    .map(ElementKey::from)
                    .collect();
                self.plan_absorption(net, (branch.kind(), branch.id()), &seeds)?
            }
            None => Vec::new(),
        };

        let key = BranchKey::new(self.branches.len());
        debug!("Added {} '{}'", branch.kind(), branch.id());
        let mut slot = Slot::new(BranchEntry { branch, bus1, bus2 });
        slot.link(bus1.into());
        slot.link(bus2.into());
        self.branches.push(slot);
        self.buses[bus1.value()].link(key.into());
        self.buses[bus2.value()].link(key.into());

        if let Some(net) = network {
            absorbed.push(key.into());
            self.absorb(net, absorbed);
        }
        Ok(key)
    }

    pub fn add_load(&mut self, load: Load, bus: BusKey) -> SpnetResult<LoadKey> {
        let network = self.bus_slot(bus)?.network;
        if let Some(net) = network {
            self.plan_absorption(net, (ElementKind::Load, load.id()), &[])?;
        }
        let key = LoadKey::new(self.loads.len());
        debug!("Added load '{}'", load.id());
        let mut slot = Slot::new(LoadEntry { load, bus: Some(bus) });
        slot.link(bus.into());
        self.loads.push(slot);
        self.buses[bus.value()].link(key.into());
        if let Some(net) = network {
            self.absorb(net, vec![key.into()]);
        }
        Ok(key)
    }

    pub fn add_source(&mut self, source: VoltageSource, bus: BusKey) -> SpnetResult<SourceKey> {
        let network = self.bus_slot(bus)?.network;
        if let Some(net) = network {
            self.plan_absorption(net, (ElementKind::Source, source.id()), &[])?;
        }
        let key = SourceKey::new(self.sources.len());
        debug!("Added voltage source '{}'", source.id());
        let mut slot = Slot::new(SourceEntry { source, bus: Some(bus) });
        slot.link(bus.into());
        self.sources.push(slot);
        self.buses[bus.value()].link(key.into());
        if let Some(net) = network {
            self.absorb(net, vec![key.into()]);
        }
        Ok(key)
    }

    /// Detaches a load or a source from its bus. The element cannot be used
    /// afterwards. Buses and branches cannot be disconnected.
    pub fn disconnect(&mut self, element: impl Into<ElementKey>) -> SpnetResult<()> {
        let key = element.into();
        let (bus, network) = match key {
            ElementKey::Load(k) => {
                let slot = self.load_slot_mut(k)?;
                debug!("Disconnected load '{}'", slot.item.load.id());
                slot.results = None;
                slot.connected.clear();
                (slot.item.bus.take(), slot.network.take())
            }
            ElementKey::Source(k) => {
                let slot = self.source_slot_mut(k)?;
                debug!("Disconnected voltage source '{}'", slot.item.source.id());
                slot.results = None;
                slot.connected.clear();
                (slot.item.bus.take(), slot.network.take())
            }
            other => {
                let kind = self.element_kind(other)?;
                let id = self.element_id(other)?;
                return raise(
                    SpnetError::BadElementObject,
                    format!("'{id}' is a {kind} and it cannot be disconnected from a network."),
                );
            }
        };

        if let Some(bus) = bus {
            self.buses[bus.value()].unlink(key);
        }
        if let Some(state) = network.and_then(|net| self.networks.get_mut(net.value())) {
            state.remove(key);
            state.invalidate_topology();
        }
        Ok(())
    }

    fn joint_network(&self, bus1: BusKey, bus2: BusKey) -> SpnetResult<Option<NetworkId>> {
        let network1 = self.buses[bus1.value()].network;
        let network2 = self.buses[bus2.value()].network;
        match (network1, network2) {
            (Some(a), Some(b)) if a != b => raise(
                SpnetError::SeveralNetworks,
                format!(
                    "The bus '{}' is already assigned to another network.",
                    self.buses[bus2.value()].item.bus.id()
                ),
            ),
            _ => Ok(network1.or(network2)),
        }
    }

    /// Collects the unassigned elements reachable from `seeds` and checks that
    /// neither they nor the new element reuse an id of `net`.
    fn plan_absorption(
        &self,
        net: NetworkId,
        new: (ElementKind, &str),
        seeds: &[ElementKey],
    ) -> SpnetResult<Vec<ElementKey>> {
        let mut visited: HashSet<ElementKey> = seeds.iter().copied().collect();
        let mut queue: VecDeque<ElementKey> = seeds.iter().copied().collect();
        let mut reached = Vec::new();
        while let Some(key) = queue.pop_front() {
            reached.push(key);
            for &other in self.ledger(key)?.0 {
                if self.ledger(other)?.1.is_none() && visited.insert(other) {
                    queue.push_back(other);
                }
            }
        }

        let mut taken: HashSet<(ElementKind, &str)> = HashSet::new();
        if let Some(state) = self.networks.get(net.value()) {
            for key in state.members() {
                taken.insert((self.element_kind(key)?, self.element_id(key)?));
            }
        }
        if !taken.insert(new) {
            return collision(new.0, new.1);
        }
        for &key in &reached {
            let kind = self.element_kind(key)?;
            let id = self.element_id(key)?;
            if !taken.insert((kind, id)) {
                return collision(kind, id);
            }
        }
        Ok(reached)
    }

    pub(crate) fn absorb(&mut self, net: NetworkId, keys: Vec<ElementKey>) {
        for &key in &keys {
            self.set_network(key, Some(net));
        }
        if let Some(state) = self.networks.get_mut(net.value()) {
            debug!("Network #{} absorbed {} element(s)", net.value(), keys.len());
            for key in keys {
                state.insert(key);
            }
            state.invalidate_topology();
        }
    }

    // ========================================================================
    // Galvanic connectivity
    // ========================================================================

    /// Buses reached from `bus` through branches accepted by `through`.
    pub(crate) fn neighbours(&self, bus: BusKey, through: impl Fn(ElementKind) -> bool) -> Vec<BusKey> {
        let mut result = Vec::new();
        if let Some(slot) = self.buses.get(bus.value()) {
            for key in &slot.connected {
                if let ElementKey::Branch(branch) = key {
                    let entry = &self.branches[branch.value()].item;
                    if through(entry.branch.kind()) {
                        result.push(if entry.bus1 == bus { entry.bus2 } else { entry.bus1 });
                    }
                }
            }
        }
        result
    }

    fn switch_group(&self, start: BusKey) -> HashSet<BusKey> {
        let mut group = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(bus) = queue.pop_front() {
            for other in self.neighbours(bus, |kind| kind == ElementKind::Switch) {
                if group.insert(other) {
                    queue.push_back(other);
                }
            }
        }
        group
    }

    fn check_switch(&self, id: &str, bus1: BusKey, bus2: BusKey) -> SpnetResult<()> {
        let group1 = self.switch_group(bus1);
        if group1.contains(&bus2) {
            return raise(
                SpnetError::SwitchesLoop,
                format!("There is a loop of switch involving the switch '{id}'. It is not allowed."),
            );
        }
        let group2 = self.switch_group(bus2);
        let has_source = |group: &HashSet<BusKey>| {
            group.iter().any(|bus| {
                self.buses[bus.value()]
                    .connected
                    .iter()
                    .any(|key| matches!(key, ElementKey::Source(_)))
            })
        };
        if has_source(&group1) && has_source(&group2) {
            return raise(
                SpnetError::BadVoltageSourcesConnection,
                format!(
                    "The buses '{}' and '{}' both have a voltage source and are connected with \
                     the switch '{id}'. It is not allowed.",
                    self.buses[bus1.value()].item.bus.id(),
                    self.buses[bus2.value()].item.bus.id()
                ),
            );
        }
        Ok(())
    }

    /// `bus` first, then every bus reachable through lines and switches in
    /// BFS order. Transformers are not crossed.
    pub fn get_connected_buses(&self, bus: BusKey) -> SpnetResult<Vec<BusKey>> {
        self.bus_slot(bus)?;
        let mut result = vec![bus];
        let mut visited = HashSet::from([bus]);
        let mut queue = VecDeque::from([bus]);
        while let Some(current) = queue.pop_front() {
            for other in self.neighbours(current, |kind| kind.is_galvanic()) {
                if visited.insert(other) {
                    result.push(other);
                    queue.push_back(other);
                }
            }
        }
        Ok(result)
    }

    /// Copies the nominal voltage and the voltage levels of `bus` to every
    /// galvanically connected bus.
    ///
    /// Without `force`, a bus that already defines a different value is an
    /// error and nothing is copied.
    pub fn propagate_limits(&mut self, bus: BusKey, force: bool) -> SpnetResult<()> {
        let connected = self.get_connected_buses(bus)?;
        let reference = self.buses[bus.value()].item.bus.clone();
        if !force {
            for other in connected.iter().skip(1) {
                let target = &self.buses[other.value()].item.bus;
                check_limit(
                    "nominal voltage",
                    reference.nominal_voltage(),
                    target.nominal_voltage(),
                    &reference,
                    target,
                )?;
                check_limit(
                    "minimum voltage level",
                    reference.min_voltage_level(),
                    target.min_voltage_level(),
                    &reference,
                    target,
                )?;
                check_limit(
                    "maximum voltage level",
                    reference.max_voltage_level(),
                    target.max_voltage_level(),
                    &reference,
                    target,
                )?;
            }
        }
        for other in connected.iter().skip(1) {
            self.buses[other.value()].item.bus.copy_limits(&reference);
        }
        debug!(
            "Propagated the limits of bus '{}' to {} bus(es)",
            reference.id(),
            connected.len() - 1
        );
        Ok(())
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub(crate) fn invalidate_results(&mut self, network: Option<NetworkId>) {
        if let Some(state) = network.and_then(|net| self.networks.get_mut(net.value())) {
            state.invalidate_results();
        }
    }

    fn line_mut(&mut self, key: BranchKey) -> SpnetResult<(&mut Line, Option<NetworkId>)> {
        let slot = self.branch_slot_mut(key)?;
        let network = slot.network;
        match &mut slot.item.branch {
            Branch::Line(line) => Ok((line, network)),
            other => wrong_branch(other, ElementKind::Line),
        }
    }

    fn transformer_mut(&mut self, key: BranchKey) -> SpnetResult<(&mut Transformer, Option<NetworkId>)> {
        let slot = self.branch_slot_mut(key)?;
        let network = slot.network;
        match &mut slot.item.branch {
            Branch::Transformer(transformer) => Ok((transformer, network)),
            other => wrong_branch(other, ElementKind::Transformer),
        }
    }

    /// Sets the initial potential of a bus.
    pub fn set_bus_potential(&mut self, key: BusKey, potential: Complex64) -> SpnetResult<()> {
        let slot = self.bus_slot_mut(key)?;
        slot.item.bus.set_potential(potential);
        let network = slot.network;
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_bus_nominal_voltage(&mut self, key: BusKey, nominal_voltage: Option<f64>) -> SpnetResult<()> {
        self.bus_slot_mut(key)?.item.bus.set_nominal_voltage(nominal_voltage);
        Ok(())
    }

    pub fn set_bus_voltage_levels(
        &mut self,
        key: BusKey,
        min_voltage_level: Option<f64>,
        max_voltage_level: Option<f64>,
    ) -> SpnetResult<()> {
        self.bus_slot_mut(key)?
            .item
            .bus
            .set_voltage_levels(min_voltage_level, max_voltage_level)
    }

    pub fn set_line_length(&mut self, key: BranchKey, length: f64) -> SpnetResult<()> {
        let (line, network) = self.line_mut(key)?;
        line.set_length(length)?;
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_line_max_loading(&mut self, key: BranchKey, max_loading: f64) -> SpnetResult<()> {
        self.line_mut(key)?.0.set_max_loading(max_loading)
    }

    pub fn set_line_parameters(&mut self, key: BranchKey, parameters: Arc<LineParameters>) -> SpnetResult<()> {
        let (line, network) = self.line_mut(key)?;
        line.set_parameters(parameters)?;
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_transformer_tap(&mut self, key: BranchKey, tap: f64) -> SpnetResult<()> {
        let (transformer, network) = self.transformer_mut(key)?;
        transformer.set_tap(tap);
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_transformer_max_loading(&mut self, key: BranchKey, max_loading: f64) -> SpnetResult<()> {
        self.transformer_mut(key)?.0.set_max_loading(max_loading)
    }

    pub fn set_transformer_parameters(
        &mut self,
        key: BranchKey,
        parameters: Arc<TransformerParameters>,
    ) -> SpnetResult<()> {
        let (transformer, network) = self.transformer_mut(key)?;
        transformer.set_parameters(parameters);
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_load_power(&mut self, key: LoadKey, power: Complex64) -> SpnetResult<()> {
        let slot = self.load_slot_mut(key)?;
        slot.item.load.set_power(power)?;
        let network = slot.network;
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_load_current(&mut self, key: LoadKey, current: Complex64) -> SpnetResult<()> {
        let slot = self.load_slot_mut(key)?;
        slot.item.load.set_current(current)?;
        let network = slot.network;
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_load_impedance(&mut self, key: LoadKey, impedance: Complex64) -> SpnetResult<()> {
        let slot = self.load_slot_mut(key)?;
        slot.item.load.set_impedance(impedance)?;
        let network = slot.network;
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_load_flexible_parameter(
        &mut self,
        key: LoadKey,
        parameter: Option<FlexibleParameter>,
    ) -> SpnetResult<()> {
        let slot = self.load_slot_mut(key)?;
        slot.item.load.set_flexible_parameter(parameter)?;
        let network = slot.network;
        self.invalidate_results(network);
        Ok(())
    }

    pub fn set_source_voltage(&mut self, key: SourceKey, voltage: Complex64) -> SpnetResult<()> {
        let slot = self.source_slot_mut(key)?;
        slot.item.source.set_voltage(voltage);
        let network = slot.network;
        self.invalidate_results(network);
        Ok(())
    }

    /// Swaps the parameters of every line sharing `parameters.id()`.
    ///
    /// All lines are checked before any is changed. Returns the number of
    /// lines updated.
    pub fn replace_line_parameters(&mut self, parameters: Arc<LineParameters>) -> SpnetResult<usize> {
        let targets: Vec<usize> = self
            .branches
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.item.branch.kind() == ElementKind::Line
                    && slot.item.branch.parameters_id() == Some(parameters.id())
            })
            .map(|(index, _)| index)
            .collect();

        for &index in &targets {
            if let Some(line) = self.branches[index].item.branch.as_line() {
                line.clone().set_parameters(Arc::clone(&parameters))?;
            }
        }

        let mut networks = Vec::new();
        for &index in &targets {
            let slot = &mut self.branches[index];
            if let Some(line) = slot.item.branch.as_line_mut() {
                line.set_parameters(Arc::clone(&parameters))?;
            }
            networks.push(slot.network);
        }
        for network in networks {
            self.invalidate_results(network);
        }
        debug!(
            "Replaced line parameters '{}' on {} line(s)",
            parameters.id(),
            targets.len()
        );
        Ok(targets.len())
    }

    /// Swaps the parameters of every transformer sharing `parameters.id()`.
    pub fn replace_transformer_parameters(&mut self, parameters: Arc<TransformerParameters>) -> usize {
        let mut networks = Vec::new();
        for slot in self.branches.iter_mut() {
            let shared = slot.item.branch.parameters_id() == Some(parameters.id());
            if let Some(transformer) = slot.item.branch.as_transformer_mut().filter(|_| shared) {
                transformer.set_parameters(Arc::clone(&parameters));
                networks.push(slot.network);
            }
        }
        let count = networks.len();
        for network in networks {
            self.invalidate_results(network);
        }
        debug!(
            "Replaced transformer parameters '{}' on {count} transformer(s)",
            parameters.id()
        );
        count
    }
}
