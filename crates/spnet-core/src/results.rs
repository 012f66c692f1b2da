//! Per-element result accessors.
//!
//! Every accessor fails with `LoadFlowNotRun` when no load flow has produced
//! results for the element. When the results exist but the network changed
//! since they were computed, the accessor logs one warning per call and
//! returns the last published value.

use num_complex::Complex64;
use tracing::warn;

use crate::branch::Branch;
use crate::element::{BranchKey, BusKey, ElementKey, ElementKind, LoadKey, NetworkId, SourceKey};
use crate::error::{raise, SpnetError, SpnetResult};
use crate::formulas::{
    branch_powers, leaf_power, line_loading, line_series_current, line_series_power_losses,
    line_shunt_currents, line_shunt_power_losses, transformer_loading, voltage,
};
use crate::grid::Grid;
use crate::state::{BranchResults, BusResults, LeafResults, ResultState};

pub(crate) fn not_run<T>() -> SpnetResult<T> {
    raise(
        SpnetError::LoadFlowNotRun,
        "The load flow results are not available because the load flow has not been run yet."
            .to_string(),
    )
}

type Pair = (Complex64, Complex64);

impl Grid {
    pub(crate) fn results_valid_in(&self, network: Option<NetworkId>) -> bool {
        network
            .and_then(|net| self.networks.get(net.value()))
            .is_some_and(|state| state.results_valid)
    }

    /// Returns `results`, warning if the owning network has stale results.
    fn checked<R>(&self, kind: ElementKind, id: &str, network: Option<NetworkId>, results: Option<R>) -> SpnetResult<R> {
        let Some(results) = results else {
            return not_run();
        };
        if !self.results_valid_in(network) {
            warn!(
                "The results of {kind} '{id}' may be outdated. Please re-run a load flow to \
                 ensure the validity of results."
            );
        }
        Ok(results)
    }

    /// Freshness of the results of any element.
    pub fn result_state(&self, key: impl Into<ElementKey>) -> SpnetResult<ResultState> {
        let key = key.into();
        let has_results = match key {
            ElementKey::Bus(k) => self.bus_slot(k)?.results.is_some(),
            ElementKey::Branch(k) => self.branch_slot(k)?.results.is_some(),
            ElementKey::Load(k) => self.load_slot(k)?.results.is_some(),
            ElementKey::Source(k) => self.source_slot(k)?.results.is_some(),
        };
        let network = self.network_of(key)?;
        Ok(ResultState::of(has_results, self.results_valid_in(network)))
    }

    // ========================================================================
    // Buses
    // ========================================================================

    fn bus_results(&self, key: BusKey) -> SpnetResult<BusResults> {
        let slot = self.bus_slot(key)?;
        self.checked(ElementKind::Bus, slot.item.bus.id(), slot.network, slot.results)
    }

    pub fn res_bus_potential(&self, key: BusKey) -> SpnetResult<Complex64> {
        Ok(self.bus_results(key)?.potential)
    }

    pub fn res_bus_voltage(&self, key: BusKey) -> SpnetResult<Complex64> {
        Ok(voltage(self.bus_results(key)?.potential))
    }

    /// `None` when the bus has no nominal voltage or no voltage levels.
    pub fn res_bus_violated(&self, key: BusKey) -> SpnetResult<Option<bool>> {
        let potential = self.bus_results(key)?.potential;
        Ok(self.bus(key)?.voltage_violated(voltage(potential)))
    }

    // ========================================================================
    // Branches
    // ========================================================================

    /// Currents of the branch and potentials of its two buses.
    fn branch_results(&self, key: BranchKey) -> SpnetResult<(BranchResults, Pair)> {
        let slot = self.branch_slot(key)?;
        let results = self.checked(
            slot.item.branch.kind(),
            slot.item.branch.id(),
            slot.network,
            slot.results,
        )?;
        let potential = |bus: BusKey| -> SpnetResult<Complex64> {
            match self.bus_slot(bus)?.results {
                Some(r) => Ok(r.potential),
                None => not_run(),
            }
        };
        let potentials = (potential(slot.item.bus1)?, potential(slot.item.bus2)?);
        Ok((results, potentials))
    }

    pub fn res_branch_currents(&self, key: BranchKey) -> SpnetResult<Pair> {
        let (results, _) = self.branch_results(key)?;
        Ok((results.current1, results.current2))
    }

    pub fn res_branch_potentials(&self, key: BranchKey) -> SpnetResult<Pair> {
        Ok(self.branch_results(key)?.1)
    }

    /// Phase-to-phase voltages at both sides.
    pub fn res_branch_voltages(&self, key: BranchKey) -> SpnetResult<Pair> {
        let (v1, v2) = self.branch_results(key)?.1;
        Ok((voltage(v1), voltage(v2)))
    }

    pub fn res_branch_powers(&self, key: BranchKey) -> SpnetResult<Pair> {
        let (results, potentials) = self.branch_results(key)?;
        Ok(branch_powers(potentials, (results.current1, results.current2)))
    }

    /// `power1 + power2`.
    pub fn res_branch_power_losses(&self, key: BranchKey) -> SpnetResult<Complex64> {
        let (s1, s2) = self.res_branch_powers(key)?;
        Ok(s1 + s2)
    }

    /// Loading ratio of a line or a transformer. `None` for switches and for
    /// lines without ampacity.
    pub fn res_branch_loading(&self, key: BranchKey) -> SpnetResult<Option<f64>> {
        let (results, potentials) = self.branch_results(key)?;
        let currents = (results.current1, results.current2);
        Ok(match self.branch(key)? {
            Branch::Line(line) => line_loading(currents, line.max_current(), line.max_loading()),
            Branch::Transformer(transformer) => Some(transformer_loading(
                branch_powers(potentials, currents),
                transformer.parameters().sn(),
                transformer.max_loading(),
            )),
            Branch::Switch(_) => None,
        })
    }

    pub fn res_branch_violated(&self, key: BranchKey) -> SpnetResult<Option<bool>> {
        Ok(self.res_branch_loading(key)?.map(|loading| loading > 1.0))
    }

    fn line_results(&self, key: BranchKey) -> SpnetResult<(Complex64, Option<Complex64>, Pair)> {
        let line = self.line(key)?;
        let (_, potentials) = self.branch_results(key)?;
        Ok((line.z_line(), line.y_shunt(), potentials))
    }

    pub fn res_line_series_current(&self, key: BranchKey) -> SpnetResult<Complex64> {
        let (z, _, (v1, v2)) = self.line_results(key)?;
        Ok(line_series_current(z, v1, v2))
    }

    pub fn res_line_series_power_losses(&self, key: BranchKey) -> SpnetResult<Complex64> {
        let (z, _, (v1, v2)) = self.line_results(key)?;
        Ok(line_series_power_losses(z, v1, v2))
    }

    /// Zero on both sides for a line without shunt.
    pub fn res_line_shunt_currents(&self, key: BranchKey) -> SpnetResult<Pair> {
        let (_, y, (v1, v2)) = self.line_results(key)?;
        Ok(line_shunt_currents(y, v1, v2))
    }

    pub fn res_line_shunt_power_losses(&self, key: BranchKey) -> SpnetResult<Complex64> {
        let (_, y, (v1, v2)) = self.line_results(key)?;
        Ok(line_shunt_power_losses(y, v1, v2))
    }

    // ========================================================================
    // Loads and sources
    // ========================================================================

    fn load_results(&self, key: LoadKey) -> SpnetResult<LeafResults> {
        let slot = self.load_slot(key)?;
        self.checked(ElementKind::Load, slot.item.load.id(), slot.network, slot.results)
    }

    pub fn res_load_current(&self, key: LoadKey) -> SpnetResult<Complex64> {
        Ok(self.load_results(key)?.current)
    }

    pub fn res_load_power(&self, key: LoadKey) -> SpnetResult<Complex64> {
        let results = self.load_results(key)?;
        Ok(leaf_power(results.potential, results.current))
    }

    pub fn res_load_potential(&self, key: LoadKey) -> SpnetResult<Complex64> {
        Ok(self.load_results(key)?.potential)
    }

    pub fn res_load_voltage(&self, key: LoadKey) -> SpnetResult<Complex64> {
        Ok(voltage(self.load_results(key)?.potential))
    }

    /// Power actually drawn by a flexible load.
    pub fn res_load_flexible_power(&self, key: LoadKey) -> SpnetResult<Complex64> {
        let load = self.load(key)?;
        if !load.is_flexible() {
            return raise(
                SpnetError::BadLoadType,
                format!(
                    "The load '{}' is not flexible and does not have a flexible power.",
                    load.id()
                ),
            );
        }
        match self.load_results(key)?.flexible_power {
            Some(power) => Ok(power),
            None => not_run(),
        }
    }

    fn source_results(&self, key: SourceKey) -> SpnetResult<LeafResults> {
        let slot = self.source_slot(key)?;
        self.checked(
            ElementKind::Source,
            slot.item.source.id(),
            slot.network,
            slot.results,
        )
    }

    pub fn res_source_current(&self, key: SourceKey) -> SpnetResult<Complex64> {
        Ok(self.source_results(key)?.current)
    }

    /// Negative when the source produces.
    pub fn res_source_power(&self, key: SourceKey) -> SpnetResult<Complex64> {
        let results = self.source_results(key)?;
        Ok(leaf_power(results.potential, results.current))
    }

    pub fn res_source_potential(&self, key: SourceKey) -> SpnetResult<Complex64> {
        Ok(self.source_results(key)?.potential)
    }

    pub fn res_source_voltage(&self, key: SourceKey) -> SpnetResult<Complex64> {
        Ok(voltage(self.source_results(key)?.potential))
    }
}
