//! Network-wide result tables.
//!
//! One row per element, in network order. The tables fail with
//! `LoadFlowNotRun` before the first solve and log a single network-level
//! warning per call when the results are stale.

use num_complex::Complex64;
use serde::Serialize;
use tracing::warn;

use crate::branch::Branch;
use crate::element::{BranchKey, NetworkId};
use crate::error::SpnetResult;
use crate::formulas::{
    branch_powers, leaf_power, line_loading, line_series_current, line_series_power_losses,
    line_shunt_power_losses, transformer_loading, voltage,
};
use crate::grid::Grid;
use crate::load::LoadType;
use crate::results::not_run;
use crate::state::{BranchResults, LeafResults};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusRow {
    pub id: String,
    pub potential: Complex64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusVoltageRow {
    pub id: String,
    pub voltage: Complex64,
    pub min_voltage: Option<f64>,
    pub max_voltage: Option<f64>,
    pub violated: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineRow {
    pub id: String,
    pub current1: Complex64,
    pub current2: Complex64,
    pub power1: Complex64,
    pub power2: Complex64,
    pub potential1: Complex64,
    pub potential2: Complex64,
    pub series_losses: Complex64,
    pub series_current: Complex64,
    pub shunt_losses: Complex64,
    pub max_current: Option<f64>,
    pub loading: Option<f64>,
    pub violated: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformerRow {
    pub id: String,
    pub current1: Complex64,
    pub current2: Complex64,
    pub power1: Complex64,
    pub power2: Complex64,
    pub potential1: Complex64,
    pub potential2: Complex64,
    pub max_power: f64,
    pub loading: f64,
    pub violated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchRow {
    pub id: String,
    pub current1: Complex64,
    pub current2: Complex64,
    pub power1: Complex64,
    pub power2: Complex64,
    pub potential1: Complex64,
    pub potential2: Complex64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadRow {
    pub id: String,
    #[serde(rename = "type")]
    pub load_type: LoadType,
    pub current: Complex64,
    pub power: Complex64,
    pub potential: Complex64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRow {
    pub id: String,
    pub current: Complex64,
    pub power: Complex64,
    pub potential: Complex64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexiblePowerRow {
    pub id: String,
    pub flexible_power: Complex64,
}

/// Currents, potentials and powers of one branch.
struct BranchFlow {
    currents: (Complex64, Complex64),
    potentials: (Complex64, Complex64),
    powers: (Complex64, Complex64),
}

impl Grid {
    /// Fails before the first solve, warns once when stale.
    fn check_tables(&self, net: NetworkId) -> SpnetResult<()> {
        if !self.has_results(net)? {
            return not_run();
        }
        if !self.network_state(net)?.results_valid {
            warn!(
                "The results of this network may be outdated. Please re-run a load flow to \
                 ensure the validity of results."
            );
        }
        Ok(())
    }

    fn branch_flow(&self, key: BranchKey) -> SpnetResult<BranchFlow> {
        let slot = self.branch_slot(key)?;
        let Some(BranchResults { current1, current2 }) = slot.results else {
            return not_run();
        };
        let (Some(r1), Some(r2)) = (
            self.bus_slot(slot.item.bus1)?.results,
            self.bus_slot(slot.item.bus2)?.results,
        ) else {
            return not_run();
        };
        let currents = (current1, current2);
        let potentials = (r1.potential, r2.potential);
        Ok(BranchFlow {
            currents,
            potentials,
            powers: branch_powers(potentials, currents),
        })
    }

    fn leaf(results: Option<LeafResults>) -> SpnetResult<LeafResults> {
        match results {
            Some(results) => Ok(results),
            None => not_run(),
        }
    }

    pub fn res_buses(&self, net: NetworkId) -> SpnetResult<Vec<BusRow>> {
        self.check_tables(net)?;
        let mut rows = Vec::new();
        for &key in self.network_buses(net)? {
            let slot = self.bus_slot(key)?;
            let Some(results) = slot.results else {
                return not_run();
            };
            rows.push(BusRow {
                id: slot.item.bus.id().to_string(),
                potential: results.potential,
            });
        }
        Ok(rows)
    }

    pub fn res_buses_voltages(&self, net: NetworkId) -> SpnetResult<Vec<BusVoltageRow>> {
        self.check_tables(net)?;
        let mut rows = Vec::new();
        for &key in self.network_buses(net)? {
            let slot = self.bus_slot(key)?;
            let Some(results) = slot.results else {
                return not_run();
            };
            let bus = &slot.item.bus;
            let voltage = voltage(results.potential);
            rows.push(BusVoltageRow {
                id: bus.id().to_string(),
                voltage,
                min_voltage: bus.min_voltage(),
                max_voltage: bus.max_voltage(),
                violated: bus.voltage_violated(voltage),
            });
        }
        Ok(rows)
    }

    pub fn res_lines(&self, net: NetworkId) -> SpnetResult<Vec<LineRow>> {
        self.check_tables(net)?;
        let mut rows = Vec::new();
        for key in self.network_lines(net)? {
            let line = self.line(key)?;
            let flow = self.branch_flow(key)?;
            let (v1, v2) = flow.potentials;
            let loading = line_loading(flow.currents, line.max_current(), line.max_loading());
            rows.push(LineRow {
                id: line.id().to_string(),
                current1: flow.currents.0,
                current2: flow.currents.1,
                power1: flow.powers.0,
                power2: flow.powers.1,
                potential1: v1,
                potential2: v2,
                series_losses: line_series_power_losses(line.z_line(), v1, v2),
                series_current: line_series_current(line.z_line(), v1, v2),
                shunt_losses: line_shunt_power_losses(line.y_shunt(), v1, v2),
                max_current: line.max_current(),
                loading,
                violated: loading.map(|loading| loading > 1.0),
            });
        }
        Ok(rows)
    }

    pub fn res_transformers(&self, net: NetworkId) -> SpnetResult<Vec<TransformerRow>> {
        self.check_tables(net)?;
        let mut rows = Vec::new();
        for key in self.network_transformers(net)? {
            let transformer = self.transformer(key)?;
            let flow = self.branch_flow(key)?;
            let loading = transformer_loading(
                flow.powers,
                transformer.parameters().sn(),
                transformer.max_loading(),
            );
            rows.push(TransformerRow {
                id: transformer.id().to_string(),
                current1: flow.currents.0,
                current2: flow.currents.1,
                power1: flow.powers.0,
                power2: flow.powers.1,
                potential1: flow.potentials.0,
                potential2: flow.potentials.1,
                max_power: transformer.max_power(),
                loading,
                violated: loading > 1.0,
            });
        }
        Ok(rows)
    }

    pub fn res_switches(&self, net: NetworkId) -> SpnetResult<Vec<SwitchRow>> {
        self.check_tables(net)?;
        let mut rows = Vec::new();
        for key in self.network_switches(net)? {
            let flow = self.branch_flow(key)?;
            rows.push(SwitchRow {
                id: self.branch(key)?.id().to_string(),
                current1: flow.currents.0,
                current2: flow.currents.1,
                power1: flow.powers.0,
                power2: flow.powers.1,
                potential1: flow.potentials.0,
                potential2: flow.potentials.1,
            });
        }
        Ok(rows)
    }

    pub fn res_loads(&self, net: NetworkId) -> SpnetResult<Vec<LoadRow>> {
        self.check_tables(net)?;
        let mut rows = Vec::new();
        for &key in self.network_loads(net)? {
            let slot = self.load_slot(key)?;
            let results = Self::leaf(slot.results)?;
            rows.push(LoadRow {
                id: slot.item.load.id().to_string(),
                load_type: slot.item.load.load_type(),
                current: results.current,
                power: leaf_power(results.potential, results.current),
                potential: results.potential,
            });
        }
        Ok(rows)
    }

    pub fn res_sources(&self, net: NetworkId) -> SpnetResult<Vec<SourceRow>> {
        self.check_tables(net)?;
        let mut rows = Vec::new();
        for &key in self.network_sources(net)? {
            let slot = self.source_slot(key)?;
            let results = Self::leaf(slot.results)?;
            rows.push(SourceRow {
                id: slot.item.source.id().to_string(),
                current: results.current,
                power: leaf_power(results.potential, results.current),
                potential: results.potential,
            });
        }
        Ok(rows)
    }

    /// Flexible loads only.
    pub fn res_loads_flexible_powers(&self, net: NetworkId) -> SpnetResult<Vec<FlexiblePowerRow>> {
        self.check_tables(net)?;
        let mut rows = Vec::new();
        for &key in self.network_loads(net)? {
            let slot = self.load_slot(key)?;
            if !slot.item.load.is_flexible() {
                continue;
            }
            let Some(flexible_power) = Self::leaf(slot.results)?.flexible_power else {
                return not_run();
            };
            rows.push(FlexiblePowerRow {
                id: slot.item.load.id().to_string(),
                flexible_power,
            });
        }
        Ok(rows)
    }

    /// Sum of the source, load and branch powers; zero up to the solver
    /// tolerance.
    pub fn res_power_balance(&self, net: NetworkId) -> SpnetResult<Complex64> {
        self.check_tables(net)?;
        let mut total = Complex64::new(0.0, 0.0);
        for &key in self.network_loads(net)? {
            let results = Self::leaf(self.load_slot(key)?.results)?;
            total += leaf_power(results.potential, results.current);
        }
        for &key in self.network_sources(net)? {
            let results = Self::leaf(self.source_slot(key)?.results)?;
            total += leaf_power(results.potential, results.current);
        }
        for &key in self.network_branches(net)? {
            if let Branch::Line(_) | Branch::Transformer(_) = self.branch(key)? {
                let (s1, s2) = self.branch_flow(key)?.powers;
                total += s1 + s2;
            }
        }
        Ok(total)
    }
}
