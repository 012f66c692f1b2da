//! Result freshness and the warm-start decision.
//!
//! Results are cached per element in the grid arena. Whether they can be
//! trusted is a property of the owning network, so an element's
//! [`ResultState`] is derived from both: no cached value means
//! [`ResultState::Never`], a cached value in a network whose results were
//! invalidated means [`ResultState::Stale`].

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultState {
    /// No load flow has produced results for this element
    Never,
    /// Results exist but an input changed since they were computed
    Stale,
    Fresh,
}

impl ResultState {
    pub(crate) fn of(has_results: bool, results_valid: bool) -> Self {
        match (has_results, results_valid) {
            (false, _) => ResultState::Never,
            (true, false) => ResultState::Stale,
            (true, true) => ResultState::Fresh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartKind {
    /// Starts from initial potentials
    Cold,
    /// Starts from the last known potentials
    Warm,
}

/// What a solve does before calling the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPlan {
    pub kind: StartKind,
    /// Re-initialize bus potentials from the sources
    pub propagate_potentials: bool,
    /// Discard the last converged potentials
    pub reset_inputs: bool,
    /// The starting point is a converged solution of the current inputs
    pub converged_start: bool,
}

/// Decides how to start a load flow.
///
/// An invalid topology always re-propagates potentials, whatever the
/// `warm_start` flag. A cold start always resets the inputs. Otherwise the
/// previous potentials are reused even when the results are stale, since only
/// the right-hand side changed.
pub fn plan_start(topology_valid: bool, results_valid: bool, warm_start: bool) -> StartPlan {
    let propagate_potentials = !topology_valid;
    let reset_inputs = !warm_start;
    let kind = if propagate_potentials || reset_inputs {
        StartKind::Cold
    } else {
        StartKind::Warm
    };
    StartPlan {
        kind,
        propagate_potentials,
        reset_inputs,
        converged_start: kind == StartKind::Warm && results_valid,
    }
}

// ============================================================================
// Cached results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusResults {
    pub potential: Complex64,
}

/// Per-phase currents entering the branch at each side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchResults {
    pub current1: Complex64,
    pub current2: Complex64,
}

/// Results of a load or a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafResults {
    /// Single-phase-equivalent current entering the element
    pub current: Complex64,
    pub potential: Complex64,
    /// Power actually drawn by a flexible load
    pub flexible_power: Option<Complex64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementResults {
    Bus(BusResults),
    Branch(BranchResults),
    Load(LeafResults),
    Source(LeafResults),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_solve_of_valid_network_is_warm() {
        // Potentials were propagated when the network was built
        let plan = plan_start(true, false, true);
        assert_eq!(plan.kind, StartKind::Warm);
        assert!(!plan.propagate_potentials);
        assert!(!plan.reset_inputs);
        assert!(!plan.converged_start);
    }

    #[test]
    fn test_cold_start_always_resets() {
        for topology_valid in [true, false] {
            for results_valid in [true, false] {
                let plan = plan_start(topology_valid, results_valid, false);
                assert_eq!(plan.kind, StartKind::Cold);
                assert!(plan.reset_inputs);
            }
        }
    }

    #[test]
    fn test_valid_results_give_converged_warm_start() {
        let plan = plan_start(true, true, true);
        assert_eq!(plan.kind, StartKind::Warm);
        assert!(plan.converged_start);
        assert!(!plan.propagate_potentials);
    }

    #[test]
    fn test_invalid_topology_propagates_without_reset() {
        let plan = plan_start(false, false, true);
        assert_eq!(plan.kind, StartKind::Cold);
        assert!(plan.propagate_potentials);
        assert!(!plan.reset_inputs);
    }

    #[test]
    fn test_result_state() {
        assert_eq!(ResultState::of(false, true), ResultState::Never);
        assert_eq!(ResultState::of(true, false), ResultState::Stale);
        assert_eq!(ResultState::of(true, true), ResultState::Fresh);
    }
}
