//! # spnet-core: Single-Phase-Equivalent Distribution Network Modeling
//!
//! Data model, validation and load flow orchestration for balanced
//! distribution networks represented by their single-phase equivalent.
//!
//! ## Design Philosophy
//!
//! Elements live in a [`Grid`] arena and are addressed by typed keys
//! ([`BusKey`], [`BranchKey`], [`LoadKey`], [`SourceKey`]):
//! - **Buses** are the nodes, carrying an optional initial potential and
//!   voltage limits
//! - **Branches** (lines, transformers, switches) join two buses
//! - **Loads** and **voltage sources** hang off a single bus
//!
//! Every element keeps a ledger of the elements it touches. A network is
//! a whole connected component of that graph, validated once at creation
//! and re-validated lazily before a solve when its topology changed.
//!
//! Potentials are phase-to-neutral, voltages phase-to-phase
//! (`voltage = potential·√3`), powers and currents are three-phase totals.
//!
//! ## Quick Start
//!
//! ```rust
//! use num_complex::Complex64;
//! use spnet_core::*;
//! use std::sync::Arc;
//!
//! let mut grid = Grid::new();
//! let source_bus = grid.add_bus(Bus::new("source_bus"));
//! let load_bus = grid.add_bus(Bus::new("load_bus"));
//!
//! let params = Arc::new(LineParameters::new("lp", Complex64::new(10.0, 0.0), None));
//! grid.add_line(Line::new("line", params, 1.0).unwrap(), source_bus, load_bus)
//!     .unwrap();
//! grid.add_source(VoltageSource::new("vs", Complex64::new(20e3, 0.0)), source_bus)
//!     .unwrap();
//! let load = grid
//!     .add_load(Load::power("load", Complex64::new(100.0, 0.0)), load_bus)
//!     .unwrap();
//!
//! let net = grid.network_from_element(source_bus).unwrap();
//! let report = grid.solve_load_flow(net, &SolverConfig::default()).unwrap();
//! assert!(report.iterations >= 1);
//!
//! let power = grid.res_load_power(load).unwrap();
//! assert!((power.re - 100.0).abs() < 1e-6);
//! ```
//!
//! ## Core Data Structures
//!
//! - [`Grid`] - Element arena and network registry
//! - [`ElementCollections`] - Explicit element lists for [`Grid::create_network`]
//! - [`Branch`] - Enum for [`Line`], [`Transformer`] and [`Switch`]
//! - [`Load`] - Power, current, impedance or flexible load
//! - [`LoadFlowEngine`] - Numerical engine boundary, see [`solver`]
//!
//! ## Modules
//!
//! - [`error`] - [`SpnetError`] and stable [`ErrorCode`]s
//! - [`diagnostics`] - Non-fatal validation findings
//! - [`results`] / [`tables`] - Per-element and per-network results
//! - [`graph_utils`] - Island detection and Graphviz export
//! - [`formulas`] - Derived result formulas

pub mod branch;
pub mod bus;
pub mod diagnostics;
pub mod element;
pub mod error;
pub mod flexible;
pub mod formulas;
pub mod graph_utils;
pub mod grid;
pub mod load;
pub mod network;
pub mod parameters;
pub mod results;
pub mod solver;
pub mod source;
pub mod state;
pub mod tables;

pub use branch::{Branch, Line, Switch, Transformer};
pub use bus::Bus;
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use element::{BranchKey, BusKey, ElementKey, ElementKind, LoadKey, NetworkId, SourceKey};
pub use error::{ErrorCode, SpnetError, SpnetResult};
pub use flexible::{Control, ControlType, FlexibleParameter, Projection, ProjectionType};
pub use graph_utils::{export_graph, find_islands, to_graph, IslandAnalysis};
pub use grid::Grid;
pub use load::{Load, LoadKind, LoadType};
pub use network::{ElementCollections, NetworkInfo};
pub use parameters::{LineParameters, TransformerParameters};
pub use solver::*;
pub use source::VoltageSource;
pub use state::{
    plan_start, BranchResults, BusResults, ElementResults, LeafResults, ResultState, StartKind,
    StartPlan,
};
pub use tables::{
    BusRow, BusVoltageRow, FlexiblePowerRow, LineRow, LoadRow, SourceRow, SwitchRow,
    TransformerRow,
};
