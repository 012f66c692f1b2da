pub mod backend;
pub mod dense;
pub mod engine;
pub mod registry;

pub use backend::{FaerBackend, GaussBackend, LinearBackend};
pub use dense::DenseEngine;
pub use engine::{
    BranchModel, BranchModelKind, LoadFlowEngine, LoadModel, LoadModelKind, NetworkModel,
    SolveReport, SolverConfig, SourceModel,
};
pub use registry::BackendKind;
