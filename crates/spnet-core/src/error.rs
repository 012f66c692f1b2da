//! Error types for network modeling and load flow.
//!
//! Every failure raised by this crate is a [`SpnetError`]. Each variant carries
//! a human-readable message and maps to a stable [`ErrorCode`] that callers can
//! match on without parsing text.
//!
//! # Example
//!
//! ```
//! use spnet_core::{ErrorCode, Line, LineParameters};
//! use num_complex::Complex64;
//! use std::sync::Arc;
//!
//! let params = Arc::new(LineParameters::new("lp", Complex64::new(0.1, 0.0), None));
//! let err = Line::new("line", params, -1.0).unwrap_err();
//! assert_eq!(err.code(), ErrorCode::BadLengthValue);
//! assert_eq!(err.code().as_str(), "BAD_LENGTH_VALUE");
//! ```

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for all network operations.
#[derive(Error, Debug)]
pub enum SpnetError {
    // =========================================================================
    // Parameter validation
    // =========================================================================
    #[error("{0}")]
    BadLengthValue(String),

    #[error("{0}")]
    BadMaxLoadingValue(String),

    #[error("{0}")]
    BadVoltages(String),

    #[error("{0}")]
    BadZLineShape(String),

    #[error("{0}")]
    BadYShuntShape(String),

    #[error("{0}")]
    BadLineModel(String),

    #[error("{0}")]
    BadTransformerParameters(String),

    /// Zero impedance on an impedance load
    #[error("{0}")]
    BadZValue(String),

    /// Power outside the envelope of a flexible load
    #[error("{0}")]
    BadSValue(String),

    #[error("{0}")]
    BadLoadType(String),

    #[error("{0}")]
    BadFlexibleParameterValue(String),

    #[error("{0}")]
    BadControlValue(String),

    #[error("{0}")]
    BadBranchType(String),

    // =========================================================================
    // Connectivity
    // =========================================================================
    #[error("{0}")]
    DisconnectedElement(String),

    #[error("{0}")]
    SwitchesLoop(String),

    #[error("{0}")]
    BadVoltageSourcesConnection(String),

    #[error("{0}")]
    BadElementObject(String),

    #[error("{0}")]
    SeveralNetworks(String),

    // =========================================================================
    // Topology validation
    // =========================================================================
    #[error("{0}")]
    EmptyNetwork(String),

    #[error("{0}")]
    NoVoltageSource(String),

    #[error("{0}")]
    PoorlyConnectedElement(String),

    #[error("{0}")]
    UnknownElement(String),

    #[error("{0}")]
    BadBusId(String),

    #[error("{0}")]
    BadBranchId(String),

    #[error("{0}")]
    BadLoadId(String),

    #[error("{0}")]
    BadSourceId(String),

    // =========================================================================
    // Results and persistence
    // =========================================================================
    #[error("{0}")]
    LoadFlowNotRun(String),

    #[error("{0}")]
    BadLoadFlowResult(String),

    #[error("{0}")]
    NoLoadFlowConvergence(String),

    #[error("{0}")]
    JsonLineParametersDuplicates(String),

    #[error("{0}")]
    JsonTransformerParametersDuplicates(String),

    #[error("{0}")]
    BadJsonFormat(String),

    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using SpnetError.
pub type SpnetResult<T> = Result<T, SpnetError>;

/// Stable, machine-checkable identifier of an error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadLengthValue,
    BadMaxLoadingValue,
    BadVoltages,
    BadZLineShape,
    BadYShuntShape,
    BadLineModel,
    BadTransformerParameters,
    BadZValue,
    BadSValue,
    BadLoadType,
    BadFlexibleParameterValue,
    BadControlValue,
    BadBranchType,
    DisconnectedElement,
    SwitchesLoop,
    BadVoltageSourcesConnection,
    BadElementObject,
    SeveralNetworks,
    EmptyNetwork,
    NoVoltageSource,
    PoorlyConnectedElement,
    UnknownElement,
    BadBusId,
    BadBranchId,
    BadLoadId,
    BadSourceId,
    LoadFlowNotRun,
    BadLoadFlowResult,
    NoLoadFlowConvergence,
    JsonLineParametersDuplicates,
    JsonTransformerParametersDuplicates,
    BadJsonFormat,
    Io,
    Parse,
    Other,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadLengthValue => "BAD_LENGTH_VALUE",
            ErrorCode::BadMaxLoadingValue => "BAD_MAX_LOADING_VALUE",
            ErrorCode::BadVoltages => "BAD_VOLTAGES",
            ErrorCode::BadZLineShape => "BAD_Z_LINE_SHAPE",
            ErrorCode::BadYShuntShape => "BAD_Y_SHUNT_SHAPE",
            ErrorCode::BadLineModel => "BAD_LINE_MODEL",
            ErrorCode::BadTransformerParameters => "BAD_TRANSFORMER_PARAMETERS",
            ErrorCode::BadZValue => "BAD_Z_VALUE",
            ErrorCode::BadSValue => "BAD_S_VALUE",
            ErrorCode::BadLoadType => "BAD_LOAD_TYPE",
            ErrorCode::BadFlexibleParameterValue => "BAD_FLEXIBLE_PARAMETER_VALUE",
            ErrorCode::BadControlValue => "BAD_CONTROL_VALUE",
            ErrorCode::BadBranchType => "BAD_BRANCH_TYPE",
            ErrorCode::DisconnectedElement => "DISCONNECTED_ELEMENT",
            ErrorCode::SwitchesLoop => "SWITCHES_LOOP",
            ErrorCode::BadVoltageSourcesConnection => "BAD_VOLTAGES_SOURCES_CONNECTION",
            ErrorCode::BadElementObject => "BAD_ELEMENT_OBJECT",
            ErrorCode::SeveralNetworks => "SEVERAL_NETWORKS",
            ErrorCode::EmptyNetwork => "EMPTY_NETWORK",
            ErrorCode::NoVoltageSource => "NO_VOLTAGE_SOURCE",
            ErrorCode::PoorlyConnectedElement => "POORLY_CONNECTED_ELEMENT",
            ErrorCode::UnknownElement => "UNKNOWN_ELEMENT",
            ErrorCode::BadBusId => "BAD_BUS_ID",
            ErrorCode::BadBranchId => "BAD_BRANCH_ID",
            ErrorCode::BadLoadId => "BAD_LOAD_ID",
            ErrorCode::BadSourceId => "BAD_SOURCE_ID",
            ErrorCode::LoadFlowNotRun => "LOAD_FLOW_NOT_RUN",
            ErrorCode::BadLoadFlowResult => "BAD_LOAD_FLOW_RESULT",
            ErrorCode::NoLoadFlowConvergence => "NO_LOAD_FLOW_CONVERGENCE",
            ErrorCode::JsonLineParametersDuplicates => "JSON_LINE_PARAMETERS_DUPLICATES",
            ErrorCode::JsonTransformerParametersDuplicates => {
                "JSON_TRANSFORMER_PARAMETERS_DUPLICATES"
            }
            ErrorCode::BadJsonFormat => "BAD_JSON_FORMAT",
            ErrorCode::Io => "IO",
            ErrorCode::Parse => "PARSE",
            ErrorCode::Other => "OTHER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl SpnetError {
    /// Stable code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SpnetError::BadLengthValue(_) => ErrorCode::BadLengthValue,
            SpnetError::BadMaxLoadingValue(_) => ErrorCode::BadMaxLoadingValue,
            SpnetError::BadVoltages(_) => ErrorCode::BadVoltages,
            SpnetError::BadZLineShape(_) => ErrorCode::BadZLineShape,
            SpnetError::BadYShuntShape(_) => ErrorCode::BadYShuntShape,
            SpnetError::BadLineModel(_) => ErrorCode::BadLineModel,
            SpnetError::BadTransformerParameters(_) => ErrorCode::BadTransformerParameters,
            SpnetError::BadZValue(_) => ErrorCode::BadZValue,
            SpnetError::BadSValue(_) => ErrorCode::BadSValue,
            SpnetError::BadLoadType(_) => ErrorCode::BadLoadType,
            SpnetError::BadFlexibleParameterValue(_) => ErrorCode::BadFlexibleParameterValue,
            SpnetError::BadControlValue(_) => ErrorCode::BadControlValue,
            SpnetError::BadBranchType(_) => ErrorCode::BadBranchType,
            SpnetError::DisconnectedElement(_) => ErrorCode::DisconnectedElement,
            SpnetError::SwitchesLoop(_) => ErrorCode::SwitchesLoop,
            SpnetError::BadVoltageSourcesConnection(_) => ErrorCode::BadVoltageSourcesConnection,
            SpnetError::BadElementObject(_) => ErrorCode::BadElementObject,
            SpnetError::SeveralNetworks(_) => ErrorCode::SeveralNetworks,
            SpnetError::EmptyNetwork(_) => ErrorCode::EmptyNetwork,
            SpnetError::NoVoltageSource(_) => ErrorCode::NoVoltageSource,
            SpnetError::PoorlyConnectedElement(_) => ErrorCode::PoorlyConnectedElement,
            SpnetError::UnknownElement(_) => ErrorCode::UnknownElement,
            SpnetError::BadBusId(_) => ErrorCode::BadBusId,
            SpnetError::BadBranchId(_) => ErrorCode::BadBranchId,
            SpnetError::BadLoadId(_) => ErrorCode::BadLoadId,
            SpnetError::BadSourceId(_) => ErrorCode::BadSourceId,
            SpnetError::LoadFlowNotRun(_) => ErrorCode::LoadFlowNotRun,
            SpnetError::BadLoadFlowResult(_) => ErrorCode::BadLoadFlowResult,
            SpnetError::NoLoadFlowConvergence(_) => ErrorCode::NoLoadFlowConvergence,
            SpnetError::JsonLineParametersDuplicates(_) => ErrorCode::JsonLineParametersDuplicates,
            SpnetError::JsonTransformerParametersDuplicates(_) => {
                ErrorCode::JsonTransformerParametersDuplicates
            }
            SpnetError::BadJsonFormat(_) => ErrorCode::BadJsonFormat,
            SpnetError::Io(_) => ErrorCode::Io,
            SpnetError::Parse(_) => ErrorCode::Parse,
            SpnetError::Other(_) => ErrorCode::Other,
        }
    }
}

/// Logs `msg` at error level and wraps it into the given variant.
///
/// Raise sites use this so the message shows up in the logs even when the
/// caller discards the error.
pub(crate) fn raise<T>(variant: fn(String) -> SpnetError, msg: String) -> SpnetResult<T> {
    tracing::error!("{msg}");
    Err(variant(msg))
}

impl From<anyhow::Error> for SpnetError {
    fn from(err: anyhow::Error) -> Self {
        SpnetError::Other(err.to_string())
    }
}

impl From<String> for SpnetError {
    fn from(s: String) -> Self {
        SpnetError::Other(s)
    }
}

impl From<&str> for SpnetError {
    fn from(s: &str) -> Self {
        SpnetError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for SpnetError {
    fn from(err: serde_json::Error) -> Self {
        SpnetError::Parse(err.to_string())
    }
}
