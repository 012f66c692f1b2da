//! Serde model of the JSON network document, version 2.
//!
//! Complex numbers are `[re, im]` pairs. Line parameter matrices are split in
//! a real and an imaginary part, `[[[re]], [[im]]]`, and must be 1×1.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use spnet_core::{FlexibleParameter, LoadType};

/// Current version of the document.
pub const NETWORK_JSON_VERSION: u32 = 2;

/// `[real part, imaginary part]` of a complex matrix
pub type ComplexMatrix = [Vec<Vec<f64>>; 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDocument {
    pub version: u32,
    pub is_multiphase: bool,
    #[serde(default)]
    pub buses: Vec<BusData>,
    #[serde(default)]
    pub lines: Vec<LineData>,
    #[serde(default)]
    pub transformers: Vec<TransformerData>,
    #[serde(default)]
    pub switches: Vec<SwitchData>,
    #[serde(default)]
    pub loads: Vec<LoadData>,
    #[serde(default)]
    pub sources: Vec<SourceData>,
    #[serde(default)]
    pub lines_params: Vec<LineParametersData>,
    #[serde(default)]
    pub transformers_params: Vec<TransformerParametersData>,
}

// ============================================================================
// Elements
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusData {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential: Option<Complex64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_voltage_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_voltage_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BusResultsData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineData {
    pub id: String,
    pub bus1: String,
    pub bus2: String,
    /// km
    pub length: f64,
    pub params_id: String,
    #[serde(default = "default_max_loading")]
    pub max_loading: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BranchResultsData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerData {
    pub id: String,
    pub bus1: String,
    pub bus2: String,
    pub params_id: String,
    #[serde(default = "default_tap")]
    pub tap: f64,
    #[serde(default = "default_max_loading")]
    pub max_loading: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BranchResultsData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchData {
    pub id: String,
    pub bus1: String,
    pub bus2: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BranchResultsData>,
}

/// A load; exactly one of `power`, `current` and `impedance` matches `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadData {
    pub id: String,
    pub bus: String,
    #[serde(rename = "type")]
    pub load_type: LoadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<Complex64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Complex64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impedance: Option<Complex64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flexible_param: Option<FlexibleParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<LeafResultsData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceData {
    pub id: String,
    pub bus: String,
    /// Phase-to-phase voltage (V)
    pub voltage: Complex64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<LeafResultsData>,
}

// ============================================================================
// Shared parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineParametersData {
    pub id: String,
    pub z_line: ComplexMatrix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_shunt: Option<ComplexMatrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ampacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerParametersData {
    pub id: String,
    pub z2: Complex64,
    pub ym: Complex64,
    pub k: Complex64,
    pub sn: f64,
    pub uhv: f64,
    pub ulv: f64,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusResultsData {
    pub potential: Complex64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchResultsData {
    pub current1: Complex64,
    pub current2: Complex64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeafResultsData {
    pub current: Complex64,
    pub potential: Complex64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flexible_power: Option<Complex64>,
}

fn default_max_loading() -> f64 {
    1.0
}

fn default_tap() -> f64 {
    1.0
}

/// Splits a scalar into the 1×1 real and imaginary matrices of the document.
pub fn to_matrix(value: Complex64) -> ComplexMatrix {
    [vec![vec![value.re]], vec![vec![value.im]]]
}

/// Joins the real and imaginary parts, `None` when their shapes differ.
pub fn from_matrix(matrix: &ComplexMatrix) -> Option<Vec<Vec<Complex64>>> {
    let [re, im] = matrix;
    if re.len() != im.len() {
        return None;
    }
    re.iter()
        .zip(im)
        .map(|(re_row, im_row)| {
            (re_row.len() == im_row.len()).then(|| {
                re_row
                    .iter()
                    .zip(im_row)
                    .map(|(&re, &im)| Complex64::new(re, im))
                    .collect()
            })
        })
        .collect()
}
