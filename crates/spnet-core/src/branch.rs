//! Two-terminal elements: lines, transformers and switches.
//!
//! A [`Branch`] is a closed set of variants. The buses it joins are not part
//! of the value: they are fixed when the branch is added to a
//! [`Grid`](crate::Grid) and never change afterwards.

use std::sync::Arc;

use num_complex::Complex64;
use tracing::warn;

use crate::element::ElementKind;
use crate::error::{raise, SpnetError, SpnetResult};
use crate::parameters::{LineParameters, TransformerParameters};

/// Taps outside this range are accepted with a warning.
pub const TAP_RANGE: (f64, f64) = (0.9, 1.1);

fn check_max_loading(value: f64) -> SpnetResult<f64> {
    if value.is_nan() || value <= 0.0 {
        return raise(
            SpnetError::BadMaxLoadingValue,
            format!("Maximum loading must be positive: {value} was provided."),
        );
    }
    Ok(value)
}

// ============================================================================
// Line
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    id: String,
    parameters: Arc<LineParameters>,
    /// Length (km)
    length: f64,
    max_loading: f64,
}

impl Line {
    pub fn new(
        id: impl Into<String>,
        parameters: Arc<LineParameters>,
        length: f64,
    ) -> SpnetResult<Self> {
        Ok(Self {
            id: id.into(),
            parameters,
            length: check_length(length)?,
            max_loading: 1.0,
        })
    }

    pub fn with_max_loading(mut self, max_loading: f64) -> SpnetResult<Self> {
        self.max_loading = check_max_loading(max_loading)?;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parameters(&self) -> &Arc<LineParameters> {
        &self.parameters
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn max_loading(&self) -> f64 {
        self.max_loading
    }

    /// Total series impedance (Ω).
    pub fn z_line(&self) -> Complex64 {
        self.parameters.z_line() * self.length
    }

    /// Total shunt admittance (S), if the line has shunt components.
    pub fn y_shunt(&self) -> Option<Complex64> {
        self.parameters.y_shunt().map(|y| y * self.length)
    }

    pub fn with_shunt(&self) -> bool {
        self.parameters.with_shunt()
    }

    /// Ampacity of the parameters (A).
    pub fn max_current(&self) -> Option<f64> {
        self.parameters.ampacity()
    }

    pub(crate) fn set_length(&mut self, length: f64) -> SpnetResult<()> {
        self.length = check_length(length)?;
        Ok(())
    }

    pub(crate) fn set_max_loading(&mut self, max_loading: f64) -> SpnetResult<()> {
        self.max_loading = check_max_loading(max_loading)?;
        Ok(())
    }

    /// Swaps the parameters; the shunt model of a line is fixed at construction.
    pub(crate) fn set_parameters(&mut self, parameters: Arc<LineParameters>) -> SpnetResult<()> {
        match (self.with_shunt(), parameters.with_shunt()) {
            (false, true) => raise(
                SpnetError::BadLineModel,
                "Cannot set line parameters with a shunt to a line that does not have shunt \
                 components."
                    .to_string(),
            ),
            (true, false) => raise(
                SpnetError::BadLineModel,
                "Cannot set line parameters without a shunt to a line that has shunt components."
                    .to_string(),
            ),
            _ => {
                self.parameters = parameters;
                Ok(())
            }
        }
    }
}

fn check_length(length: f64) -> SpnetResult<f64> {
    if length.is_nan() || length <= 0.0 {
        return raise(
            SpnetError::BadLengthValue,
            format!("A line length must be greater than 0. {length:.2} km provided."),
        );
    }
    Ok(length)
}

// ============================================================================
// Transformer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Transformer {
    id: String,
    parameters: Arc<TransformerParameters>,
    tap: f64,
    max_loading: f64,
}

impl Transformer {
    pub fn new(id: impl Into<String>, parameters: Arc<TransformerParameters>) -> Self {
        Self {
            id: id.into(),
            parameters,
            tap: 1.0,
            max_loading: 1.0,
        }
    }

    pub fn with_tap(mut self, tap: f64) -> Self {
        self.set_tap(tap);
        self
    }

    pub fn with_max_loading(mut self, max_loading: f64) -> SpnetResult<Self> {
        self.max_loading = check_max_loading(max_loading)?;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parameters(&self) -> &Arc<TransformerParameters> {
        &self.parameters
    }

    pub fn tap(&self) -> f64 {
        self.tap
    }

    pub fn max_loading(&self) -> f64 {
        self.max_loading
    }

    /// Maximum admissible power (VA).
    pub fn max_power(&self) -> f64 {
        self.parameters.sn() * self.max_loading
    }

    /// Effective voltage ratio `k * tap`.
    pub fn ratio(&self) -> Complex64 {
        self.parameters.k() * self.tap
    }

    pub(crate) fn set_tap(&mut self, tap: f64) {
        if tap > TAP_RANGE.1 {
            warn!("The provided tap {tap:.2} is higher than 1.1. A good value is between 0.9 and 1.1.");
        } else if tap < TAP_RANGE.0 {
            warn!("The provided tap {tap:.2} is lower than 0.9. A good value is between 0.9 and 1.1.");
        }
        self.tap = tap;
    }

    pub(crate) fn set_max_loading(&mut self, max_loading: f64) -> SpnetResult<()> {
        self.max_loading = check_max_loading(max_loading)?;
        Ok(())
    }

    pub(crate) fn set_parameters(&mut self, parameters: Arc<TransformerParameters>) {
        self.parameters = parameters;
    }
}

// ============================================================================
// Switch
// ============================================================================

/// An ideal switch: both buses share the same potential.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    id: String,
}

impl Switch {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Branch
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    Line(Line),
    Transformer(Transformer),
    Switch(Switch),
}

impl Branch {
    pub fn id(&self) -> &str {
        match self {
            Branch::Line(line) => line.id(),
            Branch::Transformer(transformer) => transformer.id(),
            Branch::Switch(switch) => switch.id(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Branch::Line(_) => ElementKind::Line,
            Branch::Transformer(_) => ElementKind::Transformer,
            Branch::Switch(_) => ElementKind::Switch,
        }
    }

    pub fn as_line(&self) -> Option<&Line> {
        match self {
            Branch::Line(line) => Some(line),
            _ => None,
        }
    }

    pub fn as_transformer(&self) -> Option<&Transformer> {
        match self {
            Branch::Transformer(transformer) => Some(transformer),
            _ => None,
        }
    }

    pub(crate) fn as_line_mut(&mut self) -> Option<&mut Line> {
        match self {
            Branch::Line(line) => Some(line),
            _ => None,
        }
    }

    pub(crate) fn as_transformer_mut(&mut self) -> Option<&mut Transformer> {
        match self {
            Branch::Transformer(transformer) => Some(transformer),
            _ => None,
        }
    }

    /// Id of the shared parameters, if the branch has any.
    pub fn parameters_id(&self) -> Option<&str> {
        match self {
            Branch::Line(line) => Some(line.parameters().id()),
            Branch::Transformer(transformer) => Some(transformer.parameters().id()),
            Branch::Switch(_) => None,
        }
    }
}

impl From<Line> for Branch {
    fn from(line: Line) -> Self {
        Branch::Line(line)
    }
}

impl From<Transformer> for Branch {
    fn from(transformer: Transformer) -> Self {
        Branch::Transformer(transformer)
    }
}

impl From<Switch> for Branch {
    fn from(switch: Switch) -> Self {
        Branch::Switch(switch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn params(shunt: bool) -> Arc<LineParameters> {
        let y = shunt.then(|| Complex64::new(0.0, 1e-4));
        Arc::new(LineParameters::new("lp", Complex64::new(0.1, 0.1), y).with_ampacity(200.0))
    }

    #[test]
    fn test_line_length_must_be_positive() {
        let err = Line::new("line", params(false), 0.0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadLengthValue);
        assert_eq!(
            err.to_string(),
            "A line length must be greater than 0. 0.00 km provided."
        );
        let err = Line::new("line", params(false), f64::NAN).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadLengthValue);
    }

    #[test]
    fn test_line_scales_with_length() {
        let line = Line::new("line", params(true), 2.0).unwrap();
        assert_eq!(line.z_line(), Complex64::new(0.2, 0.2));
        assert_eq!(line.y_shunt(), Some(Complex64::new(0.0, 2e-4)));
        assert_eq!(line.max_current(), Some(200.0));
    }

    #[test]
    fn test_line_shunt_model_is_fixed() {
        let mut line = Line::new("line", params(false), 1.0).unwrap();
        let err = line.set_parameters(params(true)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadLineModel);

        let mut line = Line::new("line", params(true), 1.0).unwrap();
        let err = line.set_parameters(params(false)).unwrap_err();
        assert!(err.to_string().contains("without a shunt"));
    }

    #[test]
    fn test_max_loading_must_be_positive() {
        let err = Line::new("line", params(false), 1.0)
            .unwrap()
            .with_max_loading(-0.5)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadMaxLoadingValue);
        let err = Line::new("line", params(false), 1.0)
            .unwrap()
            .with_max_loading(f64::NAN)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadMaxLoadingValue);
    }

    #[test]
    fn test_transformer_ratio_and_max_power() {
        let tp = TransformerParameters::new(
            "tp",
            20e3,
            400.0,
            630e3,
            Complex64::new(0.02, 0.0),
            Complex64::new(1e-7, 0.0),
        )
        .unwrap();
        let tr = Transformer::new("tr", Arc::new(tp))
            .with_tap(1.05)
            .with_max_loading(0.5)
            .unwrap();
        assert!((tr.ratio().re - 0.021).abs() < 1e-12);
        assert_eq!(tr.max_power(), 315e3);

        let branch = Branch::from(tr);
        assert_eq!(branch.kind(), ElementKind::Transformer);
        assert_eq!(branch.parameters_id(), Some("tp"));
        assert!(branch.as_line().is_none());
    }
}
