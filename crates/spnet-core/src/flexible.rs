//! Voltage-dependent control of flexible power loads.
//!
//! A [`FlexibleParameter`] bundles an active-power control, a reactive-power
//! control and a projection onto the feasible disk of radius `s_max`. All
//! voltages here are phase-to-phase magnitudes and all powers are totals of
//! the single-phase-equivalent load.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{raise, SpnetError, SpnetResult};

pub const DEFAULT_ALPHA: f64 = 1000.0;
pub const DEFAULT_EPSILON: f64 = 1e-8;

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    Constant,
    PMaxUProduction,
    PMaxUConsumption,
    QU,
}

impl ControlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Constant => "constant",
            ControlType::PMaxUProduction => "p_max_u_production",
            ControlType::PMaxUConsumption => "p_max_u_consumption",
            ControlType::QU => "q_u",
        }
    }
}

/// One control law. Unused voltage thresholds are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    #[serde(rename = "type")]
    pub kind: ControlType,
    #[serde(default)]
    pub u_min: f64,
    #[serde(default)]
    pub u_down: f64,
    #[serde(default)]
    pub u_up: f64,
    #[serde(default)]
    pub u_max: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Control {
    pub fn new(
        kind: ControlType,
        u_min: f64,
        u_down: f64,
        u_up: f64,
        u_max: f64,
        alpha: f64,
        epsilon: f64,
    ) -> SpnetResult<Self> {
        Self {
            kind,
            u_min,
            u_down,
            u_up,
            u_max,
            alpha,
            epsilon,
        }
        .validated()
    }

    pub fn constant() -> Self {
        Self {
            kind: ControlType::Constant,
            u_min: 0.0,
            u_down: 0.0,
            u_up: 0.0,
            u_max: 0.0,
            alpha: DEFAULT_ALPHA,
            epsilon: DEFAULT_EPSILON,
        }
    }

    pub fn p_max_u_production(u_up: f64, u_max: f64) -> SpnetResult<Self> {
        Self::new(
            ControlType::PMaxUProduction,
            0.0,
            0.0,
            u_up,
            u_max,
            DEFAULT_ALPHA,
            DEFAULT_EPSILON,
        )
    }

    pub fn p_max_u_consumption(u_min: f64, u_down: f64) -> SpnetResult<Self> {
        Self::new(
            ControlType::PMaxUConsumption,
            u_min,
            u_down,
            0.0,
            0.0,
            DEFAULT_ALPHA,
            DEFAULT_EPSILON,
        )
    }

    pub fn q_u(u_min: f64, u_down: f64, u_up: f64, u_max: f64) -> SpnetResult<Self> {
        Self::new(
            ControlType::QU,
            u_min,
            u_down,
            u_up,
            u_max,
            DEFAULT_ALPHA,
            DEFAULT_EPSILON,
        )
    }

    pub fn is_constant(&self) -> bool {
        self.kind == ControlType::Constant
    }

    /// Re-checks the thresholds, for values built field by field or deserialized.
    pub fn validated(self) -> SpnetResult<Self> {
        if self.alpha <= 0.0 || self.epsilon <= 0.0 {
            return raise(
                SpnetError::BadControlValue,
                format!(
                    "The alpha ({}) and epsilon ({}) of a {} control must be positive.",
                    self.alpha,
                    self.epsilon,
                    self.kind.as_str()
                ),
            );
        }
        let ordered = |values: &[f64]| {
            values[0] > 0.0 && values.windows(2).all(|pair| pair[0] < pair[1])
        };
        let ok = match self.kind {
            ControlType::Constant => true,
            ControlType::PMaxUProduction => ordered(&[self.u_up, self.u_max]),
            ControlType::PMaxUConsumption => ordered(&[self.u_min, self.u_down]),
            ControlType::QU => ordered(&[self.u_min, self.u_down, self.u_up, self.u_max]),
        };
        if !ok {
            return raise(
                SpnetError::BadControlValue,
                format!(
                    "Inconsistent voltages for a {} control: u_min={}, u_down={}, u_up={}, \
                     u_max={}. They must be positive and increasing.",
                    self.kind.as_str(),
                    self.u_min,
                    self.u_down,
                    self.u_up,
                    self.u_max
                ),
            );
        }
        Ok(self)
    }

    /// Fraction of the maximum production still allowed at `voltage`.
    fn production_factor(&self, voltage: f64) -> f64 {
        if voltage <= self.u_up {
            1.0
        } else if voltage >= self.u_max {
            0.0
        } else {
            (self.u_max - voltage) / (self.u_max - self.u_up)
        }
    }

    /// Fraction of the maximum consumption still allowed at `voltage`.
    fn consumption_factor(&self, voltage: f64) -> f64 {
        if voltage <= self.u_min {
            0.0
        } else if voltage >= self.u_down {
            1.0
        } else {
            (voltage - self.u_min) / (self.u_down - self.u_min)
        }
    }

    fn reactive_power(&self, voltage: f64, q_min: f64, q_max: f64) -> f64 {
        if voltage <= self.u_min {
            q_min
        } else if voltage < self.u_down {
            q_min * (self.u_down - voltage) / (self.u_down - self.u_min)
        } else if voltage <= self.u_up {
            0.0
        } else if voltage < self.u_max {
            q_max * (voltage - self.u_up) / (self.u_max - self.u_up)
        } else {
            q_max
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionType {
    Euclidean,
    KeepP,
    KeepQ,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    #[serde(rename = "type")]
    pub kind: ProjectionType,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Projection {
    pub fn new(kind: ProjectionType) -> Self {
        Self {
            kind,
            alpha: DEFAULT_ALPHA,
            epsilon: DEFAULT_EPSILON,
        }
    }

    /// Brings `power` back inside the disk of radius `s_max`.
    fn project(&self, power: Complex64, s_max: f64) -> Complex64 {
        if power.norm() <= s_max {
            return power;
        }
        match self.kind {
            ProjectionType::Euclidean => power * (s_max / power.norm()),
            ProjectionType::KeepP => {
                let p = power.re.clamp(-s_max, s_max);
                let q = (s_max * s_max - p * p).max(0.0).sqrt();
                Complex64::new(p, q.copysign(power.im))
            }
            ProjectionType::KeepQ => {
                let q = power.im.clamp(-s_max, s_max);
                let p = (s_max * s_max - q * q).max(0.0).sqrt();
                Complex64::new(p.copysign(power.re), q)
            }
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new(ProjectionType::Euclidean)
    }
}

/// Flexibility of a power load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexibleParameter {
    pub control_p: Control,
    pub control_q: Control,
    pub projection: Projection,
    /// Apparent power limit (VA)
    pub s_max: f64,
    /// Reactive power bounds (VAr), defaulting to `∓s_max`
    #[serde(default)]
    q_min: Option<f64>,
    #[serde(default)]
    q_max: Option<f64>,
}

impl FlexibleParameter {
    pub fn new(
        control_p: Control,
        control_q: Control,
        projection: Projection,
        s_max: f64,
        q_min: Option<f64>,
        q_max: Option<f64>,
    ) -> SpnetResult<Self> {
        Self {
            control_p,
            control_q,
            projection,
            s_max,
            q_min,
            q_max,
        }
        .validated()
    }

    /// No control at all, behaves like a constant power load.
    pub fn constant() -> Self {
        Self {
            control_p: Control::constant(),
            control_q: Control::constant(),
            projection: Projection::default(),
            s_max: 1.0,
            q_min: None,
            q_max: None,
        }
    }

    pub fn p_max_u_production(u_up: f64, u_max: f64, s_max: f64) -> SpnetResult<Self> {
        Self::new(
            Control::p_max_u_production(u_up, u_max)?,
            Control::constant(),
            Projection::default(),
            s_max,
            None,
            None,
        )
    }

    pub fn p_max_u_consumption(u_min: f64, u_down: f64, s_max: f64) -> SpnetResult<Self> {
        Self::new(
            Control::p_max_u_consumption(u_min, u_down)?,
            Control::constant(),
            Projection::default(),
            s_max,
            None,
            None,
        )
    }

    pub fn q_u(
        u_min: f64,
        u_down: f64,
        u_up: f64,
        u_max: f64,
        s_max: f64,
        q_min: Option<f64>,
        q_max: Option<f64>,
    ) -> SpnetResult<Self> {
        Self::new(
            Control::constant(),
            Control::q_u(u_min, u_down, u_up, u_max)?,
            Projection::default(),
            s_max,
            q_min,
            q_max,
        )
    }

    /// Production `P(U)` and `Q(U)` controls together.
    #[allow(clippy::too_many_arguments)]
    pub fn pq_u_production(
        up_up: f64,
        up_max: f64,
        uq_min: f64,
        uq_down: f64,
        uq_up: f64,
        uq_max: f64,
        s_max: f64,
        q_min: Option<f64>,
        q_max: Option<f64>,
    ) -> SpnetResult<Self> {
        Self::new(
            Control::p_max_u_production(up_up, up_max)?,
            Control::q_u(uq_min, uq_down, uq_up, uq_max)?,
            Projection::default(),
            s_max,
            q_min,
            q_max,
        )
    }

    /// Consumption `P(U)` and `Q(U)` controls together.
    #[allow(clippy::too_many_arguments)]
    pub fn pq_u_consumption(
        up_min: f64,
        up_down: f64,
        uq_min: f64,
        uq_down: f64,
        uq_up: f64,
        uq_max: f64,
        s_max: f64,
        q_min: Option<f64>,
        q_max: Option<f64>,
    ) -> SpnetResult<Self> {
        Self::new(
            Control::p_max_u_consumption(up_min, up_down)?,
            Control::q_u(uq_min, uq_down, uq_up, uq_max)?,
            Projection::default(),
            s_max,
            q_min,
            q_max,
        )
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn q_min(&self) -> f64 {
        self.q_min.unwrap_or(-self.s_max)
    }

    pub fn q_max(&self) -> f64 {
        self.q_max.unwrap_or(self.s_max)
    }

    /// True when at least one of the controls reacts to the voltage.
    pub fn is_controlled(&self) -> bool {
        !self.control_p.is_constant() || !self.control_q.is_constant()
    }

    pub fn validated(self) -> SpnetResult<Self> {
        if self.s_max <= 0.0 {
            return raise(
                SpnetError::BadFlexibleParameterValue,
                format!("'s_max' must be greater than 0 but {} VA was provided.", self.s_max),
            );
        }
        if matches!(self.control_p.kind, ControlType::QU) {
            return raise(
                SpnetError::BadControlValue,
                "The active power control cannot be of type 'q_u'.".to_string(),
            );
        }
        if matches!(
            self.control_q.kind,
            ControlType::PMaxUProduction | ControlType::PMaxUConsumption
        ) {
            return raise(
                SpnetError::BadControlValue,
                format!(
                    "The reactive power control cannot be of type '{}'.",
                    self.control_q.kind.as_str()
                ),
            );
        }
        let (q_min, q_max) = (self.q_min(), self.q_max());
        if q_min < -self.s_max {
            return raise(
                SpnetError::BadFlexibleParameterValue,
                format!(
                    "q_min must be greater than -s_max ({} VA) but {q_min} VAr was provided.",
                    -self.s_max
                ),
            );
        }
        if q_max > self.s_max {
            return raise(
                SpnetError::BadFlexibleParameterValue,
                format!(
                    "q_max must be lower than s_max ({} VA) but {q_max} VAr was provided.",
                    self.s_max
                ),
            );
        }
        if q_min > q_max {
            return raise(
                SpnetError::BadFlexibleParameterValue,
                format!("q_min must be lower than q_max ({q_max} VAr) but {q_min} VAr was provided."),
            );
        }
        Ok(Self {
            control_p: self.control_p.validated()?,
            control_q: self.control_q.validated()?,
            ..self
        })
    }

    /// Checks a commanded power against the envelope, for controlled loads only.
    pub(crate) fn check_power(&self, load_id: &str, power: Complex64) -> SpnetResult<()> {
        if !self.is_controlled() {
            return Ok(());
        }
        if power.norm() > self.s_max {
            return raise(
                SpnetError::BadSValue,
                format!("The power is greater than the parameter s_max for flexible load '{load_id}'"),
            );
        }
        if power.im < self.q_min() {
            return raise(
                SpnetError::BadSValue,
                format!(
                    "The reactive power is lower than the parameter q_min for flexible load \
                     '{load_id}'"
                ),
            );
        }
        if power.im > self.q_max() {
            return raise(
                SpnetError::BadSValue,
                format!(
                    "The reactive power is greater than the parameter q_max for flexible load \
                     '{load_id}'"
                ),
            );
        }
        if self.control_p.kind == ControlType::PMaxUProduction && power.re > 0.0 {
            return raise(
                SpnetError::BadSValue,
                format!(
                    "There is a production control but a positive power for flexible load \
                     '{load_id}'"
                ),
            );
        }
        if self.control_p.kind == ControlType::PMaxUConsumption && power.re < 0.0 {
            return raise(
                SpnetError::BadSValue,
                format!(
                    "There is a consumption control but a negative power for flexible load \
                     '{load_id}'"
                ),
            );
        }
        Ok(())
    }

    /// Power actually drawn at the phase-to-phase voltage magnitude `voltage`
    /// for the commanded `power`.
    pub fn compute_power(&self, voltage: f64, power: Complex64) -> Complex64 {
        if !self.is_controlled() {
            return power;
        }
        let p = match self.control_p.kind {
            ControlType::PMaxUProduction => {
                power.re.max(-self.s_max * self.control_p.production_factor(voltage))
            }
            ControlType::PMaxUConsumption => {
                power.re.min(self.s_max * self.control_p.consumption_factor(voltage))
            }
            _ => power.re,
        };
        let q = match self.control_q.kind {
            ControlType::QU => self
                .control_q
                .reactive_power(voltage, self.q_min(), self.q_max()),
            _ => power.im,
        }
        .clamp(self.q_min(), self.q_max());
        self.projection.project(Complex64::new(p, q), self.s_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_control_voltages_must_increase() {
        let err = Control::q_u(210.0, 220.0, 215.0, 240.0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadControlValue);
        assert!(Control::p_max_u_production(240.0, 250.0).is_ok());
        assert!(Control::p_max_u_production(250.0, 240.0).is_err());
    }

    #[test]
    fn test_reactive_bounds_default_to_s_max() {
        let fp = FlexibleParameter::q_u(210.0, 220.0, 240.0, 250.0, 5000.0, None, None).unwrap();
        assert_eq!(fp.q_min(), -5000.0);
        assert_eq!(fp.q_max(), 5000.0);

        let err = FlexibleParameter::q_u(210.0, 220.0, 240.0, 250.0, 5000.0, Some(-6000.0), None)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadFlexibleParameterValue);

        let err =
            FlexibleParameter::q_u(210.0, 220.0, 240.0, 250.0, 5000.0, Some(100.0), Some(-100.0))
                .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadFlexibleParameterValue);

        let err = FlexibleParameter::p_max_u_production(240.0, 250.0, 0.0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadFlexibleParameterValue);
    }

    #[test]
    fn test_power_envelope() {
        let fp = FlexibleParameter::p_max_u_production(240.0, 250.0, 1000.0).unwrap();
        assert!(fp.check_power("fl", Complex64::new(-500.0, 0.0)).is_ok());

        let err = fp.check_power("fl", Complex64::new(-2000.0, 0.0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadSValue);
        let err = fp.check_power("fl", Complex64::new(500.0, 0.0)).unwrap_err();
        assert!(err.to_string().contains("production control"));

        let fp = FlexibleParameter::p_max_u_consumption(210.0, 220.0, 1000.0).unwrap();
        let err = fp.check_power("fl", Complex64::new(-500.0, 0.0)).unwrap_err();
        assert!(err.to_string().contains("consumption control"));

        // Constant parameters accept anything
        let fp = FlexibleParameter::constant();
        assert!(fp.check_power("fl", Complex64::new(1e6, 0.0)).is_ok());
    }

    #[test]
    fn test_production_curtailment() {
        let fp = FlexibleParameter::p_max_u_production(240.0, 250.0, 1000.0).unwrap();
        let s = Complex64::new(-800.0, 0.0);
        assert_eq!(fp.compute_power(230.0, s), s);
        let curtailed = fp.compute_power(245.0, s);
        assert!((curtailed.re + 500.0).abs() < 1e-9);
        assert!(fp.compute_power(260.0, s).re.abs() < 1e-12);
    }

    #[test]
    fn test_consumption_shedding() {
        let fp = FlexibleParameter::p_max_u_consumption(210.0, 220.0, 1000.0).unwrap();
        let s = Complex64::new(800.0, 0.0);
        assert_eq!(fp.compute_power(230.0, s), s);
        assert!((fp.compute_power(215.0, s).re - 500.0).abs() < 1e-9);
        assert!(fp.compute_power(200.0, s).re.abs() < 1e-12);
    }

    #[test]
    fn test_q_u_curve() {
        let fp =
            FlexibleParameter::q_u(210.0, 220.0, 240.0, 250.0, 1000.0, Some(-400.0), Some(600.0))
                .unwrap();
        let s = Complex64::new(100.0, 0.0);
        assert_eq!(fp.compute_power(200.0, s).im, -400.0);
        assert!((fp.compute_power(215.0, s).im + 200.0).abs() < 1e-9);
        assert_eq!(fp.compute_power(230.0, s).im, 0.0);
        assert!((fp.compute_power(245.0, s).im - 300.0).abs() < 1e-9);
        assert_eq!(fp.compute_power(260.0, s).im, 600.0);
    }

    #[test]
    fn test_projections_stay_on_disk() {
        let s = Complex64::new(900.0, 0.0);
        let fp = FlexibleParameter::q_u(210.0, 220.0, 240.0, 250.0, 1000.0, None, None).unwrap();
        let out = fp.compute_power(260.0, s);
        assert!((out.norm() - 1000.0).abs() < 1e-9);

        let keep_p = fp.clone().with_projection(Projection::new(ProjectionType::KeepP));
        let out = keep_p.compute_power(260.0, s);
        assert_eq!(out.re, 900.0);
        assert!((out.norm() - 1000.0).abs() < 1e-9);

        let keep_q = fp.with_projection(Projection::new(ProjectionType::KeepQ));
        let out = keep_q.compute_power(260.0, s);
        assert_eq!(out.im, 1000.0);
        assert!(out.re.abs() < 1e-9);
    }

    #[test]
    fn test_flexible_parameter_json_shape() {
        let fp = FlexibleParameter::p_max_u_production(240.0, 250.0, 1000.0).unwrap();
        let value = serde_json::to_value(&fp).unwrap();
        assert_eq!(value["control_p"]["type"], "p_max_u_production");
        assert_eq!(value["projection"]["type"], "euclidean");

        let back: FlexibleParameter = serde_json::from_value(value).unwrap();
        assert_eq!(back.validated().unwrap(), fp);
    }
}
