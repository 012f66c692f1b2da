use num_complex::Complex64;
use tracing::warn;

use crate::error::{raise, SpnetError, SpnetResult};

/// A node of the network carrying a phase-to-ground potential.
///
/// Voltage limits are expressed as fractions of the nominal (phase-to-phase)
/// voltage. Limits without a nominal voltage are accepted but ignored by the
/// violation check.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bus {
    pub id: String,
    /// Initial potential, set by the user or by potential propagation
    potential: Option<Complex64>,
    potential_by_user: bool,
    nominal_voltage: Option<f64>,
    min_voltage_level: Option<f64>,
    max_voltage_level: Option<f64>,
}

impl Bus {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_potential(mut self, potential: Complex64) -> Self {
        self.set_potential(potential);
        self
    }

    pub fn with_nominal_voltage(mut self, nominal_voltage: f64) -> Self {
        self.nominal_voltage = Some(nominal_voltage);
        self
    }

    pub fn with_voltage_levels(
        mut self,
        min_voltage_level: Option<f64>,
        max_voltage_level: Option<f64>,
    ) -> SpnetResult<Self> {
        self.set_voltage_levels(min_voltage_level, max_voltage_level)?;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Initial potential, if the bus has been initialized.
    pub fn potential(&self) -> Option<Complex64> {
        self.potential
    }

    pub fn is_initialized(&self) -> bool {
        self.potential.is_some()
    }

    /// True when the initial potential was given by the user rather than propagated.
    pub fn is_initialized_by_user(&self) -> bool {
        self.potential_by_user
    }

    pub fn nominal_voltage(&self) -> Option<f64> {
        self.nominal_voltage
    }

    pub fn min_voltage_level(&self) -> Option<f64> {
        self.min_voltage_level
    }

    pub fn max_voltage_level(&self) -> Option<f64> {
        self.max_voltage_level
    }

    /// Absolute minimum voltage (V), when both the level and the nominal voltage are known.
    pub fn min_voltage(&self) -> Option<f64> {
        Some(self.min_voltage_level? * self.nominal_voltage?)
    }

    /// Absolute maximum voltage (V), when both the level and the nominal voltage are known.
    pub fn max_voltage(&self) -> Option<f64> {
        Some(self.max_voltage_level? * self.nominal_voltage?)
    }

    pub fn has_limits(&self) -> bool {
        self.min_voltage_level.is_some() || self.max_voltage_level.is_some()
    }

    /// Checks a (phase-to-phase) voltage against the limits.
    ///
    /// `None` when no limit is defined or when the nominal voltage is missing.
    pub fn voltage_violated(&self, voltage: Complex64) -> Option<bool> {
        if !self.has_limits() {
            return None;
        }
        let nominal = self.nominal_voltage?;
        let level = voltage.norm() / nominal;
        let under = self.min_voltage_level.is_some_and(|min| level < min);
        let over = self.max_voltage_level.is_some_and(|max| level > max);
        Some(under || over)
    }

    pub(crate) fn set_potential(&mut self, potential: Complex64) {
        self.potential = Some(potential);
        self.potential_by_user = true;
    }

    /// Initialization by potential propagation.
    pub(crate) fn initialize(&mut self, potential: Complex64) {
        self.potential = Some(potential);
    }

    pub(crate) fn set_nominal_voltage(&mut self, nominal_voltage: Option<f64>) {
        self.nominal_voltage = nominal_voltage;
        self.warn_useless_levels();
    }

    /// Copies the nominal voltage and the levels of `other`, without checks.
    pub(crate) fn copy_limits(&mut self, other: &Bus) {
        self.nominal_voltage = other.nominal_voltage;
        self.min_voltage_level = other.min_voltage_level;
        self.max_voltage_level = other.max_voltage_level;
    }

    pub(crate) fn set_voltage_levels(
        &mut self,
        min_voltage_level: Option<f64>,
        max_voltage_level: Option<f64>,
    ) -> SpnetResult<()> {
        if let (Some(min), Some(max)) = (min_voltage_level, max_voltage_level) {
            if min > max {
                return raise(
                    SpnetError::BadVoltages,
                    format!(
                        "Cannot set min voltage level of bus '{}' to {min} as it is higher than \
                         its max voltage level ({max}).",
                        self.id
                    ),
                );
            }
        }
        self.min_voltage_level = min_voltage_level;
        self.max_voltage_level = max_voltage_level;
        self.warn_useless_levels();
        Ok(())
    }

    fn warn_useless_levels(&self) {
        if self.has_limits() && self.nominal_voltage.is_none() {
            warn!(
                "The voltage levels of bus '{}' are useless without a nominal voltage. Please \
                 define a nominal voltage for this bus.",
                self.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_bus_defaults_are_uninitialized() {
        let bus = Bus::new("bus");
        assert_eq!(bus.id(), "bus");
        assert!(!bus.is_initialized());
        assert!(!bus.is_initialized_by_user());
        assert!(bus.min_voltage().is_none());
        assert_eq!(bus.voltage_violated(Complex64::new(400.0, 0.0)), None);
    }

    #[test]
    fn test_propagated_potential_is_not_user_defined() {
        let mut bus = Bus::new("bus");
        bus.initialize(Complex64::new(230.0, 0.0));
        assert!(bus.is_initialized());
        assert!(!bus.is_initialized_by_user());
        bus.set_potential(Complex64::new(231.0, 0.0));
        assert!(bus.is_initialized_by_user());
    }

    #[test]
    fn test_bus_voltage_levels_must_be_ordered() {
        let err = Bus::new("bus")
            .with_voltage_levels(Some(1.05), Some(0.95))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadVoltages);
        assert!(err.to_string().contains("bus 'bus'"));
    }

    #[test]
    fn test_bus_absolute_limits_need_nominal_voltage() {
        let bus = Bus::new("bus")
            .with_voltage_levels(Some(0.9), Some(1.1))
            .unwrap();
        assert!(bus.min_voltage().is_none());
        assert_eq!(bus.voltage_violated(Complex64::new(1e6, 0.0)), None);

        let bus = bus.with_nominal_voltage(400.0);
        assert!((bus.min_voltage().unwrap() - 360.0).abs() < 1e-9);
        assert!((bus.max_voltage().unwrap() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_bus_voltage_violation() {
        let bus = Bus::new("bus")
            .with_nominal_voltage(400.0)
            .with_voltage_levels(Some(0.9), None)
            .unwrap();
        assert_eq!(bus.voltage_violated(Complex64::new(400.0, 0.0)), Some(false));
        assert_eq!(bus.voltage_violated(Complex64::new(350.0, 0.0)), Some(true));
        // No upper bound
        assert_eq!(bus.voltage_violated(Complex64::new(900.0, 0.0)), Some(false));
    }
}
