use num_complex::Complex64;

use crate::formulas::SQRT_3;

/// Fixes the voltage of the bus it is attached to.
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageSource {
    id: String,
    /// Phase-to-phase voltage (V)
    voltage: Complex64,
}

impl VoltageSource {
    pub fn new(id: impl Into<String>, voltage: Complex64) -> Self {
        Self {
            id: id.into(),
            voltage,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn voltage(&self) -> Complex64 {
        self.voltage
    }

    /// Phase-to-ground potential imposed at the bus.
    pub fn potential(&self) -> Complex64 {
        self.voltage / SQRT_3
    }

    pub(crate) fn set_voltage(&mut self, voltage: Complex64) {
        self.voltage = voltage;
    }
}
