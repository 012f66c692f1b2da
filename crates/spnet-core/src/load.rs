use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{raise, SpnetError, SpnetResult};
use crate::flexible::FlexibleParameter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    Power,
    Current,
    Impedance,
}

impl LoadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadType::Power => "power",
            LoadType::Current => "current",
            LoadType::Impedance => "impedance",
        }
    }
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Electrical model of a load, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadKind {
    /// Constant power (VA), optionally voltage-controlled
    Power {
        power: Complex64,
        flexible: Option<FlexibleParameter>,
    },
    /// Constant single-phase-equivalent current (A)
    Current { current: Complex64 },
    /// Constant per-phase impedance (Ω)
    Impedance { impedance: Complex64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    id: String,
    kind: LoadKind,
}

impl Load {
    pub fn power(id: impl Into<String>, power: Complex64) -> Self {
        Self {
            id: id.into(),
            kind: LoadKind::Power {
                power,
                flexible: None,
            },
        }
    }

    /// A power load whose realized power follows `flexible`.
    pub fn flexible(
        id: impl Into<String>,
        power: Complex64,
        flexible: FlexibleParameter,
    ) -> SpnetResult<Self> {
        let id = id.into();
        flexible.check_power(&id, power)?;
        Ok(Self {
            id,
            kind: LoadKind::Power {
                power,
                flexible: Some(flexible),
            },
        })
    }

    pub fn current(id: impl Into<String>, current: Complex64) -> Self {
        Self {
            id: id.into(),
            kind: LoadKind::Current { current },
        }
    }

    pub fn impedance(id: impl Into<String>, impedance: Complex64) -> SpnetResult<Self> {
        let id = id.into();
        check_impedance(&id, impedance)?;
        Ok(Self {
            id,
            kind: LoadKind::Impedance { impedance },
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &LoadKind {
        &self.kind
    }

    pub fn load_type(&self) -> LoadType {
        match self.kind {
            LoadKind::Power { .. } => LoadType::Power,
            LoadKind::Current { .. } => LoadType::Current,
            LoadKind::Impedance { .. } => LoadType::Impedance,
        }
    }

    /// The value defining the load: power, current or impedance depending on the type.
    pub fn value(&self) -> Complex64 {
        match self.kind {
            LoadKind::Power { power, .. } => power,
            LoadKind::Current { current } => current,
            LoadKind::Impedance { impedance } => impedance,
        }
    }

    pub fn flexible_parameter(&self) -> Option<&FlexibleParameter> {
        match &self.kind {
            LoadKind::Power { flexible, .. } => flexible.as_ref(),
            _ => None,
        }
    }

    pub fn is_flexible(&self) -> bool {
        self.flexible_parameter().is_some()
    }

    pub(crate) fn set_power(&mut self, value: Complex64) -> SpnetResult<()> {
        self.expect_type(LoadType::Power)?;
        if let Some(fp) = self.flexible_parameter() {
            fp.check_power(&self.id, value)?;
        }
        if let LoadKind::Power { power, .. } = &mut self.kind {
            *power = value;
        }
        Ok(())
    }

    pub(crate) fn set_current(&mut self, value: Complex64) -> SpnetResult<()> {
        self.expect_type(LoadType::Current)?;
        self.kind = LoadKind::Current { current: value };
        Ok(())
    }

    pub(crate) fn set_impedance(&mut self, value: Complex64) -> SpnetResult<()> {
        self.expect_type(LoadType::Impedance)?;
        check_impedance(&self.id, value)?;
        self.kind = LoadKind::Impedance { impedance: value };
        Ok(())
    }

    pub(crate) fn set_flexible_parameter(
        &mut self,
        value: Option<FlexibleParameter>,
    ) -> SpnetResult<()> {
        self.expect_type(LoadType::Power)?;
        if let Some(fp) = &value {
            fp.check_power(&self.id, self.value())?;
        }
        if let LoadKind::Power { flexible, .. } = &mut self.kind {
            *flexible = value;
        }
        Ok(())
    }

    fn expect_type(&self, expected: LoadType) -> SpnetResult<()> {
        if self.load_type() == expected {
            return Ok(());
        }
        raise(
            SpnetError::BadLoadType,
            format!(
                "The load '{}' is a {} load and has no {expected} to set.",
                self.id,
                self.load_type()
            ),
        )
    }
}

/// Impedances this close to zero are treated as null.
const NULL_IMPEDANCE: f64 = 1e-8;

fn check_impedance(id: &str, impedance: Complex64) -> SpnetResult<()> {
    if impedance.norm() <= NULL_IMPEDANCE {
        return raise(
            SpnetError::BadZValue,
            format!("An impedance of the load '{id}' is null"),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_impedance_cannot_be_zero() {
        let err = Load::impedance("z", Complex64::new(0.0, 0.0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadZValue);
        assert_eq!(err.to_string(), "An impedance of the load 'z' is null");

        let err = Load::impedance("z", Complex64::new(1e-12, 0.0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadZValue);
        assert!(Load::impedance("z", Complex64::new(0.0, 1e-6)).is_ok());
    }

    #[test]
    fn test_setters_follow_the_load_type() {
        let mut load = Load::current("i", Complex64::new(1.0, 0.0));
        assert_eq!(load.load_type(), LoadType::Current);
        load.set_current(Complex64::new(2.0, 0.0)).unwrap();
        assert_eq!(load.value(), Complex64::new(2.0, 0.0));

        let err = load.set_power(Complex64::new(100.0, 0.0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadLoadType);
    }

    #[test]
    fn test_flexible_power_is_checked_on_set() {
        let fp = FlexibleParameter::p_max_u_production(240.0, 250.0, 1000.0).unwrap();
        let mut load = Load::flexible("pv", Complex64::new(-500.0, 0.0), fp).unwrap();
        assert!(load.is_flexible());

        let err = load.set_power(Complex64::new(-1500.0, 0.0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadSValue);
        assert_eq!(load.value(), Complex64::new(-500.0, 0.0));

        load.set_flexible_parameter(None).unwrap();
        load.set_power(Complex64::new(1500.0, 0.0)).unwrap();
        assert!(!load.is_flexible());
    }
}
