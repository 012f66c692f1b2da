//! Shared electrical parameters of lines and transformers.
//!
//! Parameters are immutable value objects held behind an `Arc` so that many
//! branches, possibly in different networks, can share them. Changing the
//! parameters of a set of branches goes through
//! [`Grid::replace_line_parameters`](crate::Grid::replace_line_parameters) and
//! [`Grid::replace_transformer_parameters`](crate::Grid::replace_transformer_parameters),
//! which invalidate every affected network.

use num_complex::Complex64;

use crate::error::{raise, SpnetError, SpnetResult};

/// Per-kilometre parameters of a line, single-phase-equivalent (1×1) model.
#[derive(Debug, Clone, PartialEq)]
pub struct LineParameters {
    id: String,
    /// Series impedance (Ω/km)
    z_line: Complex64,
    /// Shunt admittance (S/km), `None` for a line without shunt components
    y_shunt: Option<Complex64>,
    /// Maximum current (A)
    ampacity: Option<f64>,
    line_type: Option<String>,
    material: Option<String>,
    /// Conductor cross-section (mm²)
    section: Option<f64>,
}

impl LineParameters {
    /// A zero shunt admittance is stored as "no shunt".
    pub fn new(id: impl Into<String>, z_line: Complex64, y_shunt: Option<Complex64>) -> Self {
        Self {
            id: id.into(),
            z_line,
            y_shunt: y_shunt.filter(|y| *y != Complex64::new(0.0, 0.0)),
            ampacity: None,
            line_type: None,
            material: None,
            section: None,
        }
    }

    /// Builds parameters from impedance/admittance matrices, which must be 1×1.
    pub fn from_matrices(
        id: impl Into<String>,
        z_line: &[Vec<Complex64>],
        y_shunt: Option<&[Vec<Complex64>]>,
    ) -> SpnetResult<Self> {
        let id = id.into();
        let Some(z) = scalar_of(z_line) else {
            return raise(
                SpnetError::BadZLineShape,
                format!(
                    "Incorrect z_line dimensions for line parameters '{id}': {} instead of (1, 1)",
                    shape_of(z_line)
                ),
            );
        };
        let y = match y_shunt {
            Some(matrix) => match scalar_of(matrix) {
                Some(y) => Some(y),
                None => {
                    return raise(
                        SpnetError::BadYShuntShape,
                        format!(
                            "Incorrect y_shunt dimensions for line parameters '{id}': {} instead \
                             of (1, 1)",
                            shape_of(matrix)
                        ),
                    )
                }
            },
            None => None,
        };
        Ok(Self::new(id, z, y))
    }

    pub fn with_ampacity(mut self, ampacity: f64) -> Self {
        self.ampacity = Some(ampacity);
        self
    }

    pub fn with_line_type(mut self, line_type: impl Into<String>) -> Self {
        self.line_type = Some(line_type.into());
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn with_section(mut self, section: f64) -> Self {
        self.section = Some(section);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn z_line(&self) -> Complex64 {
        self.z_line
    }

    pub fn y_shunt(&self) -> Option<Complex64> {
        self.y_shunt
    }

    pub fn with_shunt(&self) -> bool {
        self.y_shunt.is_some()
    }

    pub fn ampacity(&self) -> Option<f64> {
        self.ampacity
    }

    pub fn line_type(&self) -> Option<&str> {
        self.line_type.as_deref()
    }

    pub fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }

    pub fn section(&self) -> Option<f64> {
        self.section
    }
}

fn scalar_of(matrix: &[Vec<Complex64>]) -> Option<Complex64> {
    match matrix {
        [row] if row.len() == 1 => Some(row[0]),
        _ => None,
    }
}

fn shape_of(matrix: &[Vec<Complex64>]) -> String {
    let cols = matrix.first().map_or(0, Vec::len);
    format!("({}, {cols})", matrix.len())
}

/// Two-port parameters of a transformer, referred to the secondary side.
///
/// `z2` is the series short-circuit impedance seen from the secondary, `ym`
/// the magnetizing admittance at the primary and `k` the no-load ratio
/// `ulv / uhv`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformerParameters {
    id: String,
    z2: Complex64,
    ym: Complex64,
    k: Complex64,
    /// Nominal power (VA)
    sn: f64,
    /// Primary phase-to-phase voltage (V)
    uhv: f64,
    /// Secondary phase-to-phase voltage (V)
    ulv: f64,
}

impl TransformerParameters {
    pub fn new(
        id: impl Into<String>,
        uhv: f64,
        ulv: f64,
        sn: f64,
        z2: Complex64,
        ym: Complex64,
    ) -> SpnetResult<Self> {
        let id = id.into();
        check_ratings(&id, uhv, ulv, sn)?;
        Ok(Self {
            id,
            z2,
            ym,
            k: Complex64::new(ulv / uhv, 0.0),
            sn,
            uhv,
            ulv,
        })
    }

    /// Derives `z2` and `ym` from the open-circuit (`p0`, `i0`) and
    /// short-circuit (`psc`, `vsc`) test results.
    ///
    /// `i0` and `vsc` are per-unit values, `p0` and `psc` are in W.
    #[allow(clippy::too_many_arguments)]
    pub fn from_open_and_short_circuit_tests(
        id: impl Into<String>,
        uhv: f64,
        ulv: f64,
        sn: f64,
        p0: f64,
        i0: f64,
        psc: f64,
        vsc: f64,
    ) -> SpnetResult<Self> {
        let id = id.into();
        check_ratings(&id, uhv, ulv, sn)?;
        if !(0.0..=1.0).contains(&i0) || !(vsc > 0.0 && vsc <= 1.0) || p0 < 0.0 || psc < 0.0 {
            return raise(
                SpnetError::BadTransformerParameters,
                format!(
                    "Invalid test results for transformer parameters '{id}': i0={i0}, vsc={vsc}, \
                     p0={p0} W, psc={psc} W."
                ),
            );
        }

        // Short-circuit test, referred to the secondary side
        let r2 = psc * ulv * ulv / (sn * sn);
        let zsc = vsc * ulv * ulv / sn;
        if r2 > zsc {
            return raise(
                SpnetError::BadTransformerParameters,
                format!(
                    "The short-circuit losses of transformer parameters '{id}' ({psc} W) are too \
                     high for the short-circuit voltage ({vsc})."
                ),
            );
        }
        let x2 = (zsc * zsc - r2 * r2).sqrt();

        // Open-circuit test, at the primary side
        let g = p0 / (uhv * uhv);
        let ym_abs = i0 * sn / (uhv * uhv);
        if g > ym_abs {
            return raise(
                SpnetError::BadTransformerParameters,
                format!(
                    "The no-load losses of transformer parameters '{id}' ({p0} W) are too high \
                     for the no-load current ({i0})."
                ),
            );
        }
        let b = (ym_abs * ym_abs - g * g).sqrt();

        Self::new(id, uhv, ulv, sn, Complex64::new(r2, x2), Complex64::new(g, -b))
    }

    /// Overrides the no-load ratio, for phase-shifting units.
    pub fn with_ratio(mut self, k: Complex64) -> SpnetResult<Self> {
        if k.norm() == 0.0 {
            return raise(
                SpnetError::BadTransformerParameters,
                format!("The ratio of transformer parameters '{}' cannot be zero.", self.id),
            );
        }
        self.k = k;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn z2(&self) -> Complex64 {
        self.z2
    }

    pub fn ym(&self) -> Complex64 {
        self.ym
    }

    pub fn k(&self) -> Complex64 {
        self.k
    }

    pub fn sn(&self) -> f64 {
        self.sn
    }

    pub fn uhv(&self) -> f64 {
        self.uhv
    }

    pub fn ulv(&self) -> f64 {
        self.ulv
    }
}

fn check_ratings(id: &str, uhv: f64, ulv: f64, sn: f64) -> SpnetResult<()> {
    if sn <= 0.0 {
        return raise(
            SpnetError::BadTransformerParameters,
            format!("The nominal power of transformer parameters '{id}' must be positive: {sn} VA was provided."),
        );
    }
    if uhv <= 0.0 || ulv <= 0.0 {
        return raise(
            SpnetError::BadTransformerParameters,
            format!(
                "The voltages of transformer parameters '{id}' must be positive: uhv={uhv} V, \
                 ulv={ulv} V were provided."
            ),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_zero_shunt_means_no_shunt() {
        let lp = LineParameters::new("lp", c(0.1, 0.1), Some(c(0.0, 0.0)));
        assert!(!lp.with_shunt());
        let lp = LineParameters::new("lp", c(0.1, 0.1), Some(c(0.0, 1e-6)));
        assert!(lp.with_shunt());
    }

    #[test]
    fn test_line_parameters_shapes() {
        let z = vec![vec![c(0.1, 0.1)]];
        let lp = LineParameters::from_matrices("lp", &z, None).unwrap();
        assert_eq!(lp.z_line(), c(0.1, 0.1));

        let bad_z = vec![vec![c(0.1, 0.1), c(0.0, 0.0)]];
        let err = LineParameters::from_matrices("lp", &bad_z, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadZLineShape);
        assert!(err.to_string().contains("(1, 2)"));

        let bad_y = vec![vec![c(0.0, 1e-6)], vec![c(0.0, 1e-6)]];
        let err = LineParameters::from_matrices("lp", &z, Some(&bad_y)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadYShuntShape);
    }

    #[test]
    fn test_transformer_ratings_are_checked() {
        let err = TransformerParameters::new("tp", 20e3, 400.0, 0.0, c(0.02, 0.0), c(1e-7, 0.0))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadTransformerParameters);

        let tp =
            TransformerParameters::new("tp", 20e3, 400.0, 630e3, c(0.02, 0.0), c(1e-7, 0.0)).unwrap();
        assert_eq!(tp.k(), c(0.02, 0.0));
    }

    #[test]
    fn test_transformer_from_tests() {
        // 160 kVA, 20 kV / 400 V
        let tp = TransformerParameters::from_open_and_short_circuit_tests(
            "160kVA", 20e3, 400.0, 160e3, 460.0, 0.023, 2350.0, 0.04,
        )
        .unwrap();
        let r2 = 2350.0 * 400.0 * 400.0 / (160e3 * 160e3);
        assert!((tp.z2().re - r2).abs() < 1e-12);
        let zsc = 0.04 * 400.0 * 400.0 / 160e3;
        assert!((tp.z2().norm() - zsc).abs() < 1e-12);
        assert!((tp.ym().norm() - 0.023 * 160e3 / (20e3 * 20e3)).abs() < 1e-15);
        assert!(tp.ym().im < 0.0);

        let err = TransformerParameters::from_open_and_short_circuit_tests(
            "bad", 20e3, 400.0, 160e3, 460.0, 0.023, 2350.0, 0.001,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadTransformerParameters);
    }
}
