//! Derived quantities of the single-phase-equivalent model.
//!
//! Potentials are phase-to-ground and branch currents are per phase, so every
//! branch power carries a factor 3 and every exposed voltage a factor √3.
//! Leaf currents (loads and sources) are single-phase-equivalent currents:
//! their powers need no extra factor.
//!
//! All currents are oriented from the bus into the element.

use num_complex::Complex64;

pub const SQRT_3: f64 = 1.732_050_807_568_877_2;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Phase-to-phase voltage of a phase-to-ground potential.
pub fn voltage(potential: Complex64) -> Complex64 {
    potential * SQRT_3
}

/// Three-phase power flowing into a branch side.
pub fn branch_power(potential: Complex64, current: Complex64) -> Complex64 {
    potential * current.conj() * 3.0
}

pub fn branch_powers(
    potentials: (Complex64, Complex64),
    currents: (Complex64, Complex64),
) -> (Complex64, Complex64) {
    (
        branch_power(potentials.0, currents.0),
        branch_power(potentials.1, currents.1),
    )
}

/// Power of a load or a source; the current is already single-phase-equivalent.
pub fn leaf_power(potential: Complex64, current: Complex64) -> Complex64 {
    potential * current.conj()
}

// ============================================================================
// Lines
// ============================================================================

pub fn line_series_current(z_line: Complex64, v1: Complex64, v2: Complex64) -> Complex64 {
    (v1 - v2) / z_line
}

pub fn line_series_power_losses(z_line: Complex64, v1: Complex64, v2: Complex64) -> Complex64 {
    let du = v1 - v2;
    du * line_series_current(z_line, v1, v2).conj() * 3.0
}

/// Half of the shunt admittance on each side; zero without shunt.
pub fn line_shunt_currents(
    y_shunt: Option<Complex64>,
    v1: Complex64,
    v2: Complex64,
) -> (Complex64, Complex64) {
    match y_shunt {
        Some(y) => (y * v1 / 2.0, y * v2 / 2.0),
        None => (ZERO, ZERO),
    }
}

pub fn line_shunt_power_losses(y_shunt: Option<Complex64>, v1: Complex64, v2: Complex64) -> Complex64 {
    let (i1, i2) = line_shunt_currents(y_shunt, v1, v2);
    (v1 * i1.conj() + v2 * i2.conj()) * 3.0
}

/// Side currents of a line (π model).
pub fn line_currents(
    z_line: Complex64,
    y_shunt: Option<Complex64>,
    v1: Complex64,
    v2: Complex64,
) -> (Complex64, Complex64) {
    let series = line_series_current(z_line, v1, v2);
    let (shunt1, shunt2) = line_shunt_currents(y_shunt, v1, v2);
    (series + shunt1, shunt2 - series)
}

/// `max(|I1|, |I2|) / (ampacity * max_loading)`, if the ampacity is known.
pub fn line_loading(
    currents: (Complex64, Complex64),
    ampacity: Option<f64>,
    max_loading: f64,
) -> Option<f64> {
    let ampacity = ampacity?;
    Some(currents.0.norm().max(currents.1.norm()) / (ampacity * max_loading))
}

// ============================================================================
// Transformers
// ============================================================================

/// Side currents of a transformer with series impedance `z2` on the
/// secondary, magnetizing admittance `ym` on the primary and ratio `n`.
pub fn transformer_currents(
    z2: Complex64,
    ym: Complex64,
    n: Complex64,
    v1: Complex64,
    v2: Complex64,
) -> (Complex64, Complex64) {
    let i2 = (v2 - n * v1) / z2;
    let i1 = ym * v1 - n.conj() * i2;
    (i1, i2)
}

/// Two-port admittance matrix `[[y11, y12], [y21, y22]]` of a transformer.
pub fn transformer_admittance(z2: Complex64, ym: Complex64, n: Complex64) -> [[Complex64; 2]; 2] {
    let y2 = z2.inv();
    [
        [ym + y2 * n.norm_sqr(), -n.conj() * y2],
        [-n * y2, y2],
    ]
}

/// `max(|S1|, |S2|) / (sn * max_loading)`.
pub fn transformer_loading(powers: (Complex64, Complex64), sn: f64, max_loading: f64) -> f64 {
    powers.0.norm().max(powers.1.norm()) / (sn * max_loading)
}
