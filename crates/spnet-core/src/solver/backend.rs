use anyhow::{anyhow, Result};
use faer::{prelude::*, solvers::PartialPivLu, Mat};
use num_complex::Complex64;

/// Trait for solving dense complex linear systems (Ax = b).
///
/// The load flow engine calls this once per fixed-point iteration with the
/// admittance matrix of the unknown buses.
pub trait LinearBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Solve the linear system Ax = b
    fn solve(&self, matrix: &[Vec<Complex64>], rhs: &[Complex64]) -> Result<Vec<Complex64>>;
}

fn check_dimensions(matrix: &[Vec<Complex64>], rhs: &[Complex64]) -> Result<()> {
    let n = matrix.len();
    if rhs.len() != n {
        return Err(anyhow!(
            "rhs length ({}) does not match matrix dimension {}",
            rhs.len(),
            n
        ));
    }
    if matrix.iter().any(|row| row.len() != n) {
        return Err(anyhow!("matrix must be square"));
    }
    Ok(())
}

/// Gauss-Jordan elimination with partial pivoting.
#[derive(Debug, Clone, Default)]
pub struct GaussBackend;

impl LinearBackend for GaussBackend {
    fn name(&self) -> &'static str {
        "gauss"
    }

    fn solve(&self, matrix: &[Vec<Complex64>], rhs: &[Complex64]) -> Result<Vec<Complex64>> {
        let n = matrix.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        check_dimensions(matrix, rhs)?;

        let mut a = matrix.to_vec();
        let mut b = rhs.to_vec();

        for i in 0..n {
            let mut pivot = i;
            for row in i + 1..n {
                if a[row][i].norm() > a[pivot][i].norm() {
                    pivot = row;
                }
            }
            if pivot != i {
                a.swap(i, pivot);
                b.swap(i, pivot);
            }

            let diag = a[i][i];
            if diag.norm() < 1e-12 {
                return Err(anyhow!("singular matrix"));
            }

            for value in a[i][i..].iter_mut() {
                *value /= diag;
            }
            b[i] /= diag;

            let pivot_segment = a[i][i..].to_vec();
            for row in 0..n {
                if row == i {
                    continue;
                }
                let factor = a[row][i];
                if factor == Complex64::new(0.0, 0.0) {
                    continue;
                }
                for (target, &pivot) in a[row][i..].iter_mut().zip(pivot_segment.iter()) {
                    *target -= factor * pivot;
                }
                let bi = b[i];
                b[row] -= factor * bi;
            }
        }

        Ok(b)
    }
}

/// `faer` partial-pivot LU on the real form `[[Re, -Im], [Im, Re]]` of the system.
#[derive(Debug, Clone, Default)]
pub struct FaerBackend;

impl LinearBackend for FaerBackend {
    fn name(&self) -> &'static str {
        "faer"
    }

    fn solve(&self, matrix: &[Vec<Complex64>], rhs: &[Complex64]) -> Result<Vec<Complex64>> {
        let n = matrix.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        check_dimensions(matrix, rhs)?;

        let mat = Mat::from_fn(2 * n, 2 * n, |i, j| {
            let value = matrix[i % n][j % n];
            match (i < n, j < n) {
                (true, true) | (false, false) => value.re,
                (true, false) => -value.im,
                (false, true) => value.im,
            }
        });
        let rhs_mat = Mat::from_fn(2 * n, 1, |i, _| if i < n { rhs[i].re } else { rhs[i - n].im });
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        let mut solution = Vec::with_capacity(n);
        for i in 0..n {
            let value = Complex64::new(sol.read(i, 0), sol.read(i + n, 0));
            if !value.is_finite() {
                return Err(anyhow!("singular matrix"));
            }
            solution.push(value);
        }
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_backends_agree_on_complex_system() {
        let matrix = vec![
            vec![c(4.0, 1.0), c(-1.0, 0.5), c(0.0, 0.0)],
            vec![c(-1.0, 0.5), c(3.0, -2.0), c(-1.0, 0.0)],
            vec![c(0.0, 0.0), c(-1.0, 0.0), c(2.0, 1.0)],
        ];
        let expected = vec![c(1.0, -1.0), c(0.5, 2.0), c(-3.0, 0.25)];
        let rhs: Vec<Complex64> = matrix
            .iter()
            .map(|row| row.iter().zip(&expected).map(|(a, x)| a * x).sum())
            .collect();

        for backend in [&GaussBackend as &dyn LinearBackend, &FaerBackend] {
            let solution = backend.solve(&matrix, &rhs).unwrap();
            for (got, want) in solution.iter().zip(&expected) {
                assert!((got - want).norm() < 1e-10, "{}: {got} != {want}", backend.name());
            }
        }
    }

    #[test]
    fn test_gauss_rejects_singular_matrix() {
        let matrix = vec![vec![c(1.0, 1.0), c(2.0, 2.0)], vec![c(1.0, 1.0), c(2.0, 2.0)]];
        let rhs = vec![c(1.0, 0.0), c(1.0, 0.0)];
        assert!(GaussBackend.solve(&matrix, &rhs).is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let matrix = vec![vec![c(1.0, 0.0)]];
        assert!(FaerBackend.solve(&matrix, &[]).is_err());
        assert!(GaussBackend.solve(&[], &[]).unwrap().is_empty());
    }
}
