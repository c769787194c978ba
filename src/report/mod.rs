//! Reporting utilities: matrix statistics and formatted terminal output.

pub mod format;

pub use format::*;

use nalgebra::DMatrix;

/// Summary statistics of a matrix (typically a difference matrix).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixStats {
    pub rms: f64,
    pub max_abs: f64,
}

pub fn matrix_stats(m: &DMatrix<f64>) -> MatrixStats {
    if m.is_empty() {
        return MatrixStats { rms: 0.0, max_abs: 0.0 };
    }
    MatrixStats {
        rms: (m.norm_squared() / m.len() as f64).sqrt(),
        max_abs: m.amax(),
    }
}

/// Fraction of the total squared singular values carried by each value.
pub fn explained_variance(singular_values: &[f64]) -> Vec<f64> {
    let total: f64 = singular_values.iter().map(|s| s * s).sum();
    if total <= 0.0 {
        return vec![0.0; singular_values.len()];
    }
    singular_values.iter().map(|s| s * s / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_small_matrix() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, 1.0, -3.0]);
        let s = matrix_stats(&m);
        assert!((s.rms - 3.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(s.max_abs, 3.0);
    }

    #[test]
    fn explained_variance_sums_to_one() {
        let v = explained_variance(&[3.0, 4.0]);
        assert!((v[0] - 0.36).abs() < 1e-12);
        assert!((v[1] - 0.64).abs() < 1e-12);
        assert_eq!(explained_variance(&[0.0]), vec![0.0]);
    }
}
