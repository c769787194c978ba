//! Linear least squares solver.
//!
//! Two places need a small dense least-squares solve:
//!
//! ```text
//! minimize ‖y - X β‖²
//! ```
//!
//! - the linear amplitude warm start (`X` = decay basis, β = amplitudes)
//! - each Gauss–Newton step (`X` = Jacobian, β = parameter update)
//!
//! Implementation choices:
//! - We use SVD to solve the problem robustly even when the design matrix is
//!   tall (more rows than columns).
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Exponential bases with similar decay constants are nearly collinear, so we
//!   retry with progressively looser singular-value cutoffs.

use nalgebra::{DMatrix, DVector};

/// SVD least-squares solve of `x β ≈ y`.
///
/// `None` when no cutoff yields a finite solution.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-12, 1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}
