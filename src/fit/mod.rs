//! Global fit orchestration.
//!
//! Responsibilities:
//!
//! - seed the parameters from user initial values (or defaults)
//! - build residuals and an exact Jacobian for the shared-τ problem
//! - run Levenberg–Marquardt or damped Gauss–Newton

pub mod fitter;
pub(crate) mod gauss_newton;
pub mod seed;

pub use fitter::*;
pub use seed::*;
