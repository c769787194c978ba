//! Mathematical utilities: decay primitives, SVD component selection and
//! linear least squares.

pub mod decay;
pub mod ols;
pub mod svd;

pub use decay::*;
pub use ols::*;
pub use svd::*;
