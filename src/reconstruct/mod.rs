//! From fitted parameters back to spectra and matrices.
//!
//! - decay-associated spectra from left singular vectors (`das`)
//! - full and what-if matrix reconstruction (`matrix`)

pub mod das;
pub mod matrix;

pub use das::*;
pub use matrix::*;
