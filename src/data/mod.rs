//! Data preparation.
//!
//! - time window selection from a start time (`window`)
//! - kinetic traces and spectra at one wavelength or delay (`slice`)
//! - synthetic TA data generation (`simulate`)

pub mod simulate;
pub mod slice;
pub mod window;

pub use simulate::*;
pub use slice::*;
pub use window::*;
