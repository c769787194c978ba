//! Input/output helpers.
//!
//! - TA data file ingest + validation (`ingest`)
//! - JSON configuration files (`config`)
//! - matrix, DAS and fit result exports (`export`)

pub mod config;
pub mod export;
pub mod ingest;

pub use config::*;
pub use export::*;
pub use ingest::*;
