//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the measured data set (`TaData`)
//! - component selection (`ComponentSet`, `RetainedSvd`)
//! - fit parameters with typed keys (`ParamKey`, `FitParameterSet`)
//! - user configuration (`InitialValues`, `TargetModelText`, `FitOptions`)
//! - fit outputs (`FitDiagnostics`, `FitFile`)

pub mod types;

pub use types::*;
