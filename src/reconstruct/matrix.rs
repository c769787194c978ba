//! Matrix reconstruction from DAS and decay constants.
//!
//! ```text
//! M[λ, t] = Σ_idx DAS[λ, idx] · exp(-t / τ[idx])
//! ```
//!
//! Reconstruction only depends on its explicit arguments, so it serves both
//! the authoritative fit-result matrix and "drop component X / change its
//! decay time" what-ifs. Every decay term and every product is checked; the
//! first non-finite value aborts with the decay constants that were used.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::domain::FitParameterSet;
use crate::error::{AnalysisError, ConfigurationError, DataError, NumericError};
use crate::math::{DecayFault, decay_trace};

fn reconstruction_error(decay_constants: &[f64], detail: String) -> AnalysisError {
    NumericError::Reconstruction {
        decay_constants: decay_constants.to_vec(),
        detail,
    }
    .into()
}

/// Reconstruct a `wavelengths × time delays` matrix.
///
/// `das` columns, `decay_constants` and `selected` must have the same length;
/// `selected` holds DAS column indices.
pub fn reconstruct(
    das: &DMatrix<f64>,
    decay_constants: &[f64],
    time_delays: &[f64],
    selected: &[usize],
) -> Result<DMatrix<f64>, AnalysisError> {
    let n = das.ncols();
    if decay_constants.len() != n || selected.len() != n {
        return Err(ConfigurationError::Invalid(format!(
            "reconstruction needs matching cardinalities: {n} DAS columns, {} decay constants, {} selected indices",
            decay_constants.len(),
            selected.len()
        ))
        .into());
    }
    for (pos, &idx) in selected.iter().enumerate() {
        if idx >= n {
            return Err(ConfigurationError::Invalid(format!(
                "selected DAS index {idx} out of range for {n} columns"
            ))
            .into());
        }
        if selected[..pos].contains(&idx) {
            return Err(ConfigurationError::Invalid(format!(
                "DAS index {idx} selected more than once"
            ))
            .into());
        }
    }
    if das.nrows() == 0 || time_delays.is_empty() {
        return Err(DataError::EmptyMatrix.into());
    }

    let traces = selected
        .iter()
        .map(|&idx| {
            decay_trace(time_delays, decay_constants[idx]).map_err(|fault| {
                let detail = match fault {
                    DecayFault::ZeroTau => format!("division by zero: decay constant of DAS {idx} is zero"),
                    DecayFault::NonFinite => {
                        format!("non-finite decay term for DAS {idx} (τ = {})", decay_constants[idx])
                    }
                };
                reconstruction_error(decay_constants, detail)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rows: Vec<Vec<f64>> = (0..das.nrows())
        .into_par_iter()
        .map(|w| {
            let mut row = vec![0.0; time_delays.len()];
            for (&idx, trace) in selected.iter().zip(&traces) {
                let amplitude = das[(w, idx)];
                for (acc, &g) in row.iter_mut().zip(trace) {
                    *acc += amplitude * g;
                }
            }
            row
        })
        .collect();

    if let Some(w) = rows.iter().position(|row| row.iter().any(|v| !v.is_finite())) {
        return Err(reconstruction_error(
            decay_constants,
            format!("non-finite value in wavelength row {w}"),
        ));
    }

    Ok(DMatrix::from_fn(das.nrows(), time_delays.len(), |w, t| rows[w][t]))
}

/// Reconstruct from a subset of the fitted components.
///
/// `das` and `decay_constants` cover every fitted component; `keep` lists the
/// DAS columns to use.
pub fn reconstruct_subset(
    das: &DMatrix<f64>,
    decay_constants: &[f64],
    time_delays: &[f64],
    keep: &[usize],
) -> Result<DMatrix<f64>, AnalysisError> {
    if decay_constants.len() != das.ncols() {
        return Err(ConfigurationError::LengthMismatch {
            what: "decay constants".to_string(),
            expected: das.ncols(),
            actual: decay_constants.len(),
        }
        .into());
    }
    if let Some(&bad) = keep.iter().find(|&&k| k >= das.ncols()) {
        return Err(ConfigurationError::Invalid(format!(
            "kept DAS index {bad} out of range for {} columns",
            das.ncols()
        ))
        .into());
    }

    let sub_das = das.select_columns(keep.iter());
    let sub_taus: Vec<f64> = keep.iter().map(|&k| decay_constants[k]).collect();
    let selected: Vec<usize> = (0..keep.len()).collect();
    reconstruct(&sub_das, &sub_taus, time_delays, &selected)
}

/// `original - reconstructed`.
pub fn difference(
    original: &DMatrix<f64>,
    reconstructed: &DMatrix<f64>,
) -> Result<DMatrix<f64>, DataError> {
    if original.shape() != reconstructed.shape() {
        return Err(DataError::ShapeMismatch {
            left_rows: original.nrows(),
            left_cols: original.ncols(),
            right_rows: reconstructed.nrows(),
            right_cols: reconstructed.ncols(),
        });
    }
    Ok(original - reconstructed)
}

/// Fitted decay constants with per-component overrides applied.
pub fn decay_constants_with_overrides(
    params: &FitParameterSet,
    overrides: &[(usize, f64)],
) -> Result<Vec<f64>, ConfigurationError> {
    let mut taus = params.taus().to_vec();
    for &(component, tau) in overrides {
        let pos = params.components().position(component).ok_or_else(|| {
            ConfigurationError::Invalid(format!(
                "decay constant override for component {component}, which is not in the fitted set {}",
                params.components()
            ))
        })?;
        if !tau.is_finite() {
            return Err(ConfigurationError::Invalid(format!(
                "decay constant override for component {component} is not finite"
            )));
        }
        log::debug!("component {component}: τ {} -> {tau}", taus[pos]);
        taus[pos] = tau;
    }
    Ok(taus)
}
