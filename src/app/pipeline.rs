//! Shared analysis pipeline.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! data -> SVD -> component selection -> global fit -> DAS -> reconstruction -> difference
//!
//! `analyze` works on in-memory inputs and returns typed errors; `run_analysis`
//! adds file loading and exports for the CLI.

use chrono::Utc;
use nalgebra::DMatrix;

use crate::data::truncate_from_start_time;
use crate::domain::{
    AnalysisConfig, ComponentSet, FitFile, FitOptions, InitialValues, RetainedSvd, TaData,
    TargetModelText,
};
use crate::error::{AnalysisError, AppError, DataError};
use crate::fit::{GlobalFit, fit_retained};
use crate::io::{load_initial_values, load_target_model, load_ta_matrix};
use crate::math::{select_components, singular_values, svd_reconstruct};
use crate::models::DecayModel;
use crate::reconstruct::{build_das, difference, reconstruct};

/// All computed outputs of one analysis.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Data after the start-time cut.
    pub data: TaData,
    pub singular_values: Vec<f64>,
    pub retained: RetainedSvd,
    pub model: DecayModel,
    pub fit: GlobalFit,
    /// `wavelengths × components`
    pub das: DMatrix<f64>,
    /// Reconstruction from DAS and fitted decay constants.
    pub reconstructed: DMatrix<f64>,
    /// `data - reconstructed`
    pub difference: DMatrix<f64>,
    /// `data - U_r Σ_r V_rᵗ` (what the retained components alone cannot explain).
    pub svd_difference: DMatrix<f64>,
}

impl Analysis {
    pub fn components(&self) -> &ComponentSet {
        &self.retained.components
    }

    /// Serializable fit result.
    pub fn fit_file(&self, data_file: Option<String>) -> FitFile {
        FitFile {
            tool: "svdgf".to_string(),
            created: Utc::now(),
            data_file,
            start_time: self.data.time_delays.first().copied().unwrap_or(f64::NAN),
            components: self.components().clone(),
            seed: self.fit.seed_source.clone(),
            diagnostics: self.fit.diagnostics.clone(),
            parameters: self.fit.params.to_named(),
            decay_constants: self.fit.params.taus().to_vec(),
            wavelengths: self.data.wavelengths.clone(),
            time_delays: self.data.time_delays.clone(),
            das: self.das.row_iter().map(|r| r.iter().copied().collect()).collect(),
        }
    }
}

/// Run the full analysis on an already windowed data set.
///
/// The target model is compiled before any SVD or solver work starts.
pub fn analyze(
    data: &TaData,
    components: &ComponentSet,
    initial: Option<&InitialValues>,
    target: Option<&TargetModelText>,
    opts: &FitOptions,
) -> Result<Analysis, AnalysisError> {
    let model = DecayModel::from_target(target, components)?;

    let values = singular_values(&data.matrix)?;
    let retained = select_components(&data.matrix, components)?;
    let fit = fit_retained(&retained, &data.time_delays, initial, &model, opts)?;

    let das = build_das(&retained.left_vectors, &fit.params, components)?;
    let selected: Vec<usize> = (0..components.len()).collect();
    let reconstructed = reconstruct(&das, fit.params.taus(), &data.time_delays, &selected)?;
    let diff = difference(&data.matrix, &reconstructed)?;
    let svd_difference = difference(&data.matrix, &svd_reconstruct(&retained))?;

    Ok(Analysis {
        data: data.clone(),
        singular_values: values,
        retained,
        model,
        fit,
        das,
        reconstructed,
        difference: diff,
        svd_difference,
    })
}

/// Load the data file and apply the optional start time.
pub fn load_windowed(path: &std::path::Path, start_time: Option<f64>) -> Result<TaData, AppError> {
    let data = load_ta_matrix(path)?;
    match start_time {
        Some(start) => Ok(truncate_from_start_time(&data, start).map_err(AnalysisError::from)?),
        None => Ok(data),
    }
}

/// Execute the analysis described by `config`, including file loading.
pub fn run_analysis(config: &AnalysisConfig) -> Result<Analysis, AppError> {
    let initial = config
        .initial_values
        .as_deref()
        .map(load_initial_values)
        .transpose()
        .map_err(AnalysisError::from)?;
    let target = config
        .target_model
        .as_deref()
        .map(load_target_model)
        .transpose()
        .map_err(AnalysisError::from)?;

    let data = load_windowed(&config.data_path, config.start_time)?;
    Ok(analyze(
        &data,
        &config.components,
        initial.as_ref(),
        target.as_ref(),
        &config.fit,
    )?)
}

/// Rebuild the DAS matrix stored in a fit file.
pub fn das_from_fit_file(fit: &FitFile) -> Result<DMatrix<f64>, AnalysisError> {
    let n = fit.components.len();
    if let Some(row) = fit.das.iter().find(|row| row.len() != n) {
        return Err(DataError::Malformed(format!(
            "fit file DAS row has {} entries but {n} components were fitted",
            row.len()
        ))
        .into());
    }
    if fit.das.len() != fit.wavelengths.len() {
        return Err(DataError::AxisMismatch {
            axis: "wavelength",
            expected: fit.das.len(),
            actual: fit.wavelengths.len(),
        }
        .into());
    }
    Ok(DMatrix::from_fn(fit.das.len(), n, |w, k| fit.das[w][k]))
}
