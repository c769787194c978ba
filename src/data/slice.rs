//! Kinetic traces and transient spectra cut out of a `wavelengths × time delays` matrix.

use nalgebra::DMatrix;

use crate::data::closest_index;
use crate::domain::TaData;
use crate::error::DataError;

/// One row or column of a matrix together with its axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    /// Axis value actually used (closest sample to the request).
    pub at: f64,
    /// Sample index along the cut axis.
    pub index: usize,
    /// Time delays for a kinetic trace, wavelengths for a spectrum.
    pub axis: Vec<f64>,
    pub values: Vec<f64>,
}

/// Kinetic trace of `matrix` at the wavelength closest to `wavelength`.
///
/// `matrix` must share the axes of `data` (the data itself, a reconstruction
/// or a difference matrix).
pub fn kinetic_trace(data: &TaData, matrix: &DMatrix<f64>, wavelength: f64) -> Result<Slice, DataError> {
    check_shape(data, matrix)?;
    let index = locate("wavelength", &data.wavelengths, wavelength)?;
    Ok(Slice {
        at: data.wavelengths[index],
        index,
        axis: data.time_delays.clone(),
        values: matrix.row(index).iter().copied().collect(),
    })
}

/// Transient spectrum of `matrix` at the time delay closest to `delay`.
pub fn spectrum_at(data: &TaData, matrix: &DMatrix<f64>, delay: f64) -> Result<Slice, DataError> {
    check_shape(data, matrix)?;
    let index = locate("time delay", &data.time_delays, delay)?;
    Ok(Slice {
        at: data.time_delays[index],
        index,
        axis: data.wavelengths.clone(),
        values: matrix.column(index).iter().copied().collect(),
    })
}

fn check_shape(data: &TaData, matrix: &DMatrix<f64>) -> Result<(), DataError> {
    if matrix.shape() != data.matrix.shape() {
        return Err(DataError::ShapeMismatch {
            left_rows: data.matrix.nrows(),
            left_cols: data.matrix.ncols(),
            right_rows: matrix.nrows(),
            right_cols: matrix.ncols(),
        });
    }
    Ok(())
}

fn locate(axis: &'static str, values: &[f64], target: f64) -> Result<usize, DataError> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !target.is_finite() || target < min || target > max {
        return Err(DataError::OutsideAxis {
            axis,
            value: target,
            min,
            max,
        });
    }
    closest_index(values, target).ok_or(DataError::EmptyMatrix)
}
