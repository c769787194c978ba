//! Export matrices and fit results.
//!
//! - matrices are written in the same tab-separated layout that `ingest`
//!   reads (time delays down the first column, wavelengths across the first
//!   row), so exported reconstructions can be analysed again
//! - DAS are written one row per wavelength, one column per component
//! - fit results are a pretty-printed JSON [`FitFile`]

use std::fs::File;
use std::path::Path;

use nalgebra::DMatrix;

use crate::domain::{ComponentSet, FitFile};
use crate::error::AppError;

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn tsv_writer(file: File) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(file)
}

fn fmt_value(v: f64) -> String {
    format!("{v:.7e}")
}

/// Write a `wavelengths × time delays` matrix as a loadable data file.
pub fn write_matrix_csv(
    path: &Path,
    matrix: &DMatrix<f64>,
    time_delays: &[f64],
    wavelengths: &[f64],
) -> Result<(), AppError> {
    if matrix.nrows() != wavelengths.len() || matrix.ncols() != time_delays.len() {
        return Err(AppError::new(
            3,
            format!(
                "Cannot export {}x{} matrix with {} wavelengths and {} time delays.",
                matrix.nrows(),
                matrix.ncols(),
                wavelengths.len(),
                time_delays.len()
            ),
        ));
    }

    let mut writer = tsv_writer(create(path, "matrix file")?);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write matrix file: {e}"));

    let header = std::iter::once(fmt_value(0.0)).chain(wavelengths.iter().map(|&w| fmt_value(w)));
    writer.write_record(header).map_err(write_err)?;
    for (t, &delay) in time_delays.iter().enumerate() {
        let column = matrix.column(t);
        let row = std::iter::once(fmt_value(delay)).chain(column.iter().map(|&v| fmt_value(v)));
        writer.write_record(row).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush matrix file: {e}")))?;
    Ok(())
}

/// Write DAS (`wavelengths × components`) with a header naming the components.
pub fn write_das_csv(
    path: &Path,
    das: &DMatrix<f64>,
    wavelengths: &[f64],
    components: &ComponentSet,
) -> Result<(), AppError> {
    if das.nrows() != wavelengths.len() || das.ncols() != components.len() {
        return Err(AppError::new(
            3,
            format!(
                "Cannot export {}x{} DAS with {} wavelengths and {} components.",
                das.nrows(),
                das.ncols(),
                wavelengths.len(),
                components.len()
            ),
        ));
    }

    let mut writer = tsv_writer(create(path, "DAS file")?);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write DAS file: {e}"));

    let header = std::iter::once("wavelength".to_string())
        .chain(components.iter().map(|c| format!("DAS{c}")));
    writer.write_record(header).map_err(write_err)?;
    for (w, &wavelength) in wavelengths.iter().enumerate() {
        let spectrum = das.row(w);
        let row = std::iter::once(fmt_value(wavelength)).chain(spectrum.iter().map(|&v| fmt_value(v)));
        writer.write_record(row).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush DAS file: {e}")))?;
    Ok(())
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, fit: &FitFile) -> Result<(), AppError> {
    let file = create(path, "fit JSON")?;
    serde_json::to_writer_pretty(file, fit)
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))?;
    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let fit: FitFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fit JSON: {e}")))?;
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitDiagnostics, FitMethod, SeedSource};
    use crate::io::ingest::load_ta_matrix;

    #[test]
    fn exported_matrix_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.txt");
        let matrix = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, -4.0, 5.5, 6.25e-4]);
        let time_delays = [0.0, 1.0, 2.5];
        let wavelengths = [480.0, 490.0];

        write_matrix_csv(&path, &matrix, &time_delays, &wavelengths).unwrap();
        let data = load_ta_matrix(&path).unwrap();

        assert_eq!(data.time_delays, time_delays.to_vec());
        assert_eq!(data.wavelengths, wavelengths.to_vec());
        assert!((data.matrix - matrix).amax() < 1e-9);
    }

    #[test]
    fn mismatched_axes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_matrix_csv(
            &dir.path().join("m.txt"),
            &DMatrix::zeros(2, 2),
            &[0.0],
            &[1.0, 2.0],
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn das_file_has_one_row_per_wavelength() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("das.txt");
        let das = DMatrix::from_row_slice(2, 2, &[1.0, -0.5, 0.25, 2.0]);
        let components = ComponentSet::new(vec![1, 0]).unwrap();

        write_das_csv(&path, &das, &[500.0, 510.0], &components).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "wavelength\tDAS1\tDAS0");
        assert!(lines[2].starts_with("5.1000000e2\t"), "{}", lines[2]);
        assert_eq!(lines[2].split('\t').count(), 3);
    }

    #[test]
    fn fit_json_reloads_values_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.json");
        let awkward = [0.0059760229190797196, 0.1 + 0.2, 1.0 / 3.0, -2.718281828459045e-7];
        let fit = FitFile {
            tool: "svdgf".to_string(),
            created: chrono::Utc::now(),
            data_file: None,
            start_time: 0.0,
            components: ComponentSet::new(vec![0, 1]).unwrap(),
            seed: SeedSource::UserValues,
            diagnostics: FitDiagnostics {
                method: FitMethod::LevenbergMarquardt,
                evaluations: 12,
                success: true,
                cost: 1e-20,
                termination: "converged".to_string(),
            },
            parameters: Default::default(),
            decay_constants: vec![awkward[1], awkward[2]],
            wavelengths: vec![500.0, 510.0],
            time_delays: vec![0.0, 1.0],
            das: vec![vec![awkward[0], awkward[3]], vec![awkward[2], awkward[1]]],
        };

        write_fit_json(&path, &fit).unwrap();
        let loaded = read_fit_json(&path).unwrap();

        assert_eq!(loaded.das, fit.das);
        assert_eq!(loaded.decay_constants, fit.decay_constants);
    }
}
