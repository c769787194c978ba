//! Transient absorption matrix ingest.
//!
//! Expected layout (the format written by `svdgf simulate` and by the export
//! helpers):
//!
//! ```text
//! 0        λ_0      λ_1      ...
//! t_0      A(t_0,λ_0) ...
//! t_1      ...
//! ```
//!
//! - first row: wavelengths (the corner cell is ignored)
//! - first column: time delays
//! - delimiter: tab, comma or semicolon (detected), otherwise runs of whitespace
//!
//! The returned matrix is transposed to `wavelengths × time delays`.

use std::fs;
use std::path::Path;

use nalgebra::DMatrix;

use crate::domain::TaData;
use crate::error::{AnalysisError, DataError};
use crate::math::validate_matrix;

/// Load a TA data file.
pub fn load_ta_matrix(path: &Path) -> Result<TaData, AnalysisError> {
    let text = fs::read_to_string(path).map_err(|e| {
        DataError::Malformed(format!("failed to read data file '{}': {e}", path.display()))
    })?;
    let data = parse_ta_matrix(&text)
        .map_err(|e| DataError::Malformed(format!("'{}': {e}", path.display())))?;
    log::debug!(
        "loaded '{}': {} wavelengths x {} time delays",
        path.display(),
        data.wavelengths.len(),
        data.time_delays.len()
    );
    Ok(data)
}

/// Parse the text of a TA data file.
pub fn parse_ta_matrix(text: &str) -> Result<TaData, DataError> {
    let rows = match detect_delimiter(text) {
        Some(delimiter) => read_delimited(text, delimiter)?,
        None => read_whitespace(text)?,
    };

    let Some((header, body)) = rows.split_first() else {
        return Err(DataError::EmptyMatrix);
    };
    if header.len() < 2 || body.is_empty() {
        return Err(DataError::EmptyMatrix);
    }

    let wavelengths: Vec<f64> = header[1..].to_vec();
    let n_wl = wavelengths.len();
    let mut time_delays = Vec::with_capacity(body.len());
    for (idx, row) in body.iter().enumerate() {
        if row.len() != n_wl + 1 {
            return Err(DataError::Malformed(format!(
                "line {}: expected {} values, found {}",
                idx + 2,
                n_wl + 1,
                row.len()
            )));
        }
        time_delays.push(row[0]);
    }

    let matrix = DMatrix::from_fn(n_wl, body.len(), |w, t| body[t][w + 1]);
    validate_matrix(&matrix)?;
    if time_delays.iter().chain(&wavelengths).any(|v| !v.is_finite()) {
        return Err(DataError::Malformed("non-finite axis value".to_string()));
    }

    TaData::new(matrix, time_delays, wavelengths)
}

fn detect_delimiter(text: &str) -> Option<u8> {
    let first = text.lines().find(|l| !l.trim().is_empty())?;
    [b'\t', b',', b';']
        .into_iter()
        .find(|&d| first.contains(d as char))
}

fn read_delimited(text: &str, delimiter: u8) -> Result<Vec<Vec<f64>>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| DataError::Malformed(format!("line {}: {e}", idx + 1)))?;
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            continue;
        }
        rows.push(parse_fields(fields.into_iter(), idx + 1)?);
    }
    Ok(rows)
}

fn read_whitespace(text: &str) -> Result<Vec<Vec<f64>>, DataError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_fields(line.split_whitespace(), idx + 1))
        .collect()
}

fn parse_fields<'a>(fields: impl Iterator<Item = &'a str>, line: usize) -> Result<Vec<f64>, DataError> {
    fields
        .map(|f| {
            f.trim_start_matches('\u{feff}').parse::<f64>().map_err(|_| {
                DataError::Malformed(format!("line {line}: '{f}' is not a number"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_separated_and_transposes() {
        let text = "0\t500\t510\t520\n0.0\t1\t2\t3\n1.5\t4\t5\t6\n";
        let data = parse_ta_matrix(text).unwrap();
        assert_eq!(data.wavelengths, vec![500.0, 510.0, 520.0]);
        assert_eq!(data.time_delays, vec![0.0, 1.5]);
        assert_eq!(data.matrix.shape(), (3, 2));
        assert_eq!(data.matrix[(0, 1)], 4.0);
        assert_eq!(data.matrix[(2, 0)], 3.0);
    }

    #[test]
    fn parses_whitespace_and_comma_files() {
        let ws = "0   500  510\n 1  1.0e-3  2.0e-3\n2 3 4\n";
        let csv = "0,500,510\n1,1.0e-3,2.0e-3\n2,3,4\n";
        let a = parse_ta_matrix(ws).unwrap();
        let b = parse_ta_matrix(csv).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.matrix[(1, 0)], 2.0e-3);
    }

    #[test]
    fn ragged_row_is_malformed() {
        let err = parse_ta_matrix("0\t500\t510\n1\t2\n").unwrap_err();
        assert!(matches!(err, DataError::Malformed(msg) if msg.contains("line 2")));
    }

    #[test]
    fn text_cell_is_malformed() {
        let err = parse_ta_matrix("0,500\n1,abc\n").unwrap_err();
        assert!(matches!(err, DataError::Malformed(msg) if msg.contains("abc")));
    }

    #[test]
    fn header_only_is_empty() {
        assert_eq!(parse_ta_matrix("0\t500\t510\n").unwrap_err(), DataError::EmptyMatrix);
    }
}
