//! Time window selection.

use crate::domain::TaData;
use crate::error::DataError;

/// Index of the value closest to `target` (first one on ties).
pub fn closest_index(values: &[f64], target: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|(_, a), (_, b)| {
            (*a - target)
                .abs()
                .partial_cmp(&(*b - target).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
}

/// Drop every time delay before the sample closest to `start_time`.
pub fn truncate_from_start_time(data: &TaData, start_time: f64) -> Result<TaData, DataError> {
    let (min, max) = data
        .time_delays
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
    if !start_time.is_finite() || start_time < min || start_time > max {
        return Err(DataError::StartTimeOutOfRange {
            start: start_time,
            min,
            max,
        });
    }
    let start = closest_index(&data.time_delays, start_time).ok_or(DataError::EmptyMatrix)?;

    log::debug!(
        "start time {start_time} ps -> closest delay {} ps (index {start})",
        data.time_delays[start]
    );

    let n = data.time_delays.len() - start;
    TaData::new(
        data.matrix.columns(start, n).into_owned(),
        data.time_delays[start..].to_vec(),
        data.wavelengths.clone(),
    )
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;

    fn data() -> TaData {
        TaData::new(
            DMatrix::from_fn(2, 5, |r, c| (r * 10 + c) as f64),
            vec![-1.0, 0.0, 0.5, 2.0, 10.0],
            vec![500.0, 600.0],
        )
        .unwrap()
    }

    #[test]
    fn closest_index_picks_nearest_and_first_tie() {
        let v = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(closest_index(&v, 1.4), Some(1));
        assert_eq!(closest_index(&v, 1.5), Some(1));
        assert_eq!(closest_index(&v, 99.0), Some(3));
        assert_eq!(closest_index(&[], 1.0), None);
    }

    #[test]
    fn truncation_keeps_columns_from_closest_delay() {
        let cut = truncate_from_start_time(&data(), 0.4).unwrap();
        assert_eq!(cut.time_delays, vec![0.5, 2.0, 10.0]);
        assert_eq!(cut.matrix.shape(), (2, 3));
        assert_eq!(cut.matrix[(1, 0)], 12.0);
        assert_eq!(cut.wavelengths, vec![500.0, 600.0]);
    }

    #[test]
    fn start_time_outside_axis_is_rejected() {
        assert!(matches!(
            truncate_from_start_time(&data(), 11.0),
            Err(DataError::StartTimeOutOfRange { .. })
        ));
        assert!(truncate_from_start_time(&data(), f64::NAN).is_err());
    }
}
