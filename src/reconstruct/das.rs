//! Decay-associated spectra.
//!
//! ```text
//! DAS[:, k] = Σ_j amp(rSV j, component k) · U[:, j]
//! ```
//!
//! i.e. `DAS = U · A` with `A` the `vectors × components` amplitude matrix.
//! Every spectrum mixes all retained left singular vectors.

use nalgebra::DMatrix;

use crate::domain::{ComponentSet, FitParameterSet, ParamKey};
use crate::error::ConfigurationError;

/// Build the DAS (`wavelengths × components`).
pub fn build_das(
    left_vectors: &DMatrix<f64>,
    params: &FitParameterSet,
    components: &ComponentSet,
) -> Result<DMatrix<f64>, ConfigurationError> {
    let n = components.len();
    if left_vectors.ncols() != n {
        return Err(ConfigurationError::LengthMismatch {
            what: "left singular vectors".to_string(),
            expected: n,
            actual: left_vectors.ncols(),
        });
    }

    let mut amplitudes = DMatrix::zeros(n, n);
    for (k, component) in components.iter().enumerate() {
        for j in 0..n {
            let key = ParamKey::Amplitude { vector: j, component };
            amplitudes[(j, k)] = params
                .get(key)
                .ok_or_else(|| ConfigurationError::MissingParameter(key.name()))?;
        }
    }

    Ok(left_vectors * amplitudes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(amps: &[f64]) -> FitParameterSet {
        let components = ComponentSet::new(vec![0, 1]).unwrap();
        FitParameterSet::from_parts(components, vec![1.0, 2.0], DMatrix::from_row_slice(2, 2, amps))
            .unwrap()
    }

    #[test]
    fn das_mixes_all_left_vectors() {
        let u = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let p = params(&[2.0, 3.0, 5.0, 7.0]);
        let das = build_das(&u, &p, p.components()).unwrap();
        assert_eq!(das.shape(), (3, 2));
        // column 0: 2 * u0 + 5 * u1
        assert_eq!(das.column(0).iter().copied().collect::<Vec<_>>(), vec![2.0, 5.0, 7.0]);
        // column 1: 3 * u0 + 7 * u1
        assert_eq!(das.column(1).iter().copied().collect::<Vec<_>>(), vec![3.0, 7.0, 10.0]);
    }

    #[test]
    fn das_is_linear_in_component_amplitudes() {
        let u = DMatrix::from_row_slice(2, 2, &[0.6, -0.8, 0.8, 0.6]);
        let base = build_das(&u, &params(&[1.0, 0.5, -0.2, 0.3]), &ComponentSet::new(vec![0, 1]).unwrap())
            .unwrap();
        // scale every amplitude of component 1 by 3
        let scaled = build_das(&u, &params(&[1.0, 1.5, -0.2, 0.9]), &ComponentSet::new(vec![0, 1]).unwrap())
            .unwrap();
        assert!((scaled.column(1) - base.column(1) * 3.0).amax() < 1e-12);
        assert!((scaled.column(0) - base.column(0)).amax() < 1e-12);
    }

    #[test]
    fn wrong_number_of_left_vectors_is_rejected() {
        let p = params(&[1.0, 0.0, 0.0, 1.0]);
        let err = build_das(&DMatrix::zeros(4, 3), &p, p.components()).unwrap_err();
        assert!(matches!(err, ConfigurationError::LengthMismatch { .. }));
    }

    #[test]
    fn component_without_amplitudes_is_rejected() {
        let p = params(&[1.0, 0.0, 0.0, 1.0]);
        let other = ComponentSet::new(vec![0, 3]).unwrap();
        let err = build_das(&DMatrix::zeros(4, 2), &p, &other).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingParameter("amp_rSV0_component3".to_string()));
    }
}
