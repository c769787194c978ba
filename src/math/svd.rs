//! Singular value decomposition and component selection.
//!
//! The data matrix is decomposed as `M = U · Σ · Vᵗ` (thin SVD, singular
//! values in descending order). Callers pick which ranked components to keep;
//! the selection preserves the caller's ordering, which need not be the
//! singular-value ordering.

use nalgebra::{DMatrix, DVector};

use crate::domain::{ComponentSet, RetainedSvd};
use crate::error::{AnalysisError, ConfigurationError, DataError, NumericError};

/// Iteration cap for nalgebra's implicit-shift SVD.
const SVD_MAX_ITERATIONS: usize = 10_000;

struct SortedSvd {
    u: DMatrix<f64>,
    singular_values: Vec<f64>,
    v_t: DMatrix<f64>,
}

/// Reject empty or non-finite matrices before any decomposition.
pub fn validate_matrix(matrix: &DMatrix<f64>) -> Result<(), DataError> {
    if matrix.nrows() == 0 || matrix.ncols() == 0 {
        return Err(DataError::EmptyMatrix);
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteMatrix);
    }
    Ok(())
}

fn sorted_svd(matrix: &DMatrix<f64>) -> Result<SortedSvd, AnalysisError> {
    validate_matrix(matrix)?;

    let svd = matrix
        .clone()
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| NumericError::NonFinite {
            context: "SVD did not converge".to_string(),
        })?;
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(NumericError::NonFinite {
            context: "SVD did not produce singular vectors".to_string(),
        }
        .into());
    };

    // Enforce descending order regardless of what the backend returns.
    let k = svd.singular_values.len();
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| {
        svd.singular_values[b]
            .partial_cmp(&svd.singular_values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let u = DMatrix::from_fn(u.nrows(), k, |r, c| u[(r, order[c])]);
    let v_t = DMatrix::from_fn(k, v_t.ncols(), |r, c| v_t[(order[r], c)]);
    let singular_values = order.iter().map(|&i| svd.singular_values[i]).collect();

    Ok(SortedSvd {
        u,
        singular_values,
        v_t,
    })
}

/// All singular values of `matrix`, descending.
pub fn singular_values(matrix: &DMatrix<f64>) -> Result<Vec<f64>, AnalysisError> {
    Ok(sorted_svd(matrix)?.singular_values)
}

/// Run the SVD and keep the components listed in `components`.
///
/// `left_vectors[:, i]`, `singular_values[i]` and `right_vectors[i, :]` all
/// belong to `components[i]`.
pub fn select_components(
    matrix: &DMatrix<f64>,
    components: &ComponentSet,
) -> Result<RetainedSvd, AnalysisError> {
    validate_matrix(matrix)?;
    let available = matrix.nrows().min(matrix.ncols());
    if let Some(index) = components.iter().find(|&c| c >= available) {
        return Err(ConfigurationError::ComponentIndexOutOfRange { index, available }.into());
    }

    let svd = sorted_svd(matrix)?;
    let n = components.len();
    let idx = components.as_slice();

    let left_vectors = DMatrix::from_fn(svd.u.nrows(), n, |r, c| svd.u[(r, idx[c])]);
    let right_vectors = DMatrix::from_fn(n, svd.v_t.ncols(), |r, c| svd.v_t[(idx[r], c)]);
    let singular_values = DVector::from_iterator(n, idx.iter().map(|&i| svd.singular_values[i]));

    log::debug!(
        "retained components {} with singular values {:?}",
        components,
        singular_values.as_slice()
    );

    Ok(RetainedSvd {
        components: components.clone(),
        left_vectors,
        singular_values,
        right_vectors,
    })
}

/// Noise-reduced matrix `U_r · Σ_r · V_rᵗ` from a retained SVD.
pub fn svd_reconstruct(retained: &RetainedSvd) -> DMatrix<f64> {
    let sigma = DMatrix::from_diagonal(&retained.singular_values);
    &retained.left_vectors * sigma * &retained.right_vectors
}
