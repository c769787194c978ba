//! Global fit of the retained right singular vectors.
//!
//! Given:
//! - time delays `t`
//! - the vectors to fit `y_i(t) = σ_i · Vᵗ[i, :]` (one per retained component)
//! - a decay model `g_c(t; τ)` that is linear in its amplitudes
//!
//! we minimize, jointly over all vectors,
//!
//! ```text
//! Σ_i Σ_t ( y_i(t) - Σ_c a_{i,c} · g_c(t; τ) )²
//! ```
//!
//! with the decay constants `τ_c` shared between all vectors. The residual
//! vector is the concatenation of the per-vector residuals in component-set
//! order. The Jacobian is exact: amplitude columns are `-g_c(t)` and decay
//! constant columns are `-Σ_c a_{i,c} ∂g_c/∂τ_k`.

use std::cell::RefCell;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{DMatrix, DVector, Dyn, Owned};
use rayon::prelude::*;

use crate::domain::{
    ComponentSet, FitDiagnostics, FitMethod, FitOptions, FitParameterSet, InitialValues,
    RetainedSvd, SeedSource,
};
use crate::error::{AnalysisError, ConfigurationError, DataError, FitError, NumericError};
use crate::fit::gauss_newton::minimize_gauss_newton;
use crate::fit::seed::seed_parameters;
use crate::math::solve_least_squares;
use crate::models::DecayModel;

/// Outcome of one global fit.
#[derive(Debug, Clone)]
pub struct GlobalFit {
    pub params: FitParameterSet,
    pub diagnostics: FitDiagnostics,
    pub seed_source: SeedSource,
    /// `σ_i · Vᵗ[i, :]`, components × time delays.
    pub vectors_to_fit: DMatrix<f64>,
    /// Model evaluated at the fitted parameters, components × time delays.
    pub model_vectors: DMatrix<f64>,
}

impl GlobalFit {
    /// Root-mean-square residual of each fitted vector.
    pub fn rms_residuals(&self) -> Vec<f64> {
        let n_t = self.vectors_to_fit.ncols().max(1) as f64;
        (0..self.vectors_to_fit.nrows())
            .map(|i| {
                let diff = self.vectors_to_fit.row(i) - self.model_vectors.row(i);
                (diff.norm_squared() / n_t).sqrt()
            })
            .collect()
    }
}

/// Scale each retained right singular vector by its singular value.
pub fn vectors_to_fit(right_vectors: &DMatrix<f64>, singular_values: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(right_vectors.nrows(), right_vectors.ncols(), |i, t| {
        singular_values[i] * right_vectors[(i, t)]
    })
}

/// Residuals and Jacobian of the global fit for a flat parameter vector.
///
/// The last numeric failure is kept so that a solver abort can be reported
/// with its cause.
pub(crate) struct GlobalFitProblem<'a> {
    components: &'a ComponentSet,
    time_delays: &'a [f64],
    targets: &'a DMatrix<f64>,
    model: &'a DecayModel,
    params: DVector<f64>,
    failure: RefCell<Option<NumericError>>,
}

impl<'a> GlobalFitProblem<'a> {
    pub(crate) fn new(
        components: &'a ComponentSet,
        time_delays: &'a [f64],
        targets: &'a DMatrix<f64>,
        model: &'a DecayModel,
        params: DVector<f64>,
    ) -> Self {
        Self {
            components,
            time_delays,
            targets,
            model,
            params,
            failure: RefCell::new(None),
        }
    }

    fn n(&self) -> usize {
        self.components.len()
    }

    pub(crate) fn current(&self) -> &DVector<f64> {
        &self.params
    }

    pub(crate) fn take_failure(&self) -> Option<NumericError> {
        self.failure.borrow_mut().take()
    }

    fn amplitudes(&self, params: &DVector<f64>, vector: usize) -> DVector<f64> {
        let n = self.n();
        DVector::from_iterator(n, params.rows(n + vector * n, n).iter().copied())
    }

    pub(crate) fn residual_vector(&self, params: &DVector<f64>) -> Result<DVector<f64>, NumericError> {
        let n = self.n();
        let n_t = self.time_delays.len();
        let taus: Vec<f64> = params.rows(0, n).iter().copied().collect();
        let g = self.model.basis_matrix(self.time_delays, &taus, self.components)?;

        let mut r = DVector::zeros(n * n_t);
        for i in 0..n {
            let fitted = &g * self.amplitudes(params, i);
            for t in 0..n_t {
                r[i * n_t + t] = self.targets[(i, t)] - fitted[t];
            }
        }
        if r.iter().all(|v| v.is_finite()) {
            Ok(r)
        } else {
            Err(NumericError::NonFinite {
                context: format!("fit residuals at decay constants {taus:?}"),
            })
        }
    }

    pub(crate) fn jacobian_matrix(&self, params: &DVector<f64>) -> Result<DMatrix<f64>, NumericError> {
        let n = self.n();
        let n_t = self.time_delays.len();
        let taus: Vec<f64> = params.rows(0, n).iter().copied().collect();
        let g = self.model.basis_matrix(self.time_delays, &taus, self.components)?;

        let derivatives = (0..n)
            .into_par_iter()
            .map(|k| self.model.basis_derivative(self.time_delays, &taus, self.components, k))
            .collect::<Result<Vec<_>, _>>()?;

        let mut jac = DMatrix::zeros(n * n_t, FitParameterSet::flat_len(n));
        for i in 0..n {
            let amps = self.amplitudes(params, i);
            for (k, dg) in derivatives.iter().enumerate() {
                let column = dg * &amps;
                for t in 0..n_t {
                    jac[(i * n_t + t, k)] = -column[t];
                }
            }
            for j in 0..n {
                for t in 0..n_t {
                    jac[(i * n_t + t, n + i * n + j)] = -g[(t, j)];
                }
            }
        }
        if jac.iter().all(|v| v.is_finite()) {
            Ok(jac)
        } else {
            Err(NumericError::NonFinite {
                context: format!("fit Jacobian at decay constants {taus:?}"),
            })
        }
    }

    pub(crate) fn set_current(&mut self, params: DVector<f64>) {
        self.params = params;
    }

    fn record<T>(&self, result: Result<T, NumericError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                log::debug!("fit evaluation failed: {e}");
                *self.failure.borrow_mut() = Some(e);
                None
            }
        }
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for GlobalFitProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.record(self.residual_vector(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.record(self.jacobian_matrix(&self.params))
    }
}

/// Run the global fit on a retained SVD.
pub fn fit_retained(
    retained: &RetainedSvd,
    time_delays: &[f64],
    initial: Option<&InitialValues>,
    model: &DecayModel,
    opts: &FitOptions,
) -> Result<GlobalFit, AnalysisError> {
    fit_global(
        &retained.right_vectors,
        &retained.singular_values,
        &retained.components,
        time_delays,
        initial,
        model,
        opts,
    )
}

/// Fit all retained right singular vectors simultaneously with shared decay
/// constants.
///
/// `right_vectors` is components × time delays, with row `i` belonging to
/// `components[i]`.
pub fn fit_global(
    right_vectors: &DMatrix<f64>,
    singular_values: &DVector<f64>,
    components: &ComponentSet,
    time_delays: &[f64],
    initial: Option<&InitialValues>,
    model: &DecayModel,
    opts: &FitOptions,
) -> Result<GlobalFit, AnalysisError> {
    let n = components.len();
    opts.validate()?;
    validate_inputs(right_vectors, singular_values, components, time_delays, model)?;

    let seed = seed_parameters(components, initial)?;
    let targets = vectors_to_fit(right_vectors, singular_values);
    let method = opts.method;

    log::debug!(
        "global fit: {} components {}, {} time delays, {} parameters, method {}, model {}",
        n,
        components,
        time_delays.len(),
        FitParameterSet::flat_len(n),
        method,
        model.display_name()
    );

    let mut start = seed.params.to_flat();
    let problem = GlobalFitProblem::new(components, time_delays, &targets, model, start.clone());
    if let Err(e) = problem.residual_vector(&start) {
        return Err(FitError::new(method.name(), format!("initial parameters: {e}")).into());
    }

    if opts.solve_amplitudes {
        warm_start_amplitudes(&mut start, components, time_delays, &targets, model);
    }

    let (params, diagnostics) = match method {
        FitMethod::LevenbergMarquardt => run_levenberg_marquardt(problem, start, opts)?,
        FitMethod::GaussNewton => {
            let mut problem = problem;
            problem.set_current(start);
            let report = minimize_gauss_newton(&mut problem, opts).map_err(|e| {
                FitError::new(method.name(), e.to_string())
            })?;
            let cost = report.cost;
            (
                problem.current().clone(),
                FitDiagnostics {
                    method,
                    evaluations: report.evaluations,
                    success: report.converged,
                    cost,
                    termination: report.termination,
                },
            )
        }
    };

    if params.iter().any(|v| !v.is_finite()) {
        return Err(FitError::new(method.name(), "solver returned non-finite parameters").into());
    }
    if !diagnostics.success {
        log::warn!(
            "global fit ({}) stopped without convergence: {}",
            method,
            diagnostics.termination
        );
    }

    let params = FitParameterSet::from_flat(components.clone(), &params);
    let g = model.basis_matrix(time_delays, params.taus(), components)?;
    let mut model_vectors = DMatrix::zeros(n, time_delays.len());
    for i in 0..n {
        let fitted = &g * DVector::from_vec(params.amplitudes_for_vector(i));
        model_vectors.row_mut(i).copy_from(&fitted.transpose());
    }

    log::info!(
        "global fit ({}) finished after {} evaluations, cost {:.6e}, decay constants {:?}",
        method,
        diagnostics.evaluations,
        diagnostics.cost,
        params.taus()
    );

    Ok(GlobalFit {
        params,
        diagnostics,
        seed_source: seed.source,
        vectors_to_fit: targets,
        model_vectors,
    })
}

fn validate_inputs(
    right_vectors: &DMatrix<f64>,
    singular_values: &DVector<f64>,
    components: &ComponentSet,
    time_delays: &[f64],
    model: &DecayModel,
) -> Result<(), AnalysisError> {
    let n = components.len();
    if right_vectors.nrows() != n {
        return Err(ConfigurationError::LengthMismatch {
            what: "right singular vectors".to_string(),
            expected: n,
            actual: right_vectors.nrows(),
        }
        .into());
    }
    if singular_values.len() != n {
        return Err(ConfigurationError::LengthMismatch {
            what: "singular values".to_string(),
            expected: n,
            actual: singular_values.len(),
        }
        .into());
    }
    if time_delays.is_empty() {
        return Err(DataError::EmptyMatrix.into());
    }
    if right_vectors.ncols() != time_delays.len() {
        return Err(DataError::AxisMismatch {
            axis: "time delay",
            expected: right_vectors.ncols(),
            actual: time_delays.len(),
        }
        .into());
    }
    if time_delays.iter().any(|t| !t.is_finite())
        || right_vectors.iter().any(|v| !v.is_finite())
        || singular_values.iter().any(|v| !v.is_finite())
    {
        return Err(DataError::NonFiniteMatrix.into());
    }
    model.check_components(components)?;
    Ok(())
}

/// Replace the amplitudes in `flat` with the linear least-squares optimum for
/// its decay constants.
fn warm_start_amplitudes(
    flat: &mut DVector<f64>,
    components: &ComponentSet,
    time_delays: &[f64],
    targets: &DMatrix<f64>,
    model: &DecayModel,
) {
    let n = components.len();
    let taus: Vec<f64> = flat.rows(0, n).iter().copied().collect();
    let g = match model.basis_matrix(time_delays, &taus, components) {
        Ok(g) => g,
        Err(e) => {
            log::warn!("amplitude warm start skipped: {e}");
            return;
        }
    };
    for i in 0..n {
        let y = targets.row(i).transpose();
        match solve_least_squares(&g, &y) {
            Some(amps) => flat.rows_mut(n + i * n, n).copy_from(&amps),
            None => log::warn!("amplitude warm start: basis is singular for vector {i}"),
        }
    }
}

fn run_levenberg_marquardt(
    mut problem: GlobalFitProblem<'_>,
    start: DVector<f64>,
    opts: &FitOptions,
) -> Result<(DVector<f64>, FitDiagnostics), FitError> {
    let method = FitMethod::LevenbergMarquardt;
    problem.set_current(start);

    let mut solver = LevenbergMarquardt::new()
        .with_ftol(opts.tolerance)
        .with_xtol(opts.tolerance);
    if opts.max_evaluations > 0 {
        let p = problem.current().len();
        solver = solver.with_patience((opts.max_evaluations / (p + 1)).max(1));
    }

    let (problem, report) = solver.minimize(problem);
    let termination = format!("{:?}", report.termination);
    let success = report.termination.was_successful();

    if !success && !matches!(report.termination, TerminationReason::NoImprovementPossible(_)) {
        let cause = match problem.take_failure() {
            Some(e) => format!("{termination}: {e}"),
            None => termination,
        };
        return Err(FitError::new(method.name(), cause));
    }

    let params = problem.current().clone();
    let cost = problem
        .residual_vector(&params)
        .map(|r| 0.5 * r.norm_squared())
        .map_err(|e| FitError::new(method.name(), e.to_string()))?;

    Ok((
        params,
        FitDiagnostics {
            method,
            evaluations: report.number_of_evaluations,
            success,
            cost,
            termination,
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::UserModel;

    fn set(v: &[usize]) -> ComponentSet {
        ComponentSet::new(v.to_vec()).unwrap()
    }

    fn delays() -> Vec<f64> {
        (0..120).map(|i| i as f64 * 2.5).collect()
    }

    /// `AMPS[i][c]`: amplitude of component `c` (τ = `TAUS[c]`) in vector `i`.
    const TAUS: [f64; 2] = [20.0, 80.0];
    const AMPS: [[f64; 2]; 2] = [[1.0, 0.5], [-0.4, 0.9]];

    /// Two vectors built from `TAUS` and `AMPS`, sv = 1.
    fn synthetic(t: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
        let rv = DMatrix::from_fn(2, t.len(), |i, k| {
            AMPS[i][0] * (-t[k] / TAUS[0]).exp() + AMPS[i][1] * (-t[k] / TAUS[1]).exp()
        });
        (rv, DVector::from_vec(vec![1.0, 1.0]))
    }

    fn assert_close(got: f64, want: f64, what: &str) {
        assert!((got - want).abs() <= 1e-3 * want.abs(), "{what}: got {got}, want {want}");
    }

    fn seeded() -> InitialValues {
        InitialValues {
            time_constants: vec![10.0, 100.0],
            amplitudes: BTreeMap::from([(0, vec![0.8, 0.8]), (1, vec![-0.2, 0.5])]),
        }
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        let targets = vectors_to_fit(&rv, &sv);
        let components = set(&[0, 1]);
        let model = DecayModel::Standard;
        let x = DVector::from_vec(vec![15.0, 60.0, 0.9, 0.4, -0.3, 0.7]);
        let problem = GlobalFitProblem::new(&components, &t, &targets, &model, x.clone());

        let jac = problem.jacobian_matrix(&x).unwrap();
        let h = 1e-6;
        for p in 0..x.len() {
            let mut up = x.clone();
            let mut down = x.clone();
            up[p] += h;
            down[p] -= h;
            let numeric = (problem.residual_vector(&up).unwrap()
                - problem.residual_vector(&down).unwrap())
                / (2.0 * h);
            let diff = (numeric - jac.column(p)).amax();
            assert!(diff < 1e-6, "parameter {p}: {diff}");
        }
    }

    #[test]
    fn levenberg_marquardt_recovers_shared_decay_constants() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        let fit = fit_global(
            &rv,
            &sv,
            &set(&[0, 1]),
            &t,
            Some(&seeded()),
            &DecayModel::Standard,
            &FitOptions::default(),
        )
        .unwrap();

        for c in 0..2 {
            assert_close(fit.params.tau_of(c).unwrap(), TAUS[c], "tau");
            for i in 0..2 {
                assert_close(fit.params.amp_of(i, c).unwrap(), AMPS[i][c], "amplitude");
            }
        }
        assert!(fit.rms_residuals().iter().all(|r| *r < 1e-5));
        assert_eq!(fit.seed_source, SeedSource::UserValues);
    }

    #[test]
    fn reversed_component_order_recovers_the_same_parameters() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        // Retained vectors arrive in component-set order: row 0 is now the
        // vector of component 1.
        let reversed = DMatrix::from_fn(2, t.len(), |i, k| rv[(1 - i, k)]);
        let seeds = seeded();
        let initial = InitialValues {
            time_constants: seeds.time_constants.clone(),
            amplitudes: BTreeMap::from([
                (0, seeds.amplitudes[&1].clone()),
                (1, seeds.amplitudes[&0].clone()),
            ]),
        };

        let fit = fit_global(
            &reversed,
            &sv,
            &set(&[1, 0]),
            &t,
            Some(&initial),
            &DecayModel::Standard,
            &FitOptions::default(),
        )
        .unwrap();

        for c in 0..2 {
            assert_close(fit.params.tau_of(c).unwrap(), TAUS[c], "tau");
            for i in 0..2 {
                assert_close(fit.params.amp_of(i, c).unwrap(), AMPS[1 - i][c], "amplitude");
            }
        }
    }

    #[test]
    fn negative_tolerance_is_configuration_error() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        for tolerance in [-1.0, f64::NAN] {
            let opts = FitOptions {
                tolerance,
                ..FitOptions::default()
            };
            let err = fit_global(&rv, &sv, &set(&[0, 1]), &t, Some(&seeded()), &DecayModel::Standard, &opts)
                .unwrap_err();
            assert!(
                matches!(err, AnalysisError::Configuration(ConfigurationError::Invalid(_))),
                "{err:?}"
            );
        }
    }

    #[test]
    fn user_model_for_other_components_is_rejected() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        let user = DecayModel::UserDefined(
            UserModel::from_pairs(&[(0, "exp(-t/k0)"), (2, "exp(-t/k2)")], &set(&[0, 2])).unwrap(),
        );
        let err = fit_global(&rv, &sv, &set(&[0, 1]), &t, Some(&seeded()), &user, &FitOptions::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)), "{err:?}");
    }

    #[test]
    fn gauss_newton_with_amplitude_warm_start_converges() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        let opts = FitOptions {
            method: FitMethod::GaussNewton,
            solve_amplitudes: true,
            ..FitOptions::default()
        };
        let initial = InitialValues {
            time_constants: vec![15.0, 60.0],
            amplitudes: BTreeMap::from([(0, vec![0.0, 0.0]), (1, vec![0.0, 0.0])]),
        };
        let fit = fit_global(&rv, &sv, &set(&[0, 1]), &t, Some(&initial), &DecayModel::Standard, &opts)
            .unwrap();
        let taus = fit.params.taus();
        assert!((taus[0] - 20.0).abs() < 0.2, "{taus:?}");
        assert!((taus[1] - 80.0).abs() < 0.8, "{taus:?}");
        assert_eq!(fit.diagnostics.method, FitMethod::GaussNewton);
    }

    #[test]
    fn user_model_matching_standard_fits_the_same() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        let components = set(&[0, 1]);
        let user = DecayModel::UserDefined(
            UserModel::from_pairs(&[(0, "exp(-t/k0)"), (1, "exp(-t/k1)")], &components).unwrap(),
        );
        let opts = FitOptions::default();
        let a = fit_global(&rv, &sv, &components, &t, Some(&seeded()), &DecayModel::Standard, &opts)
            .unwrap();
        let b = fit_global(&rv, &sv, &components, &t, Some(&seeded()), &user, &opts).unwrap();
        for (x, y) in a.params.taus().iter().zip(b.params.taus()) {
            assert!((x - y).abs() < 1e-3 * x.abs());
        }
    }

    #[test]
    fn mismatched_time_axis_is_data_error() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        let err = fit_global(
            &rv,
            &sv,
            &set(&[0, 1]),
            &t[..10],
            None,
            &DecayModel::Standard,
            &FitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Data(DataError::AxisMismatch { .. })));
    }

    #[test]
    fn zero_initial_decay_constant_is_fit_error() {
        let t = delays();
        let (rv, sv) = synthetic(&t);
        let initial = InitialValues {
            time_constants: vec![0.0, 50.0],
            amplitudes: BTreeMap::from([(0, vec![1.0, 1.0]), (1, vec![1.0, 1.0])]),
        };
        let err = fit_global(
            &rv,
            &sv,
            &set(&[0, 1]),
            &t,
            Some(&initial),
            &DecayModel::Standard,
            &FitOptions::default(),
        )
        .unwrap_err();
        match err {
            AnalysisError::Fit(e) => {
                assert!(e.cause.contains("division by zero"), "{}", e.cause);
                assert!(e.to_string().contains("another fit method"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
