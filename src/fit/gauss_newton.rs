//! Damped Gauss–Newton solver.
//!
//! Each iteration solves `J δ ≈ -r` with the SVD least-squares solver and
//! halves the step until the cost decreases.

use nalgebra::DVector;

use crate::domain::FitOptions;
use crate::error::NumericError;
use crate::fit::fitter::GlobalFitProblem;
use crate::math::solve_least_squares;

const DEFAULT_MAX_ITERATIONS: usize = 200;
const MAX_STEP_HALVINGS: usize = 30;

#[derive(Debug, Clone)]
pub(crate) struct GaussNewtonReport {
    pub evaluations: usize,
    pub converged: bool,
    pub cost: f64,
    pub termination: String,
}

fn cost_of(r: &DVector<f64>) -> f64 {
    0.5 * r.norm_squared()
}

pub(crate) fn minimize_gauss_newton(
    problem: &mut GlobalFitProblem<'_>,
    opts: &FitOptions,
) -> Result<GaussNewtonReport, NumericError> {
    let tol = opts.tolerance;
    let max_evaluations = if opts.max_evaluations > 0 {
        opts.max_evaluations
    } else {
        DEFAULT_MAX_ITERATIONS * (MAX_STEP_HALVINGS + 1)
    };

    let mut x = problem.current().clone();
    let mut r = problem.residual_vector(&x)?;
    let mut cost = cost_of(&r);
    let mut evaluations = 1;

    let report = |evaluations, converged, cost, termination: &str| GaussNewtonReport {
        evaluations,
        converged,
        cost,
        termination: termination.to_string(),
    };

    for iteration in 0..DEFAULT_MAX_ITERATIONS {
        if cost == 0.0 {
            problem.set_current(x);
            return Ok(report(evaluations, true, cost, "residuals are zero"));
        }

        let jac = problem.jacobian_matrix(&x)?;
        let step = solve_least_squares(&jac, &(-&r)).ok_or_else(|| NumericError::NonFinite {
            context: "Gauss-Newton step (Jacobian is singular)".to_string(),
        })?;

        let mut lambda = 1.0;
        let mut accepted = None;
        for _ in 0..=MAX_STEP_HALVINGS {
            if evaluations >= max_evaluations {
                break;
            }
            let candidate = &x + &step * lambda;
            evaluations += 1;
            if let Ok(r_new) = problem.residual_vector(&candidate) {
                let cost_new = cost_of(&r_new);
                if cost_new < cost {
                    accepted = Some((candidate, r_new, cost_new));
                    break;
                }
            }
            lambda *= 0.5;
        }

        let Some((x_new, r_new, cost_new)) = accepted else {
            problem.set_current(x);
            let reason = if evaluations >= max_evaluations {
                "evaluation limit reached"
            } else {
                "no improvement possible along the Gauss-Newton direction"
            };
            log::debug!("gauss-newton stopped at iteration {iteration}: {reason}");
            return Ok(report(evaluations, false, cost, reason));
        };

        let step_norm = (&x_new - &x).norm();
        let reduction = cost - cost_new;
        x = x_new;
        r = r_new;
        cost = cost_new;

        if reduction <= tol * cost.max(f64::MIN_POSITIVE) || step_norm <= tol * (x.norm() + tol) {
            problem.set_current(x);
            return Ok(report(evaluations, true, cost, "converged"));
        }
    }

    problem.set_current(x);
    Ok(report(evaluations, false, cost, "iteration limit reached"))
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::domain::ComponentSet;
    use crate::models::DecayModel;

    #[test]
    fn single_exponential_converges_from_nearby_seed() {
        let t: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let targets = DMatrix::from_fn(1, t.len(), |_, k| 2.0 * (-t[k] / 12.0).exp());
        let components = ComponentSet::new(vec![0]).unwrap();
        let model = DecayModel::Standard;
        let mut problem = GlobalFitProblem::new(
            &components,
            &t,
            &targets,
            &model,
            DVector::from_vec(vec![10.0, 1.5]),
        );
        let report = minimize_gauss_newton(&mut problem, &FitOptions::default()).unwrap();
        let x = problem.current();
        assert!(report.cost < 1e-12, "{report:?}");
        assert!((x[0] - 12.0).abs() < 1e-4);
        assert!((x[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn zero_decay_constant_seed_is_an_error() {
        let t = [0.0, 1.0, 2.0];
        let targets = DMatrix::from_element(1, 3, 1.0);
        let components = ComponentSet::new(vec![0]).unwrap();
        let model = DecayModel::Standard;
        let mut problem = GlobalFitProblem::new(
            &components,
            &t,
            &targets,
            &model,
            DVector::from_vec(vec![0.0, 1.0]),
        );
        assert!(minimize_gauss_newton(&mut problem, &FitOptions::default()).is_err());
    }
}
