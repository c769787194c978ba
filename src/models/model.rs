//! Decay model evaluation.
//!
//! Every model in this crate is linear in its amplitudes:
//!
//! ```text
//! signal(t) = Σ_c a_c · g_c(t; τ)
//! ```
//!
//! so the fitter only needs two primitives from a model:
//! - the basis matrix `G[t, c] = g_c(t; τ)` (for residuals)
//! - its derivative with respect to one decay constant (for the Jacobian)
//!
//! The standard model uses `g_c = exp(-t/τ_c)`. The user-defined model uses
//! one compiled expression per component.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::domain::{ComponentSet, TargetModelText};
use crate::error::{AnalysisError, ConfigurationError, NumericError};
use crate::math::{DecayFault, exp_decay, exp_decay_dtau};
use crate::models::expr::{CompiledSummand, EvalFault, compile_summand};

/// Compiled user-defined target model, one summand per retained component.
#[derive(Debug, Clone, PartialEq)]
pub struct UserModel {
    summands: Vec<CompiledSummand>,
}

impl UserModel {
    /// Compile the summands for every component in `components`.
    ///
    /// Fails on the first component whose summand is missing or invalid.
    pub fn compile(
        text: &TargetModelText,
        components: &ComponentSet,
    ) -> Result<Self, ConfigurationError> {
        let summands = components
            .iter()
            .map(|component| {
                let source = text
                    .summands
                    .get(&component)
                    .ok_or(ConfigurationError::MissingSummand { component })?;
                compile_summand(source, component, components)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { summands })
    }

    /// Build from explicit `component -> expression` pairs.
    pub fn from_pairs(
        pairs: &[(usize, &str)],
        components: &ComponentSet,
    ) -> Result<Self, ConfigurationError> {
        let summands: BTreeMap<usize, String> =
            pairs.iter().map(|(c, s)| (*c, s.to_string())).collect();
        Self::compile(&TargetModelText { summands }, components)
    }

    pub fn summands(&self) -> &[CompiledSummand] {
        &self.summands
    }
}

/// Decay model used as the residual model of the global fit.
///
/// Selected once at fit setup; callers never branch on it again.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DecayModel {
    /// `Σ_c a_c · exp(-t/τ_c)`
    #[default]
    Standard,
    UserDefined(UserModel),
}

impl DecayModel {
    /// Choose the model from optional target-model text.
    pub fn from_target(
        text: Option<&TargetModelText>,
        components: &ComponentSet,
    ) -> Result<Self, ConfigurationError> {
        match text {
            None => Ok(DecayModel::Standard),
            Some(text) => Ok(DecayModel::UserDefined(UserModel::compile(text, components)?)),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DecayModel::Standard => "sum of exponentials",
            DecayModel::UserDefined(_) => "user-defined target model",
        }
    }

    /// Human-readable form of the summand of component position `slot`.
    pub fn describe_summand(&self, slot: usize, component: usize) -> String {
        match self {
            DecayModel::Standard => format!("exp(-t/k{component})"),
            DecayModel::UserDefined(model) => match model.summands.get(slot) {
                Some(summand) => summand.expr.to_string(),
                None => format!("<no summand for component {component}>"),
            },
        }
    }

    /// Check that `components` matches what this model was compiled for.
    pub fn check_components(&self, components: &ComponentSet) -> Result<(), ConfigurationError> {
        if let DecayModel::UserDefined(model) = self {
            let compiled: Vec<usize> = model.summands.iter().map(|s| s.component).collect();
            if compiled.as_slice() != components.as_slice() {
                return Err(ConfigurationError::Invalid(format!(
                    "target model was compiled for components {compiled:?} but was called with {components}"
                )));
            }
        }
        Ok(())
    }

    fn check_arguments(&self, taus: &[f64], components: &ComponentSet) -> Result<(), ConfigurationError> {
        if taus.len() != components.len() {
            return Err(ConfigurationError::LengthMismatch {
                what: "decay constants".to_string(),
                expected: components.len(),
                actual: taus.len(),
            });
        }
        self.check_components(components)
    }

    /// Basis matrix `G[t, c]` (time delays × components).
    pub fn basis(
        &self,
        time_delays: &[f64],
        taus: &[f64],
        components: &ComponentSet,
    ) -> Result<DMatrix<f64>, AnalysisError> {
        self.check_arguments(taus, components)?;
        Ok(self.basis_matrix(time_delays, taus, components)?)
    }

    /// `∂G/∂τ[wrt]` (time delays × components).
    pub fn basis_dtau(
        &self,
        time_delays: &[f64],
        taus: &[f64],
        components: &ComponentSet,
        wrt: usize,
    ) -> Result<DMatrix<f64>, AnalysisError> {
        self.check_arguments(taus, components)?;
        if wrt >= taus.len() {
            return Err(ConfigurationError::Invalid(format!(
                "derivative requested for decay constant {wrt} but only {} exist",
                taus.len()
            ))
            .into());
        }
        Ok(self.basis_derivative(time_delays, taus, components, wrt)?)
    }

    /// `signal(t) = Σ_c amplitudes[c] · g_c(t; τ)`.
    pub fn evaluate(
        &self,
        time_delays: &[f64],
        amplitudes: &[f64],
        taus: &[f64],
        components: &ComponentSet,
    ) -> Result<DVector<f64>, AnalysisError> {
        self.check_arguments(taus, components)?;
        if amplitudes.len() != components.len() {
            return Err(ConfigurationError::LengthMismatch {
                what: "amplitudes".to_string(),
                expected: components.len(),
                actual: amplitudes.len(),
            }
            .into());
        }
        let g = self.basis_matrix(time_delays, taus, components)?;
        let signal = g * DVector::from_column_slice(amplitudes);
        if signal.iter().all(|v| v.is_finite()) {
            Ok(signal)
        } else {
            Err(NumericError::NonFinite {
                context: "decay model signal".to_string(),
            }
            .into())
        }
    }

    /// [`DecayModel::basis`] for arguments already checked by the caller.
    pub(crate) fn basis_matrix(
        &self,
        time_delays: &[f64],
        taus: &[f64],
        components: &ComponentSet,
    ) -> Result<DMatrix<f64>, NumericError> {
        let mut g = DMatrix::zeros(time_delays.len(), taus.len());
        for (c, component) in components.iter().enumerate().take(taus.len()) {
            for (r, &t) in time_delays.iter().enumerate() {
                g[(r, c)] = match self {
                    DecayModel::Standard => exp_decay(t, taus[c])
                        .map_err(|fault| decay_fault(fault, component, "decay model"))?,
                    DecayModel::UserDefined(model) => model.summands[c]
                        .expr
                        .eval(t, taus)
                        .map_err(|fault| eval_fault(fault, component))?,
                };
            }
        }
        Ok(g)
    }

    /// [`DecayModel::basis_dtau`] for arguments already checked by the caller.
    pub(crate) fn basis_derivative(
        &self,
        time_delays: &[f64],
        taus: &[f64],
        components: &ComponentSet,
        wrt: usize,
    ) -> Result<DMatrix<f64>, NumericError> {
        let mut d = DMatrix::zeros(time_delays.len(), taus.len());
        match self {
            DecayModel::Standard => {
                // Only the summand that owns τ[wrt] depends on it.
                let component = components.as_slice()[wrt];
                for (r, &t) in time_delays.iter().enumerate() {
                    d[(r, wrt)] = exp_decay_dtau(t, taus[wrt])
                        .map_err(|fault| decay_fault(fault, component, "decay model derivative"))?;
                }
            }
            DecayModel::UserDefined(model) => {
                for (c, summand) in model.summands.iter().enumerate() {
                    for (r, &t) in time_delays.iter().enumerate() {
                        d[(r, c)] = summand
                            .expr
                            .eval_dual(t, taus, wrt)
                            .map_err(|fault| eval_fault(fault, summand.component))?
                            .deriv;
                    }
                }
            }
        }
        Ok(d)
    }
}

fn decay_fault(fault: DecayFault, component: usize, context: &str) -> NumericError {
    match fault {
        DecayFault::ZeroTau => NumericError::ZeroDecayConstant { component },
        DecayFault::NonFinite => NumericError::NonFinite {
            context: format!("{context} for component {component}"),
        },
    }
}

fn eval_fault(fault: EvalFault, component: usize) -> NumericError {
    let context = format!("target model summand of component {component}");
    match fault {
        EvalFault::DivisionByZero => NumericError::DivisionByZero { context },
        EvalFault::NonFinite => NumericError::NonFinite { context },
        EvalFault::UnboundDecayConstant { component: missing } => NumericError::NonFinite {
            context: format!("{context}: no value for k{missing}"),
        },
    }
}
