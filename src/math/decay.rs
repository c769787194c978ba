//! Exponential decay primitives.
//!
//! The single building block of every model in this crate is
//!
//! - `g(t, τ) = exp(-t/τ)`
//! - `∂g/∂τ = g(t, τ) · t / τ²`
//!
//! Numerical notes:
//! - `τ = 0` is a division by zero and is reported, never turned into inf/NaN.
//! - For `t/τ` large and positive, `exp` underflows to 0. That is a legitimate
//!   value (a fully decayed component), not an error.
//! - Negative `τ` with large `t` overflows to `inf`; that is reported.

/// Why a decay term could not be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayFault {
    ZeroTau,
    NonFinite,
}

/// `exp(-t/τ)` with the pathologies above reported as [`DecayFault`].
pub fn exp_decay(t: f64, tau: f64) -> Result<f64, DecayFault> {
    if tau == 0.0 {
        return Err(DecayFault::ZeroTau);
    }
    let v = (-t / tau).exp();
    if v.is_finite() { Ok(v) } else { Err(DecayFault::NonFinite) }
}

/// `∂/∂τ exp(-t/τ)`.
pub fn exp_decay_dtau(t: f64, tau: f64) -> Result<f64, DecayFault> {
    let g = exp_decay(t, tau)?;
    let d = g * t / (tau * tau);
    if d.is_finite() { Ok(d) } else { Err(DecayFault::NonFinite) }
}

/// Evaluate `exp(-t/τ)` over a whole time axis.
pub fn decay_trace(time_delays: &[f64], tau: f64) -> Result<Vec<f64>, DecayFault> {
    time_delays.iter().map(|&t| exp_decay(t, tau)).collect()
}
