//! Synthetic TA data generation.
//!
//! Each component is a Gaussian band in wavelength that decays as
//! `exp(-t/τ)`. A single "pump" excitation is drawn once per component
//! (Gaussian + pump noise) and reused at every time delay; probe noise is
//! added to every matrix element.
//!
//! Determinism: all randomness comes from a `StdRng` seeded with
//! [`SimulationConfig::seed`], so the same configuration always produces the
//! same data set.

use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::domain::TaData;
use crate::error::{AnalysisError, ConfigurationError};

/// Standard deviation of the base noise distribution; noise scales multiply it.
const NOISE_STD: f64 = 2.0;

/// One simulated spectral component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimComponent {
    pub amplitude: f64,
    /// Band centre (nm).
    pub center: f64,
    /// Band standard deviation (nm).
    pub width: f64,
    /// Decay constant (ps).
    pub tau: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub wavelength_range: (f64, f64),
    pub wavelength_step: f64,
    pub time_range: (f64, f64),
    pub time_step: f64,
    pub components: Vec<SimComponent>,
    pub pump_noise: f64,
    pub probe_noise: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            wavelength_range: (400.0, 700.0),
            wavelength_step: 2.0,
            time_range: (0.0, 400.0),
            time_step: 2.0,
            components: vec![
                SimComponent {
                    amplitude: 1.0,
                    center: 480.0,
                    width: 25.0,
                    tau: 20.0,
                },
                SimComponent {
                    amplitude: 0.6,
                    center: 600.0,
                    width: 40.0,
                    tau: 80.0,
                },
            ],
            pump_noise: 0.0,
            probe_noise: 0.0,
            seed: 42,
        }
    }
}

/// `n` evenly spaced points over `range`, `n = floor((end - start) / step)`.
fn steps(range: (f64, f64), step: f64, what: &str) -> Result<Vec<f64>, ConfigurationError> {
    let (start, end) = range;
    if !(start.is_finite() && end.is_finite() && step.is_finite() && step > 0.0 && end > start) {
        return Err(ConfigurationError::Invalid(format!(
            "invalid {what} range [{start}, {end}] with step {step}"
        )));
    }
    let n = ((end - start) / step) as usize;
    if n < 2 {
        return Err(ConfigurationError::Invalid(format!(
            "{what} range [{start}, {end}] with step {step} gives fewer than 2 samples"
        )));
    }
    let spacing = (end - start) / (n as f64 - 1.0);
    Ok((0..n).map(|i| start + spacing * i as f64).collect())
}

fn gaussian(amplitude: f64, x: f64, center: f64, width: f64) -> f64 {
    amplitude * (-(x - center).powi(2) / (2.0 * width * width)).exp()
}

/// Generate a synthetic data set.
pub fn simulate(config: &SimulationConfig) -> Result<TaData, AnalysisError> {
    if config.components.is_empty() {
        return Err(ConfigurationError::Invalid("simulation needs at least one component".into()).into());
    }
    for (i, c) in config.components.iter().enumerate() {
        if !(c.tau.is_finite() && c.tau > 0.0 && c.width.is_finite() && c.width > 0.0) {
            return Err(ConfigurationError::Invalid(format!(
                "simulated component {i}: decay constant and width must be positive"
            ))
            .into());
        }
    }
    if !(config.pump_noise >= 0.0 && config.probe_noise >= 0.0) {
        return Err(ConfigurationError::Invalid("noise scales must be >= 0".into()).into());
    }

    let wavelengths = steps(config.wavelength_range, config.wavelength_step, "wavelength")?;
    let time_delays = steps(config.time_range, config.time_step, "time")?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, NOISE_STD)
        .map_err(|e| ConfigurationError::Invalid(format!("noise distribution error: {e}")))?;

    let spectra: Vec<Vec<f64>> = config
        .components
        .iter()
        .map(|c| {
            wavelengths
                .iter()
                .map(|&w| gaussian(c.amplitude, w, c.center, c.width) + config.pump_noise * normal.sample(&mut rng))
                .collect()
        })
        .collect();

    let mut matrix = DMatrix::zeros(wavelengths.len(), time_delays.len());
    for (c, spectrum) in config.components.iter().zip(&spectra) {
        for (t, &delay) in time_delays.iter().enumerate() {
            let decay = (-delay / c.tau).exp();
            for (w, &s) in spectrum.iter().enumerate() {
                matrix[(w, t)] += s * decay + config.probe_noise * normal.sample(&mut rng);
            }
        }
    }

    log::info!(
        "simulated {} components on {} wavelengths x {} time delays (seed {})",
        config.components.len(),
        wavelengths.len(),
        time_delays.len(),
        config.seed
    );

    Ok(TaData::new(matrix, time_delays, wavelengths)?)
}
