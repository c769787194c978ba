//! Command-line parsing for the SVD + global fit analyser.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the numerical code.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use crate::domain::{ComponentSet, FitMethod};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "svdgf", version, about = "SVD + global fit of time-resolved spectroscopy data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the singular values of a data matrix.
    Svd(SvdArgs),
    /// Run SVD, global fit, DAS and reconstruction; print diagnostics and optionally export.
    Fit(FitArgs),
    /// Reconstruct a matrix from a saved fit, optionally dropping components or overriding decay constants.
    Reconstruct(ReconstructArgs),
    /// Plot a kinetic trace and/or a transient spectrum, optionally against a saved fit.
    Slice(SliceArgs),
    /// Write a synthetic data file.
    Simulate(SimulateArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct SvdArgs {
    /// Data file (first row wavelengths, first column time delays).
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: PathBuf,

    /// Drop time delays before the one closest to this value (ps).
    #[arg(short = 's', long)]
    pub start_time: Option<f64>,

    /// Number of singular values to list.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Data file (first row wavelengths, first column time delays).
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: PathBuf,

    /// Components to retain, e.g. `0,1,2`. Order is significant.
    #[arg(short = 'c', long)]
    pub components: ComponentSet,

    /// Drop time delays before the one closest to this value (ps).
    #[arg(short = 's', long)]
    pub start_time: Option<f64>,

    /// Initial fit parameter values (JSON: time_constants, amps_rSV<i>).
    #[arg(long, value_name = "JSON")]
    pub initial: Option<PathBuf>,

    /// User-defined target model (JSON: summand_component<N>).
    #[arg(long, value_name = "JSON")]
    pub model: Option<PathBuf>,

    /// Nonlinear least-squares method (leastsq, lm, gauss-newton, gn).
    #[arg(long, default_value = "leastsq")]
    pub method: FitMethod,

    /// Solve the amplitudes linearly for the initial decay constants before fitting.
    #[arg(long)]
    pub solve_amplitudes: bool,

    /// Maximum number of residual evaluations (0 = solver default).
    #[arg(long, default_value_t = 0)]
    pub max_evals: usize,

    /// Convergence tolerance.
    #[arg(long, default_value_t = 1e-10)]
    pub tolerance: f64,

    /// Write fit.json, das.txt, reconstructed.txt and difference.txt here.
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Render ASCII plots of each fitted vector against the model.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct ReconstructArgs {
    /// Data file the fit was run on.
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: PathBuf,

    /// Fit JSON written by `svdgf fit --export-dir`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,

    /// Fitted components to keep (default: all).
    #[arg(long)]
    pub keep: Option<ComponentSet>,

    /// Override a decay constant, e.g. `--tau 1=35.0`. Repeatable.
    #[arg(long = "tau", value_name = "C=VALUE")]
    pub taus: Vec<TauOverride>,

    /// Write the reconstructed matrix to this file.
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SliceArgs {
    /// Data file (first row wavelengths, first column time delays).
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: PathBuf,

    /// Fit JSON; its reconstruction is drawn over the data.
    #[arg(long, value_name = "JSON")]
    pub fit: Option<PathBuf>,

    /// Drop time delays before the one closest to this value (ps); ignored with `--fit`.
    #[arg(short = 's', long)]
    pub start_time: Option<f64>,

    /// Kinetic trace at the wavelength closest to this value (nm).
    #[arg(long, required_unless_present = "delay")]
    pub wavelength: Option<f64>,

    /// Transient spectrum at the time delay closest to this value (ps).
    #[arg(long)]
    pub delay: Option<f64>,

    /// Plot `data - reconstruction` instead (requires `--fit`).
    #[arg(long, requires = "fit")]
    pub difference: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output data file.
    #[arg(short = 'o', long, value_name = "FILE")]
    pub out: PathBuf,

    /// Simulation configuration (JSON); defaults to two components with τ = 20 and 80 ps.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Random seed (overrides the configuration).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Probe noise scale (overrides the configuration).
    #[arg(long)]
    pub probe_noise: Option<f64>,

    /// Pump noise scale (overrides the configuration).
    #[arg(long)]
    pub pump_noise: Option<f64>,
}

/// `component=value` decay constant override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TauOverride {
    pub component: usize,
    pub tau: f64,
}

impl FromStr for TauOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (component, tau) = s
            .split_once('=')
            .ok_or_else(|| format!("expected C=VALUE, got '{s}'"))?;
        let component = component
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("invalid component '{component}'"))?;
        let tau = tau
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("invalid decay constant '{tau}'"))?;
        Ok(Self { component, tau })
    }
}
