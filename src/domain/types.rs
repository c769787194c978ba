//! Shared domain types.
//!
//! These types are kept small and immutable so they can be:
//!
//! - passed between the SVD, fit and reconstruction stages without copying state
//! - exported to JSON at the collaborator boundary
//! - rebuilt from a saved fit file for what-if reconstructions

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, DataError};

/// Ordered, duplicate-free list of SVD component indices.
///
/// The order is significant: position `i` in the set is the row of the
/// retained right singular vectors, the column of the retained left singular
/// vectors and the `rSV<i>` index of amplitude parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct ComponentSet(Vec<usize>);

impl ComponentSet {
    pub fn new(indices: Vec<usize>) -> Result<Self, ConfigurationError> {
        if indices.is_empty() {
            return Err(ConfigurationError::EmptyComponentSet);
        }
        for (i, &c) in indices.iter().enumerate() {
            if indices[..i].contains(&c) {
                return Err(ConfigurationError::DuplicateComponent { component: c });
            }
        }
        Ok(Self(indices))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Position of `component` within the set.
    pub fn position(&self, component: usize) -> Option<usize> {
        self.0.iter().position(|&c| c == component)
    }
}

impl TryFrom<Vec<usize>> for ComponentSet {
    type Error = ConfigurationError;

    fn try_from(value: Vec<usize>) -> Result<Self, Self::Error> {
        ComponentSet::new(value)
    }
}

impl From<ComponentSet> for Vec<usize> {
    fn from(value: ComponentSet) -> Self {
        value.0
    }
}

impl FromStr for ComponentSet {
    type Err = ConfigurationError;

    /// Parse `"0,1,3"` (whitespace tolerant).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let idx = part.parse::<usize>().map_err(|_| {
                ConfigurationError::Invalid(format!("invalid component index '{part}'"))
            })?;
            out.push(idx);
        }
        ComponentSet::new(out)
    }
}

impl fmt::Display for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// The subset of an SVD selected by a [`ComponentSet`].
#[derive(Debug, Clone)]
pub struct RetainedSvd {
    pub components: ComponentSet,
    /// `wavelengths × components`
    pub left_vectors: DMatrix<f64>,
    pub singular_values: DVector<f64>,
    /// `components × time delays`
    pub right_vectors: DMatrix<f64>,
}

/// A transient absorption data set.
#[derive(Debug, Clone, PartialEq)]
pub struct TaData {
    /// `wavelengths × time delays`
    pub matrix: DMatrix<f64>,
    /// Time delays in ps.
    pub time_delays: Vec<f64>,
    /// Wavelengths in nm.
    pub wavelengths: Vec<f64>,
}

impl TaData {
    /// Build a data set, checking both axes against the matrix.
    pub fn new(
        matrix: DMatrix<f64>,
        time_delays: Vec<f64>,
        wavelengths: Vec<f64>,
    ) -> Result<Self, DataError> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(DataError::EmptyMatrix);
        }
        if wavelengths.len() != matrix.nrows() {
            return Err(DataError::AxisMismatch {
                axis: "wavelength",
                expected: matrix.nrows(),
                actual: wavelengths.len(),
            });
        }
        if time_delays.len() != matrix.ncols() {
            return Err(DataError::AxisMismatch {
                axis: "time delay",
                expected: matrix.ncols(),
                actual: time_delays.len(),
            });
        }
        Ok(Self {
            matrix,
            time_delays,
            wavelengths,
        })
    }
}

/// Typed key of a fit parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKey {
    /// Decay constant of a component, shared by every fitted vector.
    Tau { component: usize },
    /// Amplitude of `component` in the model of fitted vector `vector`.
    Amplitude { vector: usize, component: usize },
}

impl ParamKey {
    /// Serialized name (`tau_component3`, `amp_rSV0_component3`).
    pub fn name(&self) -> String {
        match self {
            ParamKey::Tau { component } => format!("tau_component{component}"),
            ParamKey::Amplitude { vector, component } => {
                format!("amp_rSV{vector}_component{component}")
            }
        }
    }

    /// Inverse of [`ParamKey::name`].
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(rest) = name.strip_prefix("tau_component") {
            return rest.parse().ok().map(|component| ParamKey::Tau { component });
        }
        let rest = name.strip_prefix("amp_rSV")?;
        let (vector, component) = rest.split_once("_component")?;
        Some(ParamKey::Amplitude {
            vector: vector.parse().ok()?,
            component: component.parse().ok()?,
        })
    }
}

/// Result parameters of one global fit.
///
/// Layout of the flat parameter vector used by the solvers:
/// `[τ_0 .. τ_{n-1}, a_{0,0} .. a_{0,n-1}, a_{1,0} .. a_{n-1,n-1}]` where
/// `a_{i,j}` is the amplitude of component position `j` in vector `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct FitParameterSet {
    components: ComponentSet,
    taus: Vec<f64>,
    /// `vectors × components`
    amplitudes: DMatrix<f64>,
}

impl FitParameterSet {
    pub fn from_parts(
        components: ComponentSet,
        taus: Vec<f64>,
        amplitudes: DMatrix<f64>,
    ) -> Result<Self, ConfigurationError> {
        let n = components.len();
        if taus.len() != n {
            return Err(ConfigurationError::LengthMismatch {
                what: "decay constants".to_string(),
                expected: n,
                actual: taus.len(),
            });
        }
        if amplitudes.nrows() != n || amplitudes.ncols() != n {
            return Err(ConfigurationError::LengthMismatch {
                what: "amplitude matrix entries".to_string(),
                expected: n * n,
                actual: amplitudes.len(),
            });
        }
        Ok(Self {
            components,
            taus,
            amplitudes,
        })
    }

    /// Number of entries in the flat parameter vector for `n` components.
    pub fn flat_len(n: usize) -> usize {
        n + n * n
    }

    pub(crate) fn from_flat(components: ComponentSet, flat: &DVector<f64>) -> Self {
        let n = components.len();
        let taus = flat.rows(0, n).iter().copied().collect();
        let amplitudes = DMatrix::from_fn(n, n, |i, j| flat[n + i * n + j]);
        Self {
            components,
            taus,
            amplitudes,
        }
    }

    pub(crate) fn to_flat(&self) -> DVector<f64> {
        let n = self.components.len();
        let mut flat = DVector::zeros(Self::flat_len(n));
        for j in 0..n {
            flat[j] = self.taus[j];
        }
        for i in 0..n {
            for j in 0..n {
                flat[n + i * n + j] = self.amplitudes[(i, j)];
            }
        }
        flat
    }

    /// Rebuild from serialized names (e.g. a saved fit file).
    pub fn from_named(
        components: ComponentSet,
        named: &BTreeMap<String, f64>,
    ) -> Result<Self, ConfigurationError> {
        let n = components.len();
        let mut taus = Vec::with_capacity(n);
        let mut amplitudes = DMatrix::zeros(n, n);
        for (j, component) in components.iter().enumerate() {
            let key = ParamKey::Tau { component }.name();
            let tau = named
                .get(&key)
                .copied()
                .ok_or(ConfigurationError::MissingParameter(key))?;
            taus.push(tau);
            for i in 0..n {
                let key = ParamKey::Amplitude { vector: i, component }.name();
                amplitudes[(i, j)] = named
                    .get(&key)
                    .copied()
                    .ok_or(ConfigurationError::MissingParameter(key))?;
            }
        }
        Ok(Self {
            components,
            taus,
            amplitudes,
        })
    }

    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    /// Decay constants in component-set order.
    pub fn taus(&self) -> &[f64] {
        &self.taus
    }

    pub fn amplitudes(&self) -> &DMatrix<f64> {
        &self.amplitudes
    }

    pub fn tau_of(&self, component: usize) -> Option<f64> {
        self.components.position(component).map(|j| self.taus[j])
    }

    pub fn amp_of(&self, vector: usize, component: usize) -> Option<f64> {
        let j = self.components.position(component)?;
        (vector < self.amplitudes.nrows()).then(|| self.amplitudes[(vector, j)])
    }

    pub fn get(&self, key: ParamKey) -> Option<f64> {
        match key {
            ParamKey::Tau { component } => self.tau_of(component),
            ParamKey::Amplitude { vector, component } => self.amp_of(vector, component),
        }
    }

    /// Amplitudes of fitted vector `vector`, in component-set order.
    pub fn amplitudes_for_vector(&self, vector: usize) -> Vec<f64> {
        self.amplitudes.row(vector).iter().copied().collect()
    }

    /// All parameters in a stable order: taus first, then amplitudes by vector.
    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, f64)> + '_ {
        let n = self.components.len();
        let taus = self
            .components
            .iter()
            .enumerate()
            .map(|(j, component)| (ParamKey::Tau { component }, self.taus[j]));
        let amps = (0..n).flat_map(move |i| {
            self.components.iter().enumerate().map(move |(j, component)| {
                (ParamKey::Amplitude { vector: i, component }, self.amplitudes[(i, j)])
            })
        });
        taus.chain(amps)
    }

    pub fn to_named(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(k, v)| (k.name(), v)).collect()
    }
}

/// Initial parameter values as supplied by the user.
///
/// JSON shape: `{"time_constants": [..], "amps_rSV0": [..], "amps_rSV1": [..]}`.
/// Every list is indexed by *component number*, not by position in the
/// component set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<f64>>", into = "BTreeMap<String, Vec<f64>>")]
pub struct InitialValues {
    pub time_constants: Vec<f64>,
    /// `rSV` index → amplitude list.
    pub amplitudes: BTreeMap<usize, Vec<f64>>,
}

impl InitialValues {
    /// Length of the shortest value list.
    pub fn min_len(&self) -> usize {
        self.amplitudes
            .values()
            .map(Vec::len)
            .chain(std::iter::once(self.time_constants.len()))
            .min()
            .unwrap_or(0)
    }
}

impl TryFrom<BTreeMap<String, Vec<f64>>> for InitialValues {
    type Error = ConfigurationError;

    fn try_from(map: BTreeMap<String, Vec<f64>>) -> Result<Self, Self::Error> {
        let mut out = InitialValues::default();
        for (key, values) in map {
            if key == "time_constants" {
                out.time_constants = values;
            } else if let Some(idx) = key.strip_prefix("amps_rSV") {
                let idx = idx.parse::<usize>().map_err(|_| {
                    ConfigurationError::InitialValues(format!("invalid key '{key}'"))
                })?;
                out.amplitudes.insert(idx, values);
            } else {
                return Err(ConfigurationError::InitialValues(format!(
                    "unexpected key '{key}' (expected 'time_constants' or 'amps_rSV<i>')"
                )));
            }
        }
        Ok(out)
    }
}

impl From<InitialValues> for BTreeMap<String, Vec<f64>> {
    fn from(value: InitialValues) -> Self {
        let mut map = BTreeMap::new();
        map.insert("time_constants".to_string(), value.time_constants);
        for (idx, values) in value.amplitudes {
            map.insert(format!("amps_rSV{idx}"), values);
        }
        map
    }
}

/// User-defined target model text, one summand per component.
///
/// JSON shape: `{"summand_component0": "exp(-t/k0)", ...}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct TargetModelText {
    pub summands: BTreeMap<usize, String>,
}

impl TryFrom<BTreeMap<String, String>> for TargetModelText {
    type Error = ConfigurationError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut summands = BTreeMap::new();
        for (key, text) in map {
            let component = key
                .strip_prefix("summand_component")
                .and_then(|c| c.parse::<usize>().ok())
                .ok_or_else(|| {
                    ConfigurationError::Invalid(format!(
                        "unexpected target model key '{key}' (expected 'summand_component<N>')"
                    ))
                })?;
            summands.insert(component, text);
        }
        Ok(Self { summands })
    }
}

impl From<TargetModelText> for BTreeMap<String, String> {
    fn from(value: TargetModelText) -> Self {
        value
            .summands
            .into_iter()
            .map(|(c, text)| (format!("summand_component{c}"), text))
            .collect()
    }
}

/// Nonlinear least-squares method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitMethod {
    #[default]
    LevenbergMarquardt,
    GaussNewton,
}

impl FitMethod {
    pub fn name(self) -> &'static str {
        match self {
            FitMethod::LevenbergMarquardt => "leastsq",
            FitMethod::GaussNewton => "gauss-newton",
        }
    }
}

impl FromStr for FitMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leastsq" | "lm" | "levenberg-marquardt" | "levenberg_marquardt" => {
                Ok(FitMethod::LevenbergMarquardt)
            }
            "gauss-newton" | "gauss_newton" | "gn" => Ok(FitMethod::GaussNewton),
            _ => Err(ConfigurationError::UnknownFitMethod(s.to_string())),
        }
    }
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options that affect how the global fit is run.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub method: FitMethod,
    /// Replace seeded amplitudes with the linear least-squares optimum for the
    /// seeded decay constants before the nonlinear solve.
    pub solve_amplitudes: bool,
    /// Upper bound on residual evaluations (0 = solver default).
    pub max_evaluations: usize,
    /// Relative tolerance for convergence tests.
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: FitMethod::LevenbergMarquardt,
            solve_amplitudes: false,
            max_evaluations: 0,
            tolerance: 1e-10,
        }
    }
}

impl FitOptions {
    /// Reject settings the solvers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigurationError::Invalid(format!(
                "fit tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Where the starting parameters of a fit came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedSource {
    UserValues,
    /// Built-in defaults (τ = 50, amplitude = 0.7) were used instead.
    Defaults { reason: String },
}

/// Solver diagnostics of one fit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub method: FitMethod,
    pub evaluations: usize,
    pub success: bool,
    /// `0.5 * Σ r²` at the returned parameters.
    pub cost: f64,
    pub termination: String,
}

/// A full analysis run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub data_path: PathBuf,
    pub start_time: Option<f64>,
    pub components: ComponentSet,
    pub initial_values: Option<PathBuf>,
    pub target_model: Option<PathBuf>,
    pub fit: FitOptions,
    pub export_dir: Option<PathBuf>,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}

/// A saved fit file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub data_file: Option<String>,
    pub start_time: f64,
    pub components: ComponentSet,
    pub seed: SeedSource,
    pub diagnostics: FitDiagnostics,
    pub parameters: BTreeMap<String, f64>,
    /// Decay constants in component-set order.
    pub decay_constants: Vec<f64>,
    pub wavelengths: Vec<f64>,
    pub time_delays: Vec<f64>,
    /// DAS, one row per wavelength, one column per component.
    pub das: Vec<Vec<f64>>,
}
