//! Error types.
//!
//! Two layers:
//!
//! - [`AnalysisError`]: the typed taxonomy returned by the library
//!   (configuration, numeric, fit and data failures)
//! - [`AppError`]: what the binary prints, with a process exit code
//!
//! Every `AnalysisError` converts into an `AppError`, so CLI code can use `?`
//! directly on library calls.

/// Guidance attached to every fit failure. These are the practical recovery
/// paths when a global fit does not converge.
pub const FIT_REMEDIATION: &str = "Maybe try it with another fit method, different initial fit parameter values, \
another start time or another set of components.";

/// Invalid user input detected before any expensive computation starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("component set is empty")]
    EmptyComponentSet,
    #[error("component {component} listed more than once in the component set")]
    DuplicateComponent { component: usize },
    #[error("component index {index} out of range: only {available} singular values available")]
    ComponentIndexOutOfRange { index: usize, available: usize },
    #[error("target model for component {component}: {message}")]
    InvalidModelExpression { component: usize, message: String },
    #[error("target model has no summand for component {component} (expected key 'summand_component{component}')")]
    MissingSummand { component: usize },
    #[error("{what}: expected {expected} entries, got {actual}")]
    LengthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
    #[error("initial fit parameter values: {0}")]
    InitialValues(String),
    #[error("unknown fit method '{0}' (known: leastsq, lm, levenberg-marquardt, gauss-newton, gn)")]
    UnknownFitMethod(String),
    #[error("missing fit parameter '{0}'")]
    MissingParameter(String),
    #[error("{0}")]
    Invalid(String),
}

/// Numerical pathologies (division by zero, overflow, non-finite values).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NumericError {
    #[error("division by zero: decay constant of component {component} is zero")]
    ZeroDecayConstant { component: usize },
    #[error("division by zero in {context}")]
    DivisionByZero { context: String },
    #[error("non-finite value in {context}")]
    NonFinite { context: String },
    #[error("reconstruction failed ({detail}); decay constants used: {decay_constants:?}")]
    Reconstruction {
        decay_constants: Vec<f64>,
        detail: String,
    },
}

/// Solver failure or non-convergence.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("global fit ({method}) failed: {cause}\n\n{remediation}")]
pub struct FitError {
    pub method: String,
    pub cause: String,
    pub remediation: &'static str,
}

impl FitError {
    pub fn new(method: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            cause: cause.into(),
            remediation: FIT_REMEDIATION,
        }
    }
}

/// Shape or content problems with the data matrix and its axes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("data matrix is empty")]
    EmptyMatrix,
    #[error("data matrix contains non-finite values")]
    NonFiniteMatrix,
    #[error("{axis} axis has {actual} samples but the matrix dimension is {expected}")]
    AxisMismatch {
        axis: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("matrix shape mismatch: {left_rows}x{left_cols} vs {right_rows}x{right_cols}")]
    ShapeMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },
    #[error("start time {start} ps outside the measured range [{min}, {max}] ps")]
    StartTimeOutOfRange { start: f64, min: f64, max: f64 },
    #[error("{axis} {value} outside the measured range [{min}, {max}]")]
    OutsideAxis {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{0}")]
    Malformed(String),
}

/// Library-level error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Numeric(#[from] NumericError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Data(#[from] DataError),
}

impl AnalysisError {
    /// Exit code used when this error terminates the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AnalysisError::Configuration(_) => 2,
            AnalysisError::Data(_) => 3,
            AnalysisError::Numeric(_) | AnalysisError::Fit(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
