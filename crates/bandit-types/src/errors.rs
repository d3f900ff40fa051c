use thiserror::Error;

/// Main error type for the bandit designer
#[derive(Error, Debug)]
pub enum BanditError {
    #[error("Seeding error: {message}")]
    Seeding { message: String },

    #[error("Model fit error: {0}")]
    ModelFit(#[from] ModelFitError),

    #[error("Acquisition error: {message}")]
    Acquisition { message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search space error: {0}")]
    SearchSpace(#[from] SearchSpaceError),

    #[error("Invalid trial {trial_id}: {message}")]
    InvalidTrial { trial_id: u64, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Seeding,
    ModelFit,
    AcquisitionOptimization,
    Input,
}

impl BanditError {
    /// Which stage of the suggest/update pipeline failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Seeding { .. } => Stage::Seeding,
            Self::ModelFit(_) => Stage::ModelFit,
            Self::Acquisition { .. } => Stage::AcquisitionOptimization,
            Self::Config(_) | Self::Serialization(_) | Self::Io(_) => Stage::Configuration,
            Self::SearchSpace(_) | Self::InvalidTrial { .. } => Stage::Input,
        }
    }
}

/// Surrogate model fitting errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelFitError {
    #[error("all {attempted} ensemble members failed to fit")]
    EmptyEnsemble { attempted: usize },

    #[error("kernel matrix of size {size} is not positive definite")]
    NotPositiveDefinite { size: usize },

    #[error("log marginal likelihood is not finite for every restart")]
    NonFiniteLikelihood,

    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Search space membership and decoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchSpaceError {
    #[error("Empty search space")]
    Empty,

    #[error("Parameter not found: {0}")]
    MissingParameter(String),

    #[error("Parameter {name} out of bounds: {value}")]
    OutOfBounds { name: String, value: String },

    #[error("Parameter {name} has the wrong type: {value}")]
    WrongType { name: String, value: String },

    #[error("Invalid range for {name}: {message}")]
    InvalidRange { name: String, message: String },
}

/// Result type alias for bandit designer operations
pub type BanditResult<T> = Result<T, BanditError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BanditError::Config(format!($($arg)*))
    };
}

/// Macro for creating seeding errors
#[macro_export]
macro_rules! seeding_error {
    ($($arg:tt)*) => {
        $crate::BanditError::Seeding { message: format!($($arg)*) }
    };
}

/// Macro for creating acquisition errors
#[macro_export]
macro_rules! acquisition_error {
    ($($arg:tt)*) => {
        $crate::BanditError::Acquisition { message: format!($($arg)*) }
    };
}
