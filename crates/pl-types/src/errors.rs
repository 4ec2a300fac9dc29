use thiserror::Error;

/// Main error type for PortLens
#[derive(Error, Debug)]
pub enum PlError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Optimization error: {0}")]
    Optimization(#[from] OptimizationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlError {
    /// True for failures that concern a single symbol's history rather than
    /// the collaborator itself. Portfolio-wide analyses skip such symbols
    /// instead of aborting.
    pub fn is_symbol_data_issue(&self) -> bool {
        matches!(
            self,
            PlError::Data(DataError::InsufficientData { .. })
                | PlError::Data(DataError::SymbolNotFound { .. })
        )
    }
}

/// Market-data errors raised by collaborators or by estimation
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("Insufficient data for {symbol}: need {required} observations, have {available}")]
    InsufficientData {
        symbol: String,
        required: usize,
        available: usize,
    },

    #[error("Data fetch failed for {symbol}: {message}")]
    FetchFailed { symbol: String, message: String },

    #[error("Data source not found: {0}")]
    SourceNotFound(String),

    #[error("Data parsing error: {message}")]
    ParseError { message: String },
}

/// Optimizer input errors. Non-convergence is reported on the result, not here.
#[derive(Error, Debug)]
pub enum OptimizationError {
    #[error("No symbols supplied for optimization")]
    NoSymbols,

    #[error("Infeasible weight bounds: {assets} assets cannot sum to 1 within [{min_weight}, {max_weight}]")]
    InfeasibleBounds {
        assets: usize,
        min_weight: f64,
        max_weight: f64,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type alias for PortLens operations
pub type PlResult<T> = Result<T, PlError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::PlError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::PlError::Config(format!($($arg)*))
    };
}
