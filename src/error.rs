//! Error types for the stockcast trainer

use thiserror::Error;

/// Result type alias for stockcast operations
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Main error type for the trainer
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Unknown model family: {0}")]
    UnknownModel(String),

    #[error("Model build error: {0}")]
    ModelBuild(String),

    #[error("Search failure: {0}")]
    Search(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<polars::error::PolarsError> for ForecastError {
    fn from(err: polars::error::PolarsError) -> Self {
        ForecastError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for ForecastError {
    fn from(err: bincode::Error) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ForecastError {
    fn from(err: ndarray::ShapeError) -> Self {
        ForecastError::Data(err.to_string())
    }
}
