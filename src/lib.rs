//! Stockcast - single-asset price forecasting trainer
//!
//! The crate turns a raw daily price series into tuned, persisted forecast
//! models:
//!
//! - [`data`] - leakage-safe feature engineering and chronological splits
//! - [`preprocessing`] - column scaling and calendar one-hot encoding
//! - [`models`] - the tree-ensemble and sequential-neural families behind
//!   one four-operation capability contract
//! - [`search`] - batched Bayesian hyperparameter search over
//!   rolling-origin folds
//! - [`train`] - the orchestrator tying dataset, search, and refit together
//! - [`artifact`] - the on-disk library of trained pipelines
//! - [`silence`] - scoped suppression of noisy estimator construction
//! - [`cli`] - command-line entry points

// Core error handling
pub mod error;

// Data and preprocessing
pub mod data;
pub mod preprocessing;

// Model families and tuning
pub mod models;
pub mod search;
pub mod silence;

// Orchestration and persistence
pub mod artifact;
pub mod train;

// Services
pub mod cli;

pub use error::{ForecastError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ForecastError, Result};

    // Data
    pub use crate::data::{load_csv, synthetic_series, Dataset, DEFAULT_TEST_PCT};

    // Preprocessing
    pub use crate::preprocessing::{CalendarEncoder, ColumnScaler};

    // Model families
    pub use crate::models::{
        Estimator, FamilyKind, FitDirectives, ModelDescriptor, ModelRegistry,
    };

    // Hyperparameter search
    pub use crate::search::{
        Parameter, RandomSampler, SearchDriver, SearchSpace, TpeSampler, TrialParams,
    };

    // Training and reporting
    pub use crate::train::{ModelTrain, Pipeline, TrainConfig, TrainReport};

    // Artifact library
    pub use crate::artifact::{ArtifactStore, TrainedArtifact};
}
