//! Run configuration with environment fallbacks

use std::env;

use crate::data::DEFAULT_TEST_PCT;
use crate::error::{ForecastError, Result};

/// Data, split, and search settings for one training run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub symbol: String,
    pub model_name: String,
    /// Years of history to keep from the raw series.
    pub span_years: u32,
    /// Fraction of rows assigned to the test partition.
    pub test_pct: f64,
    /// Total hyperparameter candidates to evaluate.
    pub budget: usize,
    /// Candidates proposed per search iteration.
    pub batch: usize,
    /// Rolling-origin validation folds.
    pub folds: usize,
    pub seed: u64,
}

impl TrainConfig {
    pub fn new(symbol: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            model_name: model_name.into(),
            span_years: 10,
            test_pct: DEFAULT_TEST_PCT,
            budget: 100,
            batch: 5,
            folds: 5,
            seed: 42,
        }
    }

    /// Build a config from `STOCK_SYMBOL`, `MODEL_NAME`, `DATA_YEARS`, and
    /// `PARAM_SAMPLES`. The first two are required.
    pub fn from_env() -> Result<Self> {
        let symbol = env::var("STOCK_SYMBOL").map_err(|_| {
            ForecastError::Configuration("STOCK_SYMBOL is not set".to_string())
        })?;
        let model_name = env::var("MODEL_NAME").map_err(|_| {
            ForecastError::Configuration("MODEL_NAME is not set".to_string())
        })?;

        let mut config = Self::new(symbol, model_name);
        if let Ok(raw) = env::var("DATA_YEARS") {
            config.span_years = raw.parse().map_err(|_| {
                ForecastError::Configuration(format!("DATA_YEARS must be an integer, got '{raw}'"))
            })?;
        }
        if let Ok(raw) = env::var("PARAM_SAMPLES") {
            config.budget = raw.parse().map_err(|_| {
                ForecastError::Configuration(format!(
                    "PARAM_SAMPLES must be an integer, got '{raw}'"
                ))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(ForecastError::Configuration(
                "symbol must not be empty".to_string(),
            ));
        }
        if self.model_name.trim().is_empty() {
            return Err(ForecastError::Configuration(
                "model name must not be empty".to_string(),
            ));
        }
        if self.span_years == 0 {
            return Err(ForecastError::Configuration(
                "history span must be at least one year".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.test_pct) || self.test_pct == 0.0 {
            return Err(ForecastError::Configuration(format!(
                "test percentage must be in (0, 1), got {}",
                self.test_pct
            )));
        }
        if self.budget == 0 || self.batch == 0 || self.folds == 0 {
            return Err(ForecastError::Configuration(
                "budget, batch, and folds must all be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_the_standard_run() {
        let config = TrainConfig::new("MSFT", "xgboost");
        assert_eq!(config.span_years, 10);
        assert_eq!(config.budget, 100);
        assert_eq!(config.batch, 5);
        assert_eq!(config.folds, 5);
        assert_eq!(config.test_pct, DEFAULT_TEST_PCT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_degenerate_settings() {
        let mut config = TrainConfig::new("MSFT", "xgboost");
        config.budget = 0;
        assert!(config.validate().is_err());

        let mut config = TrainConfig::new("", "xgboost");
        config.budget = 10;
        assert!(config.validate().is_err());

        let mut config = TrainConfig::new("MSFT", "xgboost");
        config.test_pct = 1.0;
        assert!(config.validate().is_err());
    }
}
