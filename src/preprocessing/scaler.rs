//! Column-wise standard scaling
//!
//! Statistics are learned once by `fit` and frozen, so rows the model has
//! never seen are transformed with training-time parameters only.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::{CALENDAR_PREFIX, DATE_COL};
use crate::error::{ForecastError, Result};

/// Per-column center and spread learned at fit time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ScaleState {
    center: f64,
    scale: f64,
}

/// Standard scaler over an explicit set of columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnScaler {
    states: HashMap<String, ScaleState>,
    is_fitted: bool,
}

/// Feature columns eligible for scaling: numeric, not the date axis, not
/// calendar categories or their one-hot expansions.
pub fn scalable_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| {
            let name = c.name().as_str();
            name != DATE_COL && !name.starts_with(CALENDAR_PREFIX) && c.dtype().is_numeric()
        })
        .map(|c| c.name().to_string())
        .collect()
}

impl ColumnScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Learn mean and standard deviation for each named column. Constant
    /// columns get a unit scale so transform stays finite.
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<()> {
        self.states.clear();
        for col_name in columns {
            let column = df
                .column(col_name)
                .map_err(|_| ForecastError::FeatureNotFound(col_name.clone()))?;
            let series = column.as_materialized_series().cast(&DataType::Float64)?;
            let ca = series.f64()?;
            let mean = ca.mean().unwrap_or(0.0);
            let std = ca.std(1).unwrap_or(1.0);
            self.states.insert(
                col_name.clone(),
                ScaleState {
                    center: mean,
                    scale: if std == 0.0 { 1.0 } else { std },
                },
            );
        }
        self.is_fitted = true;
        Ok(())
    }

    /// Apply the frozen statistics. Builds all replacement columns first,
    /// then applies them in a single pass. Columns without learned state
    /// pass through unchanged and positions are preserved.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(ForecastError::ModelNotFitted);
        }

        let replacements: Vec<Series> = self
            .states
            .iter()
            .filter_map(|(col_name, state)| {
                df.column(col_name).ok().map(|column| {
                    let series = column.as_materialized_series();
                    scale_series(series, state)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut result = df.clone();
        for scaled in replacements {
            result.with_column(scaled)?;
        }
        Ok(result)
    }

    /// Fit and transform in one step.
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }
}

fn scale_series(series: &Series, state: &ScaleState) -> Result<Series> {
    let cast = series.cast(&DataType::Float64)?;
    let ca = cast.f64()?;
    let scaled: Float64Chunked = ca
        .into_iter()
        .map(|opt| opt.map(|v| (v - state.center) / state.scale))
        .collect();
    Ok(scaled.with_name(series.name().clone()).into_series())
}
