//! One-hot encoding of calendar category columns
//!
//! The engineered frame carries day-of-year, day-of-month and day-of-week
//! as small integers. Some model families want them as indicator columns
//! instead. Category columns are discovered by the calendar prefix and an
//! integer dtype, so already-expanded indicator columns (floats) are never
//! re-encoded.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::CALENDAR_PREFIX;
use crate::error::{ForecastError, Result};

/// One-hot encoder for the calendar category columns of a frame.
///
/// `transform` drops each encoded source column and appends one indicator
/// column per category level, named `{column}_{level}`, after all remaining
/// columns. Levels are the sorted distinct values seen at fit time; unseen
/// values map to an all-zero row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarEncoder {
    levels: Vec<(String, Vec<i32>)>,
    is_fitted: bool,
}

impl CalendarEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Names of the indicator columns transform will produce, in order.
    pub fn encoded_names(&self) -> Vec<String> {
        self.levels
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| format!("{name}_{v}")))
            .collect()
    }

    /// Collect the sorted distinct levels of every calendar category column.
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        self.levels.clear();
        for column in df.get_columns() {
            let name = column.name().as_str();
            if !name.starts_with(CALENDAR_PREFIX) || !column.dtype().is_integer() {
                continue;
            }
            let series = column.as_materialized_series().cast(&DataType::Int32)?;
            let mut values: Vec<i32> = series.i32()?.into_iter().flatten().collect();
            values.sort_unstable();
            values.dedup();
            if values.is_empty() {
                return Err(ForecastError::Data(format!(
                    "calendar column '{name}' has no values to encode"
                )));
            }
            self.levels.push((name.to_string(), values));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Replace the fitted category columns with their indicator expansion.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(ForecastError::ModelNotFitted);
        }

        let mut columns: Vec<Column> = df
            .get_columns()
            .iter()
            .filter(|c| !self.levels.iter().any(|(name, _)| name == c.name().as_str()))
            .cloned()
            .collect();

        for (name, values) in &self.levels {
            let source = df
                .column(name)
                .map_err(|_| ForecastError::FeatureNotFound(name.clone()))?
                .as_materialized_series()
                .cast(&DataType::Int32)?;
            let ca = source.i32()?;
            for level in values {
                let indicator: Float64Chunked = ca
                    .into_iter()
                    .map(|opt| opt.map(|v| if v == *level { 1.0 } else { 0.0 }))
                    .collect();
                let series = indicator
                    .with_name(format!("{name}_{level}").into())
                    .into_series();
                columns.push(series.into());
            }
        }

        DataFrame::new(columns).map_err(Into::into)
    }

    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<DataFrame> {
        self.fit(df)?;
        self.transform(df)
    }
}
