//! Feature engineering for daily price series
//!
//! Turns a cleaned `(date, close)` frame into a supervised feature matrix:
//! calendar parts, closing-price lags, rolling means and exponentially
//! smoothed levels, followed by a drop of every row that still carries an
//! undefined value. All lookback windows only ever reach into the past, so
//! the surviving rows are leakage-free with respect to their own date.

use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

/// Column holding the date key.
pub const DATE_COL: &str = "date";
/// Column holding the closing price (the prediction target).
pub const CLOSE_COL: &str = "close";
/// Prefix shared by all calendar-derived categorical columns.
pub const CALENDAR_PREFIX: &str = "day";

/// Closing-price lags `1..=LAG_DAYS`.
pub const LAG_DAYS: usize = 29;
/// Simple-moving-average windows.
pub const SMA_WINDOWS: [usize; 5] = [5, 10, 30, 60, 90];
/// Fixed exponential-smoothing levels; one further level is fitted automatically.
pub const SES_LEVELS: [f64; 4] = [0.2, 0.4, 0.6, 0.8];
/// Longest lookback over all stages. The first `LONGEST_LOOKBACK - 1` rows of
/// a series cannot be fully populated and are dropped.
pub const LONGEST_LOOKBACK: usize = 90;

// Days between 0001-01-01 and 1970-01-01; Date columns store days since epoch.
const EPOCH_CE_DAYS: i32 = 719_163;

pub(crate) fn date_from_days(days: i32) -> Result<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_CE_DAYS)
        .ok_or_else(|| ForecastError::Data(format!("day offset {days} out of range")))
}

pub(crate) fn days_from_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_CE_DAYS
}

/// Build the engineered feature matrix from a cleaned `(date, close)` frame.
///
/// The output keeps the date column, appends every feature column, keeps the
/// close column last, and contains no missing values; its height is exactly
/// `input height - (LONGEST_LOOKBACK - 1)`.
pub fn build_features(df: &DataFrame) -> Result<DataFrame> {
    let n = df.height();
    if n < LONGEST_LOOKBACK {
        return Err(ForecastError::Data(format!(
            "insufficient history: {n} rows, need at least {LONGEST_LOOKBACK}"
        )));
    }

    let dates = date_values(df)?;
    let closes = close_values(df)?;

    let mut columns: Vec<Column> =
        Vec::with_capacity(5 + LAG_DAYS + SMA_WINDOWS.len() + SES_LEVELS.len() + 1);
    columns.push(df.column(DATE_COL)?.clone());

    // Calendar parts follow the usual conventions: day-of-year and
    // day-of-month are 1-based, day-of-week has Monday = 0.
    let day_of_year: Vec<i32> = dates.iter().map(|d| d.ordinal() as i32).collect();
    let day_of_month: Vec<i32> = dates.iter().map(|d| d.day() as i32).collect();
    let day_of_week: Vec<i32> = dates
        .iter()
        .map(|d| d.weekday().num_days_from_monday() as i32)
        .collect();
    columns.push(Series::new("day_of_year".into(), day_of_year).into());
    columns.push(Series::new("day_of_month".into(), day_of_month).into());
    columns.push(Series::new("day_of_week".into(), day_of_week).into());

    for lag in 1..=LAG_DAYS {
        let name = format!("close_lag_{lag}");
        columns.push(Series::new(name.into(), lag_column(&closes, lag)).into());
    }

    for window in SMA_WINDOWS {
        let name = format!("close_sma_{window}");
        columns.push(Series::new(name.into(), sma_column(&closes, window)).into());
    }

    for alpha in SES_LEVELS {
        let name = format!("close_ses_{alpha}");
        columns.push(Series::new(name.into(), ses_fitted(&closes, alpha)).into());
    }
    let auto_level = optimal_ses_level(&closes);
    columns.push(Series::new("close_ses_auto".into(), ses_fitted(&closes, auto_level)).into());

    columns.push(Series::new(CLOSE_COL.into(), closes).into());

    let engineered = DataFrame::new(columns)?;
    drop_undefined_rows(&engineered)
}

fn date_values(df: &DataFrame) -> Result<Vec<NaiveDate>> {
    let days = df
        .column(DATE_COL)
        .map_err(|_| ForecastError::FeatureNotFound(DATE_COL.to_string()))?
        .cast(&DataType::Int32)?;
    days.i32()?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| ForecastError::Data("null date in series".to_string()))
                .and_then(date_from_days)
        })
        .collect()
}

fn close_values(df: &DataFrame) -> Result<Vec<f64>> {
    let close = df
        .column(CLOSE_COL)
        .map_err(|_| ForecastError::FeatureNotFound(CLOSE_COL.to_string()))?
        .cast(&DataType::Float64)?;
    let values: Vec<f64> = close
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::Data(
            "close column contains missing or non-finite values".to_string(),
        ));
    }
    Ok(values)
}

fn lag_column(values: &[f64], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if i >= lag { Some(values[i - lag]) } else { None })
        .collect()
}

fn sma_column(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i + 1 >= window {
                let start = i + 1 - window;
                Some(values[start..=i].iter().sum::<f64>() / window as f64)
            } else {
                None
            }
        })
        .collect()
}

/// One-step-ahead fitted values of simple exponential smoothing: the value at
/// `t` is the smoothed level after observing everything up to `t - 1`, with
/// the level initialized to the first observation.
fn ses_fitted(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut fitted = Vec::with_capacity(values.len());
    let mut level = values[0];
    fitted.push(level);
    for &x in values.iter().skip(1) {
        fitted.push(level);
        level = alpha * x + (1.0 - alpha) * level;
    }
    fitted
}

/// Pick the smoothing level minimizing in-sample one-step-ahead squared
/// error: a coarse grid pass followed by a finer pass around the best point.
/// Deterministic for a given series.
fn optimal_ses_level(values: &[f64]) -> f64 {
    let sse = |alpha: f64| -> f64 {
        ses_fitted(values, alpha)
            .iter()
            .zip(values)
            .map(|(f, x)| (x - f).powi(2))
            .sum()
    };

    let mut best_alpha = 0.5;
    let mut best_sse = f64::INFINITY;
    for step in 1..=19 {
        let alpha = step as f64 * 0.05;
        let err = sse(alpha);
        if err < best_sse {
            best_sse = err;
            best_alpha = alpha;
        }
    }
    for step in -9i32..=9 {
        let alpha = (best_alpha + step as f64 * 0.005).clamp(0.01, 0.99);
        let err = sse(alpha);
        if err < best_sse {
            best_sse = err;
            best_alpha = alpha;
        }
    }
    best_alpha
}

fn drop_undefined_rows(df: &DataFrame) -> Result<DataFrame> {
    let columns = df.get_columns();
    let mut any_null = columns[0].as_materialized_series().is_null();
    for col in columns.iter().skip(1) {
        any_null = &any_null | &col.as_materialized_series().is_null();
    }
    Ok(df.filter(&!any_null)?)
}
