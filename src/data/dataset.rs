//! Dataset construction and chronological partitioning
//!
//! A [`Dataset`] owns the engineered feature frame for one symbol plus its
//! train/test partitions. Partitions are always derived from the single
//! shared frame, so the feature matrix and the target can never disagree on
//! which dates belong to which side.

use crate::data::features::{
    build_features, date_from_days, days_from_date, CALENDAR_PREFIX, CLOSE_COL, DATE_COL,
};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::path::Path;

/// Fraction of rows reserved for the test partition.
pub const DEFAULT_TEST_PCT: f64 = 0.2;

/// Engineered series for one symbol with chronological partitions.
#[derive(Debug, Clone)]
pub struct Dataset {
    symbol: String,
    span_years: u32,
    test_pct: f64,
    frame: DataFrame,
    x_train: DataFrame,
    x_test: DataFrame,
    y_train: DataFrame,
    y_test: DataFrame,
    encoded: bool,
}

impl Dataset {
    /// Build a dataset from a raw daily frame carrying at least `date` and
    /// `close` columns. The raw frame is clipped to the requested span,
    /// reduced to its date/close columns, engineered, and partitioned.
    pub fn from_raw(symbol: &str, span_years: u32, raw: &DataFrame, test_pct: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&test_pct) || test_pct == 0.0 {
            return Err(ForecastError::Configuration(format!(
                "test percentage must be in (0, 1), got {test_pct}"
            )));
        }
        if span_years == 0 {
            return Err(ForecastError::Configuration(
                "history span must be at least one year".to_string(),
            ));
        }

        let clipped = clip_to_span(raw, span_years)?;
        let cleaned = clean_columns(&clipped)?;
        let frame = build_features(&cleaned)?;
        if frame.height() == 0 {
            return Err(ForecastError::Data(
                "feature engineering produced an empty matrix".to_string(),
            ));
        }

        let mut dataset = Self {
            symbol: symbol.to_string(),
            span_years,
            test_pct,
            frame,
            x_train: DataFrame::empty(),
            x_test: DataFrame::empty(),
            y_train: DataFrame::empty(),
            y_test: DataFrame::empty(),
            encoded: false,
        };
        dataset.repartition()?;
        Ok(dataset)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn span_years(&self) -> u32 {
        self.span_years
    }

    /// Feature column names, in matrix order (date excluded).
    pub fn feature_names(&self) -> Vec<String> {
        self.x_train
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != DATE_COL)
            .map(|name| name.to_string())
            .collect()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names().len()
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn is_encoded(&self) -> bool {
        self.encoded
    }

    pub fn x_train(&self) -> &DataFrame {
        &self.x_train
    }

    pub fn x_test(&self) -> &DataFrame {
        &self.x_test
    }

    pub fn y_train(&self) -> &DataFrame {
        &self.y_train
    }

    pub fn y_test(&self) -> &DataFrame {
        &self.y_test
    }

    /// One-hot encode the calendar category columns in place and recompute
    /// the partitions. Row membership is unchanged; only the column set is.
    pub fn encode_calendar(&mut self) -> Result<()> {
        if self.encoded {
            return Ok(());
        }
        let mut encoder = crate::preprocessing::CalendarEncoder::new();
        self.frame = encoder.fit_transform(&self.frame)?;
        self.encoded = true;
        self.repartition()
    }

    /// Recompute the four partitions from the current frame. The cutoff is
    /// derived once from the shared frame, then X and y are projections of
    /// the partitioned rows, so their date indices are identical by
    /// construction.
    fn repartition(&mut self) -> Result<()> {
        let (train, test) = train_test_split(&self.frame, self.test_pct)?;
        if train.height() == 0 || test.height() == 0 {
            return Err(ForecastError::Data(format!(
                "degenerate partition: {} train rows, {} test rows",
                train.height(),
                test.height()
            )));
        }

        let (x_train, y_train) = x_y_split(&train)?;
        let (x_test, y_test) = x_y_split(&test)?;

        debug_assert!(aligned(&x_train, &y_train));
        debug_assert!(aligned(&x_test, &y_test));

        self.x_train = x_train;
        self.x_test = x_test;
        self.y_train = y_train;
        self.y_test = y_test;
        Ok(())
    }
}

fn aligned(x: &DataFrame, y: &DataFrame) -> bool {
    match (x.column(DATE_COL), y.column(DATE_COL)) {
        (Ok(a), Ok(b)) => a
            .as_materialized_series()
            .equals(b.as_materialized_series()),
        _ => false,
    }
}

/// Reduce a raw frame to its `date` and `close` columns, validating that the
/// date key is strictly ascending with no nulls.
pub fn clean_columns(raw: &DataFrame) -> Result<DataFrame> {
    let df = raw.select([DATE_COL, CLOSE_COL]).map_err(|_| {
        ForecastError::Data(format!(
            "raw frame must carry '{DATE_COL}' and '{CLOSE_COL}' columns"
        ))
    })?;

    let days = date_days(&df)?;
    for pair in days.windows(2) {
        if pair[1] <= pair[0] {
            return Err(ForecastError::Data(
                "date column must be strictly ascending and unique".to_string(),
            ));
        }
    }
    Ok(df)
}

/// Keep only the trailing `span_years * 365` calendar days of a frame.
pub fn clip_to_span(df: &DataFrame, span_years: u32) -> Result<DataFrame> {
    let days = date_days(df)?;
    let max_day = *days
        .iter()
        .max()
        .ok_or_else(|| ForecastError::Data("empty raw frame".to_string()))?;
    let min_day = max_day as i64 - 365 * span_years as i64;
    let mask: BooleanChunked = days
        .iter()
        .map(|&d| Some(d as i64 >= min_day))
        .collect();
    Ok(df.filter(&mask)?)
}

/// Chronological train/test split: `test_days = round(rows × test_pct)`, the
/// cutoff sits `test_days` calendar days before the latest date, and every
/// row dated at or after the cutoff is test.
pub fn train_test_split(df: &DataFrame, test_pct: f64) -> Result<(DataFrame, DataFrame)> {
    if !(0.0..1.0).contains(&test_pct) || test_pct == 0.0 {
        return Err(ForecastError::Configuration(format!(
            "test percentage must be in (0, 1), got {test_pct}"
        )));
    }
    let days = date_days(df)?;
    let max_day = *days
        .iter()
        .max()
        .ok_or_else(|| ForecastError::Data("cannot split an empty frame".to_string()))?;

    let test_days = (df.height() as f64 * test_pct).round() as i64;
    let cutoff = max_day as i64 - test_days;

    let test_mask: BooleanChunked = days.iter().map(|&d| Some(d as i64 >= cutoff)).collect();
    let test = df.filter(&test_mask)?;
    let train = df.filter(&!test_mask)?;
    Ok((train, test))
}

/// Project a frame into its feature side (everything but close) and its
/// target side (date and close).
pub fn x_y_split(frame: &DataFrame) -> Result<(DataFrame, DataFrame)> {
    let x = frame.drop(CLOSE_COL)?;
    let y = frame.select([DATE_COL, CLOSE_COL])?;
    Ok((x, y))
}

fn date_days(df: &DataFrame) -> Result<Vec<i32>> {
    let days = df
        .column(DATE_COL)
        .map_err(|_| ForecastError::FeatureNotFound(DATE_COL.to_string()))?
        .cast(&DataType::Int32)?;
    days.i32()?
        .into_iter()
        .map(|v| v.ok_or_else(|| ForecastError::Data("null date in series".to_string())))
        .collect()
}

/// Extract the named feature columns of an X frame into a row-major matrix.
pub fn to_feature_matrix(df: &DataFrame, feature_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = feature_names.len();

    let col_data: Vec<Vec<f64>> = feature_names
        .iter()
        .map(|name| {
            let column = df
                .column(name)
                .map_err(|_| ForecastError::FeatureNotFound(name.clone()))?;
            let as_f64 = column.cast(&DataType::Float64)?;
            let values: Vec<f64> = as_f64
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| {
        col_refs[c][r]
    }))
}

/// Extract the close column of a y frame into a vector.
pub fn to_target_vector(df: &DataFrame) -> Result<Array1<f64>> {
    let close = df
        .column(CLOSE_COL)
        .map_err(|_| ForecastError::FeatureNotFound(CLOSE_COL.to_string()))?
        .cast(&DataType::Float64)?;
    Ok(close
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect())
}

/// Load a raw daily CSV. The `date` column may arrive as an ISO-8601 string
/// or as a native date; everything else is passed through untouched.
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(1000))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    normalize_date_column(df)
}

fn normalize_date_column(mut df: DataFrame) -> Result<DataFrame> {
    let column = df
        .column(DATE_COL)
        .map_err(|_| ForecastError::FeatureNotFound(DATE_COL.to_string()))?;

    match column.dtype() {
        DataType::Date => Ok(df),
        DataType::String => {
            let parsed: Vec<i32> = column
                .str()?
                .into_iter()
                .map(|v| {
                    let raw = v.ok_or_else(|| {
                        ForecastError::Data("null date in series".to_string())
                    })?;
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .map(days_from_date)
                        .map_err(|e| ForecastError::Data(format!("bad date '{raw}': {e}")))
                })
                .collect::<Result<Vec<i32>>>()?;
            let date = Series::new(DATE_COL.into(), parsed).cast(&DataType::Date)?;
            df.with_column(date)?;
            Ok(df)
        }
        other => Err(ForecastError::Data(format!(
            "unsupported dtype {other} for the date column"
        ))),
    }
}

/// Seeded random-walk daily series with OHLCV-style columns, used by tests,
/// benches, and the CLI when no CSV is given.
pub fn synthetic_series(n_days: usize, seed: u64) -> DataFrame {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2018, 1, 1).expect("valid literal date");

    let mut close = 100.0_f64;
    let mut dates = Vec::with_capacity(n_days);
    let mut opens = Vec::with_capacity(n_days);
    let mut highs = Vec::with_capacity(n_days);
    let mut lows = Vec::with_capacity(n_days);
    let mut closes = Vec::with_capacity(n_days);
    let mut volumes = Vec::with_capacity(n_days);

    for i in 0..n_days {
        let date = start + chrono::Duration::days(i as i64);
        dates.push(days_from_date(date));

        close = (close + rng.gen_range(-2.0..2.05)).max(5.0);
        let open = (close + rng.gen_range(-1.0..1.0)).max(1.0);
        opens.push(open);
        highs.push(close.max(open) + rng.gen_range(0.0..1.0));
        lows.push((close.min(open) - rng.gen_range(0.0..1.0)).max(0.5));
        closes.push(close);
        volumes.push(rng.gen_range(10_000.0..1_000_000.0));
    }

    let date = Series::new(DATE_COL.into(), dates)
        .cast(&DataType::Date)
        .expect("int32 to date cast");
    DataFrame::new(vec![
        date.into(),
        Series::new("open".into(), opens).into(),
        Series::new("high".into(), highs).into(),
        Series::new("low".into(), lows).into(),
        Series::new(CLOSE_COL.into(), closes).into(),
        Series::new("volume".into(), volumes).into(),
    ])
    .expect("columns share one length")
}

/// First and last date of a frame, for log lines.
pub fn date_range(df: &DataFrame) -> Result<(NaiveDate, NaiveDate)> {
    let days = date_days(df)?;
    let first = *days
        .first()
        .ok_or_else(|| ForecastError::Data("empty frame".to_string()))?;
    let last = *days
        .last()
        .ok_or_else(|| ForecastError::Data("empty frame".to_string()))?;
    Ok((date_from_days(first)?, date_from_days(last)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let raw = synthetic_series(400, 7);
        let ds = Dataset::from_raw("TEST", 10, &raw, DEFAULT_TEST_PCT).unwrap();
        assert_eq!(
            ds.x_train().height() + ds.x_test().height(),
            ds.n_rows(),
            "train + test must cover the full dataset"
        );
        assert_eq!(ds.x_train().height(), ds.y_train().height());
        assert_eq!(ds.x_test().height(), ds.y_test().height());
    }

    #[test]
    fn test_partition_is_chronological() {
        let raw = synthetic_series(400, 7);
        let ds = Dataset::from_raw("TEST", 10, &raw, DEFAULT_TEST_PCT).unwrap();
        let (_, last_train) = date_range(ds.x_train()).unwrap();
        let (first_test, _) = date_range(ds.x_test()).unwrap();
        assert!(last_train < first_test, "all test dates follow all train dates");
    }

    #[test]
    fn test_row_count_after_engineering() {
        let raw = synthetic_series(500, 1);
        let ds = Dataset::from_raw("TEST", 10, &raw, DEFAULT_TEST_PCT).unwrap();
        assert_eq!(ds.n_rows(), 500 - 89);
    }

    #[test]
    fn test_feature_names_exclude_date_and_close() {
        let raw = synthetic_series(200, 3);
        let ds = Dataset::from_raw("TEST", 10, &raw, DEFAULT_TEST_PCT).unwrap();
        let names = ds.feature_names();
        assert!(!names.iter().any(|n| n == DATE_COL || n == CLOSE_COL));
        assert_eq!(names.len(), 3 + 29 + 5 + 5);
    }

    #[test]
    fn test_encode_calendar_expands_columns_and_repartitions() {
        let raw = synthetic_series(300, 11);
        let mut ds = Dataset::from_raw("TEST", 10, &raw, DEFAULT_TEST_PCT).unwrap();
        let before = ds.n_features();
        let rows_before = (ds.x_train().height(), ds.x_test().height());

        ds.encode_calendar().unwrap();

        assert!(ds.is_encoded());
        assert!(ds.n_features() > before, "one-hot must add columns");
        assert!(!ds.feature_names().iter().any(|n| n == "day_of_week"));
        assert!(ds.feature_names().iter().any(|n| n.starts_with("day_of_week_")));
        // row membership is unchanged by encoding
        assert_eq!(rows_before, (ds.x_train().height(), ds.x_test().height()));
    }

    #[test]
    fn test_split_rejects_bad_percentage() {
        let raw = synthetic_series(200, 5);
        for pct in [0.0, 1.0, -0.3, 2.0] {
            let err = Dataset::from_raw("TEST", 10, &raw, pct).unwrap_err();
            assert!(matches!(err, ForecastError::Configuration(_)));
        }
    }

    #[test]
    fn test_clip_to_span_keeps_recent_rows() {
        let raw = synthetic_series(800, 9);
        let clipped = clip_to_span(&raw, 1).unwrap();
        assert!(clipped.height() <= 366);
        let (_, last_full) = date_range(&raw).unwrap();
        let (_, last_clip) = date_range(&clipped).unwrap();
        assert_eq!(last_full, last_clip, "clipping keeps the most recent end");
    }

    #[test]
    fn test_matrix_bridge_shapes() {
        let raw = synthetic_series(200, 2);
        let ds = Dataset::from_raw("TEST", 10, &raw, DEFAULT_TEST_PCT).unwrap();
        let names = ds.feature_names();
        let x = to_feature_matrix(ds.x_train(), &names).unwrap();
        let y = to_target_vector(ds.y_train()).unwrap();
        assert_eq!(x.nrows(), y.len());
        assert_eq!(x.ncols(), names.len());
    }

    #[test]
    fn test_unsorted_dates_are_rejected() {
        let raw = synthetic_series(120, 4);
        let reversed = raw.reverse();
        let err = Dataset::from_raw("TEST", 10, &reversed, DEFAULT_TEST_PCT).unwrap_err();
        assert!(matches!(err, ForecastError::Data(_)));
    }
}
