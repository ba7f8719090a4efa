//! Integration test: feature engineering and chronological partitioning

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use stockcast::data::{
    build_features, clean_columns, synthetic_series, train_test_split, Dataset, CLOSE_COL,
    DATE_COL, DEFAULT_TEST_PCT, LAG_DAYS, LONGEST_LOOKBACK, SES_LEVELS, SMA_WINDOWS,
};

fn epoch_days(date: NaiveDate) -> i32 {
    (date - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days() as i32
}

/// Consecutive daily frame with the given closing prices.
fn daily_frame(start: NaiveDate, closes: &[f64]) -> DataFrame {
    let days: Vec<i32> = (0..closes.len() as i64)
        .map(|i| epoch_days(start + chrono::Duration::days(i)))
        .collect();
    let date = Series::new(DATE_COL.into(), days)
        .cast(&DataType::Date)
        .unwrap();
    DataFrame::new(vec![
        date.into(),
        Series::new(CLOSE_COL.into(), closes.to_vec()).into(),
    ])
    .unwrap()
}

/// Weekday-only frame: rows are gapped over weekends, so calendar spans
/// exceed row counts.
fn weekday_frame(start_monday: NaiveDate, n_rows: usize) -> DataFrame {
    let mut days = Vec::with_capacity(n_rows);
    let mut date = start_monday;
    while days.len() < n_rows {
        if date.weekday().number_from_monday() <= 5 {
            days.push(epoch_days(date));
        }
        date = date + chrono::Duration::days(1);
    }
    let closes: Vec<f64> = (0..n_rows).map(|i| 50.0 + i as f64).collect();
    let date = Series::new(DATE_COL.into(), days)
        .cast(&DataType::Date)
        .unwrap();
    DataFrame::new(vec![
        date.into(),
        Series::new(CLOSE_COL.into(), closes).into(),
    ])
    .unwrap()
}

#[test]
fn test_engineered_columns_cover_all_stages() {
    let raw = synthetic_series(400, 21);
    let ds = Dataset::from_raw("ACME", 10, &raw, DEFAULT_TEST_PCT).unwrap();
    let names = ds.feature_names();

    for calendar in ["day_of_year", "day_of_month", "day_of_week"] {
        assert!(names.iter().any(|n| n == calendar), "missing {calendar}");
    }
    for lag in 1..=LAG_DAYS {
        let expected = format!("close_lag_{lag}");
        assert!(names.contains(&expected), "missing {expected}");
    }
    for window in SMA_WINDOWS {
        let expected = format!("close_sma_{window}");
        assert!(names.contains(&expected), "missing {expected}");
    }
    for alpha in SES_LEVELS {
        let expected = format!("close_ses_{alpha}");
        assert!(names.contains(&expected), "missing {expected}");
    }
    assert!(names.contains(&"close_ses_auto".to_string()));

    // calendar + lags + rolling means + fixed smoothings + auto smoothing
    assert_eq!(names.len(), 3 + LAG_DAYS + SMA_WINDOWS.len() + SES_LEVELS.len() + 1);
    assert!(!names.iter().any(|n| n == DATE_COL || n == CLOSE_COL));
}

#[test]
fn test_lag_and_mean_features_match_hand_computation() {
    let start = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
    let closes: Vec<f64> = (1..=120).map(|i| i as f64).collect();
    let out = build_features(&daily_frame(start, &closes)).unwrap();

    assert_eq!(out.height(), 120 - (LONGEST_LOOKBACK - 1));

    // First surviving row is input row 89, whose close is 90.0.
    let lag1 = out.column("close_lag_1").unwrap().f64().unwrap();
    assert!((lag1.get(0).unwrap() - 89.0).abs() < 1e-12);
    let lag29 = out.column("close_lag_29").unwrap().f64().unwrap();
    assert!((lag29.get(0).unwrap() - 61.0).abs() < 1e-12);

    // A 10-day mean ending at close 90.0 covers {81..=90}.
    let sma10 = out.column("close_sma_10").unwrap().f64().unwrap();
    assert!((sma10.get(0).unwrap() - 85.5).abs() < 1e-12);

    // Last surviving row is input row 119 (close 120.0).
    let last = out.height() - 1;
    assert!((lag1.get(last).unwrap() - 119.0).abs() < 1e-12);
}

#[test]
fn test_no_missing_values_survive_engineering() {
    let raw = synthetic_series(250, 33);
    let cleaned = clean_columns(&raw).unwrap();
    let out = build_features(&cleaned).unwrap();
    for column in out.get_columns() {
        assert_eq!(column.null_count(), 0, "nulls left in {}", column.name());
    }
    assert!(out.height() < cleaned.height());
    assert!(out.width() > cleaned.width());
}

#[test]
fn test_features_only_look_backward() {
    let start = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
    let closes: Vec<f64> = (0..200)
        .map(|i| 80.0 + (i as f64 * 0.21).sin() * 6.0 + i as f64 * 0.05)
        .collect();
    let full = build_features(&daily_frame(start, &closes)).unwrap();
    let prefix = build_features(&daily_frame(start, &closes[..150])).unwrap();

    // Extending the series must not change features already emitted; only
    // the auto-fitted smoothing level may move, since its level is chosen
    // over the whole window.
    let shared = prefix.height();
    for column in prefix.get_columns() {
        if column.name().as_str() == "close_ses_auto" {
            continue;
        }
        let early = full
            .column(column.name())
            .unwrap()
            .as_materialized_series()
            .slice(0, shared);
        assert!(
            early.equals(column.as_materialized_series()),
            "column {} changed when future rows arrived",
            column.name()
        );
    }
}

#[test]
fn test_cutoff_counts_calendar_days_not_rows() {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    let frame = weekday_frame(start, 100);
    let (train, test) = train_test_split(&frame, 0.2).unwrap();

    // test_days = round(100 x 0.2) = 20 calendar days; weekend gaps mean
    // fewer than 20 rows fall inside that window.
    let days: Vec<i32> = frame
        .column(DATE_COL)
        .unwrap()
        .cast(&DataType::Int32)
        .unwrap()
        .i32()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    let max_day = *days.iter().max().unwrap();
    let cutoff = max_day - 20;
    let expected_test = days.iter().filter(|&&d| d >= cutoff).count();

    assert_eq!(test.height(), expected_test);
    assert!(test.height() < 20, "row-count splitting would take 20 rows");
    assert_eq!(train.height() + test.height(), frame.height());
}

#[test]
fn test_partitions_are_chronological_and_complete() {
    let raw = synthetic_series(300, 17);
    let ds = Dataset::from_raw("ACME", 10, &raw, DEFAULT_TEST_PCT).unwrap();

    assert_eq!(
        ds.x_train().height() + ds.x_test().height(),
        ds.n_rows(),
        "partitions must cover every engineered row"
    );

    let last_train = ds
        .x_train()
        .column(DATE_COL)
        .unwrap()
        .cast(&DataType::Int32)
        .unwrap()
        .i32()
        .unwrap()
        .last()
        .unwrap();
    let first_test = ds
        .x_test()
        .column(DATE_COL)
        .unwrap()
        .cast(&DataType::Int32)
        .unwrap()
        .i32()
        .unwrap()
        .get(0)
        .unwrap();
    assert!(last_train < first_test, "test rows must follow train rows");
}

#[test]
fn test_raw_frame_without_close_is_rejected() {
    let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    let mut frame = daily_frame(start, &[1.0, 2.0, 3.0]);
    frame.rename(CLOSE_COL, "adjusted".into()).unwrap();
    assert!(clean_columns(&frame).is_err());
}
