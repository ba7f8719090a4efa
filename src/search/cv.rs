//! Rolling-origin cross-validation folds
//!
//! Rows are assumed chronologically ordered. Each fold trains on a prefix
//! and validates on the block immediately after it, so later folds see more
//! history and validation rows never precede training rows.

use std::ops::Range;

use crate::error::{ForecastError, Result};

/// One rolling-origin fold over row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlice {
    pub fold: usize,
    pub train: Range<usize>,
    pub validate: Range<usize>,
}

/// Split `n_rows` ordered rows into `n_splits` expanding-window folds.
///
/// The validation block size is `n_rows / (n_splits + 1)`; leftover rows
/// stay in the earliest training prefix. Fails when there are too few rows
/// to give every fold a non-empty validation block.
pub fn rolling_origin(n_rows: usize, n_splits: usize) -> Result<Vec<TimeSlice>> {
    if n_splits == 0 {
        return Err(ForecastError::Search(
            "cross-validation requires at least one fold".to_string(),
        ));
    }
    let block = n_rows / (n_splits + 1);
    if block == 0 {
        return Err(ForecastError::Search(format!(
            "{n_rows} rows cannot support {n_splits} rolling-origin folds"
        )));
    }
    let mut slices = Vec::with_capacity(n_splits);
    for fold in 0..n_splits {
        let validate_start = n_rows - (n_splits - fold) * block;
        slices.push(TimeSlice {
            fold,
            train: 0..validate_start,
            validate: validate_start..validate_start + block,
        });
    }
    Ok(slices)
}
