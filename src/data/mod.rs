//! Data layer: feature engineering, dataset assembly, partitioning

pub mod dataset;
pub mod features;

pub use dataset::{
    clean_columns, clip_to_span, date_range, load_csv, synthetic_series, to_feature_matrix,
    to_target_vector, train_test_split, x_y_split, Dataset, DEFAULT_TEST_PCT,
};
pub use features::{
    build_features, CALENDAR_PREFIX, CLOSE_COL, DATE_COL, LAG_DAYS, LONGEST_LOOKBACK, SES_LEVELS,
    SMA_WINDOWS,
};
