//! Fitted-state preprocessing transforms applied between the engineered
//! frame and a model's input tensors.

pub mod encoder;
pub mod scaler;

pub use encoder::CalendarEncoder;
pub use scaler::{scalable_columns, ColumnScaler};
