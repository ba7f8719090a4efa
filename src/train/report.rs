//! Fit-quality reporting

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Regression quality over one partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionReport {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

/// Summary of a finished training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub symbol: String,
    pub model_name: String,
    pub trials: usize,
    /// Best cross-validated score (negated mean squared error).
    pub cv_score: f64,
    pub train: PartitionReport,
    pub test: PartitionReport,
    pub elapsed_seconds: f64,
}

/// Compute MSE, RMSE, MAE, and R-squared for one partition.
pub fn regression_report(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<PartitionReport> {
    if y_true.len() != y_pred.len() {
        return Err(ForecastError::Data(format!(
            "prediction length {} does not match target length {}",
            y_pred.len(),
            y_true.len()
        )));
    }
    if y_true.is_empty() {
        return Err(ForecastError::Data(
            "cannot score an empty partition".to_string(),
        ));
    }

    let n = y_true.len() as f64;
    let errors: Vec<f64> = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| p - t)
        .collect();

    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
    let rmse = mse.sqrt();
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

    let mean = y_true.sum() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean) * (y - mean)).sum();
    let ss_res: f64 = errors.iter().map(|e| e * e).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    Ok(PartitionReport { mse, rmse, mae, r2 })
}
