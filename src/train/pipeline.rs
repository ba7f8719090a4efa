//! Preprocessing stages and estimator as one persistable unit
//!
//! A [`Pipeline`] owns the stage list a family requested, the scaler state
//! those stages produce, and the estimator itself. Fitting runs the stages
//! on the training frame before the estimator sees a tensor; predicting
//! replays the fitted stages on new frames. The whole unit serializes into
//! the artifact document.

use ndarray::{Array1, Axis};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::data::{to_feature_matrix, to_target_vector};
use crate::error::{ForecastError, Result};
use crate::models::{Estimator, FitDirectives, ModelInput, NetWeights, TransformStep};
use crate::preprocessing::{scalable_columns, ColumnScaler};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    feature_names: Vec<String>,
    steps: Vec<TransformStep>,
    scaler: Option<ColumnScaler>,
    estimator: Estimator,
}

impl Pipeline {
    pub fn new(feature_names: Vec<String>, steps: Vec<TransformStep>, estimator: Estimator) -> Self {
        Self {
            feature_names,
            steps,
            scaler: None,
            estimator,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn is_fitted(&self) -> bool {
        self.estimator.is_fitted()
    }

    /// Clone the template with sampled hyperparameters injected into the
    /// estimator. The stage list carries no tunables; fitted scaler state
    /// never leaks into the clone.
    pub fn configured(&self, params: &crate::search::TrialParams) -> Result<Pipeline> {
        Ok(Pipeline {
            feature_names: self.feature_names.clone(),
            steps: self.steps.clone(),
            scaler: None,
            estimator: self.estimator.with_trial(params)?,
        })
    }

    /// Fit the stages on the training frame, then the estimator on the
    /// staged tensor.
    pub fn fit(&mut self, x: &DataFrame, y: &Array1<f64>, directives: &FitDirectives) -> Result<()> {
        let mut frame = x.clone();
        for step in &self.steps {
            if let TransformStep::ScaleNumeric = step {
                let columns = scalable_columns(&frame);
                let mut scaler = ColumnScaler::default();
                scaler.fit(&frame, &columns)?;
                frame = scaler.transform(&frame)?;
                self.scaler = Some(scaler);
            }
        }
        let input = self.to_input(&frame)?;
        self.estimator.fit(&input, y, directives)
    }

    /// Fit on an X frame paired with a y frame sharing its date index.
    pub fn fit_frames(
        &mut self,
        x: &DataFrame,
        y: &DataFrame,
        directives: &FitDirectives,
    ) -> Result<()> {
        let target = to_target_vector(y)?;
        self.fit(x, &target, directives)
    }

    pub fn predict(&self, x: &DataFrame) -> Result<Array1<f64>> {
        let mut frame = x.clone();
        for step in &self.steps {
            if let TransformStep::ScaleNumeric = step {
                let scaler = self.scaler.as_ref().ok_or(ForecastError::ModelNotFitted)?;
                frame = scaler.transform(&frame)?;
            }
        }
        let input = self.to_input(&frame)?;
        self.estimator.predict(&input)
    }

    fn to_input(&self, frame: &DataFrame) -> Result<ModelInput> {
        let matrix = to_feature_matrix(frame, &self.feature_names)?;
        if self.steps.contains(&TransformStep::ToSequences) {
            Ok(ModelInput::Sequences(matrix.insert_axis(Axis(1))))
        } else {
            Ok(ModelInput::Matrix(matrix))
        }
    }

    pub fn has_binary_weights(&self) -> bool {
        self.estimator.has_binary_weights()
    }

    pub fn weights(&self) -> Option<&NetWeights> {
        self.estimator.weights()
    }

    pub fn attach_weights(&mut self, weights: NetWeights) -> Result<()> {
        self.estimator.attach_weights(weights)
    }
}
