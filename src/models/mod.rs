//! Model families and the capability contract
//!
//! Every family answers four questions: how to build its estimator, which
//! preprocessing stages it needs, which hyperparameters to search, and what
//! extra state fit receives. The orchestrator drives both families through
//! these four operations and nothing else. Dispatch is a closed variant
//! set, one arm per family.

pub mod lstm;
pub mod xgboost;

pub use lstm::{NetWeights, RecurrentConfig, RecurrentNet};
pub use xgboost::{TreeBooster, TreeBoosterConfig};

use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::error::{ForecastError, Result};
use crate::search::{ParameterValue, SearchSpace, TrialParams};
use crate::silence::StreamSilencer;

pub(crate) fn float_value(name: &str, value: &ParameterValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        ForecastError::ModelBuild(format!("hyperparameter '{name}' must be numeric"))
    })
}

pub(crate) fn usize_value(name: &str, value: &ParameterValue) -> Result<usize> {
    value.as_usize().ok_or_else(|| {
        ForecastError::ModelBuild(format!(
            "hyperparameter '{name}' must be a non-negative integer"
        ))
    })
}

pub(crate) fn text_value<'a>(name: &str, value: &'a ParameterValue) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        ForecastError::ModelBuild(format!("hyperparameter '{name}' must be a string choice"))
    })
}

/// The supported model family kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FamilyKind {
    TreeEnsemble,
    SequentialNeural,
}

impl FamilyKind {
    /// Whether calendar categories must be one-hot encoded before this
    /// family sees the data. Tree ensembles split on raw category codes.
    pub fn needs_calendar_encoding(&self) -> bool {
        matches!(self, FamilyKind::SequentialNeural)
    }
}

/// Input tensor layout an estimator consumes.
#[derive(Debug, Clone)]
pub enum ModelInput {
    /// Rows by features.
    Matrix(Array2<f64>),
    /// Rows by single-step window by features.
    Sequences(Array3<f64>),
}

impl ModelInput {
    pub fn n_rows(&self) -> usize {
        match self {
            ModelInput::Matrix(m) => m.nrows(),
            ModelInput::Sequences(s) => s.shape()[0],
        }
    }
}

/// Preprocessing stages a family requests ahead of its estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformStep {
    /// Standard-scale the numeric feature columns.
    ScaleNumeric,
    /// Reshape the feature matrix into single-step sequences.
    ToSequences,
}

/// Extra state handed to every fit call of a family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FitDirectives {
    /// Stop when the training loss has not improved for this many epochs.
    pub loss_patience: Option<usize>,
}

/// A model family bound to a dataset's feature count, exposing the four
/// capability operations.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    name: String,
    kind: FamilyKind,
    n_features: usize,
}

impl ModelDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FamilyKind {
        self.kind
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Construct an unfitted estimator template with default
    /// hyperparameters; the search injects sampled values later. Neural
    /// construction runs under the stream silencer since the numeric
    /// backend announces itself on both standard streams.
    pub fn build(&self) -> Result<Estimator> {
        match self.kind {
            FamilyKind::TreeEnsemble => {
                Ok(Estimator::Trees(TreeBooster::new(TreeBoosterConfig::default())))
            }
            FamilyKind::SequentialNeural => {
                let _quiet = StreamSilencer::engage()?;
                Ok(Estimator::Recurrent(RecurrentNet::new(
                    RecurrentConfig::default(),
                    self.n_features,
                )))
            }
        }
    }

    /// Preprocessing stages to run before the estimator, in order.
    pub fn preprocess(&self) -> Vec<TransformStep> {
        match self.kind {
            FamilyKind::TreeEnsemble => Vec::new(),
            FamilyKind::SequentialNeural => {
                vec![TransformStep::ScaleNumeric, TransformStep::ToSequences]
            }
        }
    }

    /// Hyperparameter domain for this family.
    pub fn params(&self) -> SearchSpace {
        match self.kind {
            FamilyKind::TreeEnsemble => xgboost::search_space(),
            FamilyKind::SequentialNeural => lstm::search_space(),
        }
    }

    /// Fit-time extras for this family.
    pub fn fit_params(&self) -> FitDirectives {
        match self.kind {
            FamilyKind::TreeEnsemble => FitDirectives::default(),
            FamilyKind::SequentialNeural => FitDirectives {
                loss_patience: Some(lstm::LOSS_PATIENCE),
            },
        }
    }
}

/// Immutable mapping from family name to its kind. Binding a name to a
/// dataset yields a [`ModelDescriptor`]; the name lookup alone never
/// touches the dataset, so callers can fail fast on a bad name before any
/// data mutation.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<(&'static str, FamilyKind)>,
}

impl ModelRegistry {
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ("lstm", FamilyKind::SequentialNeural),
                ("xgboost", FamilyKind::TreeEnsemble),
            ],
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    /// Resolve a family name without binding it to data.
    pub fn kind(&self, name: &str) -> Result<FamilyKind> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ForecastError::UnknownModel(name.to_string()))
    }

    /// Bind a family to a dataset's current feature count.
    pub fn bind(&self, name: &str, dataset: &Dataset) -> Result<ModelDescriptor> {
        let kind = self.kind(name)?;
        Ok(ModelDescriptor {
            name: name.to_string(),
            kind,
            n_features: dataset.n_features(),
        })
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// An estimator of either family, unfitted until [`fit`] succeeds.
///
/// [`fit`]: Estimator::fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    Trees(TreeBooster),
    Recurrent(RecurrentNet),
}

impl Estimator {
    /// Clone this template with sampled hyperparameters injected. Fails on
    /// unknown names, wrong value types, or structurally invalid values.
    pub fn with_trial(&self, params: &TrialParams) -> Result<Estimator> {
        match self {
            Estimator::Trees(model) => Ok(Estimator::Trees(model.with_trial(params)?)),
            Estimator::Recurrent(net) => Ok(Estimator::Recurrent(net.with_trial(params)?)),
        }
    }

    pub fn fit(
        &mut self,
        input: &ModelInput,
        y: &Array1<f64>,
        directives: &FitDirectives,
    ) -> Result<()> {
        match (self, input) {
            (Estimator::Trees(model), ModelInput::Matrix(x)) => model.fit(x, y),
            (Estimator::Recurrent(net), ModelInput::Sequences(x)) => {
                net.fit(x, y, directives.loss_patience)
            }
            (Estimator::Trees(_), ModelInput::Sequences(_)) => Err(ForecastError::ModelBuild(
                "tree ensemble expects a 2-dimensional matrix input".to_string(),
            )),
            (Estimator::Recurrent(_), ModelInput::Matrix(_)) => Err(ForecastError::ModelBuild(
                "sequential network expects a 3-dimensional sequence input".to_string(),
            )),
        }
    }

    pub fn predict(&self, input: &ModelInput) -> Result<Array1<f64>> {
        match (self, input) {
            (Estimator::Trees(model), ModelInput::Matrix(x)) => model.predict(x),
            (Estimator::Recurrent(net), ModelInput::Sequences(x)) => net.predict(x),
            (Estimator::Trees(_), ModelInput::Sequences(_)) => Err(ForecastError::ModelBuild(
                "tree ensemble expects a 2-dimensional matrix input".to_string(),
            )),
            (Estimator::Recurrent(_), ModelInput::Matrix(_)) => Err(ForecastError::ModelBuild(
                "sequential network expects a 3-dimensional sequence input".to_string(),
            )),
        }
    }

    pub fn is_fitted(&self) -> bool {
        match self {
            Estimator::Trees(model) => model.is_fitted(),
            Estimator::Recurrent(net) => net.is_fitted(),
        }
    }

    /// Whether this estimator keeps its fitted state in a binary weight
    /// blob that the artifact store must side-channel.
    pub fn has_binary_weights(&self) -> bool {
        matches!(self, Estimator::Recurrent(_))
    }

    /// Fitted network weights, when this is a weight-bearing estimator.
    pub fn weights(&self) -> Option<&NetWeights> {
        match self {
            Estimator::Recurrent(net) => net.weights(),
            Estimator::Trees(_) => None,
        }
    }

    /// Rehydrate network weights into a deserialized skeleton.
    pub fn attach_weights(&mut self, weights: NetWeights) -> Result<()> {
        match self {
            Estimator::Recurrent(net) => net.attach_weights(weights),
            Estimator::Trees(_) => Err(ForecastError::Persistence(
                "tree ensemble carries no separate weight blob".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic_series, Dataset, DEFAULT_TEST_PCT};

    fn dataset() -> Dataset {
        let raw = synthetic_series(220, 5);
        Dataset::from_raw("TEST", 10, &raw, DEFAULT_TEST_PCT).unwrap()
    }

    #[test]
    fn test_registry_knows_both_families() {
        let registry = ModelRegistry::standard();
        assert_eq!(registry.names(), vec!["lstm", "xgboost"]);
        assert_eq!(registry.kind("xgboost").unwrap(), FamilyKind::TreeEnsemble);
        assert_eq!(registry.kind("lstm").unwrap(), FamilyKind::SequentialNeural);
    }

    #[test]
    fn test_unknown_name_fails_lookup() {
        let registry = ModelRegistry::standard();
        match registry.kind("prophet") {
            Err(ForecastError::UnknownModel(name)) => assert_eq!(name, "prophet"),
            other => panic!("expected unknown-model error, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_captures_feature_count() {
        let ds = dataset();
        let registry = ModelRegistry::standard();
        let descriptor = registry.bind("xgboost", &ds).unwrap();
        assert_eq!(descriptor.name(), "xgboost");
        assert_eq!(descriptor.n_features(), ds.n_features());
    }

    #[test]
    fn test_only_neural_family_wants_encoding() {
        assert!(!FamilyKind::TreeEnsemble.needs_calendar_encoding());
        assert!(FamilyKind::SequentialNeural.needs_calendar_encoding());
    }

    #[test]
    fn test_preprocess_stages_per_family() {
        let ds = dataset();
        let registry = ModelRegistry::standard();
        assert!(registry.bind("xgboost", &ds).unwrap().preprocess().is_empty());
        assert_eq!(
            registry.bind("lstm", &ds).unwrap().preprocess(),
            vec![TransformStep::ScaleNumeric, TransformStep::ToSequences]
        );
    }

    #[test]
    fn test_fit_params_per_family() {
        let ds = dataset();
        let registry = ModelRegistry::standard();
        assert_eq!(
            registry.bind("xgboost", &ds).unwrap().fit_params(),
            FitDirectives::default()
        );
        assert_eq!(
            registry.bind("lstm", &ds).unwrap().fit_params().loss_patience,
            Some(50)
        );
    }

    #[test]
    fn test_both_search_spaces_are_populated() {
        let ds = dataset();
        let registry = ModelRegistry::standard();
        let trees = registry.bind("xgboost", &ds).unwrap().params();
        assert!(trees.get("max_depth").is_some());
        assert!(trees.get("n_estimators").is_some());
        let neural = registry.bind("lstm", &ds).unwrap().params();
        assert!(neural.get("layers").is_some());
        assert!(neural.get("learning_rate").is_some());
    }

    #[test]
    fn test_estimator_rejects_wrong_input_layout() {
        let ds = dataset();
        let registry = ModelRegistry::standard();
        let mut estimator = registry.bind("xgboost", &ds).unwrap().build().unwrap();
        let x = ndarray::Array3::<f64>::zeros((4, 1, 3));
        let y = ndarray::Array1::<f64>::zeros(4);
        let result = estimator.fit(
            &ModelInput::Sequences(x),
            &y,
            &FitDirectives::default(),
        );
        assert!(matches!(result, Err(ForecastError::ModelBuild(_))));
    }

    #[test]
    fn test_weight_side_channel_is_neural_only() {
        let ds = dataset();
        let registry = ModelRegistry::standard();
        let trees = registry.bind("xgboost", &ds).unwrap().build().unwrap();
        assert!(!trees.has_binary_weights());
        let neural = registry.bind("lstm", &ds).unwrap().build().unwrap();
        assert!(neural.has_binary_weights());
        assert!(neural.weights().is_none());
    }
}
