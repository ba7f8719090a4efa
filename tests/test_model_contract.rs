//! Integration test: model family capability contract

use std::collections::HashMap;

use ndarray::{Array1, Array2, Array3};
use stockcast::artifact::ArtifactStore;
use stockcast::data::{synthetic_series, Dataset, DEFAULT_TEST_PCT};
use stockcast::error::ForecastError;
use stockcast::models::{FamilyKind, FitDirectives, ModelInput, ModelRegistry, TransformStep};
use stockcast::search::{ParameterValue, TrialParams};
use stockcast::train::{ModelTrain, TrainConfig};

fn dataset(seed: u64) -> Dataset {
    let raw = synthetic_series(260, seed);
    Dataset::from_raw("ACME", 10, &raw, DEFAULT_TEST_PCT).unwrap()
}

#[test]
fn test_registry_exposes_fixed_families() {
    let registry = ModelRegistry::standard();
    assert_eq!(registry.names(), vec!["lstm", "xgboost"]);
    assert_eq!(registry.kind("xgboost").unwrap(), FamilyKind::TreeEnsemble);
    assert_eq!(registry.kind("lstm").unwrap(), FamilyKind::SequentialNeural);
    match registry.kind("arima") {
        Err(ForecastError::UnknownModel(name)) => assert_eq!(name, "arima"),
        other => panic!("expected unknown-model failure, got {other:?}"),
    }
}

#[test]
fn test_tree_family_answers_all_four_operations() {
    let ds = dataset(3);
    let descriptor = ModelRegistry::standard().bind("xgboost", &ds).unwrap();

    let estimator = descriptor.build().unwrap();
    assert!(!estimator.is_fitted());
    assert!(!estimator.has_binary_weights());

    assert!(descriptor.preprocess().is_empty());

    let space = descriptor.params();
    for name in ["n_estimators", "max_depth", "learning_rate", "subsample", "objective"] {
        assert!(space.get(name).is_some(), "tree space missing {name}");
    }

    assert_eq!(descriptor.fit_params(), FitDirectives::default());
}

#[test]
fn test_neural_family_answers_all_four_operations() {
    let ds = dataset(4);
    let descriptor = ModelRegistry::standard().bind("lstm", &ds).unwrap();

    let estimator = descriptor.build().unwrap();
    assert!(!estimator.is_fitted());
    assert!(estimator.has_binary_weights());
    assert!(estimator.weights().is_none(), "unfitted nets carry no weights");

    assert_eq!(
        descriptor.preprocess(),
        vec![TransformStep::ScaleNumeric, TransformStep::ToSequences]
    );

    let space = descriptor.params();
    for name in ["layers", "batch_size", "learning_rate", "dropout"] {
        assert!(space.get(name).is_some(), "neural space missing {name}");
    }

    assert_eq!(descriptor.fit_params().loss_patience, Some(50));
}

#[test]
fn test_unknown_model_aborts_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let result = ModelTrain::new(
        TrainConfig::new("ACME", "prophet"),
        dataset(5),
        ArtifactStore::new(dir.path()),
    );
    assert!(matches!(result, Err(ForecastError::UnknownModel(_))));
    assert_eq!(
        std::fs::read_dir(dir.path()).unwrap().count(),
        0,
        "a failed lookup must not leave artifacts behind"
    );
}

#[test]
fn test_calendar_encoding_is_family_conditional() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());

    let tree_run =
        ModelTrain::new(TrainConfig::new("ACME", "xgboost"), dataset(6), store.clone()).unwrap();
    assert!(!tree_run.dataset().is_encoded());
    let tree_names = tree_run.dataset().feature_names();
    assert!(tree_names.iter().any(|n| n == "day_of_week"));
    assert!(!tree_names.iter().any(|n| n.starts_with("day_of_week_")));

    let neural_run =
        ModelTrain::new(TrainConfig::new("ACME", "lstm"), dataset(6), store).unwrap();
    assert!(neural_run.dataset().is_encoded());
    let neural_names = neural_run.dataset().feature_names();
    assert!(!neural_names.iter().any(|n| n == "day_of_week"));
    assert!(neural_names.iter().any(|n| n.starts_with("day_of_week_")));
    assert!(
        neural_run.dataset().n_features() > tree_run.dataset().n_features(),
        "one-hot encoding must widen the matrix"
    );
}

#[test]
fn test_trial_injection_validates_hyperparameter_names() {
    let ds = dataset(7);
    let registry = ModelRegistry::standard();

    let bogus: TrialParams =
        HashMap::from([("warp".to_string(), ParameterValue::Int(3))]);
    let trees = registry.bind("xgboost", &ds).unwrap().build().unwrap();
    assert!(matches!(
        trees.with_trial(&bogus),
        Err(ForecastError::ModelBuild(_))
    ));
    let neural = registry.bind("lstm", &ds).unwrap().build().unwrap();
    assert!(matches!(
        neural.with_trial(&bogus),
        Err(ForecastError::ModelBuild(_))
    ));

    let valid: TrialParams = HashMap::from([
        ("n_estimators".to_string(), ParameterValue::Int(10)),
        ("max_depth".to_string(), ParameterValue::Int(3)),
    ]);
    let mut configured = trees.with_trial(&valid).unwrap();
    let x = Array2::from_shape_fn((60, 4), |(r, c)| (r * 3 + c) as f64 * 0.1);
    let y = Array1::from_shape_fn(60, |r| (r as f64 * 0.3).sin());
    configured
        .fit(&ModelInput::Matrix(x.clone()), &y, &FitDirectives::default())
        .unwrap();
    assert_eq!(configured.predict(&ModelInput::Matrix(x)).unwrap().len(), 60);
}

#[test]
fn test_input_layout_mismatch_is_rejected_both_ways() {
    let ds = dataset(8);
    let registry = ModelRegistry::standard();
    let y = Array1::<f64>::zeros(12);

    let mut trees = registry.bind("xgboost", &ds).unwrap().build().unwrap();
    let sequences = ModelInput::Sequences(Array3::<f64>::zeros((12, 1, ds.n_features())));
    assert!(matches!(
        trees.fit(&sequences, &y, &FitDirectives::default()),
        Err(ForecastError::ModelBuild(_))
    ));

    let mut neural = registry.bind("lstm", &ds).unwrap().build().unwrap();
    let matrix = ModelInput::Matrix(Array2::<f64>::zeros((12, ds.n_features())));
    assert!(matches!(
        neural.fit(&matrix, &y, &FitDirectives::default()),
        Err(ForecastError::ModelBuild(_))
    ));
}
