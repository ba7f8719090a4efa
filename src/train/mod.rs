//! Training orchestration
//!
//! [`ModelTrain`] drives one family through the full run: resolve the name,
//! encode calendar categories when the family wants them, stage a pipeline,
//! tune it with the batched search over rolling-origin folds, refit the
//! winner on the whole training partition, persist the artifact, and score
//! both partitions for the report.

pub mod config;
pub mod pipeline;
pub mod report;

pub use config::TrainConfig;
pub use pipeline::Pipeline;
pub use report::{regression_report, PartitionReport, TrainReport};

use std::time::Instant;

use tracing::info;

use crate::artifact::{ArtifactStore, TrainedArtifact, ARTIFACT_SCHEMA};
use crate::data::{to_target_vector, Dataset};
use crate::error::Result;
use crate::models::{FitDirectives, ModelDescriptor, ModelRegistry};
use crate::search::{SearchDriver, SearchOutcome, SearchSpace, TpeSampler};

/// Orchestrates tuning, refit, and persistence for one family on one
/// dataset.
pub struct ModelTrain {
    config: TrainConfig,
    dataset: Dataset,
    descriptor: ModelDescriptor,
    directives: FitDirectives,
    space: SearchSpace,
    template: Option<Pipeline>,
    store: ArtifactStore,
}

impl ModelTrain {
    /// Stage a training run. The family name resolves before anything else,
    /// so an unknown name fails without mutating the dataset; calendar
    /// encoding then runs only for families that ask for it.
    pub fn new(config: TrainConfig, mut dataset: Dataset, store: ArtifactStore) -> Result<Self> {
        config.validate()?;
        let registry = ModelRegistry::standard();
        let kind = registry.kind(&config.model_name)?;
        if kind.needs_calendar_encoding() {
            dataset.encode_calendar()?;
        }
        let descriptor = registry.bind(&config.model_name, &dataset)?;
        let directives = descriptor.fit_params();
        let space = descriptor.params();
        Ok(Self {
            config,
            dataset,
            descriptor,
            directives,
            space,
            template: None,
            store,
        })
    }

    /// Swap the search domain for a narrower one.
    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    /// Swap the pipeline template, keeping the staged dataset and search.
    pub fn with_template(mut self, template: Pipeline) -> Self {
        self.template = Some(template);
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn template(&self) -> Result<Pipeline> {
        if let Some(template) = &self.template {
            return Ok(template.clone());
        }
        Ok(Pipeline::new(
            self.dataset.feature_names(),
            self.descriptor.preprocess(),
            self.descriptor.build()?,
        ))
    }

    /// Run the search, refit the winner, persist, and report.
    pub fn train(&self) -> Result<TrainReport> {
        let started = Instant::now();
        info!(
            symbol = %self.config.symbol,
            model = %self.config.model_name,
            budget = self.config.budget,
            "training run started"
        );

        let template = self.template()?;
        let x_train = self.dataset.x_train();
        let y_train = self.dataset.y_train();
        let directives = &self.directives;

        let driver = SearchDriver::new(self.config.budget, self.config.batch, self.config.folds);
        let mut sampler = TpeSampler::new(self.config.seed);
        let outcome = driver.run(
            &self.space,
            &mut sampler,
            x_train.height(),
            |params, slice| {
                let mut candidate = template.configured(params)?;
                let x_fit = x_train.slice(slice.train.start as i64, slice.train.len());
                let y_fit = y_train.slice(slice.train.start as i64, slice.train.len());
                candidate.fit_frames(&x_fit, &y_fit, directives)?;

                let x_val = x_train.slice(slice.validate.start as i64, slice.validate.len());
                let y_val = y_train.slice(slice.validate.start as i64, slice.validate.len());
                let preds = candidate.predict(&x_val)?;
                let truth = to_target_vector(&y_val)?;
                let scored = regression_report(&truth, &preds)?;
                Ok(-scored.mse)
            },
        )?;
        info!(
            best_score = outcome.best_score,
            trials = outcome.trials.len(),
            "search finished"
        );

        // The refit gets the same fit directives the folds used.
        let mut best = template.configured(&outcome.best_params)?;
        best.fit_frames(x_train, y_train, directives)?;

        let artifact = TrainedArtifact {
            schema: ARTIFACT_SCHEMA,
            symbol: self.config.symbol.clone(),
            model_name: self.config.model_name.clone(),
            created_at: chrono::Utc::now(),
            best_params: outcome.best_params.clone(),
            cv_score: outcome.best_score,
            pipeline: best,
        };
        let path = self.store.save(&artifact)?;
        info!(path = %path.display(), "artifact persisted");

        self.summarize(&artifact, &outcome, started.elapsed().as_secs_f64())
    }

    fn summarize(
        &self,
        artifact: &TrainedArtifact,
        outcome: &SearchOutcome,
        elapsed_seconds: f64,
    ) -> Result<TrainReport> {
        let train_preds = artifact.pipeline.predict(self.dataset.x_train())?;
        let train_truth = to_target_vector(self.dataset.y_train())?;
        let test_preds = artifact.pipeline.predict(self.dataset.x_test())?;
        let test_truth = to_target_vector(self.dataset.y_test())?;
        Ok(TrainReport {
            symbol: self.config.symbol.clone(),
            model_name: self.config.model_name.clone(),
            trials: outcome.trials.len(),
            cv_score: outcome.best_score,
            train: regression_report(&train_truth, &train_preds)?,
            test: regression_report(&test_truth, &test_preds)?,
            elapsed_seconds,
        })
    }
}
