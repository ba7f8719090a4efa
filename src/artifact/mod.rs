//! Artifact library for trained pipelines
//!
//! One directory per symbol under the library root, one primary JSON
//! document per model family. Tree ensembles serialize whole; recurrent
//! weights ship in a sibling tar.gz side channel instead of bloating the
//! JSON. Loading reverses both paths and never leaves an uncompressed
//! weight file behind.

pub mod archive;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ForecastError, Result};
use crate::models::NetWeights;
use crate::search::TrialParams;
use crate::train::Pipeline;

/// Document schema version written into every artifact.
pub const ARTIFACT_SCHEMA: u32 = 1;

/// Everything a later session needs to reuse a trained pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub schema: u32,
    pub symbol: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub best_params: TrialParams,
    pub cv_score: f64,
    pub pipeline: Pipeline,
}

/// Filesystem layout: `<root>/<symbol>/<model>.<ext>`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self {
            root: PathBuf::from("artifacts"),
        }
    }
}

impl ArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn primary_path(&self, symbol: &str, model: &str) -> PathBuf {
        self.root.join(symbol).join(format!("{model}.json"))
    }

    pub fn weights_archive_path(&self, symbol: &str, model: &str) -> PathBuf {
        self.root.join(symbol).join(format!("{model}.tar.gz"))
    }

    fn weights_raw_path(&self, symbol: &str, model: &str) -> PathBuf {
        self.root.join(symbol).join(format!("{model}.weights"))
    }

    /// Write the primary document, plus the weight side channel when the
    /// pipeline carries one. The raw weight file exists only between its
    /// write and its compression.
    pub fn save(&self, artifact: &TrainedArtifact) -> Result<PathBuf> {
        let dir = self.root.join(&artifact.symbol);
        fs::create_dir_all(&dir).map_err(|e| {
            ForecastError::Persistence(format!(
                "cannot create artifact directory '{}': {e}",
                dir.display()
            ))
        })?;

        let primary = self.primary_path(&artifact.symbol, &artifact.model_name);
        let file = File::create(&primary)?;
        serde_json::to_writer_pretty(BufWriter::new(file), artifact)?;

        if artifact.pipeline.has_binary_weights() {
            let weights = artifact
                .pipeline
                .weights()
                .ok_or(ForecastError::ModelNotFitted)?;
            let raw = self.weights_raw_path(&artifact.symbol, &artifact.model_name);
            let bytes = bincode::serialize(weights)?;
            let mut file = File::create(&raw)?;
            file.write_all(&bytes)?;
            archive::compress(&raw)?;
        }

        info!(path = %primary.display(), "artifact written");
        Ok(primary)
    }

    /// Read an artifact back, rehydrating side-channel weights when the
    /// family needs them. The extracted weight file is temporary and is
    /// gone again before this returns.
    pub fn load(&self, symbol: &str, model: &str) -> Result<TrainedArtifact> {
        let primary = self.primary_path(symbol, model);
        let file = File::open(&primary).map_err(|e| {
            ForecastError::Persistence(format!("no artifact at '{}': {e}", primary.display()))
        })?;
        let mut artifact: TrainedArtifact = serde_json::from_reader(BufReader::new(file))?;
        if artifact.schema != ARTIFACT_SCHEMA {
            return Err(ForecastError::Persistence(format!(
                "artifact schema {} is not readable by this build (wants {ARTIFACT_SCHEMA})",
                artifact.schema
            )));
        }

        if artifact.pipeline.has_binary_weights() {
            let dir = self.root.join(symbol);
            archive::extract(&self.weights_archive_path(symbol, model), &dir)?;
            let raw = self.weights_raw_path(symbol, model);
            let bytes = fs::read(&raw)?;
            fs::remove_file(&raw)?;
            let weights: NetWeights = bincode::deserialize(&bytes)?;
            artifact.pipeline.attach_weights(weights)?;
        }

        Ok(artifact)
    }
}
