//! Gradient-boosted regression trees
//!
//! Second-order boosting: each round fits a regression tree to the gradient
//! and hessian of the loss at the current raw scores, then shrinks the
//! tree's contribution by the learning rate. Split quality uses the gain
//! formula `0.5 * (GL^2/(HL+lambda) + GR^2/(HR+lambda) - G^2/(H+lambda)) - gamma`
//! and leaf weights are L1-soft-thresholded before the L2 shrink.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{float_value, text_value, usize_value};
use crate::error::{ForecastError, Result};
use crate::search::{Parameter, SearchSpace, TrialParams};

/// Fraction of the most recent rows held out as the early-stopping block.
const EVAL_TAIL_FRACTION: f64 = 0.2;
/// Early stopping needs at least this many rows to carve a useful block.
const MIN_EARLY_STOP_ROWS: usize = 25;

/// Training objective: the link between raw boosting scores and targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    /// Identity link, squared-error loss.
    SquaredError,
    /// Log link, Poisson deviance. Targets must be non-negative.
    Poisson,
}

impl Objective {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "squared_error" => Ok(Objective::SquaredError),
            "poisson" => Ok(Objective::Poisson),
            other => Err(ForecastError::ModelBuild(format!(
                "unsupported objective '{other}'"
            ))),
        }
    }

    /// Raw starting score given the training targets.
    fn base_score(&self, targets: &[f64]) -> f64 {
        let n = targets.len().max(1) as f64;
        let mean = targets.iter().sum::<f64>() / n;
        match self {
            Objective::SquaredError => mean,
            Objective::Poisson => mean.max(1e-9).ln(),
        }
    }

    /// First and second loss derivatives at a raw score.
    fn derivatives(&self, raw: f64, y: f64) -> (f64, f64) {
        match self {
            Objective::SquaredError => (raw - y, 1.0),
            Objective::Poisson => {
                let mu = raw.exp();
                (mu - y, mu.max(1e-9))
            }
        }
    }

    /// Map a raw score onto the prediction scale.
    fn mean(&self, raw: f64) -> f64 {
        match self {
            Objective::SquaredError => raw,
            Objective::Poisson => raw.exp(),
        }
    }
}

/// Tree-ensemble hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeBoosterConfig {
    /// Boosting rounds (upper bound when early stopping is active).
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Minimum hessian mass per child.
    pub min_child_weight: f64,
    /// Minimum gain required to keep a split.
    pub gamma: f64,
    /// Row fraction sampled per tree.
    pub subsample: f64,
    /// Column fraction sampled per tree.
    pub colsample_bytree: f64,
    /// Column fraction resampled per tree level.
    pub colsample_bylevel: f64,
    /// L1 leaf regularization.
    pub reg_alpha: f64,
    /// L2 leaf regularization.
    pub reg_lambda: f64,
    pub objective: Objective,
    /// Stop after this many rounds without tail-block improvement.
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

impl Default for TreeBoosterConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            colsample_bylevel: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            objective: Objective::SquaredError,
            early_stopping_rounds: None,
            seed: 123,
        }
    }
}

impl TreeBoosterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForecastError::ModelBuild(
                "n_estimators must be positive".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(ForecastError::ModelBuild(
                "max_depth must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ForecastError::ModelBuild(
                "learning_rate must be a positive finite number".to_string(),
            ));
        }
        for (name, value) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
            ("colsample_bylevel", self.colsample_bylevel),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ForecastError::ModelBuild(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        for (name, value) in [
            ("min_child_weight", self.min_child_weight),
            ("gamma", self.gamma),
            ("reg_alpha", self.reg_alpha),
            ("reg_lambda", self.reg_lambda),
        ] {
            if value < 0.0 {
                return Err(ForecastError::ModelBuild(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Reference hyperparameter grid for the tree-ensemble family.
pub fn search_space() -> SearchSpace {
    let fractions = [0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
    SearchSpace::new()
        .with(Parameter::int_set("max_depth", &[2, 4, 6, 8, 10, 12, 14]))
        .with(Parameter::float_set("subsample", &fractions))
        .with(Parameter::float_set("colsample_bytree", &fractions))
        .with(Parameter::float_set("colsample_bylevel", &fractions))
        .with(Parameter::choice("objective", &["squared_error", "poisson"]))
        .with(Parameter::float_set("learning_rate", &[0.1, 0.01, 0.0001]))
        .with(Parameter::int_set("n_estimators", &[100, 1000, 10000]))
        .with(Parameter::float_set("reg_alpha", &[0.0]))
        .with(Parameter::float_set("reg_lambda", &[0.0]))
        .with(Parameter::float_set("gamma", &[0.0]))
        .with(Parameter::int_set("early_stopping_rounds", &[25]))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

fn node_score(node: &TreeNode, row: ArrayView1<f64>) -> f64 {
    match node {
        TreeNode::Leaf { weight } => *weight,
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                node_score(left, row)
            } else {
                node_score(right, row)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn score_term(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

fn leaf_weight(g: f64, h: f64, config: &TreeBoosterConfig) -> f64 {
    let g = if g > config.reg_alpha {
        g - config.reg_alpha
    } else if g < -config.reg_alpha {
        g + config.reg_alpha
    } else {
        0.0
    };
    -g / (h + config.reg_lambda)
}

/// Best split of `indices` along one feature: sort by value, scan boundary
/// positions, skip boundaries between equal values, respect the hessian
/// floor on both children. Thresholds land midway between neighbors.
fn best_split_for_feature(
    x: ArrayView2<f64>,
    grad: &[f64],
    hess: &[f64],
    indices: &[usize],
    feature: usize,
    config: &TreeBoosterConfig,
) -> Option<SplitCandidate> {
    let mut rows: Vec<(f64, f64, f64)> = indices
        .iter()
        .map(|&i| (x[[i, feature]], grad[i], hess[i]))
        .collect();
    rows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let g_total: f64 = rows.iter().map(|r| r.1).sum();
    let h_total: f64 = rows.iter().map(|r| r.2).sum();
    let parent = score_term(g_total, h_total, config.reg_lambda);

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<SplitCandidate> = None;
    for pos in 0..rows.len() - 1 {
        g_left += rows[pos].1;
        h_left += rows[pos].2;
        if rows[pos].0 == rows[pos + 1].0 {
            continue;
        }
        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }
        let gain = 0.5
            * (score_term(g_left, h_left, config.reg_lambda)
                + score_term(g_right, h_right, config.reg_lambda)
                - parent)
            - config.gamma;
        if best.as_ref().map_or(true, |b| gain > b.gain) {
            best = Some(SplitCandidate {
                feature,
                threshold: (rows[pos].0 + rows[pos + 1].0) / 2.0,
                gain,
            });
        }
    }
    best
}

/// Grow one tree over the sampled rows. Candidate splits are scored per
/// feature in parallel, then the winner is taken sequentially with ties
/// broken by feature index so rebuilds are reproducible.
fn grow_tree(
    x: ArrayView2<f64>,
    grad: &[f64],
    hess: &[f64],
    indices: &[usize],
    depth: usize,
    config: &TreeBoosterConfig,
    level_features: &[Vec<usize>],
) -> TreeNode {
    let g_sum: f64 = indices.iter().map(|&i| grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| hess[i]).sum();

    if depth >= config.max_depth || indices.len() < 2 || h_sum < config.min_child_weight {
        return TreeNode::Leaf {
            weight: leaf_weight(g_sum, h_sum, config),
        };
    }

    let mut candidates: Vec<SplitCandidate> = level_features[depth]
        .par_iter()
        .filter_map(|&f| best_split_for_feature(x, grad, hess, indices, f, config))
        .collect();
    candidates.sort_by(|a, b| {
        b.gain
            .partial_cmp(&a.gain)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.feature.cmp(&b.feature))
    });

    match candidates.first() {
        Some(split) if split.gain > 0.0 => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[[i, split.feature]] < split.threshold);
            if left_idx.is_empty() || right_idx.is_empty() {
                return TreeNode::Leaf {
                    weight: leaf_weight(g_sum, h_sum, config),
                };
            }
            TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(grow_tree(x, grad, hess, &left_idx, depth + 1, config, level_features)),
                right: Box::new(grow_tree(x, grad, hess, &right_idx, depth + 1, config, level_features)),
            }
        }
        _ => TreeNode::Leaf {
            weight: leaf_weight(g_sum, h_sum, config),
        },
    }
}

/// Draw `fraction` of a pool without replacement, returned sorted.
fn sample_fraction(pool: &[usize], fraction: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    if fraction >= 1.0 {
        return pool.to_vec();
    }
    let keep = ((pool.len() as f64 * fraction).ceil() as usize).clamp(1, pool.len());
    let mut drawn = pool.to_vec();
    drawn.shuffle(rng);
    drawn.truncate(keep);
    drawn.sort_unstable();
    drawn
}

/// Gradient-boosted tree ensemble for regression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeBooster {
    config: TreeBoosterConfig,
    trees: Vec<TreeNode>,
    base_score: f64,
}

impl TreeBooster {
    pub fn new(config: TreeBoosterConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
        }
    }

    pub fn config(&self) -> &TreeBoosterConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Clone the template with sampled hyperparameters applied.
    pub fn with_trial(&self, params: &TrialParams) -> Result<TreeBooster> {
        let mut config = self.config.clone();
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => config.n_estimators = usize_value(name, value)?,
                "learning_rate" => config.learning_rate = float_value(name, value)?,
                "max_depth" => config.max_depth = usize_value(name, value)?,
                "min_child_weight" => config.min_child_weight = float_value(name, value)?,
                "gamma" => config.gamma = float_value(name, value)?,
                "subsample" => config.subsample = float_value(name, value)?,
                "colsample_bytree" => config.colsample_bytree = float_value(name, value)?,
                "colsample_bylevel" => config.colsample_bylevel = float_value(name, value)?,
                "reg_alpha" => config.reg_alpha = float_value(name, value)?,
                "reg_lambda" => config.reg_lambda = float_value(name, value)?,
                "objective" => config.objective = Objective::parse(text_value(name, value)?)?,
                "early_stopping_rounds" => {
                    config.early_stopping_rounds = Some(usize_value(name, value)?)
                }
                other => {
                    return Err(ForecastError::ModelBuild(format!(
                        "unknown tree-ensemble hyperparameter '{other}'"
                    )))
                }
            }
        }
        config.validate()?;
        Ok(TreeBooster::new(config))
    }

    /// Fit the ensemble. Rows are assumed chronologically ordered; when
    /// early stopping is active the most recent block is held out of tree
    /// growth and watched for stalling, then the ensemble is truncated to
    /// its best length on that block.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.config.validate()?;
        let n = x.nrows();
        if n != y.len() {
            return Err(ForecastError::Data(format!(
                "feature rows ({n}) and target rows ({}) differ",
                y.len()
            )));
        }
        if n < 2 {
            return Err(ForecastError::Data(
                "tree ensemble needs at least two training rows".to_string(),
            ));
        }
        if self.config.objective == Objective::Poisson && y.iter().any(|v| *v < 0.0) {
            return Err(ForecastError::ModelBuild(
                "poisson objective requires non-negative targets".to_string(),
            ));
        }

        let stopping = self.config.early_stopping_rounds.filter(|_| n >= MIN_EARLY_STOP_ROWS);
        let eval_len = match stopping {
            Some(_) => ((n as f64 * EVAL_TAIL_FRACTION).round() as usize).max(1),
            None => 0,
        };
        let fit_rows: Vec<usize> = (0..n - eval_len).collect();
        let eval_rows: Vec<usize> = (n - eval_len..n).collect();

        let fit_targets: Vec<f64> = fit_rows.iter().map(|&i| y[i]).collect();
        self.base_score = self.config.objective.base_score(&fit_targets);
        self.trees.clear();

        let all_features: Vec<usize> = (0..x.ncols()).collect();
        let mut raw = vec![self.base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed);

        let mut best_eval = f64::INFINITY;
        let mut best_len = 0usize;
        let mut stall = 0usize;

        for _ in 0..self.config.n_estimators {
            for &i in &fit_rows {
                let (g, h) = self.config.objective.derivatives(raw[i], y[i]);
                grad[i] = g;
                hess[i] = h;
            }

            let row_sample = sample_fraction(&fit_rows, self.config.subsample, &mut rng);
            let tree_features =
                sample_fraction(&all_features, self.config.colsample_bytree, &mut rng);
            let level_features: Vec<Vec<usize>> = (0..self.config.max_depth)
                .map(|_| sample_fraction(&tree_features, self.config.colsample_bylevel, &mut rng))
                .collect();

            let tree = grow_tree(
                x.view(),
                &grad,
                &hess,
                &row_sample,
                0,
                &self.config,
                &level_features,
            );
            for i in 0..n {
                raw[i] += self.config.learning_rate * node_score(&tree, x.row(i));
            }
            self.trees.push(tree);

            if let Some(rounds) = stopping {
                let eval_mse = eval_rows
                    .iter()
                    .map(|&i| {
                        let err = self.config.objective.mean(raw[i]) - y[i];
                        err * err
                    })
                    .sum::<f64>()
                    / eval_rows.len() as f64;
                if !eval_mse.is_finite() {
                    return Err(ForecastError::ModelBuild(
                        "boosting diverged to a non-finite loss".to_string(),
                    ));
                }
                if eval_mse < best_eval {
                    best_eval = eval_mse;
                    best_len = self.trees.len();
                    stall = 0;
                } else {
                    stall += 1;
                    if stall >= rounds {
                        break;
                    }
                }
            }
        }

        if stopping.is_some() {
            self.trees.truncate(best_len.max(1));
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ForecastError::ModelNotFitted);
        }
        let mut out = Array1::zeros(x.nrows());
        for (i, row) in x.outer_iter().enumerate() {
            let mut raw = self.base_score;
            for tree in &self.trees {
                raw += self.config.learning_rate * node_score(tree, row);
            }
            out[i] = self.config.objective.mean(raw);
        }
        Ok(out)
    }
}
