//! Recurrent network over single-step sequences
//!
//! A stack of LSTM cells applied to windows of length one, each followed by
//! inverted dropout, closed by a linear head. Gate activations are sigmoid;
//! the candidate and the cell output pass through ReLU. Hidden width equals
//! the feature count, so every kernel is square. Training is Adam on mean
//! squared error with a training-loss plateau as the stopping rule.
//!
//! Fitted state lives in a detachable [`NetWeights`] blob so the rest of
//! the struct can be serialized without megabytes of kernel data.

use ndarray::{s, Array1, Array2, Array3, Axis, Zip};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::{float_value, usize_value};
use crate::error::{ForecastError, Result};
use crate::search::{Parameter, SearchSpace, TrialParams};

/// Epochs without training-loss improvement tolerated before fit stops.
pub const LOSS_PATIENCE: usize = 50;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// Recurrent-network hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentConfig {
    /// Total layer count; `depth - 1` recurrent layers feed the linear head.
    pub depth: usize,
    pub learning_rate: f64,
    /// Inverted-dropout rate applied after each recurrent layer.
    pub dropout: f64,
    pub batch_size: usize,
    /// Epoch ceiling; the loss plateau usually stops fit long before it.
    pub max_epochs: usize,
    pub seed: u64,
}

impl Default for RecurrentConfig {
    fn default() -> Self {
        Self {
            depth: 2,
            learning_rate: 0.001,
            dropout: 0.0,
            batch_size: 30,
            max_epochs: 100_000,
            seed: 42,
        }
    }
}

impl RecurrentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(ForecastError::ModelBuild(
                "layers must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ForecastError::ModelBuild(
                "learning_rate must be a positive finite number".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::ModelBuild(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::ModelBuild(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.max_epochs == 0 {
            return Err(ForecastError::ModelBuild(
                "max_epochs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reference hyperparameter grid for the sequential-neural family.
pub fn search_space() -> SearchSpace {
    SearchSpace::new()
        .with(Parameter::int_set("layers", &[1, 2, 3, 4, 5, 6, 7, 8, 9]))
        .with(Parameter::int_set("batch_size", &[7, 30, 60, 90, 180, 365]))
        .with(Parameter::float_set("learning_rate", &[0.001, 0.0001, 0.00001]))
        .with(Parameter::float_set(
            "dropout",
            &[0.0, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45],
        ))
}

/// One LSTM cell's kernels, gates stacked row-wise as
/// [input, forget, candidate, output].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    pub w_input: Array2<f64>,
    /// Recurrent kernel. Inert over single-step windows (the hidden state
    /// starts at zero and never carries) but kept as part of the cell.
    pub w_hidden: Array2<f64>,
    pub bias: Array1<f64>,
}

/// The complete trainable state of a network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetWeights {
    pub layers: Vec<LstmLayer>,
    pub head_w: Array1<f64>,
    pub head_b: f64,
}

impl NetWeights {
    fn zeros_like(other: &NetWeights) -> Self {
        Self {
            layers: other
                .layers
                .iter()
                .map(|l| LstmLayer {
                    w_input: Array2::zeros(l.w_input.raw_dim()),
                    w_hidden: Array2::zeros(l.w_hidden.raw_dim()),
                    bias: Array1::zeros(l.bias.len()),
                })
                .collect(),
            head_w: Array1::zeros(other.head_w.len()),
            head_b: 0.0,
        }
    }

    fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.w_input.fill(0.0);
            layer.w_hidden.fill(0.0);
            layer.bias.fill(0.0);
        }
        self.head_w.fill(0.0);
        self.head_b = 0.0;
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn relu(v: f64) -> f64 {
    v.max(0.0)
}

fn relu_derivative(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn xavier(rows: usize, cols: usize, rng: &mut Xoshiro256PlusPlus) -> Array2<f64> {
    let scale = (2.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.gen::<f64>() * 2.0 * scale - scale)
}

fn init_weights(depth: usize, n_features: usize, rng: &mut Xoshiro256PlusPlus) -> NetWeights {
    let hidden = n_features;
    let layers = (0..depth.saturating_sub(1))
        .map(|_| LstmLayer {
            w_input: xavier(4 * hidden, n_features, rng),
            w_hidden: xavier(4 * hidden, hidden, rng),
            bias: Array1::zeros(4 * hidden),
        })
        .collect();
    let head_scale = (2.0 / (n_features + 1) as f64).sqrt();
    NetWeights {
        layers,
        head_w: Array1::from_shape_fn(n_features, |_| {
            rng.gen::<f64>() * 2.0 * head_scale - head_scale
        }),
        head_b: 0.0,
    }
}

/// Per-layer values cached during a training forward pass.
struct LayerCache {
    input: Array1<f64>,
    gates: Array1<f64>,
    i: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
    mask: Option<Array1<f64>>,
}

struct ForwardCache {
    layers: Vec<LayerCache>,
    head_input: Array1<f64>,
}

/// One cell's activations for a single window.
struct CellOutput {
    gates: Array1<f64>,
    i: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
    hidden: Array1<f64>,
}

fn cell_forward(layer: &LstmLayer, input: &Array1<f64>) -> CellOutput {
    let h = layer.bias.len() / 4;
    // The recurrent term is w_hidden . h_prev, identically zero here.
    let gates = layer.w_input.dot(input) + &layer.bias;
    let i = gates.slice(s![0..h]).mapv(sigmoid);
    let g = gates.slice(s![2 * h..3 * h]).mapv(relu);
    let o = gates.slice(s![3 * h..4 * h]).mapv(sigmoid);
    // c = f * c_prev + i * g collapses: the cell starts empty every window.
    let c = &i * &g;
    let hidden = &o * &c.mapv(relu);
    CellOutput {
        gates,
        i,
        g,
        o,
        c,
        hidden,
    }
}

/// LSTM network bound to a fixed feature count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentNet {
    config: RecurrentConfig,
    n_features: usize,
    epochs_run: usize,
    #[serde(skip)]
    weights: Option<NetWeights>,
}

impl RecurrentNet {
    pub fn new(config: RecurrentConfig, n_features: usize) -> Self {
        Self {
            config,
            n_features,
            epochs_run: 0,
            weights: None,
        }
    }

    pub fn config(&self) -> &RecurrentConfig {
        &self.config
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    pub fn is_fitted(&self) -> bool {
        self.weights.is_some()
    }

    pub fn weights(&self) -> Option<&NetWeights> {
        self.weights.as_ref()
    }

    /// Rehydrate a weight blob into this skeleton. The blob must match the
    /// network's depth and feature count exactly.
    pub fn attach_weights(&mut self, weights: NetWeights) -> Result<()> {
        let f = self.n_features;
        let expected_layers = self.config.depth.saturating_sub(1);
        let shapes_match = weights.layers.len() == expected_layers
            && weights.head_w.len() == f
            && weights.layers.iter().all(|l| {
                l.w_input.dim() == (4 * f, f)
                    && l.w_hidden.dim() == (4 * f, f)
                    && l.bias.len() == 4 * f
            });
        if !shapes_match {
            return Err(ForecastError::Persistence(
                "weight blob does not match the network shape".to_string(),
            ));
        }
        self.weights = Some(weights);
        Ok(())
    }

    /// Clone the template with sampled hyperparameters applied.
    pub fn with_trial(&self, params: &TrialParams) -> Result<RecurrentNet> {
        let mut config = self.config.clone();
        for (name, value) in params {
            match name.as_str() {
                "layers" => config.depth = usize_value(name, value)?,
                "batch_size" => config.batch_size = usize_value(name, value)?,
                "learning_rate" => config.learning_rate = float_value(name, value)?,
                "dropout" => config.dropout = float_value(name, value)?,
                other => {
                    return Err(ForecastError::ModelBuild(format!(
                        "unknown sequential-neural hyperparameter '{other}'"
                    )))
                }
            }
        }
        config.validate()?;
        Ok(RecurrentNet::new(config, self.n_features))
    }

    fn check_input(&self, x: &Array3<f64>) -> Result<()> {
        let shape = x.shape();
        if shape[1] != 1 {
            return Err(ForecastError::ModelBuild(format!(
                "network consumes single-step sequences, got window length {}",
                shape[1]
            )));
        }
        if shape[2] != self.n_features {
            return Err(ForecastError::ModelBuild(format!(
                "sequence feature width {} does not match the network ({})",
                shape[2], self.n_features
            )));
        }
        Ok(())
    }

    /// Train with Adam on mean squared error. Epochs stop early once the
    /// epoch training loss has not improved for `loss_patience` epochs.
    pub fn fit(
        &mut self,
        x: &Array3<f64>,
        y: &Array1<f64>,
        loss_patience: Option<usize>,
    ) -> Result<()> {
        self.config.validate()?;
        self.check_input(x)?;
        let n = x.shape()[0];
        if n != y.len() {
            return Err(ForecastError::Data(format!(
                "sequence rows ({n}) and target rows ({}) differ",
                y.len()
            )));
        }
        if n == 0 {
            return Err(ForecastError::Data(
                "network needs at least one training row".to_string(),
            ));
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed);
        let mut weights = init_weights(self.config.depth, self.n_features, &mut rng);
        let mut m = NetWeights::zeros_like(&weights);
        let mut v = NetWeights::zeros_like(&weights);
        let mut grads = NetWeights::zeros_like(&weights);
        let mut step = 0i32;

        let mut best_loss = f64::INFINITY;
        let mut stall = 0usize;
        self.epochs_run = 0;

        let mut indices: Vec<usize> = (0..n).collect();
        for _epoch in 0..self.config.max_epochs {
            indices.shuffle(&mut rng);
            let mut epoch_sse = 0.0;

            for batch in indices.chunks(self.config.batch_size) {
                grads.reset();
                let scale = 1.0 / batch.len() as f64;
                for &row in batch {
                    let sample = x.index_axis(Axis(0), row).row(0).to_owned();
                    let (pred, cache) = self.forward_train(&weights, sample, &mut rng);
                    let err = pred - y[row];
                    epoch_sse += err * err;
                    backward_sample(&weights, &cache, 2.0 * err * scale, &mut grads);
                }
                step += 1;
                adam_update(&mut weights, &grads, &mut m, &mut v, step, self.config.learning_rate);
            }

            self.epochs_run += 1;
            let epoch_loss = epoch_sse / n as f64;
            if !epoch_loss.is_finite() {
                return Err(ForecastError::ModelBuild(
                    "training diverged to a non-finite loss".to_string(),
                ));
            }
            if let Some(patience) = loss_patience {
                if epoch_loss < best_loss {
                    best_loss = epoch_loss;
                    stall = 0;
                } else {
                    stall += 1;
                    if stall >= patience {
                        break;
                    }
                }
            }
        }

        self.weights = Some(weights);
        Ok(())
    }

    pub fn predict(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
        let weights = self.weights.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        self.check_input(x)?;
        let n = x.shape()[0];
        let mut out = Array1::zeros(n);
        for row in 0..n {
            let sample = x.index_axis(Axis(0), row).row(0).to_owned();
            out[row] = score_sample(weights, sample);
        }
        Ok(out)
    }

    fn forward_train(
        &self,
        weights: &NetWeights,
        sample: Array1<f64>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> (f64, ForwardCache) {
        let mut caches = Vec::with_capacity(weights.layers.len());
        let mut input = sample;
        for layer in &weights.layers {
            let mut cell = cell_forward(layer, &input);
            let mask = if self.config.dropout > 0.0 {
                let keep = 1.0 - self.config.dropout;
                let mask = Array1::from_shape_fn(cell.hidden.len(), |_| {
                    if rng.gen::<f64>() < self.config.dropout {
                        0.0
                    } else {
                        1.0 / keep
                    }
                });
                cell.hidden *= &mask;
                Some(mask)
            } else {
                None
            };
            caches.push(LayerCache {
                input,
                gates: cell.gates,
                i: cell.i,
                g: cell.g,
                o: cell.o,
                c: cell.c,
                mask,
            });
            input = cell.hidden;
        }
        let pred = weights.head_w.dot(&input) + weights.head_b;
        (
            pred,
            ForwardCache {
                layers: caches,
                head_input: input,
            },
        )
    }
}

fn score_sample(weights: &NetWeights, sample: Array1<f64>) -> f64 {
    let mut input = sample;
    for layer in &weights.layers {
        input = cell_forward(layer, &input).hidden;
    }
    weights.head_w.dot(&input) + weights.head_b
}

fn backward_sample(weights: &NetWeights, cache: &ForwardCache, dpred: f64, grads: &mut NetWeights) {
    grads.head_w.scaled_add(dpred, &cache.head_input);
    grads.head_b += dpred;

    let mut dh = weights.head_w.mapv(|w| w * dpred);
    for k in (0..weights.layers.len()).rev() {
        let lc = &cache.layers[k];
        if let Some(mask) = &lc.mask {
            dh *= mask;
        }
        let h = lc.c.len();
        let d_out = &dh * &lc.c.mapv(relu);
        let dc = &dh * &lc.o * &lc.c.mapv(relu_derivative);
        let di = &dc * &lc.g;
        let dg = &dc * &lc.i;

        // Forget-gate rows stay zero: the cell starts empty every window.
        let mut dz = Array1::zeros(4 * h);
        for j in 0..h {
            dz[j] = di[j] * lc.i[j] * (1.0 - lc.i[j]);
            dz[2 * h + j] = dg[j] * relu_derivative(lc.gates[2 * h + j]);
            dz[3 * h + j] = d_out[j] * lc.o[j] * (1.0 - lc.o[j]);
        }

        grads.layers[k].bias += &dz;
        let gw = &mut grads.layers[k].w_input;
        for (r, &dzr) in dz.iter().enumerate() {
            if dzr != 0.0 {
                gw.row_mut(r).scaled_add(dzr, &lc.input);
            }
        }
        dh = weights.layers[k].w_input.t().dot(&dz);
    }
}

fn adam_step_2d(
    param: &mut Array2<f64>,
    grad: &Array2<f64>,
    m: &mut Array2<f64>,
    v: &mut Array2<f64>,
    correction: (f64, f64),
    lr: f64,
) {
    Zip::from(param).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
        *m = BETA1 * *m + (1.0 - BETA1) * g;
        *v = BETA2 * *v + (1.0 - BETA2) * g * g;
        *p -= lr * (*m / correction.0) / ((*v / correction.1).sqrt() + ADAM_EPS);
    });
}

fn adam_step_1d(
    param: &mut Array1<f64>,
    grad: &Array1<f64>,
    m: &mut Array1<f64>,
    v: &mut Array1<f64>,
    correction: (f64, f64),
    lr: f64,
) {
    Zip::from(param).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
        *m = BETA1 * *m + (1.0 - BETA1) * g;
        *v = BETA2 * *v + (1.0 - BETA2) * g * g;
        *p -= lr * (*m / correction.0) / ((*v / correction.1).sqrt() + ADAM_EPS);
    });
}

fn adam_update(
    weights: &mut NetWeights,
    grads: &NetWeights,
    m: &mut NetWeights,
    v: &mut NetWeights,
    step: i32,
    lr: f64,
) {
    let correction = (1.0 - BETA1.powi(step), 1.0 - BETA2.powi(step));
    for k in 0..weights.layers.len() {
        adam_step_2d(
            &mut weights.layers[k].w_input,
            &grads.layers[k].w_input,
            &mut m.layers[k].w_input,
            &mut v.layers[k].w_input,
            correction,
            lr,
        );
        adam_step_2d(
            &mut weights.layers[k].w_hidden,
            &grads.layers[k].w_hidden,
            &mut m.layers[k].w_hidden,
            &mut v.layers[k].w_hidden,
            correction,
            lr,
        );
        adam_step_1d(
            &mut weights.layers[k].bias,
            &grads.layers[k].bias,
            &mut m.layers[k].bias,
            &mut v.layers[k].bias,
            correction,
            lr,
        );
    }
    adam_step_1d(&mut weights.head_w, &grads.head_w, &mut m.head_w, &mut v.head_w, correction, lr);
    m.head_b = BETA1 * m.head_b + (1.0 - BETA1) * grads.head_b;
    v.head_b = BETA2 * v.head_b + (1.0 - BETA2) * grads.head_b * grads.head_b;
    weights.head_b -= lr * (m.head_b / correction.0) / ((v.head_b / correction.1).sqrt() + ADAM_EPS);
}
