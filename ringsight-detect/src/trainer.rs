// Copyright 2026 Ringsight (https://github.com/ringsight)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Detector training
//!
//! Full-batch training of the relational detector with Adam, inverse-
//! frequency class weighting, a stratified train/validation/test split and
//! early stopping. The validation split selects the best checkpoint and
//! never contributes gradients; reported metrics come from the held-out
//! test split.
//!
//! Gradients are written out explicitly for the fixed two-layer
//! architecture; the model is small enough that hand-derived backprop stays
//! readable and keeps the dependency surface at ndarray.

use crate::model::{propagate_transpose, relu, softmax_rows, RelationalDetector, RgcnLayer, TrainedDetector};
use crate::tensors::{GraphTensors, NUM_FEATURES};
use crate::{DetectError, DetectResult};
use ndarray::{Array1, Array2, Axis, Zip};
use rand::prelude::*;
use ringsight_core::{LabelMap, RelationType, TransactionGraph};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub hidden_dim: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub dropout: f32,
    /// Fraction of accounts in the training split
    pub train_ratio: f64,
    /// Fraction of accounts in the validation split; the remainder is test
    pub val_ratio: f64,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 16,
            epochs: 200,
            learning_rate: 0.01,
            weight_decay: 5e-4,
            dropout: 0.3,
            train_ratio: 0.6,
            val_ratio: 0.2,
            patience: 20,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> DetectResult<()> {
        if self.hidden_dim == 0 || self.epochs == 0 {
            return Err(DetectError::Config(
                "hidden_dim and epochs must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(DetectError::Config(format!(
                "dropout must be within [0, 1), got {}",
                self.dropout
            )));
        }
        if self.train_ratio <= 0.0
            || self.val_ratio < 0.0
            || self.train_ratio + self.val_ratio >= 1.0
        {
            return Err(DetectError::Config(format!(
                "split ratios must leave room for a test set, got train={} val={}",
                self.train_ratio, self.val_ratio
            )));
        }
        Ok(())
    }
}

/// Classification metrics for the fraud class
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Number of fraud accounts in the evaluated split
    pub support_pos: usize,
    /// Total accounts in the evaluated split
    pub support: usize,
}

struct Split {
    train: Vec<bool>,
    val: Vec<bool>,
    test: Vec<bool>,
}

/// Stratified-by-label disjoint split. Each class contributes at least one
/// training example.
fn stratified_split(y: &[usize], cfg: &TrainConfig, rng: &mut StdRng) -> DetectResult<Split> {
    let n = y.len();
    let mut positives: Vec<usize> = (0..n).filter(|&i| y[i] == 1).collect();
    let mut negatives: Vec<usize> = (0..n).filter(|&i| y[i] == 0).collect();

    if positives.is_empty() {
        return Err(DetectError::NoPositiveExamples);
    }
    if negatives.is_empty() {
        return Err(DetectError::DegenerateSplit(
            "label map marks every account as fraud".into(),
        ));
    }

    positives.shuffle(rng);
    negatives.shuffle(rng);

    let mut train = vec![false; n];
    let mut val = vec![false; n];
    let mut test = vec![false; n];

    for class in [&positives, &negatives] {
        let count = class.len();
        let n_train = ((count as f64 * cfg.train_ratio).round() as usize).clamp(1, count);
        let n_val =
            ((count as f64 * cfg.val_ratio).round() as usize).min(count - n_train);
        for (rank, &idx) in class.iter().enumerate() {
            if rank < n_train {
                train[idx] = true;
            } else if rank < n_train + n_val {
                val[idx] = true;
            } else {
                test[idx] = true;
            }
        }
    }

    Ok(Split { train, val, test })
}

/// Inverse-frequency class weights, computed on the training split only and
/// normalized to sum to the class count.
fn class_weights(y: &[usize], train: &[bool]) -> DetectResult<[f32; 2]> {
    let mut counts = [0usize; 2];
    for (i, &label) in y.iter().enumerate() {
        if train[i] {
            counts[label] += 1;
        }
    }
    if counts[1] == 0 {
        return Err(DetectError::DegenerateSplit(
            "training split holds no fraud examples".into(),
        ));
    }
    let raw = [1.0 / counts[0] as f32, 1.0 / counts[1] as f32];
    let sum = raw[0] + raw[1];
    Ok([raw[0] * 2.0 / sum, raw[1] * 2.0 / sum])
}

struct ForwardCache {
    z1: Array2<f32>,
    h1: Array2<f32>,
    mask1: Array2<f32>,
    z2: Array2<f32>,
    h2: Array2<f32>,
    mask2: Array2<f32>,
    probs: Array2<f32>,
}

/// Inverted-dropout mask: kept units are scaled so the expected activation
/// is unchanged.
fn dropout_mask(shape: (usize, usize), p: f32, rng: &mut StdRng) -> Array2<f32> {
    if p == 0.0 {
        return Array2::ones(shape);
    }
    let keep = 1.0 - p;
    Array2::from_shape_fn(shape, |_| {
        if rng.gen::<f32>() < p {
            0.0
        } else {
            1.0 / keep
        }
    })
}

fn forward_train(
    model: &RelationalDetector,
    tensors: &GraphTensors,
    dropout: f32,
    rng: &mut StdRng,
) -> ForwardCache {
    let z1 = model.layer1.forward(tensors, &tensors.x);
    let a1 = relu(&z1);
    let mask1 = dropout_mask((a1.nrows(), a1.ncols()), dropout, rng);
    let h1 = &a1 * &mask1;

    let z2 = model.layer2.forward(tensors, &h1);
    let a2 = relu(&z2);
    let mask2 = dropout_mask((a2.nrows(), a2.ncols()), dropout, rng);
    let h2 = &a2 * &mask2;

    let logits = h2.dot(&model.w_out) + &model.b_out;
    let probs = softmax_rows(&logits);

    ForwardCache {
        z1,
        h1,
        mask1,
        z2,
        h2,
        mask2,
        probs,
    }
}

/// Class-weighted negative log-likelihood over the training mask. Returns
/// the loss and the gradient with respect to the logits.
fn weighted_nll(
    probs: &Array2<f32>,
    y: &[usize],
    train: &[bool],
    weights: &[f32; 2],
) -> (f32, Array2<f32>) {
    let n = probs.nrows();
    let weight_sum: f32 = (0..n).filter(|&i| train[i]).map(|i| weights[y[i]]).sum();

    let mut loss = 0.0;
    let mut dlogits = Array2::<f32>::zeros((n, 2));
    for i in 0..n {
        if !train[i] {
            continue;
        }
        let w = weights[y[i]] / weight_sum;
        loss -= weights[y[i]] * probs[[i, y[i]]].max(1e-12).ln();
        for c in 0..2 {
            let target = if c == y[i] { 1.0 } else { 0.0 };
            dlogits[[i, c]] = w * (probs[[i, c]] - target);
        }
    }
    (loss / weight_sum, dlogits)
}

struct LayerGrads {
    w_rel: Vec<Array2<f32>>,
    w_self: Array2<f32>,
    bias: Array1<f32>,
}

struct Gradients {
    layer1: LayerGrads,
    layer2: LayerGrads,
    w_out: Array2<f32>,
    b_out: Array1<f32>,
}

/// Backward pass through the convolution layer: given the gradient at the
/// pre-activation output and the layer input, produce parameter gradients
/// and the gradient flowing into the input.
fn layer_backward(
    layer: &RgcnLayer,
    tensors: &GraphTensors,
    input: &Array2<f32>,
    dz: &Array2<f32>,
) -> (LayerGrads, Array2<f32>) {
    let mut d_input = dz.dot(&layer.w_self.t());
    let d_wself = input.t().dot(dz);

    let mut d_wrel = Vec::with_capacity(layer.w_rel.len());
    for (r, w) in layer.w_rel.iter().enumerate() {
        let mut d_messages = Array2::<f32>::zeros(dz.raw_dim());
        propagate_transpose(&tensors.edges[r], &tensors.in_norm[r], dz, &mut d_messages);
        d_wrel.push(input.t().dot(&d_messages));
        d_input = d_input + d_messages.dot(&w.t());
    }

    let grads = LayerGrads {
        w_rel: d_wrel,
        w_self: d_wself,
        bias: dz.sum_axis(Axis(0)),
    };
    (grads, d_input)
}

fn backward(
    model: &RelationalDetector,
    tensors: &GraphTensors,
    cache: &ForwardCache,
    dlogits: &Array2<f32>,
) -> Gradients {
    let d_wout = cache.h2.t().dot(dlogits);
    let d_bout = dlogits.sum_axis(Axis(0));

    let dh2 = dlogits.dot(&model.w_out.t());
    let dz2 = &(&dh2 * &cache.mask2) * &cache.z2.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
    let (layer2_grads, dh1) = layer_backward(&model.layer2, tensors, &cache.h1, &dz2);

    let dz1 = &(&dh1 * &cache.mask1) * &cache.z1.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
    let (layer1_grads, _) = layer_backward(&model.layer1, tensors, &tensors.x, &dz1);

    Gradients {
        layer1: layer1_grads,
        layer2: layer2_grads,
        w_out: d_wout,
        b_out: d_bout,
    }
}

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;

struct Adam {
    lr: f32,
    weight_decay: f32,
    t: i32,
    mat_m: Vec<Array2<f32>>,
    mat_v: Vec<Array2<f32>>,
    vec_m: Vec<Array1<f32>>,
    vec_v: Vec<Array1<f32>>,
}

impl Adam {
    /// Slot order must match [`Adam::step`]: layer1 relations, layer1 self,
    /// layer2 relations, layer2 self, output weight; then the three biases.
    fn new(model: &RelationalDetector, lr: f32, weight_decay: f32) -> Self {
        let mut mat_shapes = Vec::new();
        for layer in [&model.layer1, &model.layer2] {
            for w in &layer.w_rel {
                mat_shapes.push(w.raw_dim());
            }
            mat_shapes.push(layer.w_self.raw_dim());
        }
        mat_shapes.push(model.w_out.raw_dim());

        let vec_shapes = vec![
            model.layer1.bias.raw_dim(),
            model.layer2.bias.raw_dim(),
            model.b_out.raw_dim(),
        ];

        Self {
            lr,
            weight_decay,
            t: 0,
            mat_m: mat_shapes.iter().map(|&d| Array2::zeros(d)).collect(),
            mat_v: mat_shapes.iter().map(|&d| Array2::zeros(d)).collect(),
            vec_m: vec_shapes.iter().map(|&d| Array1::zeros(d)).collect(),
            vec_v: vec_shapes.iter().map(|&d| Array1::zeros(d)).collect(),
        }
    }

    fn step(&mut self, model: &mut RelationalDetector, grads: &Gradients) {
        self.t += 1;
        let bc1 = 1.0 - ADAM_BETA1.powi(self.t);
        let bc2 = 1.0 - ADAM_BETA2.powi(self.t);

        let mut slot = 0;
        for (layer, layer_grads) in [
            (&mut model.layer1, &grads.layer1),
            (&mut model.layer2, &grads.layer2),
        ] {
            for (w, g) in layer.w_rel.iter_mut().zip(layer_grads.w_rel.iter()) {
                Self::update2(
                    w,
                    g,
                    &mut self.mat_m[slot],
                    &mut self.mat_v[slot],
                    self.lr,
                    self.weight_decay,
                    bc1,
                    bc2,
                );
                slot += 1;
            }
            Self::update2(
                &mut layer.w_self,
                &layer_grads.w_self,
                &mut self.mat_m[slot],
                &mut self.mat_v[slot],
                self.lr,
                self.weight_decay,
                bc1,
                bc2,
            );
            slot += 1;
        }
        Self::update2(
            &mut model.w_out,
            &grads.w_out,
            &mut self.mat_m[slot],
            &mut self.mat_v[slot],
            self.lr,
            self.weight_decay,
            bc1,
            bc2,
        );

        for (i, (b, g)) in [
            (&mut model.layer1.bias, &grads.layer1.bias),
            (&mut model.layer2.bias, &grads.layer2.bias),
            (&mut model.b_out, &grads.b_out),
        ]
        .into_iter()
        .enumerate()
        {
            Self::update1(b, g, &mut self.vec_m[i], &mut self.vec_v[i], self.lr, bc1, bc2);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update2(
        p: &mut Array2<f32>,
        g: &Array2<f32>,
        m: &mut Array2<f32>,
        v: &mut Array2<f32>,
        lr: f32,
        weight_decay: f32,
        bc1: f32,
        bc2: f32,
    ) {
        Zip::from(p)
            .and(g)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                let g = g + weight_decay * *p;
                *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                let m_hat = *m / bc1;
                let v_hat = *v / bc2;
                *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
            });
    }

    fn update1(
        p: &mut Array1<f32>,
        g: &Array1<f32>,
        m: &mut Array1<f32>,
        v: &mut Array1<f32>,
        lr: f32,
        bc1: f32,
        bc2: f32,
    ) {
        Zip::from(p)
            .and(g)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                let m_hat = *m / bc1;
                let v_hat = *v / bc2;
                *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
            });
    }
}

fn evaluate_mask(probs: &Array2<f32>, y: &[usize], mask: &[bool]) -> EvalMetrics {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    let mut correct = 0usize;
    let mut support = 0usize;
    let mut support_pos = 0usize;

    for (i, &label) in y.iter().enumerate() {
        if !mask[i] {
            continue;
        }
        support += 1;
        let pred = usize::from(probs[[i, 1]] >= probs[[i, 0]]);
        if pred == label {
            correct += 1;
        }
        match (pred, label) {
            (1, 1) => {
                tp += 1;
                support_pos += 1;
            }
            (1, 0) => fp += 1,
            (0, 1) => {
                fn_ += 1;
                support_pos += 1;
            }
            _ => {}
        }
    }

    let accuracy = if support > 0 {
        correct as f32 / support as f32
    } else {
        0.0
    };
    let precision = if tp + fp > 0 {
        tp as f32 / (tp + fp) as f32
    } else {
        0.0
    };
    let recall = if tp + fn_ > 0 {
        tp as f32 / (tp + fn_) as f32
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    EvalMetrics {
        accuracy,
        precision,
        recall,
        f1,
        support_pos,
        support,
    }
}

/// Train a detector on a generated graph and its out-of-band labels.
pub fn train(
    graph: &TransactionGraph,
    labels: &LabelMap,
    cfg: &TrainConfig,
) -> DetectResult<TrainedDetector> {
    cfg.validate()?;

    let tensors = GraphTensors::from_graph(graph);
    let y: Vec<usize> = (0..tensors.num_nodes())
        .map(|row| usize::from(labels.is_fraud_account(tensors.account_at(row))))
        .collect();

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let split = stratified_split(&y, cfg, &mut rng)?;
    let weights = class_weights(&y, &split.train)?;
    info!(
        nodes = tensors.num_nodes(),
        fraud = y.iter().filter(|&&l| l == 1).count(),
        class_weights = ?weights,
        "training relational detector"
    );

    let mut model = RelationalDetector::new(
        NUM_FEATURES,
        cfg.hidden_dim,
        RelationType::ALL.len(),
        &mut rng,
    );
    let mut adam = Adam::new(&model, cfg.learning_rate, cfg.weight_decay);

    let mut best: Option<(f32, f32, RelationalDetector)> = None;
    let mut stale_epochs = 0usize;

    for epoch in 1..=cfg.epochs {
        let cache = forward_train(&model, &tensors, cfg.dropout, &mut rng);
        let (loss, dlogits) = weighted_nll(&cache.probs, &y, &split.train, &weights);
        let grads = backward(&model, &tensors, &cache, &dlogits);
        adam.step(&mut model, &grads);

        let probs = model.forward(&tensors);
        let val = evaluate_mask(&probs, &y, &split.val);

        let improved = match &best {
            Some((f1, acc, _)) => {
                val.f1 > *f1 || (val.f1 == *f1 && val.accuracy > *acc)
            }
            None => true,
        };
        if improved {
            best = Some((val.f1, val.accuracy, model.clone()));
            stale_epochs = 0;
        } else {
            stale_epochs += 1;
        }

        if epoch % 20 == 0 {
            debug!(epoch, loss, val_acc = val.accuracy, val_f1 = val.f1, "training progress");
        }
        if stale_epochs >= cfg.patience {
            info!(epoch, "early stopping: validation plateaued");
            break;
        }
    }

    let (_, _, best_model) = best.expect("at least one epoch ran");
    let probs = best_model.forward(&tensors);
    let metrics = evaluate_mask(&probs, &y, &split.test);
    info!(
        test_accuracy = metrics.accuracy,
        test_f1 = metrics.f1,
        "training complete"
    );

    Ok(TrainedDetector {
        model: best_model,
        metrics,
    })
}
