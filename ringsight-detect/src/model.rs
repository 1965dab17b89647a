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

//! Relational graph-convolution model
//!
//! Two relational convolution layers (one learned transform per relation
//! type plus a self-loop transform, combined additively) followed by a dense
//! two-class head. Accounts with no incident transactions degrade gracefully
//! to the self-loop path.

use crate::tensors::GraphTensors;
use crate::trainer::EvalMetrics;
use crate::{DetectError, DetectResult};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use ringsight_core::{AccountId, ScoreTable};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One relational graph-convolution layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RgcnLayer {
    /// One transform per relation type
    pub w_rel: Vec<Array2<f32>>,
    /// Self-loop transform
    pub w_self: Array2<f32>,
    pub bias: Array1<f32>,
}

impl RgcnLayer {
    /// Glorot-uniform initialization
    pub fn glorot(in_dim: usize, out_dim: usize, num_relations: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_dim + out_dim) as f32).sqrt();
        let init = |rng: &mut StdRng| {
            Array2::from_shape_fn((in_dim, out_dim), |_| rng.gen_range(-limit..limit))
        };
        let w_rel = (0..num_relations).map(|_| init(rng)).collect();
        let w_self = init(rng);
        Self {
            w_rel,
            w_self,
            bias: Array1::zeros(out_dim),
        }
    }

    /// Pre-activation output: self-loop plus the in-degree-normalized
    /// aggregation of each relation's transformed messages.
    pub fn forward(&self, tensors: &GraphTensors, input: &Array2<f32>) -> Array2<f32> {
        let mut z = input.dot(&self.w_self);
        for (r, w) in self.w_rel.iter().enumerate() {
            let messages = input.dot(w);
            propagate(&tensors.edges[r], &tensors.in_norm[r], &messages, &mut z);
        }
        z + &self.bias
    }
}

/// Accumulate normalized messages along edges: `out[dst] += msg[src] / in_deg(dst)`
pub(crate) fn propagate(
    edges: &[(usize, usize)],
    in_norm: &[f32],
    messages: &Array2<f32>,
    out: &mut Array2<f32>,
) {
    for &(src, dst) in edges {
        out.row_mut(dst).scaled_add(in_norm[dst], &messages.row(src));
    }
}

/// Transpose of [`propagate`]: scatter upstream gradients back to message
/// rows, `grad_msg[src] += grad_out[dst] / in_deg(dst)`
pub(crate) fn propagate_transpose(
    edges: &[(usize, usize)],
    in_norm: &[f32],
    grad_out: &Array2<f32>,
    grad_messages: &mut Array2<f32>,
) {
    for &(src, dst) in edges {
        grad_messages
            .row_mut(src)
            .scaled_add(in_norm[dst], &grad_out.row(dst));
    }
}

pub(crate) fn relu(a: &Array2<f32>) -> Array2<f32> {
    a.mapv(|v| v.max(0.0))
}

/// Row-wise softmax with max-subtraction for stability
pub(crate) fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut row in probs.rows_mut() {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    probs
}

/// The full detector: two relational layers and a dense two-class head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalDetector {
    pub layer1: RgcnLayer,
    pub layer2: RgcnLayer,
    pub w_out: Array2<f32>,
    pub b_out: Array1<f32>,
}

impl RelationalDetector {
    pub fn new(
        num_features: usize,
        hidden_dim: usize,
        num_relations: usize,
        rng: &mut StdRng,
    ) -> Self {
        let layer1 = RgcnLayer::glorot(num_features, hidden_dim, num_relations, rng);
        let layer2 = RgcnLayer::glorot(hidden_dim, hidden_dim, num_relations, rng);
        let limit = (6.0 / (hidden_dim + 2) as f32).sqrt();
        let w_out = Array2::from_shape_fn((hidden_dim, 2), |_| rng.gen_range(-limit..limit));
        Self {
            layer1,
            layer2,
            w_out,
            b_out: Array1::zeros(2),
        }
    }

    /// Inference forward pass (dropout disabled): class probabilities per
    /// node, column 1 being the fraud class.
    pub fn forward(&self, tensors: &GraphTensors) -> Array2<f32> {
        let h1 = relu(&self.layer1.forward(tensors, &tensors.x));
        let h2 = relu(&self.layer2.forward(tensors, &h1));
        let logits = h2.dot(&self.w_out) + &self.b_out;
        softmax_rows(&logits)
    }
}

/// A trained detector: frozen weights plus the held-out test metrics
/// captured at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedDetector {
    pub model: RelationalDetector,
    pub metrics: EvalMetrics,
}

impl TrainedDetector {
    /// Fraud probability for one account, in [0, 1]. A pure function of the
    /// graph tensors and the trained weights.
    pub fn score(&self, tensors: &GraphTensors, account_id: AccountId) -> DetectResult<f32> {
        let row = tensors
            .index(account_id)
            .ok_or(DetectError::UnknownAccount(account_id))?;
        let probs = self.model.forward(tensors);
        Ok(probs[[row, 1]])
    }

    /// Score every account in one forward pass
    pub fn score_all(&self, tensors: &GraphTensors) -> ScoreTable {
        let probs = self.model.forward(tensors);
        let mut table = ScoreTable::new();
        for (row, &id) in tensors.ids().iter().enumerate() {
            table.insert(id, probs[[row, 1]]);
        }
        table
    }

    /// Persist the checkpoint (bincode), atomically
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DetectResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> DetectResult<Self> {
        let file = File::open(path)?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringsight_core::{GraphBuilder, RelationType};

    fn toy_tensors() -> GraphTensors {
        let mut builder = GraphBuilder::new();
        builder.add_account(400, 0.3);
        builder.add_account(800, 0.6);
        builder.add_account(1200, 0.1); // isolated
        builder
            .add_transaction(0, 1, 100.0, 1, RelationType::Transfer)
            .unwrap();
        GraphTensors::from_graph(&builder.build())
    }

    #[test]
    fn test_forward_rows_are_distributions() {
        let tensors = toy_tensors();
        let mut rng = StdRng::seed_from_u64(1);
        let model = RelationalDetector::new(crate::tensors::NUM_FEATURES, 8, 3, &mut rng);
        let probs = model.forward(&tensors);

        assert_eq!(probs.shape(), &[3, 2]);
        for row in probs.rows() {
            let sum: f32 = row.sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_isolated_node_scored_from_own_features() {
        // The isolated account flows only through the self-loop path; the
        // forward pass must still produce a valid probability.
        let tensors = toy_tensors();
        let mut rng = StdRng::seed_from_u64(2);
        let model = RelationalDetector::new(crate::tensors::NUM_FEATURES, 8, 3, &mut rng);
        let trained = TrainedDetector {
            model,
            metrics: EvalMetrics::default(),
        };
        let p = trained.score(&tensors, 2).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_unknown_account_rejected() {
        let tensors = toy_tensors();
        let mut rng = StdRng::seed_from_u64(3);
        let trained = TrainedDetector {
            model: RelationalDetector::new(crate::tensors::NUM_FEATURES, 4, 3, &mut rng),
            metrics: EvalMetrics::default(),
        };
        assert!(matches!(
            trained.score(&tensors, 99),
            Err(DetectError::UnknownAccount(99))
        ));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let tensors = toy_tensors();
        let mut rng = StdRng::seed_from_u64(4);
        let trained = TrainedDetector {
            model: RelationalDetector::new(crate::tensors::NUM_FEATURES, 8, 3, &mut rng),
            metrics: EvalMetrics::default(),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.bin");
        trained.save_to_file(&path).unwrap();
        let reloaded = TrainedDetector::load_from_file(&path).unwrap();

        // Weights round-trip exactly: identical scores
        let before = trained.score_all(&tensors);
        let after = reloaded.score_all(&tensors);
        for (id, p) in before.iter() {
            assert_eq!(Some(p), after.get(id));
        }
    }
}
