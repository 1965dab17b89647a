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

//! Graph tensorization
//!
//! Materializes the immutable graph snapshot into the dense feature matrix
//! and per-relation edge lists the detector consumes. Row order follows
//! ascending account id, so the mapping is stable across runs.
//!
//! Ground-truth labels are never part of the feature matrix; the only inputs
//! are account features and graph topology.

use ndarray::Array2;
use ringsight_core::{AccountId, RelationType, TransactionGraph};
use std::collections::HashMap;

/// Number of per-account input features: normalized account age, declared
/// risk, log-scaled activity velocity.
pub const NUM_FEATURES: usize = 3;

const MAX_ACCOUNT_AGE_DAYS: f32 = 1825.0;

/// Dense tensor view over a graph snapshot
pub struct GraphTensors {
    /// Node features, n x NUM_FEATURES
    pub x: Array2<f32>,
    /// Edge lists per relation: (src_row, dst_row)
    pub edges: Vec<Vec<(usize, usize)>>,
    /// Per relation, per destination row: 1 / in-degree under that relation
    /// (0.0 where there is no incoming edge)
    pub in_norm: Vec<Vec<f32>>,
    ids: Vec<AccountId>,
    index_of: HashMap<AccountId, usize>,
}

impl GraphTensors {
    pub fn from_graph(graph: &TransactionGraph) -> Self {
        let ids = graph.account_ids();
        let n = ids.len();
        let index_of: HashMap<AccountId, usize> =
            ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        // Velocity is log-scaled degree, normalized by the busiest account
        // so the column stays in [0, 1].
        let max_degree = ids
            .iter()
            .map(|&id| graph.degree(id))
            .max()
            .unwrap_or(0) as f32;
        let velocity_scale = (1.0 + max_degree).ln().max(1.0);

        let mut x = Array2::<f32>::zeros((n, NUM_FEATURES));
        for (row, &id) in ids.iter().enumerate() {
            let account = graph
                .account(id)
                .expect("account ids come from the graph itself");
            x[[row, 0]] = account.account_age_days as f32 / MAX_ACCOUNT_AGE_DAYS;
            x[[row, 1]] = account.declared_risk as f32;
            x[[row, 2]] = (1.0 + graph.degree(id) as f32).ln() / velocity_scale;
        }

        let num_relations = RelationType::ALL.len();
        let mut edges: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_relations];
        let mut in_degree: Vec<Vec<f32>> = vec![vec![0.0; n]; num_relations];
        for tx in graph.transactions() {
            let r = tx.relation.index();
            let src = index_of[&tx.src];
            let dst = index_of[&tx.dst];
            edges[r].push((src, dst));
            in_degree[r][dst] += 1.0;
        }

        let in_norm = in_degree
            .into_iter()
            .map(|degrees| {
                degrees
                    .into_iter()
                    .map(|d| if d > 0.0 { 1.0 / d } else { 0.0 })
                    .collect()
            })
            .collect();

        Self {
            x,
            edges,
            in_norm,
            ids,
            index_of,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.ids.len()
    }

    /// Row index of an account, if present
    pub fn index(&self, id: AccountId) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    /// Account id for a row index
    pub fn account_at(&self, row: usize) -> AccountId {
        self.ids[row]
    }

    pub fn ids(&self) -> &[AccountId] {
        &self.ids
    }
}
