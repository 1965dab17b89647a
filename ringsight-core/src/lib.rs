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

//! Ringsight Core
//!
//! Fundamental data structures for the fraud-ring detection pipeline: the
//! immutable transaction graph, out-of-band ground-truth labels, the
//! per-account score table, shared configuration and the error taxonomy.

pub mod config;
pub mod error;
pub mod graph;
pub mod labels;
pub mod scores;

pub use config::{CacheSettings, DataConfig, LlmSettings, RingsightConfig, ServiceSettings};
pub use error::{GraphError, GraphResult};
pub use graph::{
    Account, AccountId, GraphBuilder, GraphStats, RelationType, Transaction, TransactionGraph,
    TxId,
};
pub use labels::{FraudPattern, LabelMap};
pub use scores::ScoreTable;
