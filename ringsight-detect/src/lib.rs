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

//! Ringsight Detect
//!
//! Relational graph-convolutional fraud detector. Standard graph
//! convolutions treat every edge the same; here each transaction relation
//! (payment, transfer, withdrawal) gets its own learned transform, which is
//! what lets the model pick up relation-specific laundering topology.
//!
//! Training consumes a generated graph plus its out-of-band label map and
//! produces a [`TrainedDetector`]; inference is a pure function of the graph
//! snapshot and the trained weights.

pub mod model;
pub mod tensors;
pub mod trainer;

use ringsight_core::AccountId;
use thiserror::Error;

pub use model::{RelationalDetector, TrainedDetector};
pub use tensors::GraphTensors;
pub use trainer::{train, EvalMetrics, TrainConfig};

/// Result type for detector operations
pub type DetectResult<T> = Result<T, DetectError>;

/// Errors that can occur while training or running the detector
#[derive(Debug, Error)]
pub enum DetectError {
    /// The label map contains no fraud accounts; training would produce a
    /// degenerate always-negative model
    #[error("Training data contains no positive (fraud) examples")]
    NoPositiveExamples,

    /// A stratified split could not be formed
    #[error("Degenerate split: {0}")]
    DegenerateSplit(String),

    /// Invalid training hyperparameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Account missing from the tensorized graph
    #[error("Unknown account: {0}")]
    UnknownAccount(AccountId),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint serialization error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

impl From<bincode::Error> for DetectError {
    fn from(e: bincode::Error) -> Self {
        DetectError::Checkpoint(e.to_string())
    }
}
