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

//! Ringsight Synth
//!
//! Synthetic financial transaction networks with deliberately injected fraud
//! topologies (cyclic laundering rings, fan-out layering, rapid-fire bursts).
//! The generated graph plus its out-of-band label map are the ground truth
//! the detector trains and is evaluated against.

pub mod config;
pub mod generator;

use thiserror::Error;

pub use config::{FanOutSpec, GeneratorConfig, RapidFireSpec, RingSpec};
pub use generator::Generator;

/// Result type for generator operations
pub type SynthResult<T> = Result<T, SynthError>;

/// Errors that can occur during synthetic graph generation
#[derive(Debug, Error)]
pub enum SynthError {
    /// Invalid generator parameters (fatal, surfaced immediately)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying graph-model error
    #[error("Graph error: {0}")]
    Graph(#[from] ringsight_core::GraphError),
}
