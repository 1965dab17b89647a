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

//! Ringsight Explain
//!
//! Graph-retrieval explanation engine. Extracts a bounded neighborhood
//! around a flagged account, computes structural and temporal evidence,
//! classifies the dominant fraud pattern into a fixed reason code, then
//! drives a bounded tool-calling reasoning loop against a locally hosted
//! language model to produce a narrative. All model inference stays local;
//! transaction data never leaves the process boundary.
//!
//! Evidence extraction (steps 1-4) is fully deterministic; only the wording
//! of the narrative is not. When the model is unreachable, slow or
//! exhausts its round budget, the narrative is templated directly from the
//! evidence and the report says so; an explanation request never fails for
//! model reasons.

pub mod agent;
pub mod evidence;
pub mod llm;
pub mod neighborhood;
pub mod report;

pub use agent::{Explainer, GraphQuery};
pub use evidence::{classify, gather_evidence, ExplainConfig};
pub use llm::{ChatMessage, LlmClient, LlmError, OllamaClient};
pub use neighborhood::{find_cycle, Neighborhood};
pub use report::{
    CycleEvidence, CycleHop, Evidence, ExplanationReport, NarrativeSource, PassthroughStats,
    ReasonCode,
};
