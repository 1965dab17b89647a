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

//! Explanation report types

use ringsight_core::{AccountId, TxId};
use serde::{Deserialize, Serialize};

/// Fixed classification of why an account was flagged, independent of the
/// free-text narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    CyclicFlow,
    RapidPassthrough,
    FanOut,
    None,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::CyclicFlow => "cyclic-flow",
            ReasonCode::RapidPassthrough => "rapid-passthrough",
            ReasonCode::FanOut => "fan-out",
            ReasonCode::None => "none",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the narrative came from the language model or the deterministic
/// template fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    Model,
    Templated,
}

/// One hop of a detected cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleHop {
    pub tx: TxId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: f64,
    pub timestamp: u64,
}

/// A closed directed walk through the queried account. `path` lists the
/// accounts in hop order starting at the queried account; `hops` includes
/// the closing edge back to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEvidence {
    pub path: Vec<AccountId>,
    pub hops: Vec<CycleHop>,
    pub total_amount: f64,
    /// Mean hop-over-hop amount retention
    pub mean_retention: f64,
}

/// In-versus-out flow statistics for the queried account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassthroughStats {
    pub inflow: f64,
    pub outflow: f64,
    /// outflow / inflow
    pub ratio: f64,
    /// Shortest observed gap between an incoming transaction and a later
    /// outgoing one, in seconds
    pub min_gap_secs: Option<u64>,
}

/// Deterministic evidence computed over the neighborhood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub cycle: Option<CycleEvidence>,
    /// Distinct destination accounts of the queried account
    pub fan_out: usize,
    /// Distinct source accounts paying into the queried account
    pub fan_in: usize,
    /// Maximum transactions touching the account inside the sliding window
    pub burst_max: usize,
    pub burst_window_secs: u64,
    /// Other accounts in the neighborhood already at or above the flag
    /// threshold
    pub flagged_neighbors: usize,
    pub passthrough: Option<PassthroughStats>,
    /// All accounts reachable within k hops, ascending
    pub neighborhood_accounts: Vec<AccountId>,
}

/// The result of one explanation request, owned solely by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationReport {
    pub account_id: AccountId,
    pub fraud_probability: f32,
    pub reason_code: ReasonCode,
    pub narrative: String,
    pub narrative_source: NarrativeSource,
    pub evidence: Evidence,
}
