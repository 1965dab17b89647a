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

//! Evidence features and reason-code classification
//!
//! Everything here is deterministic given the graph snapshot and score
//! table: retention ratios, time clustering, fan-out/fan-in degree, flagged
//! neighbors and passthrough flow. The dominant pattern is classified by
//! threshold rules; a qualifying cycle always takes precedence.

use crate::neighborhood::{find_cycle, Neighborhood};
use crate::report::{Evidence, PassthroughStats, ReasonCode};
use ringsight_core::{ScoreTable, TransactionGraph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Thresholds for evidence extraction and classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// Neighborhood radius
    pub k_hops: u32,
    /// Sliding window for time clustering, in seconds
    pub burst_window_secs: u64,
    /// Transactions within the window that count as a burst
    pub burst_threshold: usize,
    /// Distinct destinations that count as fan-out layering
    pub fan_out_threshold: usize,
    /// Outflow/inflow ratio range that counts as passthrough
    pub passthrough_ratio_range: (f64, f64),
    /// Maximum in-to-out gap for rapid passthrough, in seconds
    pub passthrough_max_gap_secs: u64,
    /// Minimum cycle size that qualifies as cyclic flow
    pub min_cycle_len: usize,
    /// Minimum mean hop retention for a qualifying cycle
    pub min_cycle_retention: f64,
    /// Score at or above which a neighbor counts as flagged
    pub flag_threshold: f32,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            k_hops: 2,
            burst_window_secs: 3600,
            burst_threshold: 10,
            fan_out_threshold: 8,
            passthrough_ratio_range: (0.80, 1.05),
            passthrough_max_gap_secs: 6 * 3600,
            min_cycle_len: 3,
            min_cycle_retention: 0.5,
            flag_threshold: 0.8,
        }
    }
}

impl ExplainConfig {
    /// Longest cycle fully visible inside a k-hop neighborhood
    pub fn max_cycle_len(&self) -> usize {
        2 * self.k_hops as usize + 1
    }
}

/// Compute all evidence features over the neighborhood
pub fn gather_evidence(
    graph: &TransactionGraph,
    nb: &Neighborhood,
    scores: &ScoreTable,
    cfg: &ExplainConfig,
) -> Evidence {
    let center = nb.center();
    let cycle = find_cycle(graph, nb, cfg.max_cycle_len());

    let outgoing = nb.outgoing_within(graph, center);
    let incoming = nb.incoming_within(graph, center);

    let fan_out = outgoing
        .iter()
        .map(|t| t.dst)
        .collect::<BTreeSet<_>>()
        .len();
    let fan_in = incoming
        .iter()
        .map(|t| t.src)
        .collect::<BTreeSet<_>>()
        .len();

    // Time clustering: max transactions touching the center inside the
    // sliding window (two-pointer over sorted timestamps).
    let mut timestamps: Vec<u64> = outgoing
        .iter()
        .chain(incoming.iter())
        .map(|t| t.timestamp)
        .collect();
    timestamps.sort_unstable();
    let mut burst_max = 0usize;
    let mut lo = 0usize;
    for hi in 0..timestamps.len() {
        while timestamps[hi] - timestamps[lo] > cfg.burst_window_secs {
            lo += 1;
        }
        burst_max = burst_max.max(hi - lo + 1);
    }

    let flagged_neighbors = nb
        .account_ids()
        .into_iter()
        .filter(|&id| id != center)
        .filter(|&id| scores.get(id).is_some_and(|p| p >= cfg.flag_threshold))
        .count();

    let passthrough = passthrough_stats(&incoming, &outgoing);

    Evidence {
        cycle,
        fan_out,
        fan_in,
        burst_max,
        burst_window_secs: cfg.burst_window_secs,
        flagged_neighbors,
        passthrough,
        neighborhood_accounts: nb.account_ids(),
    }
}

fn passthrough_stats(
    incoming: &[&ringsight_core::Transaction],
    outgoing: &[&ringsight_core::Transaction],
) -> Option<PassthroughStats> {
    if incoming.is_empty() || outgoing.is_empty() {
        return None;
    }
    let inflow: f64 = incoming.iter().map(|t| t.amount).sum();
    let outflow: f64 = outgoing.iter().map(|t| t.amount).sum();
    if inflow <= 0.0 {
        return None;
    }

    let min_gap_secs = incoming
        .iter()
        .flat_map(|inc| {
            outgoing
                .iter()
                .filter(move |out| out.timestamp >= inc.timestamp)
                .map(move |out| out.timestamp - inc.timestamp)
        })
        .min();

    Some(PassthroughStats {
        inflow,
        outflow,
        ratio: outflow / inflow,
        min_gap_secs,
    })
}

/// Classify the dominant pattern. Precedence: cyclic-flow, then
/// rapid-passthrough, then fan-out.
pub fn classify(evidence: &Evidence, cfg: &ExplainConfig) -> ReasonCode {
    if let Some(cycle) = &evidence.cycle {
        if cycle.path.len() >= cfg.min_cycle_len && cycle.mean_retention >= cfg.min_cycle_retention
        {
            return ReasonCode::CyclicFlow;
        }
    }

    let rapid_burst = evidence.burst_max >= cfg.burst_threshold;
    let rapid_passthrough = evidence.passthrough.as_ref().is_some_and(|p| {
        let (lo, hi) = cfg.passthrough_ratio_range;
        (lo..=hi).contains(&p.ratio)
            && p.min_gap_secs
                .is_some_and(|gap| gap <= cfg.passthrough_max_gap_secs)
    });
    if rapid_burst || rapid_passthrough {
        return ReasonCode::RapidPassthrough;
    }

    if evidence.fan_out >= cfg.fan_out_threshold {
        return ReasonCode::FanOut;
    }

    ReasonCode::None
}
