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

//! Tool-calling reasoning loop
//!
//! The model may issue read-only graph queries from a closed set before
//! writing its final narrative. Queries are a tagged union with defined
//! input/output contracts, dispatched through a bounded loop; the round
//! budget guarantees termination. The loop never trusts the model to invent
//! scores or paths: every fact it can cite is either in the prompt or in a
//! query observation, and both are derived from the neighborhood.

use crate::evidence::{classify, gather_evidence, ExplainConfig};
use crate::llm::{ChatMessage, LlmClient, LlmError};
use crate::neighborhood::Neighborhood;
use crate::report::{Evidence, ExplanationReport, NarrativeSource, ReasonCode};
use ringsight_core::{AccountId, ScoreTable, TransactionGraph, TxId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Closed set of read-only graph queries available to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum GraphQuery {
    /// Profile and score of one account
    AccountProfile { account_id: AccountId },
    /// Transactions touching one account inside the neighborhood
    Neighbors { account_id: AccountId },
    /// Full detail of one transaction
    TransactionDetail { tx_id: TxId },
}

const SYSTEM_PROMPT: &str = "You are a fraud compliance analyst reviewing accounts flagged by a \
graph-based detector. You may query the local transaction neighborhood with these tools by \
replying with a single JSON object and nothing else:\n\
  {\"tool\": \"account_profile\", \"account_id\": <id>}\n\
  {\"tool\": \"neighbors\", \"account_id\": <id>}\n\
  {\"tool\": \"transaction_detail\", \"tx_id\": <id>}\n\
Each tool reply is followed by an Observation message. When you have enough information, write \
the final compliance report in plain English. Cite only facts present in the evidence and \
observations; never invent scores, accounts or paths.";

/// Extract a tool call from a model reply, tolerating surrounding prose
pub(crate) fn parse_tool_call(reply: &str) -> Option<GraphQuery> {
    serde_json::from_str(embedded_json(reply)?).ok()
}

/// Whether the reply is an attempted (possibly malformed or unknown) tool
/// call rather than a final narrative.
pub(crate) fn looks_like_tool_call(reply: &str) -> bool {
    embedded_json(reply)
        .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok())
        .map(|value| value.get("tool").is_some())
        .unwrap_or(false)
}

fn embedded_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&reply[start..=end])
}

/// Answer a query read-only, bounded to the neighborhood
pub(crate) fn answer_query(
    graph: &TransactionGraph,
    nb: &Neighborhood,
    scores: &ScoreTable,
    query: &GraphQuery,
) -> String {
    match query {
        GraphQuery::AccountProfile { account_id } => {
            if !nb.contains(*account_id) {
                return format!("account {account_id} is outside the neighborhood");
            }
            match graph.account(*account_id) {
                Some(account) => {
                    let score = scores
                        .get(*account_id)
                        .map(|p| format!("{p:.3}"))
                        .unwrap_or_else(|| "unscored".to_string());
                    format!(
                        "account {}: age {} days, declared risk {:.3}, fraud probability {}, \
                         degree {}",
                        account.id,
                        account.account_age_days,
                        account.declared_risk,
                        score,
                        graph.degree(account.id)
                    )
                }
                None => format!("account {account_id} not found"),
            }
        }
        GraphQuery::Neighbors { account_id } => {
            if !nb.contains(*account_id) {
                return format!("account {account_id} is outside the neighborhood");
            }
            let mut lines = Vec::new();
            for tx in nb.outgoing_within(graph, *account_id) {
                lines.push(format!(
                    "tx {}: {} -> {} ${:.2} {} at t={}s",
                    tx.id, tx.src, tx.dst, tx.amount, tx.relation, tx.timestamp
                ));
            }
            for tx in nb.incoming_within(graph, *account_id) {
                lines.push(format!(
                    "tx {}: {} -> {} ${:.2} {} at t={}s",
                    tx.id, tx.src, tx.dst, tx.amount, tx.relation, tx.timestamp
                ));
            }
            if lines.len() > 20 {
                let omitted = lines.len() - 20;
                lines.truncate(20);
                lines.push(format!("({omitted} more omitted)"));
            }
            if lines.is_empty() {
                format!("account {account_id} has no transactions in the neighborhood")
            } else {
                lines.join("\n")
            }
        }
        GraphQuery::TransactionDetail { tx_id } => {
            if !nb.contains_tx(*tx_id) {
                return format!("transaction {tx_id} is outside the neighborhood");
            }
            match graph.transaction(*tx_id) {
                Some(tx) => format!(
                    "tx {}: {} -> {} ${:.2} {} at t={}s",
                    tx.id, tx.src, tx.dst, tx.amount, tx.relation, tx.timestamp
                ),
                None => format!("transaction {tx_id} not found"),
            }
        }
    }
}

/// Bounded prompt carrying the account, its score, the reason code and the
/// concrete evidence.
fn build_prompt(
    account_id: AccountId,
    fraud_probability: f32,
    reason: ReasonCode,
    evidence: &Evidence,
) -> String {
    let mut lines = vec![
        format!(
            "Account {account_id} was scored a fraud probability of {fraud_probability:.3} by \
             the detector."
        ),
        format!("Dominant pattern: {reason}."),
    ];

    if let Some(cycle) = &evidence.cycle {
        let path: Vec<String> = cycle
            .path
            .iter()
            .chain(std::iter::once(&cycle.path[0]))
            .map(|id| id.to_string())
            .collect();
        lines.push(format!("Detected cycle: {}", path.join(" -> ")));
        for hop in &cycle.hops {
            lines.push(format!(
                "  hop {} -> {}: ${:.2} at t={}s",
                hop.from, hop.to, hop.amount, hop.timestamp
            ));
        }
        lines.push(format!(
            "Mean hop retention: {:.2} (each hop forwards ~{:.0}% of the received amount)",
            cycle.mean_retention,
            cycle.mean_retention * 100.0
        ));
    }

    lines.push(format!(
        "Fan-out: {} distinct destinations; fan-in: {} distinct sources.",
        evidence.fan_out, evidence.fan_in
    ));
    lines.push(format!(
        "Peak activity: {} transactions within a {}s window.",
        evidence.burst_max, evidence.burst_window_secs
    ));
    lines.push(format!(
        "Other flagged accounts within the neighborhood: {}.",
        evidence.flagged_neighbors
    ));
    if let Some(stats) = &evidence.passthrough {
        lines.push(format!(
            "Flow: ${:.2} in, ${:.2} out (ratio {:.2}), shortest in-to-out gap {}.",
            stats.inflow,
            stats.outflow,
            stats.ratio,
            stats
                .min_gap_secs
                .map(|g| format!("{g}s"))
                .unwrap_or_else(|| "n/a".to_string())
        ));
    }

    lines.push(
        "Explain in plain English why this account was flagged, referencing the evidence above."
            .to_string(),
    );
    lines.join("\n")
}

/// Deterministic fallback narrative built from evidence alone
fn template_narrative(
    account_id: AccountId,
    fraud_probability: f32,
    reason: ReasonCode,
    evidence: &Evidence,
) -> String {
    let mut out = format!(
        "Account {account_id} was flagged with a fraud probability of {fraud_probability:.3}. "
    );
    match reason {
        ReasonCode::CyclicFlow => {
            if let Some(cycle) = &evidence.cycle {
                let path: Vec<String> = cycle
                    .path
                    .iter()
                    .chain(std::iter::once(&cycle.path[0]))
                    .map(|id| format!("account {id}"))
                    .collect();
                out.push_str(&format!(
                    "Funds move in a closed {}-account cycle ({}), with each hop forwarding \
                     about {:.0}% of the received amount, a pattern consistent with layered \
                     money laundering. Total transferred along the cycle: ${:.2}.",
                    cycle.path.len(),
                    path.join(" -> "),
                    cycle.mean_retention * 100.0,
                    cycle.total_amount
                ));
            }
        }
        ReasonCode::RapidPassthrough => {
            out.push_str(&format!(
                "The account shows rapid pass-through activity: {} transactions inside a {}s \
                 window",
                evidence.burst_max, evidence.burst_window_secs
            ));
            if let Some(stats) = &evidence.passthrough {
                out.push_str(&format!(
                    ", forwarding {:.0}% of incoming funds",
                    stats.ratio * 100.0
                ));
                if let Some(gap) = stats.min_gap_secs {
                    out.push_str(&format!(" as little as {gap}s after receipt"));
                }
            }
            out.push('.');
        }
        ReasonCode::FanOut => {
            out.push_str(&format!(
                "The account disperses funds to {} distinct destinations, consistent with the \
                 layering phase of money laundering.",
                evidence.fan_out
            ));
        }
        ReasonCode::None => {
            out.push_str(
                "No dominant fraud pattern was found in the surrounding transaction network.",
            );
        }
    }
    if evidence.flagged_neighbors > 0 {
        out.push_str(&format!(
            " {} other account(s) in the surrounding network are already flagged.",
            evidence.flagged_neighbors
        ));
    }
    out
}

/// The explanation engine
pub struct Explainer {
    cfg: ExplainConfig,
    max_rounds: u32,
}

impl Explainer {
    pub fn new(cfg: ExplainConfig, max_rounds: u32) -> Self {
        Self { cfg, max_rounds }
    }

    /// Produce a report for `account_id`. Never fails for model reasons: on
    /// timeout, transport error or round-budget exhaustion the narrative is
    /// templated from the evidence.
    pub async fn explain(
        &self,
        graph: &TransactionGraph,
        scores: &ScoreTable,
        llm: &dyn LlmClient,
        account_id: AccountId,
        fraud_probability: f32,
    ) -> ExplanationReport {
        let nb = Neighborhood::extract(graph, account_id, self.cfg.k_hops);
        let evidence = gather_evidence(graph, &nb, scores, &self.cfg);
        let reason_code = classify(&evidence, &self.cfg);
        let prompt = build_prompt(account_id, fraud_probability, reason_code, &evidence);

        let (narrative, narrative_source) =
            match self.run_loop(graph, &nb, scores, llm, &prompt).await {
                Ok(text) => (text, NarrativeSource::Model),
                Err(e) => {
                    warn!(account_id, error = %e, "narrative generation failed, using template");
                    (
                        template_narrative(account_id, fraud_probability, reason_code, &evidence),
                        NarrativeSource::Templated,
                    )
                }
            };

        ExplanationReport {
            account_id,
            fraud_probability,
            reason_code,
            narrative,
            narrative_source,
            evidence,
        }
    }

    async fn run_loop(
        &self,
        graph: &TransactionGraph,
        nb: &Neighborhood,
        scores: &ScoreTable,
        llm: &dyn LlmClient,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        for round in 0..self.max_rounds {
            let reply = llm.chat(&messages).await?;
            match parse_tool_call(&reply) {
                Some(query) => {
                    debug!(round, ?query, "tool call");
                    let observation = answer_query(graph, nb, scores, &query);
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(format!("Observation: {observation}")));
                }
                // A malformed or unknown tool invocation gets an error
                // observation, not a crash and not a narrative.
                None if looks_like_tool_call(&reply) => {
                    debug!(round, "unrecognized tool call");
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(
                        "Observation: unrecognized tool call; use account_profile, neighbors \
                         or transaction_detail, or write the final report."
                            .to_string(),
                    ));
                }
                None => return Ok(reply.trim().to_string()),
            }
        }

        Err(LlmError::InvalidResponse(format!(
            "tool-call round budget of {} exhausted",
            self.max_rounds
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use ringsight_core::{GraphBuilder, RelationType};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted model: each entry is a reply; `None` simulates a transport
    /// failure.
    struct MockLlm {
        replies: Mutex<VecDeque<Option<String>>>,
        calls: AtomicUsize,
    }

    impl MockLlm {
        fn new(replies: Vec<Option<&str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.lock().pop_front() {
                Some(Some(reply)) => Ok(reply),
                _ => Err(LlmError::InvalidResponse("script exhausted".to_string())),
            }
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn ring_graph() -> TransactionGraph {
        let mut builder = GraphBuilder::new();
        for _ in 0..8 {
            builder.add_account(500, 0.2);
        }
        let ring = [0u64, 1, 2, 3, 4];
        let mut amount = 1200.0;
        for (i, &from) in ring.iter().enumerate() {
            let to = ring[(i + 1) % ring.len()];
            builder
                .add_transaction(from, to, amount, 100 + i as u64 * 60, RelationType::Transfer)
                .unwrap();
            amount *= 0.95;
        }
        builder
            .add_transaction(5, 6, 40.0, 9_000, RelationType::Payment)
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_parse_tool_call_tolerates_prose() {
        let query = parse_tool_call(
            "Let me look that up.\n{\"tool\": \"account_profile\", \"account_id\": 3}",
        );
        assert_eq!(query, Some(GraphQuery::AccountProfile { account_id: 3 }));
    }

    #[test]
    fn test_parse_tool_call_rejects_unknown_tool() {
        assert_eq!(parse_tool_call("{\"tool\": \"drop_tables\", \"x\": 1}"), None);
        assert_eq!(parse_tool_call("plain prose, no json"), None);
        assert_eq!(parse_tool_call("}{"), None);
    }

    #[test]
    fn test_unknown_tool_still_looks_like_a_tool_call() {
        assert!(looks_like_tool_call("{\"tool\": \"drop_tables\"}"));
        assert!(!looks_like_tool_call("The final report follows."));
        assert!(!looks_like_tool_call("{\"note\": \"not a tool\"}"));
    }

    #[tokio::test]
    async fn test_unknown_tool_gets_error_observation_then_continues() {
        let graph = ring_graph();
        let scores = ScoreTable::new();
        let llm = MockLlm::new(vec![
            Some("{\"tool\": \"drop_tables\", \"account_id\": 0}"),
            Some("Final report: cyclic movement of funds."),
        ]);

        let explainer = Explainer::new(ExplainConfig::default(), 4);
        let report = explainer.explain(&graph, &scores, &llm, 0, 0.93).await;

        assert_eq!(llm.calls(), 2);
        assert_eq!(report.narrative_source, NarrativeSource::Model);
        assert_eq!(report.narrative, "Final report: cyclic movement of funds.");
    }

    #[test]
    fn test_answer_query_is_bounded_to_neighborhood() {
        let graph = ring_graph();
        let nb = Neighborhood::extract(&graph, 0, 1);
        let scores = ScoreTable::new();

        // Account 6 exists in the graph but not in the 1-hop neighborhood
        let reply = answer_query(
            &graph,
            &nb,
            &scores,
            &GraphQuery::AccountProfile { account_id: 6 },
        );
        assert!(reply.contains("outside the neighborhood"));

        let reply = answer_query(
            &graph,
            &nb,
            &scores,
            &GraphQuery::TransactionDetail { tx_id: 5 },
        );
        assert!(reply.contains("outside the neighborhood"));
    }

    #[tokio::test]
    async fn test_model_narrative_after_tool_round() {
        let graph = ring_graph();
        let scores = ScoreTable::new();
        let llm = MockLlm::new(vec![
            Some("{\"tool\": \"neighbors\", \"account_id\": 0}"),
            Some("Account 0 routes funds through a five-account cycle."),
        ]);

        let explainer = Explainer::new(ExplainConfig::default(), 4);
        let report = explainer.explain(&graph, &scores, &llm, 0, 0.93).await;

        assert_eq!(report.narrative_source, NarrativeSource::Model);
        assert_eq!(
            report.narrative,
            "Account 0 routes funds through a five-account cycle."
        );
        assert_eq!(llm.calls(), 2);
        assert_eq!(report.reason_code, ReasonCode::CyclicFlow);
    }

    #[tokio::test]
    async fn test_round_budget_exhaustion_falls_back_to_template() {
        let graph = ring_graph();
        let scores = ScoreTable::new();
        // The model keeps calling tools and never produces a final answer
        let llm = MockLlm::new(vec![
            Some("{\"tool\": \"neighbors\", \"account_id\": 0}"),
            Some("{\"tool\": \"account_profile\", \"account_id\": 1}"),
            Some("{\"tool\": \"account_profile\", \"account_id\": 2}"),
        ]);

        let explainer = Explainer::new(ExplainConfig::default(), 3);
        let report = explainer.explain(&graph, &scores, &llm, 0, 0.93).await;

        assert_eq!(llm.calls(), 3, "loop must stop at the round budget");
        assert_eq!(report.narrative_source, NarrativeSource::Templated);
        assert!(report.narrative.contains("cycle"));
    }

    #[tokio::test]
    async fn test_model_failure_never_fails_the_request() {
        let graph = ring_graph();
        let scores = ScoreTable::new();
        let llm = MockLlm::new(vec![None]);

        let explainer = Explainer::new(ExplainConfig::default(), 4);
        let report = explainer.explain(&graph, &scores, &llm, 0, 0.93).await;

        assert_eq!(report.narrative_source, NarrativeSource::Templated);
        assert_eq!(report.reason_code, ReasonCode::CyclicFlow);
        // The templated narrative cites the concrete evidence
        assert!(report.narrative.contains("account 0"));
        assert!(report.narrative.contains('%'));
    }

    #[tokio::test]
    async fn test_ring_report_lists_all_members_and_closing_edge() {
        let graph = ring_graph();
        let scores = ScoreTable::new();
        let llm = MockLlm::new(vec![None]);

        let explainer = Explainer::new(ExplainConfig::default(), 4);
        let report = explainer.explain(&graph, &scores, &llm, 0, 0.93).await;

        let cycle = report.evidence.cycle.expect("cycle evidence present");
        assert_eq!(cycle.path, vec![0, 1, 2, 3, 4]);
        assert_eq!(cycle.hops.len(), 5);
        let closing = cycle.hops.last().unwrap();
        assert_eq!((closing.from, closing.to), (4, 0));
    }

    #[tokio::test]
    async fn test_isolated_account_reports_none() {
        let mut builder = GraphBuilder::new();
        builder.add_account(900, 0.05);
        let graph = builder.build();
        let llm = MockLlm::new(vec![None]);

        let explainer = Explainer::new(ExplainConfig::default(), 4);
        let report = explainer
            .explain(&graph, &ScoreTable::new(), &llm, 0, 0.02)
            .await;

        assert_eq!(report.reason_code, ReasonCode::None);
        assert!(report.narrative.contains("No dominant fraud pattern"));
    }
}
