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

//! End-to-end pipeline: generate, train, score, explain.

use async_trait::async_trait;
use ringsight_core::RingsightConfig;
use ringsight_detect::{train, TrainConfig};
use ringsight_explain::{ChatMessage, LlmClient, LlmError, NarrativeSource, ReasonCode};
use ringsight_service::FraudService;
use ringsight_synth::{Generator, GeneratorConfig, RingSpec};
use std::sync::Arc;

/// Stand-in for an unreachable local model server; every explanation falls
/// back to the templated narrative.
struct DownLlm;

#[async_trait]
impl LlmClient for DownLlm {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Err(LlmError::InvalidResponse("connection refused".to_string()))
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

/// 100 accounts, one 5-account ring at amount 1200 with 0.95 retention.
/// Normal traffic carries no transfers so the ring topology is learnable.
fn example_config() -> GeneratorConfig {
    GeneratorConfig {
        population: 100,
        normal_tx_count: 300,
        relation_mix: [0.6, 0.0, 0.4],
        rings: vec![RingSpec {
            size: 5,
            base_amount: 1200.0,
            retention: 0.95,
            window_secs: 5 * 3600,
        }],
        seed: 42,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ring_account_scores_high_and_explains_cyclic_flow() {
    let (graph, labels) = Generator::new(example_config())
        .unwrap()
        .generate()
        .unwrap();
    let ring_members: Vec<u64> = labels.fraud_accounts().collect();
    assert_eq!(ring_members.len(), 5);

    let detector = train(
        &graph,
        &labels,
        &TrainConfig {
            epochs: 300,
            patience: 60,
            seed: 1,
            ..Default::default()
        },
    )
    .unwrap();

    let service = FraudService::new(graph, Arc::new(DownLlm), &RingsightConfig::default());
    service.load_detector(detector);

    let target = ring_members[0];
    let outcome = service.score(target).await.unwrap();
    assert!(
        outcome.fraud_probability >= 0.8,
        "ring account {target} scored {}",
        outcome.fraud_probability
    );
    assert!(outcome.is_fraud);

    let report = service.explain(target).await.unwrap();
    assert_eq!(report.reason_code, ReasonCode::CyclicFlow);
    assert_eq!(report.narrative_source, NarrativeSource::Templated);

    // Evidence lists all five ring accounts and the closing edge
    let cycle = report.evidence.cycle.expect("cycle evidence");
    assert_eq!(cycle.path.len(), 5);
    let mut cycle_members = cycle.path.clone();
    cycle_members.sort_unstable();
    let mut expected = ring_members.clone();
    expected.sort_unstable();
    assert_eq!(cycle_members, expected);
    assert_eq!(cycle.hops.len(), 5);
    assert_eq!(cycle.hops.last().unwrap().to, cycle.path[0]);
}

#[tokio::test]
async fn test_score_then_explain_share_probability() {
    let (graph, labels) = Generator::new(example_config())
        .unwrap()
        .generate()
        .unwrap();
    let detector = train(
        &graph,
        &labels,
        &TrainConfig {
            epochs: 100,
            patience: 30,
            seed: 3,
            ..Default::default()
        },
    )
    .unwrap();

    let service = FraudService::new(graph, Arc::new(DownLlm), &RingsightConfig::default());
    service.load_detector(detector);

    let outcome = service.score(10).await.unwrap();
    let report = service.explain(10).await.unwrap();
    assert_eq!(report.fraud_probability, outcome.fraud_probability);
}
