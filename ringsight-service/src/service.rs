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

//! Service facade
//!
//! The two logical operations exposed to the (out-of-scope) request-serving
//! layer: `score` and `explain`. Reads against the graph snapshot and the
//! trained weights are lock-free; the only lock is the slot holding the
//! currently loaded detector, and it is never held across an await.

use crate::cache::{CacheBackend, CacheStats, ResultCache, ResultCacheConfig};
use parking_lot::RwLock;
use ringsight_core::{AccountId, RingsightConfig, TransactionGraph};
use ringsight_detect::{GraphTensors, TrainedDetector};
use ringsight_explain::{Explainer, ExplainConfig, ExplanationReport, LlmClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors surfaced to the caller
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Unknown account (4xx-equivalent)
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// No trained detector loaded (5xx-equivalent; retry after load)
    #[error("No trained detector is loaded")]
    ModelUnavailable,
}

/// Result of a score request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub account_id: AccountId,
    pub fraud_probability: f32,
    pub is_fraud: bool,
}

/// The fraud-detection service facade
pub struct FraudService {
    graph: Arc<TransactionGraph>,
    tensors: Arc<GraphTensors>,
    detector: RwLock<Option<Arc<TrainedDetector>>>,
    llm: Arc<dyn LlmClient>,
    explainer: Explainer,
    flag_threshold: f32,
    score_cache: ResultCache<ScoreOutcome>,
    explain_cache: ResultCache<ExplanationReport>,
}

impl FraudService {
    pub fn new(
        graph: TransactionGraph,
        llm: Arc<dyn LlmClient>,
        config: &RingsightConfig,
    ) -> Self {
        let tensors = GraphTensors::from_graph(&graph);
        let explainer = Explainer::new(
            ExplainConfig {
                k_hops: config.service.k_hops,
                flag_threshold: config.service.flag_threshold,
                ..ExplainConfig::default()
            },
            config.llm.max_rounds,
        );

        let score_cache = ResultCache::new(
            "score",
            ResultCacheConfig {
                max_entries: config.cache.max_entries,
                ttl: Duration::from_secs(config.cache.score_ttl_secs),
            },
        );
        let explain_cache = ResultCache::new(
            "explain",
            ResultCacheConfig {
                max_entries: config.cache.max_entries,
                ttl: Duration::from_secs(config.cache.explain_ttl_secs),
            },
        );

        Self {
            graph: Arc::new(graph),
            tensors: Arc::new(tensors),
            detector: RwLock::new(None),
            llm,
            explainer,
            flag_threshold: config.service.flag_threshold,
            score_cache,
            explain_cache,
        }
    }

    /// Route both caches through a shared backing store. Backend failures
    /// degrade to node-local caching and are never surfaced.
    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.score_cache = self.score_cache.with_backend(Arc::clone(&backend));
        self.explain_cache = self.explain_cache.with_backend(backend);
        self
    }

    /// Swap in a trained detector. Cached results from a previous detector
    /// are dropped.
    pub fn load_detector(&self, detector: TrainedDetector) {
        *self.detector.write() = Some(Arc::new(detector));
        self.score_cache.invalidate_all();
        self.explain_cache.invalidate_all();
        info!("detector loaded");
    }

    pub fn detector_loaded(&self) -> bool {
        self.detector.read().is_some()
    }

    fn current_detector(&self) -> Result<Arc<TrainedDetector>, ServiceError> {
        self.detector
            .read()
            .clone()
            .ok_or(ServiceError::ModelUnavailable)
    }

    /// Fraud probability for one account. Cached results within the score
    /// TTL are returned bit-identically without re-running the detector.
    pub async fn score(&self, account_id: AccountId) -> Result<ScoreOutcome, ServiceError> {
        if !self.graph.contains_account(account_id) {
            return Err(ServiceError::NotFound(account_id));
        }
        let detector = self.current_detector()?;
        let tensors = Arc::clone(&self.tensors);
        let threshold = self.flag_threshold;

        self.score_cache
            .get_or_try_compute(account_id, || async move {
                let fraud_probability = detector
                    .score(&tensors, account_id)
                    .map_err(|_| ServiceError::NotFound(account_id))?;
                Ok(ScoreOutcome {
                    account_id,
                    fraud_probability,
                    is_fraud: fraud_probability >= threshold,
                })
            })
            .await
            .map_err(|e: Arc<ServiceError>| (*e).clone())
    }

    /// Explanation report for one account. Never fails due to language-model
    /// unavailability; the narrative falls back to a template built from the
    /// evidence.
    pub async fn explain(&self, account_id: AccountId) -> Result<ExplanationReport, ServiceError> {
        if !self.graph.contains_account(account_id) {
            return Err(ServiceError::NotFound(account_id));
        }
        let outcome = self.score(account_id).await?;
        let detector = self.current_detector()?;

        let report = self
            .explain_cache
            .get_or_compute(account_id, || async move {
                // One forward pass scores the whole population so the
                // evidence can count already-flagged neighbors.
                let scores = detector.score_all(&self.tensors);
                self.explainer
                    .explain(
                        &self.graph,
                        &scores,
                        self.llm.as_ref(),
                        account_id,
                        outcome.fraud_probability,
                    )
                    .await
            })
            .await;
        Ok(report)
    }

    pub fn score_cache_stats(&self) -> CacheStats {
        self.score_cache.stats()
    }

    pub fn explain_cache_stats(&self) -> CacheStats {
        self.explain_cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::prelude::*;
    use ringsight_detect::model::RelationalDetector;
    use ringsight_detect::trainer::EvalMetrics;
    use ringsight_explain::{ChatMessage, LlmError, NarrativeSource};
    use ringsight_synth::{Generator, GeneratorConfig, RingSpec};

    /// Model client that is always unreachable
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

    fn test_service() -> FraudService {
        let config = GeneratorConfig {
            population: 30,
            normal_tx_count: 60,
            rings: vec![RingSpec::default()],
            seed: 21,
            ..Default::default()
        };
        let (graph, _) = Generator::new(config).unwrap().generate().unwrap();
        FraudService::new(graph, Arc::new(DownLlm), &RingsightConfig::default())
    }

    fn untrained_detector() -> TrainedDetector {
        let mut rng = StdRng::seed_from_u64(5);
        TrainedDetector {
            model: RelationalDetector::new(ringsight_detect::tensors::NUM_FEATURES, 8, 3, &mut rng),
            metrics: EvalMetrics::default(),
        }
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let service = test_service();
        service.load_detector(untrained_detector());

        assert!(matches!(
            service.score(999).await,
            Err(ServiceError::NotFound(999))
        ));
        assert!(matches!(
            service.explain(999).await,
            Err(ServiceError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_score_without_detector_is_model_unavailable() {
        let service = test_service();
        assert!(matches!(
            service.score(0).await,
            Err(ServiceError::ModelUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_repeated_scores_bit_identical_and_cached() {
        let service = test_service();
        service.load_detector(untrained_detector());

        let first = service.score(3).await.unwrap();
        let second = service.score(3).await.unwrap();
        assert_eq!(first, second);
        assert!(first.fraud_probability.to_bits() == second.fraud_probability.to_bits());

        let stats = service.score_cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_explain_survives_model_outage() {
        let service = test_service();
        service.load_detector(untrained_detector());

        let report = service.explain(2).await.unwrap();
        assert_eq!(report.account_id, 2);
        assert_eq!(report.narrative_source, NarrativeSource::Templated);
        assert!(!report.narrative.is_empty());
    }

    #[tokio::test]
    async fn test_flag_threshold_applied() {
        let config = GeneratorConfig {
            population: 10,
            normal_tx_count: 20,
            rings: vec![],
            seed: 2,
            ..Default::default()
        };
        let (graph, _) = Generator::new(config).unwrap().generate().unwrap();

        let mut service_config = RingsightConfig::default();
        // Everything is fraud at a zero threshold
        service_config.service.flag_threshold = 0.0;
        let service = FraudService::new(graph, Arc::new(DownLlm), &service_config);
        service.load_detector(untrained_detector());

        let outcome = service.score(1).await.unwrap();
        assert!(outcome.is_fraud);
    }
}
