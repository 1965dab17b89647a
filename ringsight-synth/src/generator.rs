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

//! Synthetic graph generator
//!
//! Builds a randomized base population, injects the configured fraud
//! topologies from a pool of previously-unused accounts, then fills in
//! normal traffic. Every injected account and transaction is recorded in the
//! out-of-band label map. Identical configurations (seed included) yield
//! identical graphs.

use crate::config::{FanOutSpec, GeneratorConfig, RapidFireSpec, RingSpec};
use crate::{SynthError, SynthResult};
use rand::prelude::*;
use rand_distr::{Beta, LogNormal};
use ringsight_core::{
    AccountId, FraudPattern, GraphBuilder, LabelMap, RelationType, TransactionGraph,
};
use tracing::{debug, info};

const MIN_ACCOUNT_AGE_DAYS: u32 = 30;
const MAX_ACCOUNT_AGE_DAYS: u32 = 1825;

pub struct Generator {
    config: GeneratorConfig,
    rng: StdRng,
    risk_dist: Beta<f64>,
    amount_dist: LogNormal<f64>,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> SynthResult<Self> {
        config.validate()?;
        let risk_dist = Beta::new(2.0, 5.0)
            .map_err(|e| SynthError::Config(format!("risk distribution: {e}")))?;
        let amount_dist = LogNormal::new(config.amount_log_mean, config.amount_log_sigma)
            .map_err(|e| SynthError::Config(format!("amount distribution: {e}")))?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            rng,
            risk_dist,
            amount_dist,
        })
    }

    /// Generate a graph snapshot and its label map. Mutates internal RNG
    /// state; construct a fresh generator for a reproducible run.
    pub fn generate(&mut self) -> SynthResult<(TransactionGraph, LabelMap)> {
        let mut builder = GraphBuilder::new();
        let mut labels = LabelMap::new();

        // Base population
        for _ in 0..self.config.population {
            let age = self
                .rng
                .gen_range(MIN_ACCOUNT_AGE_DAYS..=MAX_ACCOUNT_AGE_DAYS);
            let risk = self.risk_dist.sample(&mut self.rng);
            builder.add_account(age, risk);
        }

        // Pool of accounts not yet claimed by an injected pattern. Patterns
        // never share accounts; running out is a configuration error.
        let mut unused: Vec<AccountId> = (0..self.config.population as AccountId).collect();

        let rings = self.config.rings.clone();
        for spec in &rings {
            self.inject_ring(spec, &mut builder, &mut labels, &mut unused)?;
        }
        let fan_outs = self.config.fan_outs.clone();
        for spec in &fan_outs {
            self.inject_fan_out(spec, &mut builder, &mut labels, &mut unused)?;
        }
        let rapid_fires = self.config.rapid_fires.clone();
        for spec in &rapid_fires {
            self.inject_rapid_fire(spec, &mut builder, &mut labels, &mut unused)?;
        }

        self.generate_normal_traffic(&mut builder)?;

        let graph = builder.build();
        info!(
            accounts = graph.account_count(),
            transactions = graph.transaction_count(),
            fraud_accounts = labels.fraud_account_count(),
            "synthetic graph generated"
        );
        Ok((graph, labels))
    }

    /// Claim `n` previously-unused accounts, or fail with a configuration
    /// error naming the pattern.
    fn take_unused(
        &mut self,
        n: usize,
        pattern: &str,
        unused: &mut Vec<AccountId>,
    ) -> SynthResult<Vec<AccountId>> {
        if unused.len() < n {
            return Err(SynthError::Config(format!(
                "{pattern} needs {n} unused accounts but only {} remain",
                unused.len()
            )));
        }
        let mut picked = Vec::with_capacity(n);
        for _ in 0..n {
            let idx = self.rng.gen_range(0..unused.len());
            picked.push(unused.swap_remove(idx));
        }
        Ok(picked)
    }

    fn inject_ring(
        &mut self,
        spec: &RingSpec,
        builder: &mut GraphBuilder,
        labels: &mut LabelMap,
        unused: &mut Vec<AccountId>,
    ) -> SynthResult<()> {
        let members = self.take_unused(spec.size, "cyclic ring", unused)?;
        debug!(?members, "injecting cyclic ring");

        let start = self.window_start(spec.window_secs);
        // Hop timestamps must be strictly increasing inside the window.
        let hop_gap = (spec.window_secs / spec.size as u64).max(1);

        for (i, &from) in members.iter().enumerate() {
            let to = members[(i + 1) % members.len()];
            let amount = round_cents(spec.base_amount * spec.retention.powi(i as i32));
            let timestamp = start + (i as u64) * hop_gap;
            let tx = builder.add_transaction(from, to, amount, timestamp, RelationType::Transfer)?;
            labels.mark_transaction(tx);
            labels.mark_account(from, FraudPattern::CyclicRing);
        }
        Ok(())
    }

    fn inject_fan_out(
        &mut self,
        spec: &FanOutSpec,
        builder: &mut GraphBuilder,
        labels: &mut LabelMap,
        unused: &mut Vec<AccountId>,
    ) -> SynthResult<()> {
        let source = self.take_unused(1, "fan-out source", unused)?[0];
        let targets = self.take_unused(spec.targets, "fan-out targets", unused)?;
        debug!(source, ?targets, "injecting fan-out");

        let start = self.window_start(spec.spacing_secs * spec.targets as u64);
        let share = round_cents(spec.total_amount / spec.targets as f64);

        for (i, &target) in targets.iter().enumerate() {
            let timestamp = start + (i as u64) * spec.spacing_secs;
            let tx =
                builder.add_transaction(source, target, share, timestamp, RelationType::Transfer)?;
            labels.mark_transaction(tx);
        }
        labels.mark_account(source, FraudPattern::FanOut);
        Ok(())
    }

    fn inject_rapid_fire(
        &mut self,
        spec: &RapidFireSpec,
        builder: &mut GraphBuilder,
        labels: &mut LabelMap,
        unused: &mut Vec<AccountId>,
    ) -> SynthResult<()> {
        // The burst account must be fresh; its targets may be anyone else.
        let population = self.config.population as AccountId;
        let account = self.take_unused(1, "rapid-fire burst", unused)?[0];
        debug!(account, count = spec.tx_count, "injecting rapid-fire burst");

        let start = self.window_start(spec.gap_secs * spec.tx_count as u64);
        for i in 0..spec.tx_count {
            let target = loop {
                let candidate = self.rng.gen_range(0..population);
                if candidate != account {
                    break candidate;
                }
            };
            let amount =
                round_cents(self.rng.gen_range(spec.amount_range.0..=spec.amount_range.1));
            let timestamp = start + (i as u64) * spec.gap_secs;
            let tx =
                builder.add_transaction(account, target, amount, timestamp, RelationType::Payment)?;
            labels.mark_transaction(tx);
        }
        labels.mark_account(account, FraudPattern::RapidFire);
        Ok(())
    }

    fn generate_normal_traffic(&mut self, builder: &mut GraphBuilder) -> SynthResult<()> {
        let population = self.config.population as AccountId;
        for _ in 0..self.config.normal_tx_count {
            // Re-draw self-pairs so the configured count is exact.
            let (src, dst) = loop {
                let src = self.rng.gen_range(0..population);
                let dst = self.rng.gen_range(0..population);
                if src != dst {
                    break (src, dst);
                }
            };
            let raw: f64 = self.amount_dist.sample(&mut self.rng);
            let amount = round_cents(raw.clamp(self.config.amount_min, self.config.amount_max));
            let timestamp = self.rng.gen_range(0..self.config.time_window_secs);
            let relation = self.sample_relation();
            builder.add_transaction(src, dst, amount, timestamp, relation)?;
        }
        Ok(())
    }

    fn sample_relation(&mut self) -> RelationType {
        let r: f64 = self.rng.gen();
        let mut cumulative = 0.0;
        for (weight, relation) in self
            .config
            .relation_mix
            .iter()
            .zip(RelationType::ALL.iter())
        {
            cumulative += weight;
            if r < cumulative {
                return *relation;
            }
        }
        RelationType::Withdrawal
    }

    fn window_start(&mut self, span_secs: u64) -> u64 {
        if self.config.time_window_secs > span_secs {
            self.rng.gen_range(0..self.config.time_window_secs - span_secs)
        } else {
            0
        }
    }
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
