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

//! Generator configuration and injected-pattern specs

use crate::{SynthError, SynthResult};
use serde::{Deserialize, Serialize};

/// Configuration for the synthetic graph generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Number of accounts in the base population
    pub population: usize,

    /// Number of normal (non-fraudulent) transactions
    pub normal_tx_count: usize,

    /// Relation sampling weights for normal traffic, indexed as
    /// [payment, transfer, withdrawal]; must sum to ~1.0
    pub relation_mix: [f64; 3],

    /// Log-normal parameters for normal transaction amounts
    pub amount_log_mean: f64,
    pub amount_log_sigma: f64,

    /// Clamp range applied to drawn amounts
    pub amount_min: f64,
    pub amount_max: f64,

    /// Length of the generation window, in seconds
    pub time_window_secs: u64,

    /// Cyclic laundering rings to inject
    pub rings: Vec<RingSpec>,

    /// Fan-out layering patterns to inject
    pub fan_outs: Vec<FanOutSpec>,

    /// Rapid-fire burst patterns to inject
    pub rapid_fires: Vec<RapidFireSpec>,

    /// RNG seed; identical configs produce identical graphs
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            population: 100,
            normal_tx_count: 300,
            relation_mix: [0.4, 0.35, 0.25],
            amount_log_mean: 4.5,
            amount_log_sigma: 1.5,
            amount_min: 10.0,
            amount_max: 5000.0,
            time_window_secs: 720 * 3600,
            rings: vec![RingSpec::default()],
            fan_outs: Vec::new(),
            rapid_fires: Vec::new(),
            seed: 42,
        }
    }
}

/// A cyclic money-laundering ring: `size` accounts connected in a cycle of
/// transfers whose amounts decay by `retention` per hop inside a tight
/// timestamp window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingSpec {
    /// Number of accounts in the ring (at least 3)
    pub size: usize,
    /// Amount entering the first hop
    pub base_amount: f64,
    /// Fraction of the received amount forwarded at each hop (0.90..=0.98)
    pub retention: f64,
    /// Window containing all ring transactions, in seconds
    pub window_secs: u64,
}

impl Default for RingSpec {
    fn default() -> Self {
        Self {
            size: 5,
            base_amount: 1000.0,
            retention: 0.95,
            window_secs: 5 * 3600,
        }
    }
}

/// Fan-out layering: one source splits an amount across many fresh
/// destinations in quick succession.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutSpec {
    /// Number of destination accounts
    pub targets: usize,
    /// Total amount split evenly across targets
    pub total_amount: f64,
    /// Gap between consecutive transfers, in seconds
    pub spacing_secs: u64,
}

impl Default for FanOutSpec {
    fn default() -> Self {
        Self {
            targets: 8,
            total_amount: 5000.0,
            spacing_secs: 300,
        }
    }
}

/// Rapid-fire burst: one account emits many small payments seconds apart,
/// the signature of an automated attack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapidFireSpec {
    /// Number of transactions in the burst
    pub tx_count: usize,
    /// Uniform amount range
    pub amount_range: (f64, f64),
    /// Gap between consecutive transactions, in seconds
    pub gap_secs: u64,
}

impl Default for RapidFireSpec {
    fn default() -> Self {
        Self {
            tx_count: 15,
            amount_range: (50.0, 200.0),
            gap_secs: 3,
        }
    }
}

impl GeneratorConfig {
    /// Validate the configuration before generation. Violations are fatal
    /// configuration errors, never silently adjusted.
    pub fn validate(&self) -> SynthResult<()> {
        if self.population == 0 {
            return Err(SynthError::Config("population must be positive".into()));
        }
        if self.population < 2 && self.normal_tx_count > 0 {
            return Err(SynthError::Config(
                "normal traffic requires at least two accounts".into(),
            ));
        }

        let mix_total: f64 = self.relation_mix.iter().sum();
        if self.relation_mix.iter().any(|w| *w < 0.0) || (mix_total - 1.0).abs() > 0.01 {
            return Err(SynthError::Config(format!(
                "relation_mix must be non-negative and sum to 1.0, got {mix_total}"
            )));
        }

        if self.amount_min <= 0.0 || self.amount_max < self.amount_min {
            return Err(SynthError::Config(format!(
                "invalid amount clamp range [{}, {}]",
                self.amount_min, self.amount_max
            )));
        }
        if self.time_window_secs == 0 {
            return Err(SynthError::Config("time window must be positive".into()));
        }

        for (i, ring) in self.rings.iter().enumerate() {
            if ring.size < 3 {
                return Err(SynthError::Config(format!(
                    "ring {i}: size must be at least 3, got {}",
                    ring.size
                )));
            }
            if !(0.90..=0.98).contains(&ring.retention) {
                return Err(SynthError::Config(format!(
                    "ring {i}: retention must be within [0.90, 0.98], got {}",
                    ring.retention
                )));
            }
            if ring.base_amount <= 0.0 {
                return Err(SynthError::Config(format!(
                    "ring {i}: base amount must be positive"
                )));
            }
            if ring.window_secs < ring.size as u64 {
                return Err(SynthError::Config(format!(
                    "ring {i}: window too short for strictly increasing hop timestamps"
                )));
            }
        }

        for (i, fan) in self.fan_outs.iter().enumerate() {
            if fan.targets == 0 || fan.total_amount <= 0.0 {
                return Err(SynthError::Config(format!("fan-out {i}: invalid spec")));
            }
        }
        if !self.rapid_fires.is_empty() && self.population < 2 {
            return Err(SynthError::Config(
                "rapid-fire bursts require at least two accounts".into(),
            ));
        }
        for (i, burst) in self.rapid_fires.iter().enumerate() {
            if burst.tx_count == 0 || burst.amount_range.0 <= 0.0 {
                return Err(SynthError::Config(format!("rapid-fire {i}: invalid spec")));
            }
            if burst.amount_range.1 < burst.amount_range.0 {
                return Err(SynthError::Config(format!(
                    "rapid-fire {i}: empty amount range"
                )));
            }
        }

        Ok(())
    }

    /// Accounts consumed by injected patterns (every pattern draws from the
    /// previously-unused pool)
    pub fn injected_account_count(&self) -> usize {
        let ring_accounts: usize = self.rings.iter().map(|r| r.size).sum();
        let fan_accounts: usize = self.fan_outs.iter().map(|f| f.targets + 1).sum();
        ring_accounts + fan_accounts + self.rapid_fires.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(GeneratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_relation_mix_must_sum_to_one() {
        let config = GeneratorConfig {
            relation_mix: [0.5, 0.5, 0.5],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SynthError::Config(_))));
    }

    #[test]
    fn test_ring_retention_bounds() {
        let config = GeneratorConfig {
            rings: vec![RingSpec {
                retention: 0.5,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tiny_ring_rejected() {
        let config = GeneratorConfig {
            rings: vec![RingSpec {
                size: 2,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_injected_account_count() {
        let config = GeneratorConfig {
            rings: vec![RingSpec::default()],
            fan_outs: vec![FanOutSpec::default()],
            rapid_fires: vec![RapidFireSpec::default()],
            ..Default::default()
        };
        // 5 ring + 9 fan-out (source + 8 targets) + 1 burst account
        assert_eq!(config.injected_account_count(), 15);
    }
}
