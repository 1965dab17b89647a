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

//! Ringsight configuration
//!
//! TOML file with environment-variable overrides. Load precedence is
//! file > environment > defaults.

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration shared by the CLI and the service facade
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RingsightConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub service: ServiceSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// Directory holding graph/label/weight/score artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// TTL for cached detector scores, in seconds
    #[serde(default = "default_score_ttl")]
    pub score_ttl_secs: u64,

    /// TTL for cached explanation reports, in seconds. Explanations are far
    /// more expensive than scores, so this is much longer.
    #[serde(default = "default_explain_ttl")]
    pub explain_ttl_secs: u64,

    /// Maximum entries per cache
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmSettings {
    /// Base URL of the locally hosted model server
    #[serde(default = "default_ollama_url")]
    pub ollama_base_url: String,

    /// Model name passed to the chat endpoint
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum tool-call rounds before falling back to the templated
    /// narrative
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSettings {
    /// Probability at or above which an account is flagged as fraud
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: f32,

    /// Neighborhood radius used by the explainer
    #[serde(default = "default_k_hops")]
    pub k_hops: u32,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./ringsight-data")
}

fn default_score_ttl() -> u64 {
    60
}

fn default_explain_ttl() -> u64 {
    3600
}

fn default_cache_entries() -> u64 {
    10_000
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "llama3.2:1b".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_max_rounds() -> u32 {
    4
}

fn default_flag_threshold() -> f32 {
    0.8
}

fn default_k_hops() -> u32 {
    2
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            score_ttl_secs: default_score_ttl(),
            explain_ttl_secs: default_explain_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            ollama_base_url: default_ollama_url(),
            model: default_llm_model(),
            request_timeout_secs: default_llm_timeout(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            flag_threshold: default_flag_threshold(),
            k_hops: default_k_hops(),
        }
    }
}

impl RingsightConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> GraphResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported variables:
    /// - RINGSIGHT_DATA_DIR: artifact directory
    /// - RINGSIGHT_SCORE_TTL / RINGSIGHT_EXPLAIN_TTL: cache TTLs in seconds
    /// - RINGSIGHT_FLAG_THRESHOLD: fraud flag threshold
    /// - OLLAMA_BASE_URL: local model server URL
    /// - RINGSIGHT_LLM_MODEL: model name
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RINGSIGHT_DATA_DIR") {
            config.data.data_dir = PathBuf::from(dir);
        }
        if let Ok(ttl) = std::env::var("RINGSIGHT_SCORE_TTL") {
            if let Ok(val) = ttl.parse() {
                config.cache.score_ttl_secs = val;
            }
        }
        if let Ok(ttl) = std::env::var("RINGSIGHT_EXPLAIN_TTL") {
            if let Ok(val) = ttl.parse() {
                config.cache.explain_ttl_secs = val;
            }
        }
        if let Ok(threshold) = std::env::var("RINGSIGHT_FLAG_THRESHOLD") {
            if let Ok(val) = threshold.parse() {
                config.service.flag_threshold = val;
            }
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            config.llm.ollama_base_url = url;
        }
        if let Ok(model) = std::env::var("RINGSIGHT_LLM_MODEL") {
            config.llm.model = model;
        }

        config
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> GraphResult<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::from_env()
            }
        } else {
            Self::from_env()
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> GraphResult<()> {
        if !(0.0..=1.0).contains(&self.service.flag_threshold) {
            return Err(GraphError::Config(format!(
                "flag_threshold must be within [0, 1], got {}",
                self.service.flag_threshold
            )));
        }
        if self.service.k_hops == 0 {
            return Err(GraphError::Config("k_hops must be at least 1".to_string()));
        }
        if self.llm.max_rounds == 0 {
            return Err(GraphError::Config(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RingsightConfig::default();
        assert_eq!(config.cache.score_ttl_secs, 60);
        assert!(config.cache.explain_ttl_secs > config.cache.score_ttl_secs);
        assert_eq!(config.service.flag_threshold, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = RingsightConfig::default();
        config.service.flag_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: RingsightConfig = toml::from_str(
            r#"
            [service]
            flag_threshold = 0.9

            [llm]
            model = "mistral"
            "#,
        )
        .unwrap();
        assert_eq!(config.service.flag_threshold, 0.9);
        assert_eq!(config.llm.model, "mistral");
        // untouched sections fall back to defaults
        assert_eq!(config.cache.score_ttl_secs, 60);
    }
}
