//! Analyzer configuration and validation.
//!
//! Configuration is validated once, when the orchestrator is constructed;
//! invalid settings are rejected with
//! [`OrchestratorError::InvalidConfiguration`](crate::core::OrchestratorError::InvalidConfiguration)
//! rather than surfacing as runtime surprises.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::types::StageId;

/// Tunable settings for one orchestrator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Maximum number of cached stage results. `0` disables caching
    /// entirely (every lookup misses, every store is a no-op), intended
    /// for tests and explicit opt-out.
    pub cache_capacity: usize,

    /// Time-to-live for cached results in seconds. `0` makes every entry
    /// immediately expired, which also disables caching.
    pub cache_ttl_seconds: u64,

    /// Maximum segment size in bytes produced by the chunking policy for
    /// stages that declare an input limit. Must be positive.
    pub max_chunk_size: usize,

    /// Stages to run, in the fixed order their results are assembled.
    /// Must be non-empty and free of duplicates.
    pub enabled_stages: Vec<StageId>,

    /// Stages whose failure fails the entire analysis call. Must be a
    /// subset of `enabled_stages`.
    pub mandatory_stages: HashSet<StageId>,

    /// Overall deadline for one analysis call. `None` waits indefinitely.
    /// On expiry the call returns a timeout error while outstanding stage
    /// tasks drain in the background.
    pub stage_timeout: Option<Duration>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            cache_ttl_seconds: 3600,
            max_chunk_size: 5000,
            enabled_stages: vec![
                StageId::new("doc-classify"),
                StageId::new("entity-extract"),
                StageId::new("clause-simplify"),
            ],
            mandatory_stages: HashSet::from([StageId::new("doc-classify")]),
            stage_timeout: None,
        }
    }
}

impl AnalyzerConfig {
    /// Create a configuration builder seeded with defaults.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::new()
    }

    /// Validate the configuration, returning a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_size == 0 {
            return Err("max_chunk_size must be greater than 0".to_string());
        }

        if self.enabled_stages.is_empty() {
            return Err("enabled_stages must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for stage in &self.enabled_stages {
            if !seen.insert(stage) {
                return Err(format!("duplicate enabled stage: {stage}"));
            }
        }

        for stage in &self.mandatory_stages {
            if !seen.contains(stage) {
                return Err(format!("mandatory stage '{stage}' is not enabled"));
            }
        }

        Ok(())
    }

    /// TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Whether this stage fails the whole call on failure.
    pub fn is_mandatory(&self, stage: &StageId) -> bool {
        self.mandatory_stages.contains(stage)
    }
}

/// Builder for [`AnalyzerConfig`].
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: AnalyzerConfig::default(),
        }
    }

    /// Set the cached-result capacity.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Set the cached-result TTL in seconds.
    pub fn cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.cache_ttl_seconds = seconds;
        self
    }

    /// Set the maximum chunk size in bytes.
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    /// Replace the enabled stage list (and its assembly order).
    pub fn enabled_stages(mut self, stages: Vec<StageId>) -> Self {
        self.config.enabled_stages = stages;
        self
    }

    /// Replace the mandatory stage set.
    pub fn mandatory_stages(mut self, stages: impl IntoIterator<Item = StageId>) -> Self {
        self.config.mandatory_stages = stages.into_iter().collect();
        self
    }

    /// Set the overall call deadline.
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.config.stage_timeout = Some(timeout);
        self
    }

    /// Build the configuration without validating it.
    pub fn build(self) -> AnalyzerConfig {
        self.config
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<AnalyzerConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for AnalyzerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
