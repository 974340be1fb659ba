//! Scheduler configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::rrq::DEFAULT_ROUND_BURST;
use crate::{DecisionError, Strategy};

/// Configuration for a [`Scheduler`](crate::Scheduler).
///
/// Can be loaded from TOML via [`SchedulerConfig::from_toml_file`] or built
/// programmatically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Bytes distributed across peers per round. Must be positive; no single
    /// task may exceed it or it will be deferred indefinitely.
    #[serde(default = "default_round_burst")]
    pub round_burst: u64,

    /// Weighting function applied to peer receipts.
    #[serde(default)]
    pub strategy: Strategy,

    /// Minimum number of cancelled tasks in one peer's queue before that
    /// queue is compacted. Zero disables compaction.
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_round_burst() -> u64 {
    DEFAULT_ROUND_BURST
}

fn default_compaction_threshold() -> usize {
    64
}

// ── Impl ───────────────────────────────────────────────────────────────

impl SchedulerConfig {
    pub fn new(round_burst: u64, strategy: Strategy) -> Self {
        Self {
            round_burst,
            strategy,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, DecisionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, DecisionError> {
        let config: Self = toml::from_str(s).map_err(|e| DecisionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, DecisionError> {
        if matches!(self.strategy, Strategy::Custom(_)) {
            return Err(DecisionError::CustomStrategyNotSerializable);
        }
        toml::to_string_pretty(self).map_err(|e| DecisionError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), DecisionError> {
        if self.round_burst == 0 {
            return Err(DecisionError::InvalidRoundBurst);
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            round_burst: default_round_burst(),
            strategy: Strategy::default(),
            compaction_threshold: default_compaction_threshold(),
        }
    }
}
