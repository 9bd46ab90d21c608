//! engine.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! the stock tuning.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the rebalancer's tie-break shuffling.
    pub seed: u64,
    pub weights: ScoringWeights,
    pub margins: Margins,
    pub rebalance: RebalanceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            weights: ScoringWeights::default(),
            margins: Margins::default(),
            rebalance: RebalanceConfig::default(),
        }
    }
}

/// Weights for the candidate score components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Adjacent same-room slot already held. Dominates everything else.
    pub continuity: f64,
    /// Flat bonus for any remaining quota.
    pub quota: f64,
    /// Per unit of remaining quota.
    pub quota_unit: f64,
    /// At or below the running average workload.
    pub below_average: f64,
    /// Per unit above the overload threshold.
    pub overload_penalty: f64,
    /// Per slot of same-room streak extended.
    pub chain_extension: f64,
    /// Per unit above the fair-share upper bound (aggressive tier only).
    pub ceiling_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            continuity: 1000.0,
            quota: 100.0,
            quota_unit: 10.0,
            below_average: 50.0,
            overload_penalty: 20.0,
            chain_extension: 1.0,
            ceiling_penalty: 200.0,
        }
    }
}

/// Distances above the running average used by the escalation tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    /// Mild-penalty threshold: `average + overload`.
    pub overload: f64,
    /// Normal-tier exclusion threshold: `average + strict_overload`.
    pub strict_overload: f64,
    /// Aggressive-tier ceiling: `average + aggressive`.
    pub aggressive: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            overload: 1.0,
            strict_overload: 2.0,
            aggressive: 2.0,
        }
    }
}

/// Budgets for the swap-based rebalancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    pub max_iterations: u32,
    /// Consecutive iterations without a swap before giving up.
    pub max_stuck: u32,
    /// Underloaded candidates tried per overloaded resource.
    pub candidate_scan: usize,
    /// Spread above which the aggressive pass kicks in.
    pub aggressive_spread: u32,
    /// Swaps attempted per aggressive iteration.
    pub aggressive_swaps: usize,
    /// Run a quick pass after this many placements (0 disables).
    pub quick_every: usize,
    pub quick_iterations: u32,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            max_stuck: 20,
            candidate_scan: 5,
            aggressive_spread: 5,
            aggressive_swaps: 4,
            quick_every: 25,
            quick_iterations: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml_str = r#"
seed = 7

[rebalance]
max_stuck = 3
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.rebalance.max_stuck, 3);
        assert_eq!(config.rebalance.max_iterations, 500);
        assert_eq!(config.weights.continuity, 1000.0);
    }

    #[test]
    fn roundtrips_through_file() {
        let mut config = EngineConfig::default();
        config.margins.aggressive = 3.5;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();

        let loaded = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.margins.aggressive, 3.5);
    }
}
