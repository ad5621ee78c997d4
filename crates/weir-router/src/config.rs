//! TOML configuration for the router.
//!
//! Every section and field has a default, so an empty document is a valid
//! configuration: a 5000-slot discrete ring with hash seed 480, hard capacity
//! admission, a retry cap of 100 and a 100-entry request history.

use std::path::Path;

use serde::{Deserialize, Serialize};
use weir_types::{AdmissionPolicy, PlacementStrategy};

use crate::error::RouterError;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Ring layout.
    pub ring: RingSection,
    /// Admission control.
    pub admission: AdmissionSection,
    /// Recent-request history (weighted strategy only).
    pub history: HistorySection,
}

/// `[ring]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingSection {
    /// Size of the ring address space.
    pub total_nodes: usize,
    /// Seed for key and server-name hashing.
    pub seed: u64,
    /// Placement strategy.
    pub strategy: PlacementStrategy,
    /// Bound on out-of-range re-hashing in the weighted strategy.
    pub max_rehash: u32,
}

impl Default for RingSection {
    fn default() -> Self {
        Self {
            total_nodes: 5_000,
            seed: 480,
            strategy: PlacementStrategy::Discrete,
            max_rehash: 1_024,
        }
    }
}

/// `[admission]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSection {
    /// Admission policy.
    pub policy: AdmissionPolicy,
    /// Seed for the shedding random source.
    pub rng_seed: u64,
    /// Maximum probes per request where the probe sequence is not naturally
    /// bounded by the ring.
    pub retry_cap: u32,
    /// Fraction of a server's capacity a single key must hold to count as a
    /// heavy hitter in reports.
    pub heavy_hitter_threshold: f64,
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            policy: AdmissionPolicy::HardCapacity,
            rng_seed: 480,
            retry_cap: 100,
            heavy_hitter_threshold: 0.25,
        }
    }
}

/// `[history]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Maximum remembered keys.
    pub capacity: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

impl RouterConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let config: RouterConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config with a discrete ring of `total_nodes` slots.
    pub fn discrete(total_nodes: usize) -> Self {
        Self::default()
            .with_strategy(PlacementStrategy::Discrete)
            .with_total_nodes(total_nodes)
    }

    /// Default config with a weighted ring hashing into `total_nodes`
    /// addresses.
    pub fn weighted(total_nodes: usize) -> Self {
        Self::default()
            .with_strategy(PlacementStrategy::Weighted)
            .with_total_nodes(total_nodes)
    }

    /// Override the placement strategy.
    pub fn with_strategy(mut self, strategy: PlacementStrategy) -> Self {
        self.ring.strategy = strategy;
        self
    }

    /// Override the ring size.
    pub fn with_total_nodes(mut self, total_nodes: usize) -> Self {
        self.ring.total_nodes = total_nodes;
        self
    }

    /// Override the admission policy.
    pub fn with_policy(mut self, policy: AdmissionPolicy) -> Self {
        self.admission.policy = policy;
        self
    }

    /// Override the shedding seed.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.admission.rng_seed = seed;
        self
    }

    /// Override the retry cap.
    pub fn with_retry_cap(mut self, retry_cap: u32) -> Self {
        self.admission.retry_cap = retry_cap;
        self
    }

    /// Check the values a router cannot work with.
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.ring.total_nodes == 0 {
            return Err(RouterError::Config("ring.total_nodes must be positive".into()));
        }
        if self.admission.retry_cap == 0 {
            return Err(RouterError::Config("admission.retry_cap must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.admission.heavy_hitter_threshold) {
            return Err(RouterError::Config(
                "admission.heavy_hitter_threshold must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}
