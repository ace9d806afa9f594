//! Join executor configuration.
//!
//! Defines the execution geometry (lanes, groups, pseudo-stack capacity)
//! of a join run and how it is loaded from and saved to TOML files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    DEFAULT_LANES_PER_GROUP, DEFAULT_MAX_SCRATCH_BYTES, DEFAULT_NUM_GROUPS,
    DEFAULT_PSTACK_NROOMS, MAX_JOIN_DEPTH,
};
use crate::error::{JoinError, JoinResult};
use crate::memory::PseudoStackArena;

/// Join executor configuration.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::config::JoinConfig;
///
/// let config = JoinConfig::default();
/// assert_eq!(config.lanes_per_group, 32);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConfig {
    /// Number of lanes executing in lockstep inside one group.
    /// Default: 32
    #[serde(default = "default_lanes_per_group")]
    pub lanes_per_group: usize,

    /// Number of groups running concurrently over the outer relation.
    /// Default: 4
    #[serde(default = "default_num_groups")]
    pub num_groups: usize,

    /// Pseudo-stack capacity: combinations buffered per depth per group.
    /// Must be at least `lanes_per_group`.
    /// Default: 256
    #[serde(default = "default_pstack_nrooms")]
    pub pstack_nrooms: usize,

    /// Lanes cooperating on one page of a block-format source.
    /// Default: same as `lanes_per_group`
    #[serde(default)]
    pub block_partition_size: Option<usize>,

    /// Number of devices sharing the inner relations (outer-join map slots).
    /// Default: 1
    #[serde(default = "default_num_devices")]
    pub num_devices: usize,

    /// Upper bound on pseudo-stack scratch memory for one run.
    /// Default: 64 MB
    #[serde(default = "default_max_scratch_bytes")]
    pub max_scratch_bytes: usize,
}

fn default_lanes_per_group() -> usize {
    DEFAULT_LANES_PER_GROUP
}

fn default_num_groups() -> usize {
    DEFAULT_NUM_GROUPS
}

fn default_pstack_nrooms() -> usize {
    DEFAULT_PSTACK_NROOMS
}

fn default_num_devices() -> usize {
    1
}

fn default_max_scratch_bytes() -> usize {
    DEFAULT_MAX_SCRATCH_BYTES
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            lanes_per_group: default_lanes_per_group(),
            num_groups: default_num_groups(),
            pstack_nrooms: default_pstack_nrooms(),
            block_partition_size: None,
            num_devices: default_num_devices(),
            max_scratch_bytes: default_max_scratch_bytes(),
        }
    }
}

impl JoinConfig {
    /// Creates a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a small configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            lanes_per_group: 4,
            num_groups: 1,
            pstack_nrooms: 16,
            block_partition_size: None,
            num_devices: 1,
            max_scratch_bytes: 1024 * 1024,
        }
    }

    /// Sets the group width.
    #[must_use]
    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes_per_group = lanes;
        self
    }

    /// Sets the number of groups.
    #[must_use]
    pub fn with_groups(mut self, groups: usize) -> Self {
        self.num_groups = groups;
        self
    }

    /// Sets the pseudo-stack capacity per depth.
    #[must_use]
    pub fn with_pstack_nrooms(mut self, nrooms: usize) -> Self {
        self.pstack_nrooms = nrooms;
        self
    }

    /// Sets the number of lanes sharing one block page.
    #[must_use]
    pub fn with_block_partition_size(mut self, part_sz: usize) -> Self {
        self.block_partition_size = Some(part_sz);
        self
    }

    /// Sets the number of devices.
    #[must_use]
    pub fn with_devices(mut self, devices: usize) -> Self {
        self.num_devices = devices;
        self
    }

    /// Returns the effective block partition size.
    #[must_use]
    pub fn partition_size(&self) -> usize {
        self.block_partition_size.unwrap_or(self.lanes_per_group)
    }

    /// Validates the geometry on its own.
    pub fn validate(&self) -> JoinResult<()> {
        if self.lanes_per_group == 0 {
            return Err(JoinError::invalid_config("lanes_per_group must be positive"));
        }
        if self.num_groups == 0 {
            return Err(JoinError::invalid_config("num_groups must be positive"));
        }
        if self.pstack_nrooms < self.lanes_per_group {
            return Err(JoinError::invalid_config(format!(
                "pstack_nrooms ({}) must be at least lanes_per_group ({})",
                self.pstack_nrooms, self.lanes_per_group
            )));
        }
        if u32::try_from(self.pstack_nrooms).is_err() {
            return Err(JoinError::invalid_config("pstack_nrooms does not fit in u32"));
        }
        let part_sz = self.partition_size();
        if part_sz == 0 || part_sz > self.lanes_per_group {
            return Err(JoinError::invalid_config(format!(
                "block_partition_size ({}) must be within 1..={}",
                part_sz, self.lanes_per_group
            )));
        }
        if self.num_devices == 0 {
            return Err(JoinError::invalid_config("num_devices must be positive"));
        }
        Ok(())
    }

    /// Validates the geometry for a join over `num_rels` inner relations.
    pub fn validate_for(&self, num_rels: usize) -> JoinResult<()> {
        self.validate()?;
        if num_rels > MAX_JOIN_DEPTH {
            return Err(JoinError::DepthLimit {
                depth: num_rels,
                max: MAX_JOIN_DEPTH,
            });
        }
        let required =
            PseudoStackArena::required_bytes(self.num_groups, num_rels, self.pstack_nrooms);
        if required > self.max_scratch_bytes {
            return Err(JoinError::ScratchExhausted {
                required,
                budget: self.max_scratch_bytes,
            });
        }
        Ok(())
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> JoinResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> JoinResult<Self> {
        toml::from_str(content).map_err(|e| JoinError::invalid_config(e.to_string()))
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> JoinResult<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to a TOML string.
    pub fn to_toml(&self) -> JoinResult<String> {
        toml::to_string_pretty(self).map_err(|e| JoinError::invalid_config(e.to_string()))
    }
}
