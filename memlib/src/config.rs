use std::io::Read;
use serde::{Deserialize, Serialize};
use crate::allocator::AllocationStrategy;
use crate::error::Result;

/// The full simulator configuration: one physical memory region and one cache hierarchy
///
/// Every field has a default, so `{}` is a valid configuration describing the stock setup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub caches: HierarchyConfig,
}

impl SimulatorConfig {
    /// Parses a JSON configuration document
    ///
    /// # Arguments
    ///
    /// * `reader`: Source of the JSON text, usually a buffered file
    ///
    /// returns: Result<SimulatorConfig, SimError>
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Configuration for the physical memory allocator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "MemoryConfig::default_size")]
    pub size: usize,
    #[serde(default = "MemoryConfig::default_alignment")]
    pub alignment: usize,
    #[serde(default)]
    pub strategy: AllocationStrategy,
}

impl MemoryConfig {
    pub const DEFAULT_SIZE: usize = 4096;
    pub const DEFAULT_ALIGNMENT: usize = 4;

    fn default_size() -> usize {
        Self::DEFAULT_SIZE
    }

    fn default_alignment() -> usize {
        Self::DEFAULT_ALIGNMENT
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size: Self::DEFAULT_SIZE,
            alignment: Self::DEFAULT_ALIGNMENT,
            strategy: AllocationStrategy::default(),
        }
    }
}

/// A two level cache hierarchy backed by main memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default = "LevelConfig::default_l1")]
    pub l1: LevelConfig,
    #[serde(default = "LevelConfig::default_l2")]
    pub l2: LevelConfig,
    #[serde(default = "HierarchyConfig::default_memory_latency")]
    pub memory_latency: u64,
}

impl HierarchyConfig {
    pub const DEFAULT_MEMORY_LATENCY: u64 = 100;

    fn default_memory_latency() -> u64 {
        Self::DEFAULT_MEMORY_LATENCY
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            l1: LevelConfig::default_l1(),
            l2: LevelConfig::default_l2(),
            memory_latency: Self::DEFAULT_MEMORY_LATENCY,
        }
    }
}

/// Geometry and latency of a single cache level
///
/// Missing fields take the L1 defaults, wherever the level sits in the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    #[serde(default = "LevelConfig::default_size")]
    pub size: usize,
    #[serde(default = "LevelConfig::default_block_size")]
    pub block_size: usize,
    #[serde(default = "LevelConfig::default_associativity", alias = "assoc")]
    pub associativity: usize,
    #[serde(default = "LevelConfig::default_latency")]
    pub latency: u64,
}

impl LevelConfig {
    /// 1KiB direct mapped, 32 byte lines, 1 cycle
    pub fn default_l1() -> Self {
        Self {
            size: 1024,
            block_size: 32,
            associativity: 1,
            latency: 1,
        }
    }

    /// 4KiB 2-way, 32 byte lines, 10 cycles
    pub fn default_l2() -> Self {
        Self {
            size: 4096,
            block_size: 32,
            associativity: 2,
            latency: 10,
        }
    }

    fn default_size() -> usize {
        Self::default_l1().size
    }

    fn default_block_size() -> usize {
        Self::default_l1().block_size
    }

    fn default_associativity() -> usize {
        Self::default_l1().associativity
    }

    fn default_latency() -> u64 {
        Self::default_l1().latency
    }
}
