use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use crate::config::{HierarchyConfig, LevelConfig};
use crate::error::{try_filled, Result, SimError};
use crate::replacement_policies::{ReplacementPolicy, RoundRobin};

/// Width of a simulated address
pub const ADDRESS_BITS: u32 = u32::BITS;

/// One way of a set
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheLine {
    pub tag: u32,
    pub valid: bool,
}

/// The shape of a cache level, and the address split derived from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelGeometry {
    pub name: String,
    pub size: usize,
    pub block_size: usize,
    pub associativity: usize,
    pub num_sets: usize,
    pub offset_bits: u32,
    pub index_bits: u32,
    pub tag_bits: u32,
    pub latency: u64,
}

impl LevelGeometry {
    /// Validates a level configuration and derives the set count and address split
    ///
    /// The block size and the resulting number of sets must be powers of two, and the size must
    /// be an exact multiple of one full set
    fn new(name: &str, config: &LevelConfig) -> Result<Self> {
        let LevelConfig { size, block_size, associativity, latency } = *config;
        if size == 0 || associativity == 0 {
            return Err(SimError::invalid(format!("{name}: size and associativity must be non-zero")));
        }
        if !block_size.is_power_of_two() {
            return Err(SimError::invalid(format!(
                "{name}: block size must be a non-zero power of two, got {block_size}"
            )));
        }
        let set_bytes = block_size
            .checked_mul(associativity)
            .ok_or_else(|| SimError::invalid(format!("{name}: set size overflows")))?;
        if size % set_bytes != 0 {
            return Err(SimError::invalid(format!(
                "{name}: size {size} is not a multiple of block size x associativity ({set_bytes})"
            )));
        }
        let num_sets = size / set_bytes;
        if !num_sets.is_power_of_two() {
            return Err(SimError::invalid(format!(
                "{name}: number of sets must be a power of two, got {num_sets}"
            )));
        }
        let offset_bits = block_size.trailing_zeros();
        let index_bits = num_sets.trailing_zeros();
        if offset_bits + index_bits > ADDRESS_BITS {
            return Err(SimError::invalid(format!(
                "{name}: {offset_bits} offset bits and {index_bits} index bits don't fit a {ADDRESS_BITS} bit address"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            size,
            block_size,
            associativity,
            num_sets,
            offset_bits,
            index_bits,
            tag_bits: ADDRESS_BITS - offset_bits - index_bits,
            latency,
        })
    }
}

/// Hit and miss figures for a single level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of accesses which hit, 0 when the level hasn't been accessed
    pub hit_rate: f64,
}

/// A single set associative cache level, parameterised by a replacement policy
///
/// Lookups and installs are separate steps: `access` only decides hit or miss, and the caller
/// decides when a line gets installed. Lines are stored flat, set by set
#[derive(Debug, Clone)]
pub struct CacheLevel<R: ReplacementPolicy = RoundRobin> {
    geometry: LevelGeometry,
    index_mask: u32,
    lines: Vec<CacheLine>,
    policy: R,
    hits: u64,
    misses: u64,
}

impl<R: ReplacementPolicy> CacheLevel<R> {
    pub fn new(name: &str, config: &LevelConfig) -> Result<Self> {
        let geometry = LevelGeometry::new(name, config)?;
        let lines = try_filled(geometry.num_sets * geometry.associativity, CacheLine::default(), name)?;
        debug!(
            level = name,
            size = geometry.size,
            block_size = geometry.block_size,
            associativity = geometry.associativity,
            latency = geometry.latency,
            "initialised cache level"
        );
        Ok(Self {
            index_mask: (geometry.num_sets - 1) as u32,
            lines,
            policy: R::new(geometry.num_sets, geometry.associativity),
            geometry,
            hits: 0,
            misses: 0,
        })
    }

    /// Splits an address into its set index and tag
    ///
    /// # Arguments
    ///
    /// * `address`: A 32-bit address
    ///
    /// returns: (usize, u32)
    pub fn address_to_set_and_tag(&self, address: u32) -> (usize, u32) {
        let offset_bits = self.geometry.offset_bits;
        let set = address.checked_shr(offset_bits).unwrap_or(0) & self.index_mask;
        let tag = address
            .checked_shr(offset_bits + self.geometry.index_bits)
            .unwrap_or(0);
        (set as usize, tag)
    }

    /// Looks the address up, returning true on a hit and false on a miss
    ///
    /// Only the counters and the policy's hit bookkeeping change, lines are never installed here
    pub fn access(&mut self, address: u32) -> bool {
        let (set, tag) = self.address_to_set_and_tag(address);
        let ways = self.geometry.associativity;
        let base = set * ways;
        let hit_way = self.lines[base..base + ways]
            .iter()
            .position(|line| line.valid && line.tag == tag);
        match hit_way {
            Some(way) => {
                self.hits += 1;
                self.policy.update_on_hit(set, way);
                true
            }
            None => {
                self.misses += 1;
                false
            }
        }
    }

    /// Installs the line holding `address` into the way chosen by the replacement policy
    ///
    /// The caller must only install addresses which just missed, otherwise the set can end up
    /// holding the same tag twice. Returns the tag of the valid line which was evicted, if any
    pub fn install(&mut self, address: u32) -> Option<u32> {
        let (set, tag) = self.address_to_set_and_tag(address);
        let way = self.policy.next_victim(set);
        let line = &mut self.lines[set * self.geometry.associativity + way];
        let evicted = line.valid.then_some(line.tag);
        *line = CacheLine { tag, valid: true };
        if let Some(old_tag) = evicted {
            trace!(level = %self.geometry.name, set, way, old_tag, new_tag = tag, "evicted line");
        }
        evicted
    }

    pub fn geometry(&self) -> &LevelGeometry {
        &self.geometry
    }

    pub fn latency(&self) -> u64 {
        self.geometry.latency
    }

    /// The ways of `set`, in way order
    pub fn set_lines(&self, set: usize) -> &[CacheLine] {
        let ways = self.geometry.associativity;
        &self.lines[set * ways..(set + 1) * ways]
    }

    pub fn stats(&self) -> LevelStats {
        let total = self.hits + self.misses;
        LevelStats {
            name: self.geometry.name.clone(),
            hits: self.hits,
            misses: self.misses,
            hit_rate: if total > 0 {
                self.hits as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

/// Which part of the hierarchy satisfied a request
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServedBy {
    L1,
    L2,
    Memory,
}

/// Where a request was served from and what it cost
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessOutcome {
    pub served_by: ServedBy,
    pub cycles: u64,
}

/// Names one of the two levels of the hierarchy
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    L1,
    L2,
}

impl Level {
    pub fn name(self) -> &'static str {
        match self {
            Level::L1 => "L1",
            Level::L2 => "L2",
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = SimError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Level::L1),
            2 => Ok(Level::L2),
            other => Err(SimError::invalid(format!("cache level must be 1 or 2, got {other}"))),
        }
    }
}

/// Hierarchy wide figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1: LevelStats,
    pub l2: LevelStats,
    pub total_requests: u64,
    pub total_cycles: u64,
    /// Average memory access time in cycles, 0 before the first request
    pub amat: f64,
}

/// A two level inclusive hierarchy in front of main memory
///
/// Every request looks up L1, then L2, then memory, paying each latency along the way. Lines fetched
/// from a lower level are installed into every level above it
#[derive(Debug, Clone)]
pub struct Cache {
    l1: CacheLevel,
    l2: CacheLevel,
    memory_latency: u64,
    total_requests: u64,
    total_cycles: u64,
}

impl Cache {
    pub fn new(config: &HierarchyConfig) -> Result<Self> {
        Ok(Self {
            l1: CacheLevel::new(Level::L1.name(), &config.l1)?,
            l2: CacheLevel::new(Level::L2.name(), &config.l2)?,
            memory_latency: config.memory_latency,
            total_requests: 0,
            total_cycles: 0,
        })
    }

    /// Simulates one memory request
    ///
    /// Reads and writes are treated identically, there is no dirty state
    ///
    /// # Arguments
    ///
    /// * `address`: The address requested
    /// * `_is_write`: Whether the request is a store
    ///
    /// returns: AccessOutcome
    pub fn access(&mut self, address: u32, _is_write: bool) -> AccessOutcome {
        self.total_requests += 1;
        let mut cycles = self.l1.latency();
        let served_by = if self.l1.access(address) {
            ServedBy::L1
        } else {
            cycles += self.l2.latency();
            if self.l2.access(address) {
                self.l1.install(address);
                ServedBy::L2
            } else {
                cycles += self.memory_latency;
                self.l2.install(address);
                self.l1.install(address);
                ServedBy::Memory
            }
        };
        self.total_cycles += cycles;
        trace!(address, ?served_by, cycles, "cache access");
        AccessOutcome { served_by, cycles }
    }

    /// Replaces a level with an empty one of the given geometry, keeping its latency
    ///
    /// The replacement is built before the old level is dropped, so an invalid geometry leaves
    /// the hierarchy as it was. The other level and the global totals are untouched
    pub fn reconfigure(&mut self, level: Level, size: usize, block_size: usize, associativity: usize) -> Result<()> {
        let target = match level {
            Level::L1 => &mut self.l1,
            Level::L2 => &mut self.l2,
        };
        let config = LevelConfig {
            size,
            block_size,
            associativity,
            latency: target.latency(),
        };
        *target = CacheLevel::new(level.name(), &config)?;
        debug!(level = level.name(), size, block_size, associativity, "reconfigured cache level");
        Ok(())
    }

    pub fn l1(&self) -> &CacheLevel {
        &self.l1
    }

    pub fn l2(&self) -> &CacheLevel {
        &self.l2
    }

    pub fn memory_latency(&self) -> u64 {
        self.memory_latency
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1: self.l1.stats(),
            l2: self.l2.stats(),
            total_requests: self.total_requests,
            total_cycles: self.total_cycles,
            amat: if self.total_requests > 0 {
                self.total_cycles as f64 / self.total_requests as f64
            } else {
                0.0
            },
        }
    }
}
