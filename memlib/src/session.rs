use crate::allocator::PhysicalMemory;
use crate::cache::Cache;
use crate::config::SimulatorConfig;
use crate::error::Result;

/// One independent simulation: a physical memory region and a cache hierarchy
///
/// The two components never interact, the session only keeps them together for a caller which
/// drives both. Any number of sessions can exist side by side
#[derive(Debug, Clone)]
pub struct Session {
    pub memory: PhysicalMemory,
    pub cache: Cache,
}

impl Session {
    /// Builds a session from a configuration, usually resulting from parsing JSON
    ///
    /// # Arguments
    ///
    /// * `config`: The simulator configuration
    ///
    /// returns: Result<Session, SimError>
    pub fn new(config: &SimulatorConfig) -> Result<Self> {
        Ok(Self {
            memory: PhysicalMemory::from_config(&config.memory)?,
            cache: Cache::new(&config.caches)?,
        })
    }
}
