use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::config::MemoryConfig;
use crate::error::{try_filled, Result, SimError};

/// Identifier handed out for each successful allocation. Ids start at 1 and are never reused
pub type BlockId = u64;

/// Placement policy used to pick a free block for a new allocation. Defaults to first fit.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStrategy {
    #[default]
    #[serde(alias = "first_fit")]
    FirstFit,
    #[serde(alias = "best_fit")]
    BestFit,
    #[serde(alias = "worst_fit")]
    WorstFit,
}

impl FromStr for AllocationStrategy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first_fit" | "FirstFit" => Ok(AllocationStrategy::FirstFit),
            "best_fit" | "BestFit" => Ok(AllocationStrategy::BestFit),
            "worst_fit" | "WorstFit" => Ok(AllocationStrategy::WorstFit),
            other => Err(SimError::invalid(format!(
                "unknown allocation strategy '{other}', expected first_fit, best_fit or worst_fit"
            ))),
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllocationStrategy::FirstFit => "First Fit",
            AllocationStrategy::BestFit => "Best Fit",
            AllocationStrategy::WorstFit => "Worst Fit",
        })
    }
}

/// Whether a block is free, and if not, who owns it and how much of it is alignment padding
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BlockState {
    Free,
    Used { id: BlockId, padding: usize },
}

/// A contiguous region of physical memory
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub start_address: usize,
    pub size: usize,
    #[serde(flatten)]
    pub state: BlockState,
}

impl MemoryBlock {
    fn free(start_address: usize, size: usize) -> Self {
        Self {
            start_address,
            size,
            state: BlockState::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self.state, BlockState::Free)
    }

    /// The owning allocation id, `None` for free blocks
    pub fn id(&self) -> Option<BlockId> {
        match self.state {
            BlockState::Free => None,
            BlockState::Used { id, .. } => Some(id),
        }
    }

    /// Bytes added to the request to satisfy alignment. Always 0 for free blocks
    pub fn padding(&self) -> usize {
        match self.state {
            BlockState::Free => 0,
            BlockState::Used { padding, .. } => padding,
        }
    }

    /// Exclusive end of the block
    pub fn end_address(&self) -> usize {
        self.start_address + self.size
    }
}

/// The result of a successful allocation
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: BlockId,
    pub address: usize,
    /// Size of the block including padding
    pub size: usize,
    pub padding: usize,
}

/// What happened to the neighbours of a freed block
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeReport {
    pub id: BlockId,
    pub merged_next: bool,
    pub merged_prev: bool,
}

/// Occupancy and fragmentation figures, derived from the block list on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub largest_free_block: usize,
    pub internal_fragmentation: usize,
    pub external_fragmentation_percent: f64,
    pub allocation_requests: u64,
    pub successful_allocations: u64,
}

/// A fixed size physical memory region managed as an ordered list of blocks
///
/// The blocks always partition `[0, total_size)`: they are sorted by address, each one starts
/// where the previous one ends, and no two neighbouring blocks are both free
#[derive(Debug, Clone)]
pub struct PhysicalMemory {
    ram: Vec<u8>,
    blocks: Vec<MemoryBlock>,
    alignment: usize,
    strategy: AllocationStrategy,
    next_id: BlockId,
    allocation_requests: u64,
    successful_allocations: u64,
}

impl PhysicalMemory {
    /// Creates a zeroed region of `total_size` bytes holding a single free block
    ///
    /// # Arguments
    ///
    /// * `total_size`: Size of the region in bytes, must be non-zero
    /// * `alignment`: Allocation granularity, must be a power of two
    ///
    /// returns: Result<PhysicalMemory, SimError>
    pub fn new(total_size: usize, alignment: usize) -> Result<Self> {
        if total_size == 0 {
            return Err(SimError::invalid("physical memory size must be non-zero"));
        }
        if !alignment.is_power_of_two() {
            return Err(SimError::invalid(format!(
                "alignment must be a non-zero power of two, got {alignment}"
            )));
        }
        let ram = try_filled(total_size, 0, "physical memory")?;
        debug!(total_size, alignment, "initialised physical memory");
        Ok(Self {
            ram,
            blocks: vec![MemoryBlock::free(0, total_size)],
            alignment,
            strategy: AllocationStrategy::default(),
            next_id: 1,
            allocation_requests: 0,
            successful_allocations: 0,
        })
    }

    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        let mut memory = Self::new(config.size, config.alignment)?;
        memory.set_strategy(config.strategy);
        Ok(memory)
    }

    /// Discards every block and the contents of memory, starting again with a fresh region.
    ///
    /// Invalid parameters leave the current region untouched
    pub fn reset(&mut self, total_size: usize, alignment: usize) -> Result<()> {
        *self = Self::new(total_size, alignment)?;
        Ok(())
    }

    pub fn set_strategy(&mut self, strategy: AllocationStrategy) {
        debug!(%strategy, "allocation strategy changed");
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    pub fn total_size(&self) -> usize {
        self.ram.len()
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Allocates a block for `requested` bytes, rounded up to the alignment
    ///
    /// The block is chosen by the current strategy. If it is larger than needed, the tail is
    /// split off as a new free block directly after it
    ///
    /// # Arguments
    ///
    /// * `requested`: The number of bytes asked for
    ///
    /// returns: Result<Allocation, SimError>
    pub fn allocate(&mut self, requested: usize) -> Result<Allocation> {
        self.allocation_requests += 1;
        if requested == 0 {
            return Err(SimError::ZeroSizedAllocation);
        }
        let padding = match requested % self.alignment {
            0 => 0,
            remainder => self.alignment - remainder,
        };
        let actual_size = requested
            .checked_add(padding)
            .ok_or(SimError::AllocationFailed { requested })?;
        let Some(index) = self.find_block(actual_size) else {
            warn!(requested, actual_size, strategy = %self.strategy, "allocation failed");
            return Err(SimError::AllocationFailed { requested });
        };

        let id = self.next_id;
        self.next_id += 1;
        let block = &mut self.blocks[index];
        let address = block.start_address;
        let remainder = block.size - actual_size;
        block.size = actual_size;
        block.state = BlockState::Used { id, padding };
        if remainder > 0 {
            self.blocks.insert(index + 1, MemoryBlock::free(address + actual_size, remainder));
        }
        self.successful_allocations += 1;
        debug!(id, address, size = actual_size, padding, "allocated block");
        Ok(Allocation {
            id,
            address,
            size: actual_size,
            padding,
        })
    }

    /// Index of the free block the current strategy picks for `size` bytes
    ///
    /// Ties always go to the lowest address: best fit keeps the first minimum, and worst fit
    /// only replaces its candidate on a strictly larger block
    fn find_block(&self, size: usize) -> Option<usize> {
        let mut candidates = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.is_free() && block.size >= size);
        let chosen = match self.strategy {
            AllocationStrategy::FirstFit => candidates.next(),
            AllocationStrategy::BestFit => candidates.min_by_key(|(_, block)| block.size - size),
            AllocationStrategy::WorstFit => candidates
                .reduce(|best, candidate| if candidate.1.size > best.1.size { candidate } else { best }),
        };
        chosen.map(|(index, _)| index)
    }

    /// Frees the block owned by `id`, merging it with free neighbours
    ///
    /// The following block is merged first, then the preceding one
    ///
    /// # Arguments
    ///
    /// * `id`: An id returned by `allocate` which hasn't been freed yet
    ///
    /// returns: Result<FreeReport, SimError>
    pub fn free(&mut self, id: BlockId) -> Result<FreeReport> {
        let index = self
            .blocks
            .iter()
            .position(|block| block.id() == Some(id))
            .ok_or(SimError::BlockNotFound(id))?;
        self.blocks[index].state = BlockState::Free;

        let mut report = FreeReport {
            id,
            merged_next: false,
            merged_prev: false,
        };
        if self.blocks.get(index + 1).is_some_and(MemoryBlock::is_free) {
            let next = self.blocks.remove(index + 1);
            self.blocks[index].size += next.size;
            report.merged_next = true;
        }
        if index > 0 && self.blocks[index - 1].is_free() {
            let current = self.blocks.remove(index);
            self.blocks[index - 1].size += current.size;
            report.merged_prev = true;
        }
        debug!(id, merged_next = report.merged_next, merged_prev = report.merged_prev, "freed block");
        Ok(report)
    }

    /// The block list in address order
    pub fn dump(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    pub fn stats(&self) -> MemoryStats {
        let mut used_bytes = 0;
        let mut free_bytes = 0;
        let mut largest_free_block = 0;
        let mut internal_fragmentation = 0;
        for block in &self.blocks {
            match block.state {
                BlockState::Free => {
                    free_bytes += block.size;
                    largest_free_block = largest_free_block.max(block.size);
                }
                BlockState::Used { padding, .. } => {
                    used_bytes += block.size;
                    internal_fragmentation += padding;
                }
            }
        }
        let external_fragmentation_percent = if free_bytes > 0 {
            (1.0 - largest_free_block as f64 / free_bytes as f64) * 100.0
        } else {
            0.0
        };
        MemoryStats {
            total_bytes: self.total_size(),
            used_bytes,
            free_bytes,
            largest_free_block,
            internal_fragmentation,
            external_fragmentation_percent,
            allocation_requests: self.allocation_requests,
            successful_allocations: self.successful_allocations,
        }
    }

    pub fn read_byte(&self, address: usize) -> Result<u8> {
        self.ram.get(address).copied().ok_or(SimError::AddressOutOfRange {
            address,
            size: self.ram.len(),
        })
    }

    pub fn write_byte(&mut self, address: usize, value: u8) -> Result<()> {
        let size = self.ram.len();
        let byte = self
            .ram
            .get_mut(address)
            .ok_or(SimError::AddressOutOfRange { address, size })?;
        *byte = value;
        Ok(())
    }
}
