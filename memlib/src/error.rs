use thiserror::Error;

use crate::allocator::BlockId;

/// Errors reported by the allocator, the cache hierarchy and configuration loading.
///
/// All of these are local and non-fatal: an operation that returns one leaves the component in
/// the state it was in before the call.
#[derive(Debug, Error)]
pub enum SimError {
    /// No free block is large enough for the (aligned) request
    #[error("allocation of {requested} bytes failed (not enough contiguous memory)")]
    AllocationFailed { requested: usize },

    /// A request for zero bytes, which would produce an empty block
    #[error("cannot allocate zero bytes")]
    ZeroSizedAllocation,

    /// `free` was given an id that is not currently allocated
    #[error("block id {0} not found")]
    BlockNotFound(BlockId),

    /// Geometry or sizing parameters that the simulators cannot be built from
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A byte access outside the physical memory region
    #[error("address {address:#x} is outside physical memory of {size} bytes")]
    AddressOutOfRange { address: usize, size: usize },

    /// A configuration document which couldn't be read or parsed
    #[error("couldn't load the configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// I/O failure while opening an input
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SimError::InvalidConfiguration(message.into())
    }
}

/// Builds a vector of `len` copies of `value`, reporting a failed allocation instead of aborting
pub(crate) fn try_filled<T: Clone>(len: usize, value: T, what: &str) -> Result<Vec<T>> {
    let mut items = Vec::new();
    items
        .try_reserve_exact(len)
        .map_err(|e| SimError::invalid(format!("{what}: can't allocate {len} entries: {e}")))?;
    items.resize(len, value);
    Ok(items)
}
