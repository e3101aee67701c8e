//! # MemLib
//!
//! MemLib is a library for simulating the memory side of a small computer
//!
//! It provides two independent simulators: a physical memory allocator with first, best and worst
//! fit placement, and a two level set associative cache hierarchy with FIFO replacement and
//! latency accounting
//!
//! Both are deterministic and single threaded. Every operation runs to completion and reports
//! failures as a [`error::SimError`] without changing any state

/// Contains the physical memory allocator and its block list
pub mod allocator;

/// Contains the cache levels and the two level hierarchy built from them
pub mod cache;

/// Contains definitions for the JSON configuration format, with defaults for every field
pub mod config;

/// Contains the error type shared by all simulators
pub mod error;

/// Contains input helpers for replaying command scripts
pub mod io;

/// Contains the replacement policies, with a trait for implementing custom replacement policies
pub mod replacement_policies;

/// Contains the session type bundling one allocator and one cache hierarchy
pub mod session;

#[cfg(test)]
mod test;

pub use allocator::{AllocationStrategy, PhysicalMemory};
pub use cache::{Cache, CacheLevel, Level};
pub use config::SimulatorConfig;
pub use error::{Result, SimError};
pub use session::Session;
