/// A generic trait for implementing replacement policies. Can be used to parameterise a CacheLevel.
pub trait ReplacementPolicy {
    /// Creates the policy state for a cache with the given shape
    fn new(num_sets: usize, associativity: usize) -> Self
    where
        Self: Sized;

    /// Updates the policy when a line is hit
    ///
    /// Not applicable for some policies, a default which does nothing is provided. The cache
    /// calls it on every hit, round robin ignores it
    ///
    /// # Arguments
    ///
    /// * `set`: The set containing the line
    /// * `way`: The way within the set which was hit
    ///
    /// returns: ()
    fn update_on_hit(&mut self, _set: usize, _way: usize) {}

    /// Used by the cache to pick a way when a new line is installed into `set`.
    ///
    /// Implementations should assume that when this method is called, the line in the returned
    /// way has been replaced
    ///
    /// # Arguments
    ///
    /// * `set`: The cache set
    ///
    /// returns: usize
    fn next_victim(&mut self, set: usize) -> usize;
}

/// Round robin (FIFO) replacement, which keeps a separate cursor for each set
///
/// The cursor always points at the way installed longest ago, hits don't move it
#[derive(Debug, Clone)]
pub struct RoundRobin {
    set_cursors: Vec<usize>,
    associativity: usize,
}

impl ReplacementPolicy for RoundRobin {
    fn new(num_sets: usize, associativity: usize) -> Self {
        Self {
            set_cursors: vec![0; num_sets],
            associativity,
        }
    }

    fn next_victim(&mut self, set: usize) -> usize {
        let cursor = &mut self.set_cursors[set];
        let way = *cursor;
        *cursor = (*cursor + 1) % self.associativity;
        way
    }
}
