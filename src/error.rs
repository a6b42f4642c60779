//! Error kinds surfaced by table construction and the device pools.
//!
//! Pool exhaustion (`OutOfPairs`, `OutOfSlabs`) never aborts a bulk
//! operation: the affected lane finishes its protocol loop with a
//! not-inserted outcome. The variants exist so the allocators can report
//! exhaustion internally and so construction can reject bad parameters.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `num_buckets` was zero.
    #[error("table must have at least one bucket")]
    ZeroBuckets,

    /// `max_keyvalue_count` was zero.
    #[error("pair pool must have capacity for at least one record")]
    ZeroCapacity,

    /// The pair pool capacity would collide with the reserved all-ones
    /// pair-index sentinel.
    #[error("pair pool capacity {0} collides with the reserved empty-pair index")]
    CapacityTooLarge(u64),

    /// Slab pool geometry was rejected (zero-sized, not warp-scannable, or
    /// colliding with reserved slab indices).
    #[error("invalid slab pool geometry: {0}")]
    BadSlabGeometry(&'static str),

    /// The pair pool has no free record.
    #[error("pair pool exhausted")]
    OutOfPairs,

    /// No bitmap in the slab pool has a free slot.
    #[error("slab pool exhausted")]
    OutOfSlabs,
}
