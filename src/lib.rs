//! slabhash: a warp-cooperative concurrent hash table on slab chains.
//!
//! The table stores (key, value) records in buckets of chained 32-word
//! *slabs* and is operated by *warps* — groups of 32 lanes working one
//! query at a time in lockstep. Bulk Insert / Search / Remove batches fan
//! warps out across threads; every mutation is a single-word
//! compare-and-swap, so there are no locks anywhere on the data path.
//!
//! Two map flavors:
//! - [`SlabHashMap`] — slots hold 32-bit handles into a pair pool.
//! - [`PackedSlabHashMap`] — key and value packed into 64-bit slots.
//!
//! # Usage
//!
//! ```ignore
//! let map: slabhash::SlabHashMap<u32, u32> =
//!     slabhash::SlabHashMap::new(slabhash::TableConfig::new(1 << 16, 1 << 20))?;
//! map.bulk_insert(&keys, &values);
//! let (values, found) = map.bulk_search(&keys);
//! ```

pub mod bucket;
pub mod config;
pub mod diag;
pub mod error;
pub mod hash;
mod macros;
pub mod pair_alloc;
pub mod protocol;
pub mod simt;
pub mod slab_alloc;
pub mod slot;
#[cfg(feature = "stats")]
pub mod stats;
pub mod table;

/// Empty pair slot sentinel: no record handle lives here.
pub const EMPTY_PAIR: u32 = 0xFFFF_FFFF;

/// Empty next-pointer sentinel: the chain ends at this slab.
pub const EMPTY_SLAB: u32 = 0xFFFF_FFFF;

/// Reserved slab index meaning "the bucket's head slab", which lives in
/// the bucket array rather than the slab pool.
pub const HEAD_SLAB: u32 = 0xFFFF_FFFE;

// Re-export the main entry points at crate root for convenience.
pub use error::Error;
pub use hash::{KeyHasher, UniversalHasher};
pub use slab_alloc::SlabGeometry;
pub use slot::TableWord;
pub use table::{PackedSlabHashMap, SlabHashMap, TableConfig};
