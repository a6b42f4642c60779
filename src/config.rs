//! Compile-time slab pool geometry.
//!
//! Constants are generated by `build.rs` from `slabhash.toml` (or the file
//! named by the `SLABHASH_CONFIG` environment variable):
//!
//! - `NUM_SUPER_BLOCKS` — default super-block count of the slab pool
//! - `MEM_BLOCKS_PER_SUPER_BLOCK` — 32-slab memory blocks per super-block
//!   (must be a multiple of 32 so a warp scans one bitmap per lane)
//! - `MAX_ALLOC_WINDOWS` — resident windows a warp scans before giving up
//!   (0 = one full cycle over the pool)

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));
