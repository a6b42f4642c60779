//! Slab allocator: a fixed pool of 32-word slabs behind per-block bitmaps.
//!
//! Layout: the pool is divided into super-blocks, each super-block into
//! memory blocks of 32 slabs, and each memory block carries one 32-bit
//! bitmap (bit = 1 means free, so the freshly `0xFF`-initialized pool is
//! all-free). Slab words themselves are initialized to the all-ones empty
//! pattern and stay that way until a warp publishes into them.
//!
//! Allocation is warp-cooperative: the 32 lanes of a warp each read one
//! bitmap of the warp's resident window, the warp ballots "my bitmap has a
//! free bit", the elected lane clears the chosen bit with a CAS, and the
//! resulting slab index is broadcast to every lane. The resident window is
//! seeded per warp at kernel entry and advances cyclically, spreading
//! contention across the pool. Freeing is thread-wise and only legal for
//! slabs no other warp has observed (backing out of a lost publication
//! race); published slabs are permanent.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::Error;
use crate::simt::{self, WARP_WIDTH};
use crate::slot::SlotWord;
use crate::stat_inc;

/// Slabs tracked by one bitmap.
pub const SLABS_PER_MEM_BLOCK: usize = 32;

/// Runtime pool geometry; defaults come from the generated build config.
#[derive(Debug, Clone, Copy)]
pub struct SlabGeometry {
    pub super_blocks: usize,
    pub mem_blocks_per_super_block: usize,
}

impl Default for SlabGeometry {
    fn default() -> Self {
        Self {
            super_blocks: crate::config::NUM_SUPER_BLOCKS,
            mem_blocks_per_super_block: crate::config::MEM_BLOCKS_PER_SUPER_BLOCK,
        }
    }
}

impl SlabGeometry {
    fn validate(self) -> Result<(), Error> {
        if self.super_blocks == 0 || self.mem_blocks_per_super_block == 0 {
            return Err(Error::BadSlabGeometry("pool must hold at least one slab"));
        }
        if !self.mem_blocks_per_super_block.is_multiple_of(WARP_WIDTH) {
            return Err(Error::BadSlabGeometry(
                "mem_blocks_per_super_block must be a multiple of the warp width",
            ));
        }
        let slabs = self
            .super_blocks
            .checked_mul(self.mem_blocks_per_super_block)
            .and_then(|n| n.checked_mul(SLABS_PER_MEM_BLOCK));
        match slabs {
            // Keep clear of the reserved HEAD_SLAB / EMPTY_SLAB indices.
            Some(n) if n < crate::HEAD_SLAB as usize => Ok(()),
            _ => Err(Error::BadSlabGeometry(
                "pool collides with reserved slab indices",
            )),
        }
    }

    fn mem_blocks(&self) -> usize {
        self.super_blocks * self.mem_blocks_per_super_block
    }
}

/// Per-warp allocator state: the resident bitmap window.
///
/// Seeded once per warp at kernel entry (before any allocation) from the
/// warp's global id; every allocation scan starts at the resident window
/// and wraps cyclically.
#[derive(Debug, Clone, Copy)]
pub struct AllocCursor {
    window: usize,
    num_windows: usize,
}

impl AllocCursor {
    pub fn new(warp_id: usize, num_windows: usize) -> Self {
        debug_assert!(num_windows > 0);
        Self {
            // Knuth multiplicative spread so consecutive warps land on
            // distant windows.
            window: (warp_id.wrapping_mul(0x9E37_79B9)) % num_windows,
            num_windows,
        }
    }

    #[inline]
    fn advance(&mut self) {
        self.window = (self.window + 1) % self.num_windows;
    }
}

#[derive(Debug)]
pub struct SlabAllocator<W: SlotWord> {
    /// Slab storage: `num_slabs * WARP_WIDTH` words, all-ones initialized.
    words: Vec<W::Atomic>,
    /// One bitmap per memory block; bit = 1 means the slab is free.
    bitmaps: Vec<AtomicU32>,
    geometry: SlabGeometry,
    /// Windows scanned before reporting exhaustion.
    scan_limit: usize,
}

impl<W: SlotWord> SlabAllocator<W> {
    pub fn new(geometry: SlabGeometry) -> Result<Self, Error> {
        geometry.validate()?;
        let mem_blocks = geometry.mem_blocks();
        let num_slabs = mem_blocks * SLABS_PER_MEM_BLOCK;

        let words = (0..num_slabs * WARP_WIDTH).map(|_| W::new_empty()).collect();
        let bitmaps = (0..mem_blocks).map(|_| AtomicU32::new(u32::MAX)).collect();

        let num_windows = mem_blocks / WARP_WIDTH;
        let scan_limit = match crate::config::MAX_ALLOC_WINDOWS {
            0 => num_windows,
            n => n.min(num_windows),
        };

        Ok(Self {
            words,
            bitmaps,
            geometry,
            scan_limit,
        })
    }

    /// A fresh cursor for the warp with the given global id.
    pub fn cursor(&self, warp_id: usize) -> AllocCursor {
        AllocCursor::new(warp_id, self.bitmaps.len() / WARP_WIDTH)
    }

    #[inline]
    pub fn num_slabs(&self) -> usize {
        self.bitmaps.len() * SLABS_PER_MEM_BLOCK
    }

    /// The word lane `lane` owns in slab `slab`.
    #[inline]
    pub fn word(&self, slab: u32, lane: usize) -> &W::Atomic {
        debug_assert!(lane < WARP_WIDTH);
        &self.words[slab as usize * WARP_WIDTH + lane]
    }

    /// Warp-cooperative allocation: every lane of the warp reads one bitmap
    /// of the resident window; the elected lane claims a bit. All lanes
    /// receive the same slab index.
    pub fn warp_allocate(&self, cursor: &mut AllocCursor) -> Result<u32, Error> {
        let mut empty_windows = 0;
        loop {
            let base = cursor.window * WARP_WIDTH;
            // Lane `i` reads the bitmap of memory block `base + i`.
            let mut maps = [0u32; WARP_WIDTH];
            for lane in 0..WARP_WIDTH {
                maps[lane] = self.bitmaps[base + lane].load(Ordering::Relaxed);
            }

            let candidates = simt::ballot(|lane| maps[lane] != 0);
            let Some(src) = simt::first_lane(candidates) else {
                cursor.advance();
                empty_windows += 1;
                if empty_windows >= self.scan_limit {
                    stat_inc!(slab_exhausted);
                    return Err(Error::OutOfSlabs);
                }
                continue;
            };

            let observed = simt::shfl(&maps, src);
            let bit = observed.trailing_zeros();
            let claimed = observed & !(1 << bit);
            let block = base + src;
            if self.bitmaps[block]
                .compare_exchange(observed, claimed, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                stat_inc!(slab_allocs);
                return Ok((block * SLABS_PER_MEM_BLOCK) as u32 + bit);
            }
            // Another warp raced us on this bitmap; rescan the same window.
        }
    }

    /// Release a slab whose words were never published to another warp.
    ///
    /// Only legal for a slab that lost its publication race: its contents
    /// must still be the all-ones pattern from construction.
    pub fn free_untouched(&self, slab: u32) {
        #[cfg(debug_assertions)]
        for lane in 0..WARP_WIDTH {
            debug_assert_eq!(
                W::load(self.word(slab, lane), Ordering::Relaxed),
                W::EMPTY,
                "free_untouched on a slab with published words"
            );
        }

        let block = slab as usize / SLABS_PER_MEM_BLOCK;
        let bit = 1u32 << (slab as usize % SLABS_PER_MEM_BLOCK);
        let prev = self.bitmaps[block].fetch_or(bit, Ordering::AcqRel);
        debug_assert_eq!(prev & bit, 0, "double free of slab {slab}");
    }

    /// Currently-allocated slab count (cleared bitmap bits).
    pub fn allocated_slabs(&self) -> usize {
        self.bitmaps
            .iter()
            .map(|b| SLABS_PER_MEM_BLOCK - b.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    /// Allocated-slab count per super-block, one thread-sized bitmap scan
    /// per block, in pool order.
    pub fn super_block_fill(&self) -> Vec<u32> {
        let per_sb = self.geometry.mem_blocks_per_super_block;
        self.bitmaps
            .chunks(per_sb)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|b| SLABS_PER_MEM_BLOCK as u32 - b.load(Ordering::Relaxed).count_ones())
                    .sum()
            })
            .collect()
    }
}
