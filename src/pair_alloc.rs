//! Pair allocator: an index-addressed pool of (key, value) records.
//!
//! Records are identified by 32-bit handles so a pair reference fits in one
//! slot word and publication is a single CAS. The pool is a fixed array
//! sized at construction; free records form an index-linked Treiber stack.
//! The list head packs a generation tag next to the index so a pop racing
//! a free cannot be fooled by a recycled head (the concurrent-slab ABA
//! hazard).
//!
//! Calls are thread-wise: each lane allocates and frees directly, with no
//! warp coordination. Record fields are atomic cells because a record freed
//! by Remove may be re-issued and rewritten while a racing warp still holds
//! the old handle from an earlier slot read; such readers observe either
//! the old or the new field value, never a torn one.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::Error;
use crate::stat_inc;
use crate::EMPTY_PAIR;

/// Packed free-list head: generation tag in the high half, index low.
#[inline]
fn pack_head(tag: u32, index: u32) -> u64 {
    ((tag as u64) << 32) | index as u64
}

#[derive(Debug)]
pub struct PairAllocator {
    keys: Vec<AtomicU32>,
    values: Vec<AtomicU32>,
    /// Free-list links; `next[i]` is meaningful only while record `i` is free.
    next: Vec<AtomicU32>,
    /// `[tag:32 | head index:32]`; `EMPTY_PAIR` index = pool exhausted.
    head: AtomicU64,
}

impl PairAllocator {
    pub fn new(capacity: u32) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        if capacity >= EMPTY_PAIR {
            return Err(Error::CapacityTooLarge(capacity as u64));
        }

        let n = capacity as usize;
        let keys = (0..n).map(|_| AtomicU32::new(EMPTY_PAIR)).collect();
        let values = (0..n).map(|_| AtomicU32::new(EMPTY_PAIR)).collect();
        // Record i links to i+1; the last record terminates the list.
        let next = (0..n)
            .map(|i| {
                let link = if i + 1 < n { i as u32 + 1 } else { EMPTY_PAIR };
                AtomicU32::new(link)
            })
            .collect();

        Ok(Self {
            keys,
            values,
            next,
            head: AtomicU64::new(pack_head(0, 0)),
        })
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.keys.len() as u32
    }

    /// Pop a free record. Thread-wise; fails when the pool is exhausted.
    pub fn allocate(&self) -> Result<u32, Error> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let index = head as u32;
            if index == EMPTY_PAIR {
                stat_inc!(pair_exhausted);
                return Err(Error::OutOfPairs);
            }
            let tag = (head >> 32) as u32;
            let link = self.next[index as usize].load(Ordering::Relaxed);
            let new_head = pack_head(tag.wrapping_add(1), link);
            match self
                .head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(index),
                Err(observed) => head = observed,
            }
        }
    }

    /// Push a record back. Caller must hold the only reference to it.
    pub fn free(&self, index: u32) {
        debug_assert!(index < self.capacity());
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let tag = (head >> 32) as u32;
            self.next[index as usize].store(head as u32, Ordering::Relaxed);
            let new_head = pack_head(tag.wrapping_add(1), index);
            match self
                .head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    /// Write a record's fields. Ordered before any publication CAS of the
    /// record's handle, which is what makes the writes visible to readers.
    #[inline]
    pub fn write(&self, index: u32, key: u32, value: u32) {
        self.keys[index as usize].store(key, Ordering::Relaxed);
        self.values[index as usize].store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn key(&self, index: u32) -> u32 {
        self.keys[index as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn value(&self, index: u32) -> u32 {
        self.values[index as usize].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_bounds() {
        assert_eq!(PairAllocator::new(0).unwrap_err(), Error::ZeroCapacity);
        assert!(matches!(
            PairAllocator::new(EMPTY_PAIR).unwrap_err(),
            Error::CapacityTooLarge(_)
        ));
    }

    #[test]
    fn test_exhaust_then_free_then_reuse() {
        let pool = PairAllocator::new(4).unwrap();
        let all: Vec<u32> = (0..4).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(pool.allocate().unwrap_err(), Error::OutOfPairs);

        pool.free(all[2]);
        assert_eq!(pool.allocate().unwrap(), all[2]);
        assert_eq!(pool.allocate().unwrap_err(), Error::OutOfPairs);
    }

    #[test]
    fn test_write_extract_round_trip() {
        let pool = PairAllocator::new(8).unwrap();
        let idx = pool.allocate().unwrap();
        pool.write(idx, 42, 99);
        assert_eq!(pool.key(idx), 42);
        assert_eq!(pool.value(idx), 99);
    }

    #[test]
    fn test_concurrent_allocate_free_is_balanced() {
        use std::sync::Arc;

        let pool = Arc::new(PairAllocator::new(64).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let p = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..1000u32 {
                        let idx = p.allocate().unwrap();
                        p.write(idx, t, i);
                        p.free(idx);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Every record must be back on the free list.
        let drained: Vec<u32> = (0..64).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(drained.len(), 64);
        assert_eq!(pool.allocate().unwrap_err(), Error::OutOfPairs);
    }
}
