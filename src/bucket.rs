//! Bucket array: one head slab per bucket, stored in place.
//!
//! Head slabs are part of the table itself: they are allocated once, every
//! word starts as the all-ones empty sentinel, and they are never freed
//! while the table lives. Chains of further slabs hang off word 31 of each
//! slab, starting at the head.

use core::sync::atomic::Ordering;

use crate::simt::WARP_WIDTH;
use crate::slot::SlotWord;

pub struct BucketArray<W: SlotWord> {
    words: Vec<W::Atomic>,
    num_buckets: u32,
}

impl<W: SlotWord> BucketArray<W> {
    pub fn new(num_buckets: u32) -> Self {
        debug_assert!(num_buckets > 0);
        let words = (0..num_buckets as usize * WARP_WIDTH)
            .map(|_| W::new_empty())
            .collect();
        Self { words, num_buckets }
    }

    #[inline]
    pub fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    /// The word lane `lane` owns in the head slab of `bucket`.
    #[inline]
    pub fn word(&self, bucket: u32, lane: usize) -> &W::Atomic {
        debug_assert!(lane < WARP_WIDTH);
        &self.words[bucket as usize * WARP_WIDTH + lane]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_slabs_start_empty() {
        let array: BucketArray<u32> = BucketArray::new(3);
        for bucket in 0..3 {
            for lane in 0..WARP_WIDTH {
                assert_eq!(
                    u32::load(array.word(bucket, lane), Ordering::Relaxed),
                    u32::EMPTY
                );
            }
        }
    }

    #[test]
    fn test_buckets_are_disjoint() {
        let array: BucketArray<u64> = BucketArray::new(2);
        let cell = array.word(0, 5);
        u64::compare_exchange(cell, u64::EMPTY, 7).unwrap();
        assert_eq!(u64::load(array.word(1, 5), Ordering::Relaxed), u64::EMPTY);
        assert_eq!(u64::load(array.word(0, 5), Ordering::Relaxed), 7);
    }
}
