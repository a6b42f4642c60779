//! Diagnostics: bucket occupancy and load factor.
//!
//! Two read-only passes over the table, kept out of the operation hot
//! path. The bucket pass walks each chain the same way the protocol does
//! (one warp-shaped read per slab, occupancy by ballot popcount); the
//! allocator pass sums bitmap popcounts per super-block. Both observe a
//! racing table loosely: counts are exact only in quiescence.

use crate::bucket::BucketArray;
use crate::protocol::{read_slab, SlotScheme};
use crate::simt::{self, NEXT_PTR_LANE};
use crate::slab_alloc::SlabAllocator;
use crate::{EMPTY_SLAB, HEAD_SLAB};

/// Occupied pair slots in one bucket's chain, and the chain's slab count
/// (head included).
pub fn bucket_fill<S: SlotScheme>(
    scheme: &S,
    buckets: &BucketArray<S::Word>,
    slabs: &SlabAllocator<S::Word>,
    bucket: u32,
) -> (u32, u32) {
    let mut elements = 0;
    let mut chain_slabs = 0;
    let mut curr_slab = HEAD_SLAB;

    loop {
        let words = read_slab(buckets, slabs, bucket, curr_slab);
        let occupied = simt::ballot(|lane| {
            lane < NEXT_PTR_LANE && scheme.slot_key(words[lane]).is_some()
        });
        elements += occupied.count_ones();
        chain_slabs += 1;

        let next = scheme.next_slab(words[NEXT_PTR_LANE]);
        if next == EMPTY_SLAB {
            return (elements, chain_slabs);
        }
        curr_slab = next;
    }
}

/// Occupied pair slots per bucket, in bucket order.
pub fn bucket_fill_counts<S: SlotScheme>(
    scheme: &S,
    buckets: &BucketArray<S::Word>,
    slabs: &SlabAllocator<S::Word>,
) -> Vec<u32> {
    (0..buckets.num_buckets())
        .map(|b| bucket_fill(scheme, buckets, slabs, b).0)
        .collect()
}

/// Live records across all buckets.
pub fn count_elements<S: SlotScheme>(
    scheme: &S,
    buckets: &BucketArray<S::Word>,
    slabs: &SlabAllocator<S::Word>,
) -> u64 {
    (0..buckets.num_buckets())
        .map(|b| bucket_fill(scheme, buckets, slabs, b).0 as u64)
        .sum()
}

/// Bytes of live pair data divided by bytes of allocated slab storage.
///
/// Slab storage counts every head slab plus every currently-allocated pool
/// slab, at 32 words of the scheme's word width each; a pair contributes
/// its key and value bytes.
pub fn load_factor<S: SlotScheme>(
    scheme: &S,
    buckets: &BucketArray<S::Word>,
    slabs: &SlabAllocator<S::Word>,
) -> f64 {
    let elements = count_elements(scheme, buckets, slabs);
    let pair_bytes = elements * 2 * core::mem::size_of::<u32>() as u64;

    let total_slabs = buckets.num_buckets() as u64 + slabs.allocated_slabs() as u64;
    let slab_bytes =
        total_slabs * simt::WARP_WIDTH as u64 * core::mem::size_of::<S::Word>() as u64;

    pair_bytes as f64 / slab_bytes as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair_alloc::PairAllocator;
    use crate::protocol::{warp_insert, IndexScheme};
    use crate::slab_alloc::SlabGeometry;

    fn make_env() -> (IndexScheme, BucketArray<u32>, SlabAllocator<u32>) {
        let scheme = IndexScheme::new(PairAllocator::new(256).unwrap());
        let buckets = BucketArray::new(2);
        let slabs = SlabAllocator::new(SlabGeometry {
            super_blocks: 1,
            mem_blocks_per_super_block: 32,
        })
        .unwrap();
        (scheme, buckets, slabs)
    }

    #[test]
    fn test_empty_table_counts_zero() {
        let (scheme, buckets, slabs) = make_env();
        assert_eq!(count_elements(&scheme, &buckets, &slabs), 0);
        assert_eq!(bucket_fill_counts(&scheme, &buckets, &slabs), vec![0, 0]);
        assert_eq!(load_factor(&scheme, &buckets, &slabs), 0.0);
    }

    #[test]
    fn test_fill_counts_follow_chains() {
        let (scheme, buckets, slabs) = make_env();
        let mut cursor = slabs.cursor(0);

        // 40 keys into bucket 0: the head saturates at 31, the chain grows.
        for chunk in 0..2 {
            let mut keys = [0u32; 32];
            let mut values = [0u32; 32];
            let mut active = [false; 32];
            for lane in 0..20 {
                keys[lane] = (chunk * 20 + lane) as u32 + 1;
                values[lane] = keys[lane] * 10;
                active[lane] = true;
            }
            warp_insert(
                &scheme,
                &buckets,
                &slabs,
                &mut cursor,
                &[0u32; 32],
                &keys,
                &values,
                active,
            );
        }

        let (elements, chain_slabs) = bucket_fill(&scheme, &buckets, &slabs, 0);
        assert_eq!(elements, 40);
        assert_eq!(chain_slabs, 2);
        assert_eq!(bucket_fill(&scheme, &buckets, &slabs, 1), (0, 1));
        assert_eq!(count_elements(&scheme, &buckets, &slabs), 40);

        // 40 pairs of 8 bytes over (2 heads + 1 pool slab) * 128 bytes.
        let lf = load_factor(&scheme, &buckets, &slabs);
        assert!((lf - (40.0 * 8.0) / (3.0 * 128.0)).abs() < 1e-12);
    }
}
