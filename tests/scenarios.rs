//! End-to-end scenarios through the public bulk API.
//!
//! Each test pins down one observable contract of the table: lookup after
//! insert, insert-not-overwrite, chain growth past one slab, removal
//! semantics, pool exhaustion as a per-key best-effort outcome, and the
//! load-factor accounting.

use slabhash::{PackedSlabHashMap, SlabGeometry, SlabHashMap, TableConfig};

fn config(num_buckets: u32, max_pairs: u32) -> TableConfig {
    TableConfig::new(num_buckets, max_pairs)
        .seed(42)
        .slab_geometry(SlabGeometry {
            super_blocks: 1,
            mem_blocks_per_super_block: 32,
        })
}

#[test]
fn single_bucket_lookup() {
    let map: SlabHashMap<u32, u32> = SlabHashMap::new(config(1, 64)).unwrap();

    map.bulk_insert(&[1, 2, 3], &[10, 20, 30]);

    let (values, found) = map.bulk_search(&[1, 2, 3, 4]);
    assert_eq!(found, vec![true, true, true, false]);
    assert_eq!(&values[..3], &[10, 20, 30]);
}

#[test]
fn chain_grows_past_head_slab() {
    let map: SlabHashMap<u32, u32> = SlabHashMap::new(config(1, 64)).unwrap();

    // 31 keys saturate the head slab's pair slots; the 32nd forces the
    // warp to allocate and link a second slab.
    let keys: Vec<u32> = (1..=32).collect();
    let values: Vec<u32> = keys.iter().map(|k| k * 10).collect();
    map.bulk_insert(&keys, &values);

    assert_eq!(map.len(), 32);
    let pool_slabs: u32 = map.super_block_fill().iter().sum();
    assert_eq!(pool_slabs, 1, "expected exactly one chained slab");

    let (got, found) = map.bulk_search(&keys);
    assert!(found.iter().all(|f| *f));
    assert_eq!(got, values);
}

#[test]
fn insert_does_not_overwrite() {
    let map: SlabHashMap<u32, u32> = SlabHashMap::new(config(8, 64)).unwrap();

    map.insert(5, 99);
    map.insert(5, 7);
    assert_eq!(map.search(5), Some(99));
    assert_eq!(map.len(), 1);
}

#[test]
fn remove_then_search_misses() {
    let map: SlabHashMap<u32, u32> = SlabHashMap::new(config(8, 2048)).unwrap();

    let keys: Vec<u32> = (0..1000).collect();
    let values: Vec<u32> = keys.iter().map(|k| k + 1).collect();
    map.bulk_insert(&keys, &values);

    let odd: Vec<u32> = keys.iter().copied().filter(|k| k % 2 == 1).collect();
    map.bulk_remove(&odd);

    let (_, found) = map.bulk_search(&keys);
    for (k, hit) in keys.iter().zip(found) {
        assert_eq!(hit, k % 2 == 0, "key {k}");
    }
    assert_eq!(map.len(), 500);

    // Load factor counts the 500 live records over all allocated slabs
    // (chains are never shortened by removal).
    let pool_slabs: u32 = map.super_block_fill().iter().sum();
    let slab_bytes = (map.num_buckets() + pool_slabs) as f64 * 32.0 * 4.0;
    let expected = (500.0 * 8.0) / slab_bytes;
    assert!((map.load_factor() - expected).abs() < 1e-12);
}

#[test]
fn same_key_warp_race_publishes_once() {
    // 32 identical keys land in one warp; exactly one lane may publish.
    // Capacity 33 proves the 31 losing pre-allocations went back to the
    // pool: a follow-up batch of 32 distinct keys still fits.
    let map: SlabHashMap<u32, u32> =
        SlabHashMap::new(config(4, 33).worker_threads(1)).unwrap();

    let keys = [42u32; 32];
    let values: Vec<u32> = (0..32).collect();
    map.bulk_insert(&keys, &values);

    assert_eq!(map.len(), 1);
    let winner = map.search(42).expect("key 42 lost");
    assert!(values.contains(&winner));

    let fresh: Vec<u32> = (100..132).collect();
    map.bulk_insert(&fresh, &values);
    assert_eq!(map.len(), 33, "losing pre-allocations leaked");
}

#[test]
fn pair_pool_exhaustion_is_best_effort() {
    let max_pairs = 100;
    let map: SlabHashMap<u32, u32> = SlabHashMap::new(config(8, max_pairs)).unwrap();

    let keys: Vec<u32> = (0..max_pairs).collect();
    let values = vec![7u32; max_pairs as usize];
    map.bulk_insert(&keys, &values);
    assert_eq!(map.len(), max_pairs as usize);

    // One more key cannot be stored; the table stays consistent.
    map.insert(max_pairs, 7);
    assert_eq!(map.search(max_pairs), None);
    assert_eq!(map.len(), max_pairs as usize);

    // Removing a record makes room again.
    map.remove(0);
    map.insert(max_pairs, 7);
    assert_eq!(map.search(max_pairs), Some(7));
}

#[test]
fn slab_pool_exhaustion_is_best_effort() {
    // 1 super-block of 32 memory blocks = 1024 pool slabs. 50_000 keys
    // over 256 buckets need far more chain slabs than that, so the pool
    // runs dry mid-batch and the overflow keys are skipped.
    let map: SlabHashMap<u32, u32> =
        SlabHashMap::new(config(256, 60_000)).unwrap();

    let keys: Vec<u32> = (0..50_000).collect();
    let values = vec![1u32; keys.len()];
    map.bulk_insert(&keys, &values);

    let pool_slabs: u32 = map.super_block_fill().iter().sum();
    assert_eq!(pool_slabs, 1024, "pool should be fully allocated");

    let stored = map.len();
    assert!(stored < keys.len(), "some keys must have been skipped");

    // Every reachable key searches consistently.
    let (_, found) = map.bulk_search(&keys);
    assert_eq!(found.iter().filter(|f| **f).count(), stored);
}

#[test]
fn remove_is_idempotent_on_absent_keys() {
    let map: SlabHashMap<u32, u32> = SlabHashMap::new(config(8, 64)).unwrap();
    map.bulk_remove(&[1, 2, 3]);
    assert!(map.is_empty());

    map.insert(2, 20);
    map.bulk_remove(&[2, 2, 2]);
    assert_eq!(map.search(2), None);
    assert!(map.is_empty());
}

#[test]
fn bucket_fill_counts_match_len() {
    let map: SlabHashMap<u32, u32> = SlabHashMap::new(config(16, 4096)).unwrap();
    let keys: Vec<u32> = (0..3000).collect();
    map.bulk_insert(&keys, &vec![0u32; 3000]);

    let per_bucket = map.bucket_fill_counts();
    assert_eq!(per_bucket.len(), 16);
    assert_eq!(per_bucket.iter().sum::<u32>() as usize, map.len());
}

#[test]
fn packed_map_scenarios() {
    let map: PackedSlabHashMap<u32, u32> = PackedSlabHashMap::new(config(1, 64)).unwrap();

    // Same chain-growth shape as the index-addressed variant.
    let keys: Vec<u32> = (1..=32).collect();
    let values: Vec<u32> = keys.iter().map(|k| k + 500).collect();
    map.bulk_insert(&keys, &values);
    assert_eq!(map.len(), 32);

    map.insert(1, 9999);
    assert_eq!(map.search(1), Some(501), "insert must not overwrite");

    map.bulk_remove(&keys);
    assert!(map.is_empty());
    let (_, found) = map.bulk_search(&keys);
    assert!(found.iter().all(|f| !*f));
}
