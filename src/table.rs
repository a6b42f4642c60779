//! Host facade: bulk entry points over the warp protocol.
//!
//! A bulk operation assigns one key per lane, 32 lanes per warp, and fans
//! the warps out over OS worker threads. Each worker owns a contiguous run
//! of warps and the matching disjoint output slices, so workers never
//! share mutable state — all cross-thread contention happens inside the
//! table's atomic words, exactly as it would between warps on a device.
//! Lanes past the end of the batch enter the protocol loop inactive and
//! contribute only their slab reads.
//!
//! Two map flavors share everything but the slot scheme:
//! - [`SlabHashMap`] — index-addressed slots backed by the pair pool.
//! - [`PackedSlabHashMap`] — key and value packed into 64-bit slots; no
//!   pair pool, but the all-ones key is reserved.

use core::marker::PhantomData;

use log::{debug, warn};

use crate::bucket::BucketArray;
use crate::diag;
use crate::error::Error;
use crate::hash::{KeyHasher, UniversalHasher};
use crate::pair_alloc::PairAllocator;
use crate::protocol::{
    warp_insert, warp_remove, warp_search, IndexScheme, InsertOutcome, PackedScheme, SlotScheme,
};
use crate::simt::WARP_WIDTH;
use crate::slab_alloc::{SlabAllocator, SlabGeometry};
use crate::slot::TableWord;
use crate::{stat_add, EMPTY_PAIR};

cfg_if::cfg_if! {
    if #[cfg(miri)] {
        // The interpreter pays dearly for real threads; run warps inline.
        fn default_workers() -> usize {
            1
        }
    } else {
        fn default_workers() -> usize {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        }
    }
}

/// Construction parameters. `num_buckets` and `max_keyvalue_count` are
/// fixed for the table's lifetime; the rest have working defaults.
#[derive(Debug, Clone, Copy)]
pub struct TableConfig {
    num_buckets: u32,
    max_keyvalue_count: u32,
    seed: u64,
    worker_threads: Option<usize>,
    slab_geometry: SlabGeometry,
}

impl TableConfig {
    pub fn new(num_buckets: u32, max_keyvalue_count: u32) -> Self {
        Self {
            num_buckets,
            max_keyvalue_count,
            seed: 0,
            worker_threads: None,
            slab_geometry: SlabGeometry::default(),
        }
    }

    /// Hash-function parameterization. Tables built from equal seeds hash
    /// identically.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Degree of parallelism for bulk operations. Default: one worker per
    /// available CPU.
    pub fn worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = Some(workers.max(1));
        self
    }

    /// Slab pool geometry override (defaults come from the build config).
    pub fn slab_geometry(mut self, geometry: SlabGeometry) -> Self {
        self.slab_geometry = geometry;
        self
    }
}

/// The scheme-generic table: memory, pools and the bulk fan-out. The
/// public map types wrap this with typed keys and values.
struct TableCore<S: SlotScheme> {
    scheme: S,
    buckets: BucketArray<S::Word>,
    slabs: SlabAllocator<S::Word>,
    workers: usize,
}

impl<S: SlotScheme> TableCore<S> {
    fn new(scheme: S, config: &TableConfig) -> Result<Self, Error> {
        if config.num_buckets == 0 {
            return Err(Error::ZeroBuckets);
        }
        let buckets = BucketArray::new(config.num_buckets);
        let slabs = SlabAllocator::new(config.slab_geometry)?;
        let workers = config.worker_threads.unwrap_or_else(default_workers);

        debug!(
            "slab hash table: {} buckets, {} pool slabs, {} workers",
            config.num_buckets,
            slabs.num_slabs(),
            workers
        );

        Ok(Self {
            scheme,
            buckets,
            slabs,
            workers,
        })
    }

    /// Split `n` keys into contiguous per-worker runs of whole warps.
    /// Returns (keys per worker, warps per worker).
    fn partition(&self, n: usize) -> (usize, usize) {
        let num_warps = n.div_ceil(WARP_WIDTH);
        let workers = self.workers.min(num_warps).max(1);
        let warps_per_worker = num_warps.div_ceil(workers);
        (warps_per_worker * WARP_WIDTH, warps_per_worker)
    }

    fn bulk_insert<H: KeyHasher>(&self, hasher: &H, keys: &[u32], values: &[u32]) {
        debug_assert_eq!(keys.len(), values.len());
        if keys.is_empty() {
            return;
        }
        stat_add!(insert_keys, keys.len());

        let (chunk, warps_per_worker) = self.partition(keys.len());
        let (out_of_pairs, out_of_slabs) = if chunk >= keys.len() {
            self.insert_run(hasher, keys, values, 0)
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = keys
                    .chunks(chunk)
                    .zip(values.chunks(chunk))
                    .enumerate()
                    .map(|(w, (kc, vc))| {
                        scope.spawn(move || self.insert_run(hasher, kc, vc, w * warps_per_worker))
                    })
                    .collect();
                handles.into_iter().fold((0u64, 0u64), |acc, h| {
                    let (p, s) = h.join().expect("insert worker panicked");
                    (acc.0 + p, acc.1 + s)
                })
            })
        };

        if out_of_pairs > 0 {
            warn!("bulk insert: pair pool exhausted, {out_of_pairs} keys not inserted");
        }
        if out_of_slabs > 0 {
            warn!("bulk insert: slab pool exhausted, {out_of_slabs} keys not inserted");
        }
    }

    /// One worker's run of warps. Returns per-kind not-inserted counts.
    fn insert_run<H: KeyHasher>(
        &self,
        hasher: &H,
        keys: &[u32],
        values: &[u32],
        first_warp: usize,
    ) -> (u64, u64) {
        let mut out_of_pairs = 0;
        let mut out_of_slabs = 0;
        for (i, (kw, vw)) in keys
            .chunks(WARP_WIDTH)
            .zip(values.chunks(WARP_WIDTH))
            .enumerate()
        {
            // Allocator state is seeded per warp, before any allocation.
            let mut cursor = self.slabs.cursor(first_warp + i);
            let (lane_buckets, lane_keys, active) = self.load_lanes(hasher, kw);
            let mut lane_values = [0u32; WARP_WIDTH];
            lane_values[..vw.len()].copy_from_slice(vw);

            let outcome = warp_insert(
                &self.scheme,
                &self.buckets,
                &self.slabs,
                &mut cursor,
                &lane_buckets,
                &lane_keys,
                &lane_values,
                active,
            );
            for o in outcome {
                match o {
                    InsertOutcome::OutOfPairs => out_of_pairs += 1,
                    InsertOutcome::OutOfSlabs => out_of_slabs += 1,
                    _ => {}
                }
            }
        }
        (out_of_pairs, out_of_slabs)
    }

    fn bulk_search<H: KeyHasher>(
        &self,
        hasher: &H,
        keys: &[u32],
        values_out: &mut [u32],
        found_out: &mut [bool],
    ) {
        debug_assert_eq!(keys.len(), values_out.len());
        debug_assert_eq!(keys.len(), found_out.len());
        if keys.is_empty() {
            return;
        }
        stat_add!(search_keys, keys.len());

        let (chunk, _) = self.partition(keys.len());
        if chunk >= keys.len() {
            self.search_run(hasher, keys, values_out, found_out);
            return;
        }
        std::thread::scope(|scope| {
            for ((kc, vc), fc) in keys
                .chunks(chunk)
                .zip(values_out.chunks_mut(chunk))
                .zip(found_out.chunks_mut(chunk))
            {
                scope.spawn(move || self.search_run(hasher, kc, vc, fc));
            }
        });
    }

    fn search_run<H: KeyHasher>(
        &self,
        hasher: &H,
        keys: &[u32],
        values_out: &mut [u32],
        found_out: &mut [bool],
    ) {
        for ((kw, vw), fw) in keys
            .chunks(WARP_WIDTH)
            .zip(values_out.chunks_mut(WARP_WIDTH))
            .zip(found_out.chunks_mut(WARP_WIDTH))
        {
            let (lane_buckets, lane_keys, active) = self.load_lanes(hasher, kw);
            let (values, found) = warp_search(
                &self.scheme,
                &self.buckets,
                &self.slabs,
                &lane_buckets,
                &lane_keys,
                active,
            );
            vw.copy_from_slice(&values[..vw.len()]);
            fw.copy_from_slice(&found[..fw.len()]);
        }
    }

    fn bulk_remove<H: KeyHasher>(&self, hasher: &H, keys: &[u32]) {
        if keys.is_empty() {
            return;
        }
        stat_add!(remove_keys, keys.len());

        let (chunk, _) = self.partition(keys.len());
        if chunk >= keys.len() {
            self.remove_run(hasher, keys);
            return;
        }
        std::thread::scope(|scope| {
            for kc in keys.chunks(chunk) {
                scope.spawn(move || self.remove_run(hasher, kc));
            }
        });
    }

    fn remove_run<H: KeyHasher>(&self, hasher: &H, keys: &[u32]) {
        for kw in keys.chunks(WARP_WIDTH) {
            let (lane_buckets, lane_keys, active) = self.load_lanes(hasher, kw);
            warp_remove(
                &self.scheme,
                &self.buckets,
                &self.slabs,
                &lane_buckets,
                &lane_keys,
                active,
            );
        }
    }

    /// Spread up to one warp's worth of keys over the lane registers.
    fn load_lanes<H: KeyHasher>(
        &self,
        hasher: &H,
        keys: &[u32],
    ) -> ([u32; WARP_WIDTH], [u32; WARP_WIDTH], [bool; WARP_WIDTH]) {
        debug_assert!(keys.len() <= WARP_WIDTH);
        let mut lane_buckets = [0u32; WARP_WIDTH];
        let mut lane_keys = [0u32; WARP_WIDTH];
        let mut active = [false; WARP_WIDTH];
        for (lane, &key) in keys.iter().enumerate() {
            lane_buckets[lane] = hasher.bucket(key, self.buckets.num_buckets());
            lane_keys[lane] = key;
            active[lane] = true;
        }
        (lane_buckets, lane_keys, active)
    }
}

/// Concurrent hash table with index-addressed slots: each occupied slot
/// holds a 32-bit handle into the pair pool, and records are written in
/// full before their handle is published.
///
/// All operations are bulk-parallel and safe to call from multiple threads
/// at once; see the module docs for the execution model.
pub struct SlabHashMap<K: TableWord, V: TableWord, H: KeyHasher = UniversalHasher> {
    core: TableCore<IndexScheme>,
    hasher: H,
    _marker: PhantomData<(K, V)>,
}

impl<K: TableWord, V: TableWord> SlabHashMap<K, V, UniversalHasher> {
    /// Build a table with the seeded universal hasher.
    pub fn new(config: TableConfig) -> Result<Self, Error> {
        let hasher = UniversalHasher::from_seed(config.seed);
        Self::with_hasher(config, hasher)
    }
}

impl<K: TableWord, V: TableWord, H: KeyHasher> SlabHashMap<K, V, H> {
    pub fn with_hasher(config: TableConfig, hasher: H) -> Result<Self, Error> {
        let pairs = PairAllocator::new(config.max_keyvalue_count)?;
        let core = TableCore::new(IndexScheme::new(pairs), &config)?;
        Ok(Self {
            core,
            hasher,
            _marker: PhantomData,
        })
    }

    /// Insert each `(key, value)`; keys already present keep their original
    /// value. Best-effort on pool exhaustion: affected keys are skipped and
    /// the rest of the batch is unaffected.
    pub fn bulk_insert(&self, keys: &[K], values: &[V]) {
        assert_eq!(keys.len(), values.len(), "keys/values length mismatch");
        let raw_keys: Vec<u32> = keys.iter().map(|k| k.to_raw()).collect();
        let raw_values: Vec<u32> = values.iter().map(|v| v.to_raw()).collect();
        self.core.bulk_insert(&self.hasher, &raw_keys, &raw_values);
    }

    /// Look up each key. Returns `(values, found)`; a missed key reports
    /// `found = false` and the all-ones default value.
    pub fn bulk_search(&self, keys: &[K]) -> (Vec<V>, Vec<bool>) {
        let raw_keys: Vec<u32> = keys.iter().map(|k| k.to_raw()).collect();
        let mut values = vec![EMPTY_PAIR; raw_keys.len()];
        let mut found = vec![false; raw_keys.len()];
        self.core
            .bulk_search(&self.hasher, &raw_keys, &mut values, &mut found);
        (values.into_iter().map(V::from_raw).collect(), found)
    }

    /// Remove each key that is present; absent keys are no-ops.
    pub fn bulk_remove(&self, keys: &[K]) {
        let raw_keys: Vec<u32> = keys.iter().map(|k| k.to_raw()).collect();
        self.core.bulk_remove(&self.hasher, &raw_keys);
    }

    /// Single-key insert on the bulk path.
    pub fn insert(&self, key: K, value: V) {
        self.bulk_insert(&[key], &[value]);
    }

    /// Single-key lookup on the bulk path.
    pub fn search(&self, key: K) -> Option<V> {
        let (values, found) = self.bulk_search(&[key]);
        found[0].then(|| values[0])
    }

    /// Single-key remove on the bulk path.
    pub fn remove(&self, key: K) {
        self.bulk_remove(&[key]);
    }

    /// Bytes of live pair data divided by bytes of allocated slab storage.
    pub fn load_factor(&self) -> f64 {
        diag::load_factor(&self.core.scheme, &self.core.buckets, &self.core.slabs)
    }

    /// Live records, counted by walking every bucket chain. Exact only in
    /// quiescence.
    pub fn len(&self) -> usize {
        diag::count_elements(&self.core.scheme, &self.core.buckets, &self.core.slabs) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied pair slots per bucket.
    pub fn bucket_fill_counts(&self) -> Vec<u32> {
        diag::bucket_fill_counts(&self.core.scheme, &self.core.buckets, &self.core.slabs)
    }

    /// Allocated slabs per super-block of the slab pool.
    pub fn super_block_fill(&self) -> Vec<u32> {
        self.core.slabs.super_block_fill()
    }

    pub fn num_buckets(&self) -> u32 {
        self.core.buckets.num_buckets()
    }

    /// Pair pool capacity (`max_keyvalue_count`).
    pub fn capacity(&self) -> u32 {
        self.core.scheme.pairs().capacity()
    }
}

/// Concurrent hash table with packed slots: key and value live inline in
/// one 64-bit word and are published together by a single CAS.
///
/// The all-ones key is reserved (it is the empty-slot test) and must not
/// be inserted. There is no pair pool; capacity is bounded only by the
/// slab pool.
pub struct PackedSlabHashMap<K: TableWord, V: TableWord, H: KeyHasher = UniversalHasher> {
    core: TableCore<PackedScheme>,
    hasher: H,
    _marker: PhantomData<(K, V)>,
}

impl<K: TableWord, V: TableWord> PackedSlabHashMap<K, V, UniversalHasher> {
    /// Build a table with the seeded universal hasher.
    pub fn new(config: TableConfig) -> Result<Self, Error> {
        let hasher = UniversalHasher::from_seed(config.seed);
        Self::with_hasher(config, hasher)
    }
}

impl<K: TableWord, V: TableWord, H: KeyHasher> PackedSlabHashMap<K, V, H> {
    pub fn with_hasher(config: TableConfig, hasher: H) -> Result<Self, Error> {
        let core = TableCore::new(PackedScheme, &config)?;
        Ok(Self {
            core,
            hasher,
            _marker: PhantomData,
        })
    }

    /// Insert each `(key, value)`; keys already present keep their original
    /// value.
    pub fn bulk_insert(&self, keys: &[K], values: &[V]) {
        assert_eq!(keys.len(), values.len(), "keys/values length mismatch");
        let raw_keys: Vec<u32> = keys.iter().map(|k| k.to_raw()).collect();
        let raw_values: Vec<u32> = values.iter().map(|v| v.to_raw()).collect();
        self.core.bulk_insert(&self.hasher, &raw_keys, &raw_values);
    }

    /// Look up each key. Returns `(values, found)`.
    pub fn bulk_search(&self, keys: &[K]) -> (Vec<V>, Vec<bool>) {
        let raw_keys: Vec<u32> = keys.iter().map(|k| k.to_raw()).collect();
        let mut values = vec![EMPTY_PAIR; raw_keys.len()];
        let mut found = vec![false; raw_keys.len()];
        self.core
            .bulk_search(&self.hasher, &raw_keys, &mut values, &mut found);
        (values.into_iter().map(V::from_raw).collect(), found)
    }

    /// Remove each key that is present; absent keys are no-ops.
    pub fn bulk_remove(&self, keys: &[K]) {
        let raw_keys: Vec<u32> = keys.iter().map(|k| k.to_raw()).collect();
        self.core.bulk_remove(&self.hasher, &raw_keys);
    }

    /// Single-key insert on the bulk path.
    pub fn insert(&self, key: K, value: V) {
        self.bulk_insert(&[key], &[value]);
    }

    /// Single-key lookup on the bulk path.
    pub fn search(&self, key: K) -> Option<V> {
        let (values, found) = self.bulk_search(&[key]);
        found[0].then(|| values[0])
    }

    /// Single-key remove on the bulk path.
    pub fn remove(&self, key: K) {
        self.bulk_remove(&[key]);
    }

    /// Bytes of live pair data divided by bytes of allocated slab storage.
    pub fn load_factor(&self) -> f64 {
        diag::load_factor(&self.core.scheme, &self.core.buckets, &self.core.slabs)
    }

    /// Live records, counted by walking every bucket chain.
    pub fn len(&self) -> usize {
        diag::count_elements(&self.core.scheme, &self.core.buckets, &self.core.slabs) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied pair slots per bucket.
    pub fn bucket_fill_counts(&self) -> Vec<u32> {
        diag::bucket_fill_counts(&self.core.scheme, &self.core.buckets, &self.core.slabs)
    }

    pub fn num_buckets(&self) -> u32 {
        self.core.buckets.num_buckets()
    }
}
