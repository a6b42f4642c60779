//! Operation statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and
//! never synchronize anything. The table's publication CASes provide the
//! ordering guarantees for correctness; these counters exist so tests and
//! operators can watch protocol behavior (duplicate aborts, lost races,
//! pool exhaustion) without touching the hot path when the `stats` feature
//! is off.
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads are
//! individually atomic but not globally consistent with each other.

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    // ---- Bulk entry points ----
    /// Keys submitted to bulk insert.
    pub insert_keys: AtomicU64,
    /// Keys submitted to bulk search.
    pub search_keys: AtomicU64,
    /// Keys submitted to bulk remove.
    pub remove_keys: AtomicU64,

    // ---- Insert protocol ----
    /// Publication CASes won.
    pub inserted: AtomicU64,
    /// Lanes that found their key already present and released their
    /// pre-allocation.
    pub duplicate_aborts: AtomicU64,
    /// Slot CASes lost to a racing warp (lane retried).
    pub insert_cas_retries: AtomicU64,
    /// Next-pointer CASes lost; the fresh slab went back untouched.
    pub slab_link_races: AtomicU64,

    // ---- Remove protocol ----
    /// Clearing CASes won (one pair freed each).
    pub removed: AtomicU64,
    /// Clearing CASes lost; nothing freed.
    pub remove_cas_losses: AtomicU64,

    // ---- Pools ----
    /// Slabs handed out by the slab allocator.
    pub slab_allocs: AtomicU64,
    /// Warp allocations that scanned the whole pool and failed.
    pub slab_exhausted: AtomicU64,
    /// Pair allocations that found the pool empty.
    pub pair_exhausted: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            insert_keys: AtomicU64::new(0),
            search_keys: AtomicU64::new(0),
            remove_keys: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
            duplicate_aborts: AtomicU64::new(0),
            insert_cas_retries: AtomicU64::new(0),
            slab_link_races: AtomicU64::new(0),
            removed: AtomicU64::new(0),
            remove_cas_losses: AtomicU64::new(0),
            slab_allocs: AtomicU64::new(0),
            slab_exhausted: AtomicU64::new(0),
            pair_exhausted: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of all operation statistics.
///
/// Fields are plain `u64` values loaded from the global atomic counters.
/// Each field is atomically read, but the snapshot as a whole is not
/// globally consistent — concurrent operations may race between loads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    /// Keys submitted to bulk insert.
    pub insert_keys: u64,
    /// Keys submitted to bulk search.
    pub search_keys: u64,
    /// Keys submitted to bulk remove.
    pub remove_keys: u64,
    /// Publication CASes won.
    pub inserted: u64,
    /// Lanes that found their key already present.
    pub duplicate_aborts: u64,
    /// Slot CASes lost to a racing warp.
    pub insert_cas_retries: u64,
    /// Next-pointer CASes lost.
    pub slab_link_races: u64,
    /// Clearing CASes won.
    pub removed: u64,
    /// Clearing CASes lost.
    pub remove_cas_losses: u64,
    /// Slabs handed out by the slab allocator.
    pub slab_allocs: u64,
    /// Failed whole-pool slab scans.
    pub slab_exhausted: u64,
    /// Failed pair allocations.
    pub pair_exhausted: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        insert_keys: s.insert_keys.load(Ordering::Relaxed),
        search_keys: s.search_keys.load(Ordering::Relaxed),
        remove_keys: s.remove_keys.load(Ordering::Relaxed),
        inserted: s.inserted.load(Ordering::Relaxed),
        duplicate_aborts: s.duplicate_aborts.load(Ordering::Relaxed),
        insert_cas_retries: s.insert_cas_retries.load(Ordering::Relaxed),
        slab_link_races: s.slab_link_races.load(Ordering::Relaxed),
        removed: s.removed.load(Ordering::Relaxed),
        remove_cas_losses: s.remove_cas_losses.load(Ordering::Relaxed),
        slab_allocs: s.slab_allocs.load(Ordering::Relaxed),
        slab_exhausted: s.slab_exhausted.load(Ordering::Relaxed),
        pair_exhausted: s.pair_exhausted.load(Ordering::Relaxed),
    }
}
