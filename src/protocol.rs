//! Warp protocol: the Insert / Search / Remove state machines.
//!
//! All three operations share the warp-cooperative work sharing (WCWS)
//! skeleton: each iteration the warp ballots the still-active lanes, elects
//! the lowest one, broadcasts its key and bucket, and every lane reads one
//! word of the slab the warp is currently standing on. Exactly one lane is
//! serviced per iteration; the other 31 contribute their slab read. Lanes
//! never leave the loop early — they go inactive and keep voting, so every
//! warp-wide primitive is reached by all lanes on the same control path.
//!
//! Mutations are single-word publication CASes. Losing a CAS never aborts
//! a lane directly: the next iteration re-reads the slab and the ordinary
//! branch logic decides (a lost insert CAS may resolve into the duplicate
//! branch when the racing winner published the same key).
//!
//! The state machines are generic over [`SlotScheme`]: the index-addressed
//! scheme stages records in the pair pool and publishes a 32-bit handle;
//! the packed scheme publishes key and value together in one 64-bit word.

use core::sync::atomic::Ordering;

use crate::bucket::BucketArray;
use crate::error::Error;
use crate::pair_alloc::PairAllocator;
use crate::simt::{self, LaneMask, NEXT_PTR_LANE, WARP_WIDTH};
use crate::slab_alloc::{AllocCursor, SlabAllocator};
use crate::slot::SlotWord;
use crate::stat_inc;
use crate::{EMPTY_PAIR, EMPTY_SLAB, HEAD_SLAB};

/// How one slot layout stages, publishes and reclaims its payload.
///
/// `prepare` runs before the WCWS loop for every active lane (allocation
/// must not straddle the divergent loop); `discard` releases a staged
/// payload that was never published (duplicate key, slab exhaustion).
pub trait SlotScheme: Send + Sync {
    type Word: SlotWord;
    /// Payload staged per lane before the loop.
    type Prepared: Copy;

    fn prepare(&self, key: u32, value: u32) -> Result<Self::Prepared, Error>;
    fn discard(&self, staged: Self::Prepared);
    /// The word the publication CAS installs.
    fn payload(&self, staged: Self::Prepared) -> Self::Word;

    /// Key held by a pair slot, or `None` if the slot is empty.
    fn slot_key(&self, word: Self::Word) -> Option<u32>;
    fn slot_value(&self, word: Self::Word) -> u32;
    /// Reclaim whatever a removed slot word referenced.
    fn release_removed(&self, word: Self::Word);

    /// Slab index held by a next-pointer word (`EMPTY_SLAB` if none).
    fn next_slab(&self, word: Self::Word) -> u32;
    fn make_next(&self, slab: u32) -> Self::Word;
}

/// Index-addressed slots: 32-bit pair handles into the pair pool.
pub struct IndexScheme {
    pairs: PairAllocator,
}

impl IndexScheme {
    pub fn new(pairs: PairAllocator) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &PairAllocator {
        &self.pairs
    }
}

impl SlotScheme for IndexScheme {
    type Word = u32;
    type Prepared = u32;

    #[inline]
    fn prepare(&self, key: u32, value: u32) -> Result<u32, Error> {
        let index = self.pairs.allocate()?;
        self.pairs.write(index, key, value);
        Ok(index)
    }

    #[inline]
    fn discard(&self, staged: u32) {
        self.pairs.free(staged);
    }

    #[inline]
    fn payload(&self, staged: u32) -> u32 {
        staged
    }

    #[inline]
    fn slot_key(&self, word: u32) -> Option<u32> {
        if word == EMPTY_PAIR {
            None
        } else {
            Some(self.pairs.key(word))
        }
    }

    #[inline]
    fn slot_value(&self, word: u32) -> u32 {
        self.pairs.value(word)
    }

    #[inline]
    fn release_removed(&self, word: u32) {
        self.pairs.free(word);
    }

    #[inline]
    fn next_slab(&self, word: u32) -> u32 {
        word
    }

    #[inline]
    fn make_next(&self, slab: u32) -> u32 {
        slab
    }
}

/// Packed slots: key in the high half, value in the low half, one 64-bit
/// publication CAS, no pair pool. The all-ones key is reserved (it is the
/// empty test).
pub struct PackedScheme;

impl SlotScheme for PackedScheme {
    type Word = u64;
    type Prepared = u64;

    #[inline]
    fn prepare(&self, key: u32, value: u32) -> Result<u64, Error> {
        debug_assert_ne!(key, EMPTY_PAIR, "the all-ones key is reserved");
        Ok(((key as u64) << 32) | value as u64)
    }

    #[inline]
    fn discard(&self, _staged: u64) {}

    #[inline]
    fn payload(&self, staged: u64) -> u64 {
        staged
    }

    #[inline]
    fn slot_key(&self, word: u64) -> Option<u32> {
        let key = (word >> 32) as u32;
        if key == EMPTY_PAIR { None } else { Some(key) }
    }

    #[inline]
    fn slot_value(&self, word: u64) -> u32 {
        word as u32
    }

    #[inline]
    fn release_removed(&self, _word: u64) {}

    #[inline]
    fn next_slab(&self, word: u64) -> u32 {
        word as u32
    }

    #[inline]
    fn make_next(&self, slab: u32) -> u64 {
        slab as u64
    }
}

/// Per-lane insert result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Lane was inactive.
    Skipped,
    /// This lane won the publication CAS.
    Inserted,
    /// The key was already present; the pre-allocation was released.
    AlreadyPresent,
    /// Pair pool exhausted before the loop; nothing published.
    OutOfPairs,
    /// Slab pool exhausted while extending the chain; the pre-allocation
    /// was released.
    OutOfSlabs,
}

/// The word lane `lane` owns on the warp's current slab (`HEAD_SLAB` means
/// the bucket's head).
#[inline]
pub(crate) fn slot_cell<'a, W: SlotWord>(
    buckets: &'a BucketArray<W>,
    slabs: &'a SlabAllocator<W>,
    bucket: u32,
    slab: u32,
    lane: usize,
) -> &'a W::Atomic {
    if slab == HEAD_SLAB {
        buckets.word(bucket, lane)
    } else {
        slabs.word(slab, lane)
    }
}

/// Read the warp's current slab, one word per lane. Raw atomic loads every
/// iteration — the scan never caches a slot across iterations.
#[inline]
pub(crate) fn read_slab<W: SlotWord>(
    buckets: &BucketArray<W>,
    slabs: &SlabAllocator<W>,
    bucket: u32,
    slab: u32,
) -> [W; WARP_WIDTH] {
    let mut words = [W::EMPTY; WARP_WIDTH];
    for lane in 0..WARP_WIDTH {
        words[lane] = W::load(
            slot_cell(buckets, slabs, bucket, slab, lane),
            Ordering::Acquire,
        );
    }
    words
}

/// Warp-cooperative insert over one warp's lanes.
///
/// Every active lane stages its record before the loop; unpublished
/// stagings are released on the duplicate and exhaustion branches. Insert
/// never overwrites: a present key aborts the lane and the table keeps the
/// original record.
pub fn warp_insert<S: SlotScheme>(
    scheme: &S,
    buckets: &BucketArray<S::Word>,
    slabs: &SlabAllocator<S::Word>,
    cursor: &mut AllocCursor,
    bucket_ids: &[u32; WARP_WIDTH],
    keys: &[u32; WARP_WIDTH],
    values: &[u32; WARP_WIDTH],
    mut active: [bool; WARP_WIDTH],
) -> [InsertOutcome; WARP_WIDTH] {
    let mut outcome = [InsertOutcome::Skipped; WARP_WIDTH];
    let mut staged: [Option<S::Prepared>; WARP_WIDTH] = [None; WARP_WIDTH];

    // Pre-loop staging. Allocating inside the divergent loop would tear
    // the warp apart between ballots, so every lane stages its payload
    // here, on the common path.
    for lane in 0..WARP_WIDTH {
        if !active[lane] {
            continue;
        }
        match scheme.prepare(keys[lane], values[lane]) {
            Ok(p) => staged[lane] = Some(p),
            Err(_) => {
                outcome[lane] = InsertOutcome::OutOfPairs;
                active[lane] = false;
            }
        }
    }

    let mut curr_slab = HEAD_SLAB;
    let mut prev_work: LaneMask = 0;

    loop {
        let work = simt::ballot(|lane| active[lane]);
        let Some(src) = simt::first_lane(work) else {
            break;
        };
        let src_key = simt::shfl(keys, src);
        let src_bucket = simt::shfl(bucket_ids, src);
        // A new serviced lane starts over from the bucket head.
        if work != prev_work {
            curr_slab = HEAD_SLAB;
        }
        prev_work = work;

        let words = read_slab(buckets, slabs, src_bucket, curr_slab);

        let found = simt::ballot(|lane| {
            lane < NEXT_PTR_LANE && scheme.slot_key(words[lane]) == Some(src_key)
        });
        if found != 0 {
            // Key already present: abort, keep the original entry.
            scheme.discard(staged[src].take().expect("active lane lost its staging"));
            outcome[src] = InsertOutcome::AlreadyPresent;
            active[src] = false;
            stat_inc!(duplicate_aborts);
            continue;
        }

        let empty = simt::ballot(|lane| lane < NEXT_PTR_LANE && words[lane] == S::Word::EMPTY);
        if let Some(dest) = simt::first_lane(empty) {
            // First-fit publication CAS into the lowest empty slot.
            let payload = scheme.payload(staged[src].expect("active lane lost its staging"));
            let cell = slot_cell(buckets, slabs, src_bucket, curr_slab, dest);
            if S::Word::compare_exchange(cell, S::Word::EMPTY, payload).is_ok() {
                staged[src] = None;
                outcome[src] = InsertOutcome::Inserted;
                active[src] = false;
                stat_inc!(inserted);
            } else {
                // Lost the slot. Re-read and re-decide: the winner may have
                // published this very key, which the duplicate branch will
                // catch next iteration.
                stat_inc!(insert_cas_retries);
            }
            continue;
        }

        // Slab is full: follow the chain, or extend it.
        let next = scheme.next_slab(words[NEXT_PTR_LANE]);
        if next != EMPTY_SLAB {
            curr_slab = next;
            continue;
        }

        match slabs.warp_allocate(cursor) {
            Ok(new_slab) => {
                let cell = slot_cell(buckets, slabs, src_bucket, curr_slab, NEXT_PTR_LANE);
                if S::Word::compare_exchange(cell, S::Word::EMPTY, scheme.make_next(new_slab))
                    .is_err()
                {
                    // Another warp linked its slab first; ours was never
                    // observed, so it goes straight back to the pool.
                    slabs.free_untouched(new_slab);
                    stat_inc!(slab_link_races);
                }
                // Win or lose, the next iteration re-reads word 31 and
                // walks into whichever slab got linked.
            }
            Err(_) => {
                scheme.discard(staged[src].take().expect("active lane lost its staging"));
                outcome[src] = InsertOutcome::OutOfSlabs;
                active[src] = false;
            }
        }
    }

    outcome
}

/// Warp-cooperative search over one warp's lanes.
///
/// Returns per-lane `(raw value, found)`; a miss leaves the raw value at
/// the all-ones default.
pub fn warp_search<S: SlotScheme>(
    scheme: &S,
    buckets: &BucketArray<S::Word>,
    slabs: &SlabAllocator<S::Word>,
    bucket_ids: &[u32; WARP_WIDTH],
    keys: &[u32; WARP_WIDTH],
    mut active: [bool; WARP_WIDTH],
) -> ([u32; WARP_WIDTH], [bool; WARP_WIDTH]) {
    let mut values = [EMPTY_PAIR; WARP_WIDTH];
    let mut found = [false; WARP_WIDTH];

    let mut curr_slab = HEAD_SLAB;
    let mut prev_work: LaneMask = 0;

    loop {
        let work = simt::ballot(|lane| active[lane]);
        let Some(src) = simt::first_lane(work) else {
            break;
        };
        let src_key = simt::shfl(keys, src);
        let src_bucket = simt::shfl(bucket_ids, src);
        if work != prev_work {
            curr_slab = HEAD_SLAB;
        }
        prev_work = work;

        let words = read_slab(buckets, slabs, src_bucket, curr_slab);

        let hits = simt::ballot(|lane| {
            lane < NEXT_PTR_LANE && scheme.slot_key(words[lane]) == Some(src_key)
        });
        if let Some(hit) = simt::first_lane(hits) {
            let word = simt::shfl(&words, hit);
            values[src] = scheme.slot_value(word);
            found[src] = true;
            active[src] = false;
            continue;
        }

        let next = scheme.next_slab(words[NEXT_PTR_LANE]);
        if next != EMPTY_SLAB {
            curr_slab = next;
        } else {
            // Chain exhausted; the miss result is already in place.
            active[src] = false;
        }
    }

    (values, found)
}

/// Warp-cooperative remove over one warp's lanes.
///
/// Single-shot: whether the clearing CAS wins or loses, the lane goes
/// inactive. A lost CAS means a racing warp already retired that exact
/// reference (or replaced the slot); retrying could observe a re-inserted
/// key in a different slot and double-retire.
pub fn warp_remove<S: SlotScheme>(
    scheme: &S,
    buckets: &BucketArray<S::Word>,
    slabs: &SlabAllocator<S::Word>,
    bucket_ids: &[u32; WARP_WIDTH],
    keys: &[u32; WARP_WIDTH],
    mut active: [bool; WARP_WIDTH],
) -> [bool; WARP_WIDTH] {
    let mut removed = [false; WARP_WIDTH];

    let mut curr_slab = HEAD_SLAB;
    let mut prev_work: LaneMask = 0;

    loop {
        let work = simt::ballot(|lane| active[lane]);
        let Some(src) = simt::first_lane(work) else {
            break;
        };
        let src_key = simt::shfl(keys, src);
        let src_bucket = simt::shfl(bucket_ids, src);
        if work != prev_work {
            curr_slab = HEAD_SLAB;
        }
        prev_work = work;

        let words = read_slab(buckets, slabs, src_bucket, curr_slab);

        let hits = simt::ballot(|lane| {
            lane < NEXT_PTR_LANE && scheme.slot_key(words[lane]) == Some(src_key)
        });
        if let Some(hit) = simt::first_lane(hits) {
            let observed = simt::shfl(&words, hit);
            let cell = slot_cell(buckets, slabs, src_bucket, curr_slab, hit);
            if S::Word::compare_exchange(cell, observed, S::Word::EMPTY).is_ok() {
                scheme.release_removed(observed);
                removed[src] = true;
                stat_inc!(removed);
            } else {
                stat_inc!(remove_cas_losses);
            }
            active[src] = false;
            continue;
        }

        let next = scheme.next_slab(words[NEXT_PTR_LANE]);
        if next != EMPTY_SLAB {
            curr_slab = next;
        } else {
            active[src] = false;
        }
    }

    removed
}
