//! Slot words: the atomic cells a slab is made of.
//!
//! All intra-table references are 32-bit index handles, never pointers, so
//! a single compare-and-swap on one word is enough to publish or retract a
//! record. Two word widths exist:
//!
//! - `u32` — index-addressed slots; a pair slot holds a pair index into the
//!   pair pool, the next-pointer slot holds a slab index.
//! - `u64` — packed slots; a pair slot holds key (high half) and value (low
//!   half) inline, the next-pointer slot holds a slab index in its low half.
//!
//! In both widths the all-ones pattern is the reserved empty sentinel, so
//! zero-filling to `0xFF` bytes at construction leaves every slot empty.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// One atomic word of a slab.
///
/// The trait is the seam between the warp protocol (which only needs load /
/// publication-CAS / the empty sentinel) and the two slot layouts.
pub trait SlotWord: Copy + Eq + core::fmt::Debug + Send + Sync + 'static {
    type Atomic: Send + Sync;

    /// The reserved all-ones empty sentinel.
    const EMPTY: Self;

    fn new_empty() -> Self::Atomic;

    fn load(cell: &Self::Atomic, order: Ordering) -> Self;

    /// Publication CAS: `AcqRel` on success so record writes made before
    /// the publish are visible to any acquire-load of the slot.
    fn compare_exchange(cell: &Self::Atomic, current: Self, new: Self) -> Result<Self, Self>;
}

impl SlotWord for u32 {
    type Atomic = AtomicU32;

    const EMPTY: Self = u32::MAX;

    #[inline]
    fn new_empty() -> AtomicU32 {
        AtomicU32::new(u32::MAX)
    }

    #[inline]
    fn load(cell: &AtomicU32, order: Ordering) -> u32 {
        cell.load(order)
    }

    #[inline]
    fn compare_exchange(cell: &AtomicU32, current: u32, new: u32) -> Result<u32, u32> {
        cell.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

impl SlotWord for u64 {
    type Atomic = AtomicU64;

    const EMPTY: Self = u64::MAX;

    #[inline]
    fn new_empty() -> AtomicU64 {
        AtomicU64::new(u64::MAX)
    }

    #[inline]
    fn load(cell: &AtomicU64, order: Ordering) -> u64 {
        cell.load(order)
    }

    #[inline]
    fn compare_exchange(cell: &AtomicU64, current: u64, new: u64) -> Result<u64, u64> {
        cell.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

/// A key or value type storable in the table: any 32-bit plain-old-data
/// value with a lossless mapping to and from a raw `u32` word.
pub trait TableWord: Copy + Eq + core::fmt::Debug {
    fn to_raw(self) -> u32;
    fn from_raw(raw: u32) -> Self;
}

impl TableWord for u32 {
    #[inline]
    fn to_raw(self) -> u32 {
        self
    }

    #[inline]
    fn from_raw(raw: u32) -> u32 {
        raw
    }
}

impl TableWord for i32 {
    #[inline]
    fn to_raw(self) -> u32 {
        self as u32
    }

    #[inline]
    fn from_raw(raw: u32) -> i32 {
        raw as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentinels_are_all_ones() {
        assert_eq!(<u32 as SlotWord>::EMPTY, 0xFFFF_FFFF);
        assert_eq!(<u64 as SlotWord>::EMPTY, 0xFFFF_FFFF_FFFF_FFFF);
    }

    #[test]
    fn test_publication_cas() {
        let cell = <u32 as SlotWord>::new_empty();
        assert_eq!(u32::load(&cell, Ordering::Relaxed), u32::EMPTY);

        assert!(u32::compare_exchange(&cell, u32::EMPTY, 7).is_ok());
        // A second publish against the empty sentinel must observe the winner.
        assert_eq!(u32::compare_exchange(&cell, u32::EMPTY, 8), Err(7));
    }

    #[test]
    fn test_table_word_round_trip() {
        assert_eq!(u32::from_raw(42u32.to_raw()), 42);
        assert_eq!(i32::from_raw((-5i32).to_raw()), -5);
    }
}
