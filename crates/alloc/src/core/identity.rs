//! Allocator identity assigned by a registry
//!
//! An [`AllocatorId`] packs a registry slot index with the generation of that
//! slot. Releasing a slot bumps its generation, so an id handed out before the
//! release never resolves to the allocator that later reuses the slot.

use core::fmt;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicU64, Ordering};

const SLOT_BITS: u32 = 16;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;

/// Largest number of slots an id can address
pub const MAX_SLOTS: usize = (SLOT_MASK - 1) as usize;

/// Unique identifier for registered allocators
///
/// Uses `NonZeroU64` so `Option<AllocatorId>` is the same size as the raw
/// integer a container stores next to its pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocatorId(NonZeroU64);

impl AllocatorId {
    pub(crate) fn new(slot: usize, generation: u32) -> Self {
        debug_assert!(slot < MAX_SLOTS);
        let raw = (u64::from(generation) << SLOT_BITS) | (slot as u64 + 1);
        // slot + 1 is never zero and never spills into the generation bits
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Registry slot this id refers to
    #[inline]
    pub const fn slot(self) -> usize {
        ((self.0.get() & SLOT_MASK) - 1) as usize
    }

    /// Generation of the slot when the id was issued
    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0.get() >> SLOT_BITS) as u32
    }

    /// Raw integer form, suitable for storing inside a value-type container
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Rebuilds an id from its raw form; zero and out-of-range slots are rejected
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(value) if raw & SLOT_MASK != 0 && raw >> (SLOT_BITS + 32) == 0 => {
                Some(Self(value))
            }
            _ => None,
        }
    }
}

impl fmt::Display for AllocatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.slot(), self.generation())
    }
}

/// Identity cell embedded in every allocator
///
/// Written only by [`AllocatorRegistry`](crate::allocator::AllocatorRegistry).
/// Atomic so process-wide allocators stay `Sync`.
#[derive(Debug, Default)]
pub struct Identity(AtomicU64);

impl Identity {
    /// An identity that is not cached anywhere
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Current id, `None` when not cached
    #[inline]
    pub fn get(&self) -> Option<AllocatorId> {
        NonZeroU64::new(self.0.load(Ordering::Relaxed)).map(AllocatorId)
    }

    pub(crate) fn set(&self, id: Option<AllocatorId>) {
        self.0.store(id.map_or(0, AllocatorId::get), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn id_round_trips_slot_and_generation() {
        let id = AllocatorId::new(11, 7);
        assert_eq!(id.slot(), 11);
        assert_eq!(id.generation(), 7);
        assert_eq!(AllocatorId::from_raw(id.get()), Some(id));
        assert_eq!(id.to_string(), "11@7");
    }

    #[test]
    fn generations_distinguish_same_slot() {
        assert_ne!(AllocatorId::new(0, 0), AllocatorId::new(0, 1));
    }

    #[test]
    fn from_raw_rejects_garbage() {
        assert_eq!(AllocatorId::from_raw(0), None);
        // generation bits set but no slot
        assert_eq!(AllocatorId::from_raw(1 << SLOT_BITS), None);
    }

    #[test]
    fn identity_starts_uncached() {
        let identity = Identity::new();
        assert_eq!(identity.get(), None);
        let id = AllocatorId::new(3, 0);
        identity.set(Some(id));
        assert_eq!(identity.get(), Some(id));
        identity.set(None);
        assert_eq!(identity.get(), None);
    }
}
