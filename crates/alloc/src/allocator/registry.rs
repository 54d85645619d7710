//! Allocator registry
//!
//! A small, fixed-capacity table that hands out [`AllocatorId`]s so that a
//! value-type container can store a plain integer next to its pointer and
//! recover the owning allocator later.
//!
//! ## Invariants
//!
//! - At most `capacity` slots exist; a full table returns `None` instead of
//!   an id
//! - An id resolves only while its slot's generation matches; unregistering
//!   or reclaiming a slot bumps the generation
//! - Shared allocators are held weakly, so the registry never keeps one alive

use core::cell::RefCell;
use core::fmt;
use core::ops::Deref;
use core::ptr;
use std::rc::{Rc, Weak};

use super::Allocator;
use crate::core::{AllocatorId, Identity, identity::MAX_SLOTS};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Default number of registry slots
pub const MAX_CACHED_ALLOCATORS: usize = 12;

/// Registered allocator as returned by [`AllocatorRegistry::lookup`]
#[derive(Clone)]
pub enum AllocatorHandle {
    /// Allocator registered through [`AllocatorRegistry::register`]
    Shared(Rc<dyn Allocator>),
    /// Process-lifetime allocator
    Static(&'static dyn Allocator),
}

impl Deref for AllocatorHandle {
    type Target = dyn Allocator;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Shared(allocator) => allocator.as_ref(),
            Self::Static(allocator) => *allocator,
        }
    }
}

impl fmt::Debug for AllocatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorHandle")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .finish()
    }
}

enum Entry {
    Shared(Weak<dyn Allocator>),
    Static(&'static dyn Allocator),
}

impl Entry {
    fn upgrade(&self) -> Option<AllocatorHandle> {
        match self {
            Self::Shared(weak) => weak.upgrade().map(AllocatorHandle::Shared),
            Self::Static(allocator) => Some(AllocatorHandle::Static(*allocator)),
        }
    }

    fn is_dead(&self) -> bool {
        matches!(self, Self::Shared(weak) if weak.strong_count() == 0)
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

impl Slot {
    fn vacate(&mut self) {
        self.entry = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Fixed-capacity table of cached allocators
///
/// Single-threaded by construction (`!Sync`); create one per thread or per
/// subsystem and pass it where containers need to resolve ids.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
///
/// use nebula_alloc::allocator::{Allocator, AllocatorRegistry, ArenaAllocator};
///
/// let registry = AllocatorRegistry::new();
/// let arena = Rc::new(ArenaAllocator::new(1024).unwrap());
/// let id = registry.register(&arena).unwrap();
///
/// let handle = registry.lookup(id).unwrap();
/// assert_eq!(handle.id(), Some(id));
/// assert!(registry.unregister(&*arena));
/// assert!(registry.lookup(id).is_none());
/// ```
pub struct AllocatorRegistry {
    slots: RefCell<Vec<Slot>>,
    capacity: usize,
}

impl AllocatorRegistry {
    /// Creates a registry with [`MAX_CACHED_ALLOCATORS`] slots
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHED_ALLOCATORS)
    }

    /// Creates a registry with `capacity` slots
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_SLOTS);
        Self {
            slots: RefCell::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Caches a shared allocator
    ///
    /// Returns the existing id if the allocator is already cached here, and
    /// `None` when every slot is taken.
    pub fn register<A: Allocator + 'static>(&self, allocator: &Rc<A>) -> Option<AllocatorId> {
        if let Some(id) = self.cached_id(&**allocator) {
            return Some(id);
        }
        let weak: Weak<dyn Allocator> = Rc::downgrade(allocator) as Weak<dyn Allocator>;
        self.insert(Entry::Shared(weak), allocator.identity())
    }

    /// Caches a process-lifetime allocator
    pub fn register_static(&self, allocator: &'static dyn Allocator) -> Option<AllocatorId> {
        if let Some(id) = self.cached_id(allocator) {
            return Some(id);
        }
        self.insert(Entry::Static(allocator), allocator.identity())
    }

    /// Removes an allocator; returns `false` if it was not cached here
    pub fn unregister<A: Allocator + ?Sized>(&self, allocator: &A) -> bool {
        let Some(id) = self.cached_id(allocator) else {
            return false;
        };
        if let Some(slot) = self.slots.borrow_mut().get_mut(id.slot()) {
            slot.vacate();
        }
        allocator.identity().set(None);

        #[cfg(feature = "logging")]
        debug!(%id, kind = %allocator.kind(), "allocator unregistered");

        true
    }

    /// Resolves an id to its live allocator
    ///
    /// Ids from an earlier generation of the slot never resolve. A slot
    /// whose allocator has been dropped is reclaimed on the way.
    pub fn lookup(&self, id: AllocatorId) -> Option<AllocatorHandle> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.get_mut(id.slot())?;
        if slot.generation != id.generation() {
            return None;
        }
        let handle = slot.entry.as_ref()?.upgrade();
        if handle.is_none() {
            slot.vacate();
        }
        handle
    }

    /// Whether this exact allocator instance is cached here
    pub fn is_cached<A: Allocator + ?Sized>(&self, allocator: &A) -> bool {
        self.cached_id(allocator).is_some()
    }

    /// Whether `id` still resolves
    pub fn is_cached_id(&self, id: AllocatorId) -> bool {
        self.lookup(id).is_some()
    }

    /// Number of live cached allocators
    pub fn len(&self) -> usize {
        let mut slots = self.slots.borrow_mut();
        Self::reclaim(&mut slots);
        slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    fn cached_id<A: Allocator + ?Sized>(&self, allocator: &A) -> Option<AllocatorId> {
        let id = allocator.id()?;
        let handle = self.lookup(id)?;
        ptr::eq(handle.identity(), allocator.identity()).then_some(id)
    }

    fn insert(&self, entry: Entry, identity: &Identity) -> Option<AllocatorId> {
        let mut slots = self.slots.borrow_mut();
        Self::reclaim(&mut slots);

        let index = match slots.iter().position(|slot| slot.entry.is_none()) {
            Some(index) => index,
            None if slots.len() < self.capacity => {
                slots.push(Slot::default());
                slots.len() - 1
            }
            None => {
                #[cfg(feature = "logging")]
                warn!(capacity = self.capacity, "allocator registry full, not caching");

                return None;
            }
        };

        let slot = &mut slots[index];
        slot.entry = Some(entry);
        let id = AllocatorId::new(index, slot.generation);
        identity.set(Some(id));

        #[cfg(feature = "logging")]
        debug!(%id, "allocator registered");

        Some(id)
    }

    fn reclaim(slots: &mut [Slot]) {
        for slot in slots {
            if slot.entry.as_ref().is_some_and(Entry::is_dead) {
                slot.vacate();
            }
        }
    }
}

impl Default for AllocatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AllocatorRegistry {
    fn drop(&mut self) {
        for slot in self.slots.get_mut() {
            if let Some(handle) = slot.entry.as_ref().and_then(Entry::upgrade) {
                handle.identity().set(None);
            }
        }
    }
}

impl fmt::Debug for AllocatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorRegistry")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
