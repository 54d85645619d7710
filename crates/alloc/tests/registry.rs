//! Integration tests for the allocator registry

use std::rc::Rc;

use nebula_alloc::allocator::{
    Allocator, AllocatorRegistry, ArenaAllocator, FixedPoolAllocator, MAX_CACHED_ALLOCATORS,
};
use nebula_alloc::core::AllocatorId;
use pretty_assertions::assert_eq;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn pool() -> Rc<FixedPoolAllocator> {
    Rc::new(FixedPoolAllocator::new(1, 32).expect("Failed to create pool"))
}

#[test]
fn test_capacity_limits_cached_allocators() {
    init_tracing();
    let registry = AllocatorRegistry::new();
    let pools: Vec<_> = (0..MAX_CACHED_ALLOCATORS).map(|_| pool()).collect();

    let ids: Vec<AllocatorId> = pools
        .iter()
        .map(|pool| registry.register(pool).expect("slot available"))
        .collect();
    let mut distinct = ids.clone();
    distinct.sort_by_key(|id| id.get());
    distinct.dedup();
    assert_eq!(distinct.len(), MAX_CACHED_ALLOCATORS);
    assert!(registry.is_full());

    let extra = pool();
    assert_eq!(registry.register(&extra), None);
    assert_eq!(extra.id(), None);

    assert!(registry.unregister(&*pools[3]));
    let id = registry.register(&extra).expect("freed slot reused");
    assert_eq!(id.slot(), ids[3].slot());
}

#[test]
fn test_stale_ids_never_resolve() {
    init_tracing();
    let registry = AllocatorRegistry::with_capacity(1);
    let first = Rc::new(ArenaAllocator::new(64).unwrap());
    let old = registry.register(&first).unwrap();
    assert!(registry.unregister(&*first));

    let second = Rc::new(ArenaAllocator::new(64).unwrap());
    let new = registry.register(&second).unwrap();
    assert_eq!(new.slot(), old.slot());
    assert!(registry.lookup(old).is_none());
    assert!(!registry.is_cached_id(old));

    let handle = registry.lookup(new).unwrap();
    assert!(std::ptr::eq(handle.identity(), second.identity()));
}

#[test]
fn test_lookup_round_trips_through_raw_id() {
    let registry = AllocatorRegistry::new();
    let arena = Rc::new(ArenaAllocator::new(128).unwrap());
    let raw = registry.register(&arena).unwrap().get();

    let id = AllocatorId::from_raw(raw).unwrap();
    let handle = registry.lookup(id).unwrap();
    let block = handle.allocate(4, 4, true).unwrap();
    assert!(arena.contains(block));
    assert_eq!(arena.used(), 16);
}

#[test]
fn test_registry_does_not_keep_allocators_alive() {
    let registry = AllocatorRegistry::new();
    let id = registry.register(&pool()).unwrap();
    assert!(registry.lookup(id).is_none());
    assert!(registry.is_empty());
}
