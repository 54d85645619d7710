//! Integration tests shared by both pool-with-fallback allocators

use std::ptr::NonNull;

use nebula_alloc::allocator::{
    Allocator, AnyAllocator, BlockSize, ForwardPoolAllocator, HeapAllocator, HybridPoolAllocator,
};
use nebula_alloc::error::ErrorKind;
use pretty_assertions::assert_eq;
use rstest::rstest;

const CHUNK_SIZE: usize = 64;
const CHUNK_COUNT: usize = 2;

fn heap() -> Box<AnyAllocator> {
    Box::new(AnyAllocator::from(HeapAllocator::new()).tracked())
}

fn hybrid() -> AnyAllocator {
    HybridPoolAllocator::new(CHUNK_COUNT, CHUNK_SIZE, heap())
        .expect("Failed to create hybrid pool")
        .into()
}

fn forward() -> AnyAllocator {
    ForwardPoolAllocator::new(CHUNK_COUNT, CHUNK_SIZE, heap())
        .expect("Failed to create forward pool")
        .into()
}

fn pool_owns(allocator: &AnyAllocator, block: NonNull<u8>) -> bool {
    match allocator {
        AnyAllocator::HybridPool(hybrid) => hybrid.pool_owns(block),
        AnyAllocator::ForwardPool(forward) => forward.pool_owns(block),
        other => panic!("not a pool with fallback: {other:?}"),
    }
}

fn fallback_outstanding(allocator: &AnyAllocator) -> isize {
    let fallback = match allocator {
        AnyAllocator::HybridPool(hybrid) => hybrid.fallback(),
        AnyAllocator::ForwardPool(forward) => forward.fallback(),
        other => panic!("not a pool with fallback: {other:?}"),
    };
    match &**fallback {
        AnyAllocator::Debug(tracked) => tracked.outstanding_bytes(),
        other => panic!("fallback is not tracked: {other:?}"),
    }
}

#[rstest]
#[case::hybrid(hybrid())]
#[case::forward(forward())]
fn threshold_boundary_picks_the_side(#[case] allocator: AnyAllocator) {
    let small = allocator.allocate(CHUNK_SIZE, 1, false).unwrap();
    let large = allocator.allocate(CHUNK_SIZE + 1, 1, false).unwrap();

    assert!(pool_owns(&allocator, small));
    assert!(!pool_owns(&allocator, large));
    assert_eq!(unsafe { allocator.block_size(small) }, Some(CHUNK_SIZE));

    unsafe {
        allocator.free(large).unwrap();
        allocator.free(small).unwrap();
    }
    allocator.dispose().unwrap();
}

#[rstest]
#[case::hybrid(hybrid())]
#[case::forward(forward())]
fn exhausted_pool_does_not_spill(#[case] allocator: AnyAllocator) {
    let blocks: Vec<_> = (0..CHUNK_COUNT)
        .map(|_| allocator.allocate(8, 1, false).unwrap())
        .collect();

    let err = allocator.allocate(8, 1, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);

    // Large requests still go through.
    let large = allocator.allocate(4, CHUNK_SIZE, false).unwrap();
    unsafe {
        allocator.free(large).unwrap();
        for block in blocks {
            allocator.free(block).unwrap();
        }
    }
}

#[rstest]
#[case::hybrid(hybrid())]
#[case::forward(forward())]
fn growth_past_threshold_carries_contents(#[case] allocator: AnyAllocator) {
    let block = allocator.allocate(CHUNK_SIZE, 1, false).unwrap();
    let pattern: Vec<u8> = (0..CHUNK_SIZE as u8).collect();
    unsafe { block.as_ptr().copy_from(pattern.as_ptr(), CHUNK_SIZE) };

    let grown = unsafe { allocator.reallocate(block, CHUNK_SIZE * 2, 1, true) }.unwrap();
    assert!(!pool_owns(&allocator, grown));

    let bytes = unsafe { core::slice::from_raw_parts(grown.as_ptr(), CHUNK_SIZE * 2) };
    assert_eq!(&bytes[..CHUNK_SIZE], pattern.as_slice());

    // The chunk went back to the pool, so the pool can hand out both again.
    let first = allocator.allocate(1, 1, false).unwrap();
    let second = allocator.allocate(1, 1, false).unwrap();
    unsafe {
        allocator.free(second).unwrap();
        allocator.free(first).unwrap();
        allocator.free(grown).unwrap();
    }
}

#[rstest]
#[case::hybrid(hybrid())]
#[case::forward(forward())]
fn shrinking_within_a_chunk_stays_put(#[case] allocator: AnyAllocator) {
    let block = allocator.allocate(CHUNK_SIZE, 1, false).unwrap();
    let same = unsafe { allocator.reallocate(block, 4, 1, false) }.unwrap();
    assert_eq!(same, block);
    unsafe { allocator.free(same).unwrap() };
}

#[rstest]
#[case::hybrid(hybrid())]
#[case::forward(forward())]
fn dispose_cascades_to_owned_fallback(#[case] allocator: AnyAllocator) {
    allocator.dispose().unwrap();
    assert!(allocator.is_disposed());
    let err = allocator.allocate(1, 1, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Disposed);
}

#[rstest]
#[case::hybrid(hybrid())]
#[case::forward(forward())]
fn growth_within_chunk_zeroes_exposed_bytes(#[case] allocator: AnyAllocator) {
    let block = allocator.allocate(8, 1, false).unwrap();
    unsafe {
        block.as_ptr().write_bytes(0x42, 8);
        block.as_ptr().add(8).write_bytes(0xEE, CHUNK_SIZE - 8);
    }

    let same = unsafe { allocator.reallocate(block, CHUNK_SIZE, 1, true) }.unwrap();
    assert_eq!(same, block);
    let bytes = unsafe { core::slice::from_raw_parts(same.as_ptr(), CHUNK_SIZE) };
    assert!(bytes[..8].iter().all(|&b| b == 0x42));
    assert!(bytes[8..].iter().all(|&b| b == 0));

    unsafe { allocator.free(same).unwrap() };
}

#[rstest]
#[case::hybrid(hybrid())]
#[case::forward(forward())]
fn off_boundary_growth_takes_nothing_from_fallback(#[case] allocator: AnyAllocator) {
    let block = allocator.allocate(CHUNK_SIZE, 1, false).unwrap();
    let inside = unsafe { block.add(4) };

    let err = unsafe { allocator.reallocate(inside, CHUNK_SIZE * 2, 1, false) }.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(fallback_outstanding(&allocator), 0);

    unsafe { allocator.free(block).unwrap() };
    allocator.dispose().unwrap();
}
