//! Allocator tests
//!
//! Test suite organized by component:
//! - Allocator Core: fast path and chunk growth
//! - Oversized: dedicated chunks
//! - Edge Cases: alignment limits, zero-size requests

use super::*;

// ===== Allocator Core Tests =====

#[test]
fn allocator_creation_starts_empty() {
    let allocator = Allocator::new();
    let stats = allocator.stats();
    assert_eq!(stats.total_allocated, 0);
    assert_eq!(stats.chunk_count, 0);
}

#[test]
fn bump_allocation_sequential() {
    let mut allocator = Allocator::new();

    let a = allocator.alloc(64, 8).expect("first alloc").as_ptr() as usize;
    let b = allocator.alloc(64, 8).expect("second alloc").as_ptr() as usize;
    let c = allocator.alloc(64, 8).expect("third alloc").as_ptr() as usize;

    assert!(a < b && b < c);
    assert_eq!(allocator.stats().chunk_count, 1);
}

#[test]
fn allocation_alignment_powers_of_two() {
    let mut allocator = Allocator::new();

    for align in [1, 2, 4, 8, 16] {
        let addr = allocator.alloc(3, align).expect("aligned alloc").as_ptr() as usize;
        assert_eq!(addr % align, 0, "not aligned to {}", align);
    }
}

#[test]
fn allocations_are_zeroed() {
    let mut allocator = Allocator::new();
    let ptr = allocator.alloc(128, 8).expect("alloc");
    let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 128) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn exhausted_chunk_grows() {
    let mut allocator = Allocator::new();

    for _ in 0..(DEFAULT_CHUNK_SIZE / 512 + 1) {
        allocator.alloc(512, 8).expect("alloc");
    }

    let stats = allocator.stats();
    assert!(stats.chunk_count >= 2);
    assert!(stats.total_allocated >= DEFAULT_CHUNK_SIZE * 3);
}

// ===== Oversized Tests =====

#[test]
fn oversized_allocation_gets_dedicated_chunk() {
    let mut allocator = Allocator::new();
    let size = 64 * 1024;

    let ptr = allocator.alloc(size, 8).expect("large alloc");
    unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0xAA, size) };

    let stats = allocator.stats();
    assert_eq!(stats.chunk_count, 1);
    assert_eq!(stats.current_chunk_remaining, 0);
}

// ===== Edge Cases =====

#[test]
fn rejects_excessive_alignment() {
    let mut allocator = Allocator::new();
    assert!(allocator.alloc(8, 64).is_none());
    assert!(allocator.alloc(8, 3).is_none());
}

#[test]
fn zero_size_allocation_succeeds() {
    let mut allocator = Allocator::new();
    assert!(allocator.alloc(0, 1).is_some());
}
