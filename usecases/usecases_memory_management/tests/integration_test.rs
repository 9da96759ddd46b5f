//! Integration tests for usecases_memory_management crate
//!
//! These tests exercise the tracked allocator from several threads at once
//! and check that the accounting balances afterwards.

use std::sync::Arc;
use std::thread;
use usecases_memory_management::{AllocationError, Allocator, TrackedAllocator};

#[test]
fn test_concurrent_alloc_free_balances() {
    let allocator = Arc::new(TrackedAllocator::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || {
                for i in 0..200 {
                    let size = 1 + (i * 7 + t) % 256;
                    let ptr = allocator.alloc(size).unwrap();
                    unsafe {
                        ptr.write_bytes(t as u8, size);
                        let ptr = allocator.realloc(ptr, size * 2).unwrap();
                        assert_eq!(*ptr, t as u8);
                        allocator.dealloc(ptr);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let stats = allocator.stats();
    assert_eq!(stats.bytes_in_use, 0);
    assert_eq!(stats.blocks_in_use, 0);
    assert_eq!(stats.total_allocations, 1600);
    assert_eq!(stats.total_frees, 1600);
}

#[test]
fn test_limit_is_never_overshot_under_contention() {
    let allocator = Arc::new(TrackedAllocator::new());
    allocator.set_limit(Some(1000));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || {
                let mut held = Vec::new();
                for _ in 0..10 {
                    match allocator.alloc(100) {
                        Ok(ptr) => held.push(ptr as usize),
                        Err(e) => assert!(matches!(e, AllocationError::LimitExceeded { .. })),
                    }
                }
                held
            })
        })
        .collect();
    let held: Vec<usize> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(held.len(), 10);
    assert_eq!(allocator.stats().bytes_in_use, 1000);
    for ptr in held {
        unsafe { allocator.dealloc(ptr as *mut u8) };
    }
    assert_eq!(allocator.stats().bytes_in_use, 0);
}

#[test]
fn test_clearing_the_limit_allows_allocation_again() {
    let allocator = TrackedAllocator::new();
    allocator.set_limit(Some(10));
    assert!(allocator.alloc(11).is_err());
    allocator.set_limit(None);
    let ptr = allocator.alloc(11).unwrap();
    unsafe { allocator.dealloc(ptr) };
}
