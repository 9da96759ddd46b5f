//! Allocator Trait and Tracked Allocator
//!
//! The runtime hands native code a single allocator family (`enif_alloc`,
//! `enif_realloc`, `enif_free`). Every block goes through
//! [`TrackedAllocator`], which keeps the runtime's view of native memory
//! use up to date and can enforce a byte limit so exhaustion is observable.
//!
//! ## Block layout
//!
//! ```text
//! [ header: requested size (16 bytes) ][ payload ... ]
//!                                       ^ pointer handed out
//! ```
//!
//! The header lets `dealloc` and `realloc` recover the block size without
//! the caller passing it back.
//!
//! ## Examples
//!
//! ```rust
//! use usecases_memory_management::{Allocator, TrackedAllocator};
//!
//! let allocator = TrackedAllocator::new();
//! let ptr = allocator.alloc(1024).unwrap();
//! assert_eq!(allocator.stats().bytes_in_use, 1024);
//! unsafe { allocator.dealloc(ptr) };
//! assert_eq!(allocator.stats().bytes_in_use, 0);
//! ```

/*
 * %CopyrightBegin%
 *
 * SPDX-License-Identifier: Apache-2.0
 *
 * Copyright Lee Barney 2025. All Rights Reserved.
 *
 * This file is derived from work copyrighted by Ericsson AB 1996-2025.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 * %CopyrightEnd%
 */

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use thiserror::Error;

/// Size of the block header. Sixteen bytes keep the payload aligned the
/// way `malloc` aligns its own blocks.
pub const BLOCK_HEADER_SIZE: usize = 16;

/// Allocation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The system allocator returned null
    #[error("out of memory")]
    OutOfMemory,
    /// The request would exceed the configured byte limit
    #[error("allocation of {requested} bytes exceeds the limit of {limit} bytes")]
    LimitExceeded { requested: usize, limit: usize },
    /// The size overflows when the header is added
    #[error("invalid allocation size")]
    InvalidSize,
}

/// Allocator interface used by the NIF memory primitives.
///
/// ## Safety
///
/// Implementations must return pointers valid for the requested size.
/// Callers must only pass pointers obtained from the same allocator to
/// `realloc` and `dealloc`, and each pointer at most once to `dealloc`.
pub trait Allocator {
    /// Allocate `size` bytes.
    fn alloc(&self, size: usize) -> Result<*mut u8, AllocationError>;

    /// Resize a block, preserving `min(old, new)` bytes.
    ///
    /// On failure the original block is untouched and still owned by the
    /// caller.
    ///
    /// # Safety
    /// `ptr` must come from this allocator and not have been freed.
    unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> Result<*mut u8, AllocationError>;

    /// Free a block.
    ///
    /// # Safety
    /// `ptr` must come from this allocator and not have been freed.
    unsafe fn dealloc(&self, ptr: *mut u8);
}

/// Snapshot of allocator accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Payload bytes currently allocated
    pub bytes_in_use: usize,
    /// Live blocks
    pub blocks_in_use: usize,
    /// Successful `alloc` calls since creation
    pub total_allocations: u64,
    /// `dealloc` calls since creation
    pub total_frees: u64,
    /// Requests refused by the limit or the system allocator
    pub failed_allocations: u64,
}

/// `malloc`-backed allocator with runtime-visible accounting.
pub struct TrackedAllocator {
    bytes_in_use: AtomicUsize,
    blocks_in_use: AtomicUsize,
    total_allocations: AtomicU64,
    total_frees: AtomicU64,
    failed_allocations: AtomicU64,
    /// Byte limit; zero means unlimited
    limit: AtomicUsize,
}

impl Default for TrackedAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackedAllocator {
    pub const fn new() -> Self {
        Self {
            bytes_in_use: AtomicUsize::new(0),
            blocks_in_use: AtomicUsize::new(0),
            total_allocations: AtomicU64::new(0),
            total_frees: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
            limit: AtomicUsize::new(0),
        }
    }

    /// Set or clear the byte limit. Blocks already allocated are unaffected.
    pub fn set_limit(&self, limit: Option<usize>) {
        self.limit.store(limit.unwrap_or(0), Ordering::Relaxed);
    }

    pub fn limit(&self) -> Option<usize> {
        match self.limit.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    /// Current accounting
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            bytes_in_use: self.bytes_in_use.load(Ordering::Relaxed),
            blocks_in_use: self.blocks_in_use.load(Ordering::Relaxed),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            total_frees: self.total_frees.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
        }
    }

    /// Reserve `extra` bytes against the limit before touching the system
    /// allocator, so concurrent callers cannot overshoot it together.
    fn reserve(&self, extra: usize) -> Result<(), AllocationError> {
        let limit = self.limit.load(Ordering::Relaxed);
        let result = self
            .bytes_in_use
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                let total = used.checked_add(extra)?;
                (limit == 0 || total <= limit).then_some(total)
            });
        result.map(|_| ()).map_err(|_| {
            self.failed_allocations.fetch_add(1, Ordering::Relaxed);
            AllocationError::LimitExceeded {
                requested: extra,
                limit,
            }
        })
    }

    fn unreserve(&self, bytes: usize) {
        self.bytes_in_use.fetch_sub(bytes, Ordering::Relaxed);
    }

    fn out_of_memory(&self, reserved: usize) -> AllocationError {
        self.unreserve(reserved);
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
        AllocationError::OutOfMemory
    }

    unsafe fn base_of(ptr: *mut u8) -> *mut u8 {
        ptr.sub(BLOCK_HEADER_SIZE)
    }

    unsafe fn block_size(ptr: *mut u8) -> usize {
        (Self::base_of(ptr) as *const usize).read()
    }

    /// Payload size of a live block.
    ///
    /// # Safety
    /// `ptr` must come from this allocator and not have been freed.
    pub unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
        Self::block_size(ptr)
    }
}

impl Allocator for TrackedAllocator {
    fn alloc(&self, size: usize) -> Result<*mut u8, AllocationError> {
        let total = size
            .checked_add(BLOCK_HEADER_SIZE)
            .ok_or(AllocationError::InvalidSize)?;
        self.reserve(size)?;
        // SAFETY: plain malloc of a non-zero size; null is handled below.
        let base = unsafe { libc::malloc(total) } as *mut u8;
        if base.is_null() {
            return Err(self.out_of_memory(size));
        }
        // SAFETY: the block is at least BLOCK_HEADER_SIZE bytes and malloc
        // aligns it for usize.
        unsafe { (base as *mut usize).write(size) };
        self.blocks_in_use.fetch_add(1, Ordering::Relaxed);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        Ok(unsafe { base.add(BLOCK_HEADER_SIZE) })
    }

    unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> Result<*mut u8, AllocationError> {
        if ptr.is_null() {
            return self.alloc(new_size);
        }
        let old_size = Self::block_size(ptr);
        let total = new_size
            .checked_add(BLOCK_HEADER_SIZE)
            .ok_or(AllocationError::InvalidSize)?;
        let growth = new_size.saturating_sub(old_size);
        self.reserve(growth)?;

        let base = libc::realloc(Self::base_of(ptr) as *mut libc::c_void, total) as *mut u8;
        if base.is_null() {
            // libc leaves the old block in place on failure.
            return Err(self.out_of_memory(growth));
        }
        (base as *mut usize).write(new_size);
        self.unreserve(old_size.saturating_sub(new_size));
        Ok(base.add(BLOCK_HEADER_SIZE))
    }

    unsafe fn dealloc(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let size = Self::block_size(ptr);
        libc::free(Self::base_of(ptr) as *mut libc::c_void);
        self.unreserve(size);
        self.blocks_in_use.fetch_sub(1, Ordering::Relaxed);
        self.total_frees.fetch_add(1, Ordering::Relaxed);
    }
}

static GLOBAL_ALLOCATOR: OnceLock<TrackedAllocator> = OnceLock::new();

/// The process-wide allocator behind `enif_alloc` and friends.
pub fn get_global_allocator() -> &'static TrackedAllocator {
    GLOBAL_ALLOCATOR.get_or_init(TrackedAllocator::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_free_update_accounting() {
        let allocator = TrackedAllocator::new();
        let a = allocator.alloc(100).unwrap();
        let b = allocator.alloc(28).unwrap();
        let stats = allocator.stats();
        assert_eq!(stats.bytes_in_use, 128);
        assert_eq!(stats.blocks_in_use, 2);
        unsafe {
            allocator.dealloc(a);
            allocator.dealloc(b);
        }
        let stats = allocator.stats();
        assert_eq!(stats.bytes_in_use, 0);
        assert_eq!(stats.blocks_in_use, 0);
        assert_eq!(stats.total_allocations, 2);
        assert_eq!(stats.total_frees, 2);
    }

    #[test]
    fn test_payload_is_aligned() {
        let allocator = TrackedAllocator::new();
        let ptr = allocator.alloc(3).unwrap();
        assert_eq!(ptr as usize % 16, 0);
        unsafe { allocator.dealloc(ptr) };
    }

    #[test]
    fn test_realloc_preserves_contents() {
        let allocator = TrackedAllocator::new();
        let ptr = allocator.alloc(4).unwrap();
        unsafe {
            std::ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), ptr, 4);
            let grown = allocator.realloc(ptr, 64).unwrap();
            assert_eq!(std::slice::from_raw_parts(grown, 4), &[1, 2, 3, 4]);
            assert_eq!(allocator.stats().bytes_in_use, 64);
            let shrunk = allocator.realloc(grown, 2).unwrap();
            assert_eq!(std::slice::from_raw_parts(shrunk, 2), &[1, 2]);
            assert_eq!(allocator.stats().bytes_in_use, 2);
            allocator.dealloc(shrunk);
        }
    }

    #[test]
    fn test_limit_refuses_and_leaves_accounting_alone() {
        let allocator = TrackedAllocator::new();
        allocator.set_limit(Some(100));
        let ptr = allocator.alloc(60).unwrap();
        assert!(matches!(
            allocator.alloc(60),
            Err(AllocationError::LimitExceeded { .. })
        ));
        assert_eq!(allocator.stats().bytes_in_use, 60);
        assert_eq!(allocator.stats().failed_allocations, 1);
        unsafe { allocator.dealloc(ptr) };
    }

    #[test]
    fn test_failed_realloc_keeps_original_block() {
        let allocator = TrackedAllocator::new();
        allocator.set_limit(Some(32));
        let ptr = allocator.alloc(8).unwrap();
        unsafe {
            ptr.write_bytes(0xAB, 8);
            assert!(allocator.realloc(ptr, 1024).is_err());
            assert_eq!(std::slice::from_raw_parts(ptr, 8), &[0xAB; 8]);
            assert_eq!(allocator.usable_size(ptr), 8);
            assert_eq!(allocator.stats().bytes_in_use, 8);
            allocator.dealloc(ptr);
        }
    }

    #[test]
    fn test_realloc_of_null_allocates() {
        let allocator = TrackedAllocator::new();
        let ptr = unsafe { allocator.realloc(std::ptr::null_mut(), 16) }.unwrap();
        assert_eq!(allocator.stats().blocks_in_use, 1);
        unsafe { allocator.dealloc(ptr) };
    }
}
