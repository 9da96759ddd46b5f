//! Runtime-accounted Memory
//!
//! Thin wrappers over the `enif_alloc` family. Blocks count against the
//! runtime's allocator and its limit, and must be freed with [`free`];
//! mixing them with the Rust global allocator is undefined behaviour.

use crate::error::{NifError, NifResult};
use infrastructure_nif_api::{enif_alloc, enif_free, enif_realloc};
use std::os::raw::c_void;
use std::ptr::NonNull;

/// Allocate `size` uninitialised bytes
pub fn alloc(size: usize) -> NifResult<NonNull<u8>> {
    NonNull::new(unsafe { enif_alloc(size) } as *mut u8).ok_or(NifError::AllocFailed)
}

/// Allocate `size` zeroed bytes
pub fn calloc(size: usize) -> NifResult<NonNull<u8>> {
    let block = alloc(size)?;
    unsafe { std::ptr::write_bytes(block.as_ptr(), 0, size) };
    Ok(block)
}

/// Resize a block, keeping `min(old, new)` bytes
///
/// On failure `ptr` is still valid and still owned by the caller.
///
/// # Safety
/// `ptr` must come from this module and not have been freed.
pub unsafe fn realloc(ptr: NonNull<u8>, new_size: usize) -> NifResult<NonNull<u8>> {
    NonNull::new(enif_realloc(ptr.as_ptr() as *mut c_void, new_size) as *mut u8).ok_or(NifError::AllocFailed)
}

/// Give a block back
///
/// # Safety
/// `ptr` must come from this module and not have been freed.
pub unsafe fn free(ptr: NonNull<u8>) {
    enif_free(ptr.as_ptr() as *mut c_void)
}
