//! Memory Functions
//!
//! `enif_alloc`, `enif_realloc` and `enif_free` draw from the runtime's
//! tracked allocator, so native allocations show up in its accounting and
//! are subject to its limit. Blocks from this family must only be freed with
//! [`enif_free`].

use std::os::raw::c_void;
use usecases_memory_management::{get_global_allocator, Allocator};

/// Allocate `size` bytes
///
/// # Returns
///
/// * Pointer to uninitialized memory, aligned for any primitive type
/// * Null if the allocator is exhausted or over its limit
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_alloc()` - C implementation
pub unsafe extern "C" fn enif_alloc(size: usize) -> *mut c_void {
    match get_global_allocator().alloc(size) {
        Ok(ptr) => ptr as *mut c_void,
        Err(err) => {
            log::trace!("enif_alloc({}) failed: {}", size, err);
            std::ptr::null_mut()
        }
    }
}

/// Resize a block from [`enif_alloc`]
///
/// A null `ptr` behaves like [`enif_alloc`]. On failure null is returned
/// and the original block is left untouched.
pub unsafe extern "C" fn enif_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    if ptr.is_null() {
        return enif_alloc(size);
    }
    match get_global_allocator().realloc(ptr as *mut u8, size) {
        Ok(ptr) => ptr as *mut c_void,
        Err(err) => {
            log::trace!("enif_realloc({}) failed: {}", size, err);
            std::ptr::null_mut()
        }
    }
}

/// Free a block from [`enif_alloc`] or [`enif_realloc`]; null is ignored.
pub unsafe extern "C" fn enif_free(ptr: *mut c_void) {
    if !ptr.is_null() {
        get_global_allocator().dealloc(ptr as *mut u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_realloc_free() {
        unsafe {
            let ptr = enif_alloc(8) as *mut u8;
            assert!(!ptr.is_null());
            std::ptr::copy_nonoverlapping(b"12345678".as_ptr(), ptr, 8);
            let grown = enif_realloc(ptr as *mut c_void, 64) as *mut u8;
            assert!(!grown.is_null());
            assert_eq!(std::slice::from_raw_parts(grown, 8), b"12345678");
            enif_free(grown as *mut c_void);
            enif_free(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_realloc_null_allocates() {
        unsafe {
            let ptr = enif_realloc(std::ptr::null_mut(), 4);
            assert!(!ptr.is_null());
            enif_free(ptr);
        }
    }
}
