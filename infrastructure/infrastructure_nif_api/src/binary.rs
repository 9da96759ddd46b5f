//! Binary Functions
//!
//! Two kinds of `ErlNifBinary`:
//!
//! - **Owned**: created by [`enif_alloc_binary`]. Native code may write to
//!   `data` and must either hand it to the runtime with [`enif_make_binary`]
//!   or give it back with [`enif_release_binary`].
//! - **Borrowed**: filled in by [`enif_inspect_binary`]. A read-only view
//!   into a binary term, valid as long as the term.

use crate::heap::{binary_bytes, HeapObject};
use crate::nif_env::{env_mut, ErlNifEnv};
use crate::{ErlNifBinary, ERL_NIF_TERM};
use entities_data_handling::eterm;
use std::os::raw::{c_int, c_void};

/// Bytes behind an owned binary
unsafe fn owned_bytes<'a>(bin: &ErlNifBinary) -> Option<&'a mut Vec<u8>> {
    (bin.ref_bin as *mut Vec<u8>).as_mut()
}

/// Allocate an owned binary of `size` zeroed bytes
///
/// # Returns
///
/// * `1` - `*bin` describes the new binary
/// * `0` - `bin` is null
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_alloc_binary()` - C implementation
pub unsafe extern "C" fn enif_alloc_binary(size: usize, bin: *mut ErlNifBinary) -> c_int {
    let Some(bin) = bin.as_mut() else {
        return 0;
    };
    let mut bytes = Box::new(vec![0u8; size]);
    bin.size = size;
    bin.data = bytes.as_mut_ptr();
    bin.ref_bin = Box::into_raw(bytes) as *mut c_void;
    1
}

/// Resize an owned binary, keeping `min(old, new)` bytes
///
/// `data` may move.
pub unsafe extern "C" fn enif_realloc_binary(bin: *mut ErlNifBinary, size: usize) -> c_int {
    let Some(bin) = bin.as_mut() else {
        return 0;
    };
    let Some(bytes) = owned_bytes(bin) else {
        return 0;
    };
    bytes.resize(size, 0);
    bin.size = size;
    bin.data = bytes.as_mut_ptr();
    1
}

/// Give back an owned binary that was not turned into a term
///
/// Borrowed binaries are left alone.
pub unsafe extern "C" fn enif_release_binary(bin: *mut ErlNifBinary) {
    let Some(bin) = bin.as_mut() else {
        return;
    };
    if !bin.ref_bin.is_null() {
        drop(Box::from_raw(bin.ref_bin as *mut Vec<u8>));
    }
    *bin = ErlNifBinary::default();
}

/// Turn a binary into a term
///
/// An owned binary is moved onto the heap of `env` and `*bin` no longer
/// owns anything. A borrowed binary is copied.
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_binary()` - C implementation
pub unsafe extern "C" fn enif_make_binary(env: *mut ErlNifEnv, bin: *mut ErlNifBinary) -> ERL_NIF_TERM {
    let (Some(env), Some(bin)) = (env_mut(env), bin.as_mut()) else {
        return eterm::THE_NON_VALUE;
    };
    let bytes: Box<[u8]> = if bin.ref_bin.is_null() {
        if bin.data.is_null() {
            Box::default()
        } else {
            Box::from(std::slice::from_raw_parts(bin.data, bin.size))
        }
    } else {
        let mut owned = *Box::from_raw(bin.ref_bin as *mut Vec<u8>);
        owned.truncate(bin.size);
        owned.into_boxed_slice()
    };
    bin.ref_bin = std::ptr::null_mut();
    env.heap.alloc_boxed(HeapObject::Binary(bytes))
}

/// Borrow the bytes of a binary term
///
/// # Returns
///
/// * `1` - `*bin` is a read-only view of `term`
/// * `0` - `term` is not a binary
pub unsafe extern "C" fn enif_inspect_binary(
    _env: *mut ErlNifEnv,
    term: ERL_NIF_TERM,
    bin: *mut ErlNifBinary,
) -> c_int {
    let (Some(bytes), Some(bin)) = (binary_bytes(term), bin.as_mut()) else {
        return 0;
    };
    *bin = ErlNifBinary {
        size: bytes.len(),
        data: bytes.as_ptr() as *mut u8,
        ..ErlNifBinary::default()
    };
    1
}

/// Allocate a binary term of `size` zeroed bytes and return its data
///
/// The bytes may be written until the call returns.
///
/// # Returns
///
/// * Pointer to the bytes, with `*termp` set to the new term
/// * Null if `env` or `termp` is null
pub unsafe extern "C" fn enif_make_new_binary(
    env: *mut ErlNifEnv,
    size: usize,
    termp: *mut ERL_NIF_TERM,
) -> *mut u8 {
    let Some(env) = env_mut(env) else {
        return std::ptr::null_mut();
    };
    if termp.is_null() {
        return std::ptr::null_mut();
    }
    let mut bytes = vec![0u8; size].into_boxed_slice();
    let data = bytes.as_mut_ptr();
    *termp = env.heap.alloc_boxed(HeapObject::Binary(bytes));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif_env::EnvKind;

    #[test]
    fn test_owned_binary_becomes_term() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        let mut bin = ErlNifBinary::default();
        unsafe {
            assert_eq!(enif_alloc_binary(3, &mut bin), 1);
            std::ptr::copy_nonoverlapping(b"abc".as_ptr(), bin.data, 3);
            assert_eq!(enif_realloc_binary(&mut bin, 5), 1);
            *bin.data.add(3) = b'd';
            *bin.data.add(4) = b'e';
            let term = enif_make_binary(&mut env, &mut bin);
            assert!(bin.ref_bin.is_null());

            let mut view = ErlNifBinary::default();
            assert_eq!(enif_inspect_binary(&mut env, term, &mut view), 1);
            assert_eq!(std::slice::from_raw_parts(view.data, view.size), b"abcde");
        }
    }

    #[test]
    fn test_release_resets_descriptor() {
        let mut bin = ErlNifBinary::default();
        unsafe {
            enif_alloc_binary(16, &mut bin);
            enif_release_binary(&mut bin);
        }
        assert_eq!(bin.size, 0);
        assert!(bin.data.is_null());
        assert!(bin.ref_bin.is_null());
    }

    #[test]
    fn test_make_new_binary_is_writable() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        let mut term = 0;
        unsafe {
            let data = enif_make_new_binary(&mut env, 2, &mut term);
            *data = 7;
            *data.add(1) = 9;
            assert_eq!(binary_bytes(term), Some(&[7u8, 9][..]));
            assert_eq!(enif_inspect_binary(&mut env, eterm::NIL, &mut ErlNifBinary::default()), 0);
        }
    }
}
