//! Map Functions
//!
//! Maps are immutable: every update builds a new map on the caller's heap.
//! Entries are kept sorted by key in exact term order, so lookups are a
//! binary search and two maps with the same contents have the same layout.

use crate::comparison::compare;
use crate::heap::{map_entries, HeapObject};
use crate::nif_env::{env_mut, ErlNifEnv};
use crate::ERL_NIF_TERM;
use entities_data_handling::eterm::Eterm;
use std::os::raw::c_int;

unsafe fn find(entries: &[(Eterm, Eterm)], key: Eterm) -> Result<usize, usize> {
    entries.binary_search_by(|(k, _)| compare(*k, key, true))
}

/// Create an empty map
pub unsafe extern "C" fn enif_make_new_map(env: *mut ErlNifEnv) -> ERL_NIF_TERM {
    match env_mut(env) {
        Some(env) => env.heap.alloc_boxed(HeapObject::Map(Vec::new())),
        None => entities_data_handling::eterm::THE_NON_VALUE,
    }
}

/// Insert or replace a key
///
/// # Returns
///
/// * `1` - `*map_out` is a new map with `key` set to `value`
/// * `0` - `map_in` is not a map
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_map_put()` - C implementation
pub unsafe extern "C" fn enif_make_map_put(
    env: *mut ErlNifEnv,
    map_in: ERL_NIF_TERM,
    key: ERL_NIF_TERM,
    value: ERL_NIF_TERM,
    map_out: *mut ERL_NIF_TERM,
) -> c_int {
    let (Some(env), Some(entries)) = (env_mut(env), map_entries(map_in)) else {
        return 0;
    };
    let mut updated = entries.to_vec();
    match find(&updated, key) {
        Ok(at) => updated[at].1 = value,
        Err(at) => updated.insert(at, (key, value)),
    }
    let map = env.heap.alloc_boxed(HeapObject::Map(updated));
    if !map_out.is_null() {
        *map_out = map;
    }
    1
}

/// Look up a key
///
/// # Returns
///
/// * `1` - `*value` is set
/// * `0` - `map` is not a map, or has no such key
pub unsafe extern "C" fn enif_get_map_value(
    _env: *mut ErlNifEnv,
    map: ERL_NIF_TERM,
    key: ERL_NIF_TERM,
    value: *mut ERL_NIF_TERM,
) -> c_int {
    let Some(entries) = map_entries(map) else {
        return 0;
    };
    match find(entries, key) {
        Ok(at) => {
            if !value.is_null() {
                *value = entries[at].1;
            }
            1
        }
        Err(_) => 0,
    }
}

/// Number of entries in a map
pub unsafe extern "C" fn enif_get_map_size(
    _env: *mut ErlNifEnv,
    map: ERL_NIF_TERM,
    size: *mut usize,
) -> c_int {
    match map_entries(map) {
        Some(entries) => {
            if !size.is_null() {
                *size = entries.len();
            }
            1
        }
        None => 0,
    }
}

/// Remove a key; removing a missing key succeeds and yields an equal map.
pub unsafe extern "C" fn enif_make_map_remove(
    env: *mut ErlNifEnv,
    map_in: ERL_NIF_TERM,
    key: ERL_NIF_TERM,
    map_out: *mut ERL_NIF_TERM,
) -> c_int {
    let (Some(env), Some(entries)) = (env_mut(env), map_entries(map_in)) else {
        return 0;
    };
    let mut updated = entries.to_vec();
    if let Ok(at) = find(&updated, key) {
        updated.remove(at);
    }
    let map = env.heap.alloc_boxed(HeapObject::Map(updated));
    if !map_out.is_null() {
        *map_out = map;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::enif_is_identical;
    use crate::nif_env::EnvKind;
    use crate::term_creation::{enif_make_atom, enif_make_double, enif_make_int};

    #[test]
    fn test_put_get_and_size() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            let e = &mut env as *mut ErlNifEnv;
            let empty = enif_make_new_map(e);
            let key = enif_make_atom(e, c"answer".as_ptr());
            let mut map = 0;
            assert_eq!(enif_make_map_put(e, empty, key, enif_make_int(e, 42), &mut map), 1);

            let mut size = 9;
            assert_eq!(enif_get_map_size(e, empty, &mut size), 1);
            assert_eq!(size, 0);
            assert_eq!(enif_get_map_size(e, map, &mut size), 1);
            assert_eq!(size, 1);

            let mut value = 0;
            assert_eq!(enif_get_map_value(e, map, key, &mut value), 1);
            assert_eq!(value, enif_make_int(e, 42));
            assert_eq!(enif_get_map_value(e, empty, key, &mut value), 0);
        }
    }

    #[test]
    fn test_integer_and_float_keys_are_distinct() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            let e = &mut env as *mut ErlNifEnv;
            let mut map = enif_make_new_map(e);
            let one = enif_make_int(e, 1);
            let one_f = enif_make_double(e, 1.0);
            assert_eq!(enif_make_map_put(e, map, one, one, &mut map), 1);
            assert_eq!(enif_make_map_put(e, map, one_f, one_f, &mut map), 1);
            let mut size = 0;
            enif_get_map_size(e, map, &mut size);
            assert_eq!(size, 2);
        }
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            let e = &mut env as *mut ErlNifEnv;
            let a = enif_make_atom(e, c"a".as_ptr());
            let b = enif_make_atom(e, c"b".as_ptr());
            let (mut m1, mut m2) = (enif_make_new_map(e), enif_make_new_map(e));
            enif_make_map_put(e, m1, a, a, &mut m1);
            enif_make_map_put(e, m1, b, b, &mut m1);
            enif_make_map_put(e, m2, b, b, &mut m2);
            enif_make_map_put(e, m2, a, a, &mut m2);
            assert_eq!(enif_is_identical(m1, m2), 1);

            let mut removed = 0;
            assert_eq!(enif_make_map_remove(e, m1, b, &mut removed), 1);
            let mut size = 0;
            enif_get_map_size(e, removed, &mut size);
            assert_eq!(size, 1);
        }
    }
}
