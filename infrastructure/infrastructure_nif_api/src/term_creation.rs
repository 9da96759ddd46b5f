//! Term Creation Functions
//!
//! The `enif_make_*` constructors. Every constructed term lives on the heap
//! of the environment passed in. Constructors that can fail (invalid atom
//! text, non-finite floats) raise `badarg` in that environment and return
//! the non-value, exactly like their C counterparts.

use crate::atom_table::get_global_atom_table;
use crate::error_handling::enif_make_badarg;
use crate::heap::HeapObject;
use crate::nif_env::{env_mut, ErlNifEnv};
use crate::resource_management::next_ref_id;
use crate::{ErlNifCharEncoding, ErlNifPid, ErlNifSInt64, ErlNifUInt64, ERL_NIF_TERM};
use entities_data_handling::eterm::{self, Eterm};
use entities_data_handling::AtomEncoding;
use malachite::Integer;
use std::ffi::CStr;
use std::os::raw::{c_char, c_double, c_int, c_long, c_uint, c_ulong};

fn atom_encoding(encoding: ErlNifCharEncoding) -> AtomEncoding {
    match encoding {
        ErlNifCharEncoding::ERL_NIF_LATIN1 => AtomEncoding::Latin1,
        ErlNifCharEncoding::ERL_NIF_UTF8 => AtomEncoding::Utf8,
    }
}

unsafe fn bytes<'a>(ptr: *const c_char, len: usize) -> &'a [u8] {
    if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr as *const u8, len)
    }
}

/// Create an atom from a NUL-terminated Latin1 name
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_atom()` - C implementation
pub unsafe extern "C" fn enif_make_atom(env: *mut ErlNifEnv, name: *const c_char) -> ERL_NIF_TERM {
    if name.is_null() {
        return make_badarg_raw(env);
    }
    let len = CStr::from_ptr(name).to_bytes().len();
    enif_make_atom_len(env, name, len)
}

/// Create an atom from a Latin1 name of `len` bytes
///
/// # Returns
///
/// * `ERL_NIF_TERM` - The atom, or the non-value with `badarg` raised if
///   the name is too long or the atom table is full
pub unsafe extern "C" fn enif_make_atom_len(
    env: *mut ErlNifEnv,
    name: *const c_char,
    len: usize,
) -> ERL_NIF_TERM {
    match get_global_atom_table().put_index(bytes(name, len), AtomEncoding::Latin1) {
        Ok(index) => eterm::make_atom(index),
        Err(_) => make_badarg_raw(env),
    }
}

/// Create an atom from a name in the given encoding
pub unsafe extern "C" fn enif_make_atom_len_encoded(
    env: *mut ErlNifEnv,
    name: *const c_char,
    len: usize,
    encoding: ErlNifCharEncoding,
) -> ERL_NIF_TERM {
    match get_global_atom_table().put_index(bytes(name, len), atom_encoding(encoding)) {
        Ok(index) => eterm::make_atom(index),
        Err(_) => make_badarg_raw(env),
    }
}

/// Look up an existing atom
///
/// # Arguments
///
/// * `env` - NIF environment
/// * `name` - Atom name bytes
/// * `len` - Length of `name`
/// * `atom` - Receives the atom term
/// * `encoding` - Encoding of `name`
///
/// # Returns
///
/// * `1` - The atom exists and `*atom` is set
/// * `0` - No such atom; none is created
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_existing_atom_len()` - C implementation
pub unsafe extern "C" fn enif_make_existing_atom_len(
    _env: *mut ErlNifEnv,
    name: *const c_char,
    len: usize,
    atom: *mut ERL_NIF_TERM,
    encoding: ErlNifCharEncoding,
) -> c_int {
    match get_global_atom_table().get(bytes(name, len), atom_encoding(encoding)) {
        Some(index) => {
            if !atom.is_null() {
                *atom = eterm::make_atom(index);
            }
            1
        }
        None => 0,
    }
}

unsafe fn make_badarg_raw(env: *mut ErlNifEnv) -> ERL_NIF_TERM {
    match env_mut(env) {
        Some(env) => enif_make_badarg(env),
        None => eterm::THE_NON_VALUE,
    }
}

unsafe fn make_integer(env: *mut ErlNifEnv, value: Integer) -> ERL_NIF_TERM {
    match env_mut(env) {
        Some(env) => env.heap.integer(value),
        None => eterm::THE_NON_VALUE,
    }
}

/// Create an integer term from a C `int`
pub unsafe extern "C" fn enif_make_int(_env: *mut ErlNifEnv, value: c_int) -> ERL_NIF_TERM {
    // Every `int` fits a small integer.
    eterm::make_small(i64::from(value)).unwrap_or(eterm::THE_NON_VALUE)
}

/// Create an integer term from a C `unsigned int`
pub unsafe extern "C" fn enif_make_uint(_env: *mut ErlNifEnv, value: c_uint) -> ERL_NIF_TERM {
    eterm::make_small(i64::from(value)).unwrap_or(eterm::THE_NON_VALUE)
}

/// Create an integer term from a C `long`
///
/// Values outside the small range are stored as bignums on the heap.
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_long()` - C implementation
pub unsafe extern "C" fn enif_make_long(env: *mut ErlNifEnv, value: c_long) -> ERL_NIF_TERM {
    enif_make_int64(env, value as ErlNifSInt64)
}

/// Create an integer term from a C `unsigned long`
pub unsafe extern "C" fn enif_make_ulong(env: *mut ErlNifEnv, value: c_ulong) -> ERL_NIF_TERM {
    enif_make_uint64(env, value as ErlNifUInt64)
}

pub unsafe extern "C" fn enif_make_int64(env: *mut ErlNifEnv, value: ErlNifSInt64) -> ERL_NIF_TERM {
    match eterm::make_small(value) {
        Some(term) => term,
        None => make_integer(env, Integer::from(value)),
    }
}

pub unsafe extern "C" fn enif_make_uint64(env: *mut ErlNifEnv, value: ErlNifUInt64) -> ERL_NIF_TERM {
    match i64::try_from(value).ok().and_then(eterm::make_small) {
        Some(term) => term,
        None => make_integer(env, Integer::from(value)),
    }
}

/// Create a float term
///
/// # Returns
///
/// * `ERL_NIF_TERM` - The float, or the non-value with `badarg` raised if
///   `value` is NaN or infinite
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_double()` - C implementation
pub unsafe extern "C" fn enif_make_double(env: *mut ErlNifEnv, value: c_double) -> ERL_NIF_TERM {
    let Some(env) = env_mut(env) else {
        return eterm::THE_NON_VALUE;
    };
    if !value.is_finite() {
        return enif_make_badarg(env);
    }
    env.heap.alloc_boxed(HeapObject::Float(value))
}

/// Create a tuple from `cnt` terms
pub unsafe extern "C" fn enif_make_tuple_from_array(
    env: *mut ErlNifEnv,
    arr: *const ERL_NIF_TERM,
    cnt: c_uint,
) -> ERL_NIF_TERM {
    let Some(env) = env_mut(env) else {
        return eterm::THE_NON_VALUE;
    };
    let elements: Box<[Eterm]> = term_slice(arr, cnt).into();
    env.heap.alloc_boxed(HeapObject::Tuple(elements))
}

/// Create a proper list from `cnt` terms
pub unsafe extern "C" fn enif_make_list_from_array(
    env: *mut ErlNifEnv,
    arr: *const ERL_NIF_TERM,
    cnt: c_uint,
) -> ERL_NIF_TERM {
    let Some(env) = env_mut(env) else {
        return eterm::THE_NON_VALUE;
    };
    env.heap.list_from(term_slice(arr, cnt))
}

unsafe fn term_slice<'a>(arr: *const ERL_NIF_TERM, cnt: c_uint) -> &'a [Eterm] {
    if cnt == 0 || arr.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(arr, cnt as usize)
    }
}

/// Create a list cell `[car | cdr]`
pub unsafe extern "C" fn enif_make_list_cell(
    env: *mut ErlNifEnv,
    car: ERL_NIF_TERM,
    cdr: ERL_NIF_TERM,
) -> ERL_NIF_TERM {
    match env_mut(env) {
        Some(env) => env.heap.cons(car, cdr),
        None => eterm::THE_NON_VALUE,
    }
}

/// The empty list
pub unsafe extern "C" fn enif_make_empty_list(_env: *mut ErlNifEnv) -> ERL_NIF_TERM {
    eterm::NIL
}

/// Create a character list from `len` bytes of text
///
/// Latin1 text maps each byte to one character. UTF-8 text is decoded to
/// code points; malformed UTF-8 raises `badarg`.
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_string_len()` - C implementation
pub unsafe extern "C" fn enif_make_string_len(
    env: *mut ErlNifEnv,
    string: *const c_char,
    len: usize,
    encoding: ErlNifCharEncoding,
) -> ERL_NIF_TERM {
    let Some(env) = env_mut(env) else {
        return eterm::THE_NON_VALUE;
    };
    let text = bytes(string, len);
    let chars: Vec<Eterm> = match encoding {
        ErlNifCharEncoding::ERL_NIF_LATIN1 => text
            .iter()
            .filter_map(|&b| eterm::make_small(i64::from(b)))
            .collect(),
        ErlNifCharEncoding::ERL_NIF_UTF8 => match std::str::from_utf8(text) {
            Ok(text) => text
                .chars()
                .filter_map(|c| eterm::make_small(i64::from(u32::from(c))))
                .collect(),
            Err(_) => return enif_make_badarg(env),
        },
    };
    env.heap.list_from(&chars)
}

/// Create a character list from a NUL-terminated string
pub unsafe extern "C" fn enif_make_string(
    env: *mut ErlNifEnv,
    string: *const c_char,
    encoding: ErlNifCharEncoding,
) -> ERL_NIF_TERM {
    if string.is_null() {
        return make_badarg_raw(env);
    }
    let len = CStr::from_ptr(string).to_bytes().len();
    enif_make_string_len(env, string, len, encoding)
}

/// Create a new unique reference
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_ref()` - C implementation
pub unsafe extern "C" fn enif_make_ref(env: *mut ErlNifEnv) -> ERL_NIF_TERM {
    match env_mut(env) {
        Some(env) => env.heap.alloc_boxed(HeapObject::Ref(next_ref_id())),
        None => eterm::THE_NON_VALUE,
    }
}

/// Make a pid term from an `ErlNifPid`
pub unsafe extern "C" fn enif_make_pid(_env: *mut ErlNifEnv, pid: *const ErlNifPid) -> ERL_NIF_TERM {
    match pid.as_ref() {
        Some(pid) => pid.pid,
        None => eterm::THE_NON_VALUE,
    }
}

/// Make a function term `fun Module:Function/Arity`
///
/// Native code cannot create functions; the runtime uses this to hand them
/// to native code.
///
/// # Safety
/// `env` must be a live environment; `module` and `function` must be atoms.
pub unsafe fn erts_make_fun(
    env: *mut ErlNifEnv,
    module: Eterm,
    function: Eterm,
    arity: u32,
) -> ERL_NIF_TERM {
    match env_mut(env) {
        Some(env) if eterm::is_atom(module) && eterm::is_atom(function) => {
            env.heap.alloc_boxed(HeapObject::Fun {
                module,
                function,
                arity,
            })
        }
        _ => eterm::THE_NON_VALUE,
    }
}

/// Make a port term for port number `number`
pub fn erts_make_port(number: u64) -> ERL_NIF_TERM {
    eterm::make_port(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{float_value, integer_ref, list_cell, tuple_elements};
    use crate::nif_env::EnvKind;

    fn env() -> Box<ErlNifEnv> {
        Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent))
    }

    #[test]
    fn test_make_atom_is_interned() {
        let mut env = env();
        unsafe {
            let a = enif_make_atom(&mut *env, c"term_creation_atom".as_ptr());
            let b = enif_make_atom_len(&mut *env, c"term_creation_atom".as_ptr(), 18);
            assert_eq!(a, b);
            assert!(eterm::is_atom(a));
        }
    }

    #[test]
    fn test_make_existing_atom() {
        let mut env = env();
        let mut out = 0;
        unsafe {
            enif_make_atom(&mut *env, c"surely_exists".as_ptr());
            assert_eq!(
                enif_make_existing_atom_len(
                    &mut *env,
                    c"surely_exists".as_ptr(),
                    13,
                    &mut out,
                    ErlNifCharEncoding::ERL_NIF_LATIN1
                ),
                1
            );
            assert_eq!(
                enif_make_existing_atom_len(
                    &mut *env,
                    c"never_made_by_anyone_42".as_ptr(),
                    23,
                    &mut out,
                    ErlNifCharEncoding::ERL_NIF_LATIN1
                ),
                0
            );
        }
    }

    #[test]
    fn test_integers_switch_to_bignum() {
        let mut env = env();
        unsafe {
            let small = enif_make_long(&mut *env, 42);
            assert!(eterm::is_small(small));
            let big = enif_make_int64(&mut *env, i64::MIN);
            assert!(eterm::is_boxed(big));
            assert_eq!(integer_ref(big).and_then(|i| i.to_i64()), Some(i64::MIN));
            let big = enif_make_uint64(&mut *env, u64::MAX);
            assert_eq!(integer_ref(big).and_then(|i| i.to_u64()), Some(u64::MAX));
        }
    }

    #[test]
    fn test_non_finite_double_raises_badarg() {
        let mut env = env();
        unsafe {
            let ok = enif_make_double(&mut *env, 2.5);
            assert_eq!(float_value(ok), Some(2.5));
            let bad = enif_make_double(&mut *env, f64::NAN);
            assert_eq!(bad, eterm::THE_NON_VALUE);
            assert!(env.take_exception().is_some());
        }
    }

    #[test]
    fn test_tuple_and_list() {
        let mut env = env();
        unsafe {
            let items = [enif_make_int(&mut *env, 1), enif_make_int(&mut *env, 2)];
            let tuple = enif_make_tuple_from_array(&mut *env, items.as_ptr(), 2);
            assert_eq!(tuple_elements(tuple), Some(&items[..]));
            let list = enif_make_list_from_array(&mut *env, items.as_ptr(), 2);
            assert_eq!(list_cell(list).map(|(h, _)| h), Some(items[0]));
            assert_eq!(enif_make_list_from_array(&mut *env, std::ptr::null(), 0), eterm::NIL);
        }
    }

    #[test]
    fn test_string_encodings() {
        let mut env = env();
        unsafe {
            let latin1 = enif_make_string_len(
                &mut *env,
                [0xE5u8].as_ptr() as *const c_char,
                1,
                ErlNifCharEncoding::ERL_NIF_LATIN1,
            );
            assert_eq!(list_cell(latin1).map(|(h, _)| eterm::small_value(h)), Some(0xE5));
            let bad = enif_make_string_len(
                &mut *env,
                [0xFFu8].as_ptr() as *const c_char,
                1,
                ErlNifCharEncoding::ERL_NIF_UTF8,
            );
            assert_eq!(bad, eterm::THE_NON_VALUE);
        }
    }

    #[test]
    fn test_refs_are_unique() {
        let mut env = env();
        unsafe {
            let a = enif_make_ref(&mut *env);
            let b = enif_make_ref(&mut *env);
            assert_eq!(crate::comparison::enif_is_identical(a, a), 1);
            assert_eq!(crate::comparison::enif_is_identical(a, b), 0);
        }
    }
}
