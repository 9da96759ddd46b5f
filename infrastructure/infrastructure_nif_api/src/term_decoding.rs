//! Term Decoding Functions
//!
//! The `enif_get_*` accessors and `enif_is_*` predicates. Accessors write
//! through an out-pointer and return `1` on success or `0` when the term
//! has the wrong type or does not fit the target. They never raise.

use crate::atom_table::atom_text;
use crate::heap::{self, classify, integer_ref, HeapObject};
use crate::nif_env::ErlNifEnv;
use crate::{
    ErlNifCharEncoding, ErlNifPid, ErlNifSInt64, ErlNifTermType, ErlNifUInt64, ERL_NIF_TERM,
    ERL_NIF_TERM_TYPE_ATOM, ERL_NIF_TERM_TYPE_BITSTRING, ERL_NIF_TERM_TYPE_FLOAT,
    ERL_NIF_TERM_TYPE_FUN, ERL_NIF_TERM_TYPE_INTEGER, ERL_NIF_TERM_TYPE_LIST,
    ERL_NIF_TERM_TYPE_MAP, ERL_NIF_TERM_TYPE_PID, ERL_NIF_TERM_TYPE_PORT,
    ERL_NIF_TERM_TYPE_REFERENCE, ERL_NIF_TERM_TYPE_TUPLE,
};
use entities_data_handling::atom::utf8_to_latin1;
use entities_data_handling::eterm;
use entities_data_handling::TermClass;
use std::os::raw::{c_char, c_double, c_int, c_long, c_uint, c_ulong};

unsafe fn put<T>(out: *mut T, value: T) -> c_int {
    if !out.is_null() {
        *out = value;
    }
    1
}

/// Decode an integer into any primitive integer type that can hold it.
unsafe fn get_integer<T>(term: ERL_NIF_TERM, out: *mut T) -> c_int
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let Some(int) = integer_ref(term) else {
        return 0;
    };
    let value = match int.to_i64() {
        Some(v) => T::try_from(v).ok(),
        None => int.to_u64().and_then(|v| T::try_from(v).ok()),
    };
    match value {
        Some(v) => put(out, v),
        None => 0,
    }
}

/// Get a C `int` from an integer term
///
/// # Returns
///
/// * `1` - `*ip` is set
/// * `0` - Not an integer, or outside the range of `int`
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_get_int()` - C implementation
pub unsafe extern "C" fn enif_get_int(_env: *mut ErlNifEnv, term: ERL_NIF_TERM, ip: *mut c_int) -> c_int {
    get_integer(term, ip)
}

pub unsafe extern "C" fn enif_get_uint(_env: *mut ErlNifEnv, term: ERL_NIF_TERM, ip: *mut c_uint) -> c_int {
    get_integer(term, ip)
}

pub unsafe extern "C" fn enif_get_long(_env: *mut ErlNifEnv, term: ERL_NIF_TERM, ip: *mut c_long) -> c_int {
    get_integer(term, ip)
}

pub unsafe extern "C" fn enif_get_ulong(_env: *mut ErlNifEnv, term: ERL_NIF_TERM, ip: *mut c_ulong) -> c_int {
    get_integer(term, ip)
}

pub unsafe extern "C" fn enif_get_int64(_env: *mut ErlNifEnv, term: ERL_NIF_TERM, ip: *mut ErlNifSInt64) -> c_int {
    get_integer(term, ip)
}

pub unsafe extern "C" fn enif_get_uint64(_env: *mut ErlNifEnv, term: ERL_NIF_TERM, ip: *mut ErlNifUInt64) -> c_int {
    get_integer(term, ip)
}

/// Get a C `double` from a float term
///
/// Integers are not converted, as in the reference runtime.
pub unsafe extern "C" fn enif_get_double(_env: *mut ErlNifEnv, term: ERL_NIF_TERM, dp: *mut c_double) -> c_int {
    match heap::float_value(term) {
        Some(value) => put(dp, value),
        None => 0,
    }
}

/// Atom text in the requested encoding, if representable
fn atom_bytes(term: ERL_NIF_TERM, encoding: ErlNifCharEncoding) -> Option<Vec<u8>> {
    let text = atom_text(term)?;
    match encoding {
        ErlNifCharEncoding::ERL_NIF_LATIN1 => utf8_to_latin1(&text),
        ErlNifCharEncoding::ERL_NIF_UTF8 => Some(text.as_bytes().to_vec()),
    }
}

/// Get the length of an atom's text in bytes, excluding the terminator
///
/// # Returns
///
/// * `0` - Not an atom, or not representable in Latin1 when Latin1 is asked for
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_get_atom_length()` - C implementation
pub unsafe extern "C" fn enif_get_atom_length(
    _env: *mut ErlNifEnv,
    atom: ERL_NIF_TERM,
    len: *mut c_uint,
    encoding: ErlNifCharEncoding,
) -> c_int {
    match atom_bytes(atom, encoding).and_then(|b| c_uint::try_from(b.len()).ok()) {
        Some(n) => put(len, n),
        None => 0,
    }
}

/// Copy an atom's text into `buf` with a NUL terminator
///
/// # Returns
///
/// * Bytes written including the terminator, or `0` if `atom` is not an
///   atom, is not representable, or does not fit in `size` bytes
pub unsafe extern "C" fn enif_get_atom(
    _env: *mut ErlNifEnv,
    atom: ERL_NIF_TERM,
    buf: *mut c_char,
    size: c_uint,
    encoding: ErlNifCharEncoding,
) -> c_int {
    let Some(bytes) = atom_bytes(atom, encoding) else {
        return 0;
    };
    if buf.is_null() || bytes.len() + 1 > size as usize {
        return 0;
    }
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, bytes.len());
    *buf.add(bytes.len()) = 0;
    (bytes.len() + 1) as c_int
}

/// Get the pid of a local process from a pid term
pub unsafe extern "C" fn enif_get_local_pid(
    _env: *mut ErlNifEnv,
    term: ERL_NIF_TERM,
    pid: *mut ErlNifPid,
) -> c_int {
    if eterm::is_pid(term) {
        put(pid, ErlNifPid { pid: term })
    } else {
        0
    }
}

/// Get the arity and elements of a tuple
///
/// `*array` points into the tuple itself and is valid as long as the term.
pub unsafe extern "C" fn enif_get_tuple(
    _env: *mut ErlNifEnv,
    tpl: ERL_NIF_TERM,
    arity: *mut c_int,
    array: *mut *const ERL_NIF_TERM,
) -> c_int {
    let Some(elements) = heap::tuple_elements(tpl) else {
        return 0;
    };
    let Ok(n) = c_int::try_from(elements.len()) else {
        return 0;
    };
    put(arity, n);
    put(array, elements.as_ptr())
}

/// Get the head and tail of a non-empty list
pub unsafe extern "C" fn enif_get_list_cell(
    _env: *mut ErlNifEnv,
    term: ERL_NIF_TERM,
    head: *mut ERL_NIF_TERM,
    tail: *mut ERL_NIF_TERM,
) -> c_int {
    match heap::list_cell(term) {
        Some((h, t)) => {
            put(head, h);
            put(tail, t)
        }
        None => 0,
    }
}

/// Get the length of a proper list
///
/// # Returns
///
/// * `0` - Not a list, or an improper list
pub unsafe extern "C" fn enif_get_list_length(
    _env: *mut ErlNifEnv,
    term: ERL_NIF_TERM,
    len: *mut c_uint,
) -> c_int {
    let mut count: c_uint = 0;
    let mut rest = term;
    while let Some((_, tail)) = heap::list_cell(rest) {
        count = match count.checked_add(1) {
            Some(c) => c,
            None => return 0,
        };
        rest = tail;
    }
    if eterm::is_nil(rest) {
        put(len, count)
    } else {
        0
    }
}

/// Copy a character list into `buf` as NUL-terminated text
///
/// Latin1 writes one byte per character and fails on characters above 255;
/// UTF-8 encodes each code point.
///
/// # Returns
///
/// * Bytes written including the terminator on success
/// * The negated buffer size if the text was truncated to fit
/// * `0` if `list` is not a proper list of characters or `size` is 0
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_get_string()` - C implementation
pub unsafe extern "C" fn enif_get_string(
    _env: *mut ErlNifEnv,
    list: ERL_NIF_TERM,
    buf: *mut c_char,
    size: c_uint,
    encoding: ErlNifCharEncoding,
) -> c_int {
    if buf.is_null() || size == 0 {
        return 0;
    }
    let mut text = Vec::new();
    let mut rest = list;
    while let Some((head, tail)) = heap::list_cell(rest) {
        if !eterm::is_small(head) {
            return 0;
        }
        let code = eterm::small_value(head);
        match encoding {
            ErlNifCharEncoding::ERL_NIF_LATIN1 => match u8::try_from(code) {
                Ok(b) => text.push(b),
                Err(_) => return 0,
            },
            ErlNifCharEncoding::ERL_NIF_UTF8 => {
                let Some(c) = u32::try_from(code).ok().and_then(char::from_u32) else {
                    return 0;
                };
                let mut utf8 = [0u8; 4];
                text.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
        rest = tail;
    }
    if !eterm::is_nil(rest) {
        return 0;
    }
    let capacity = size as usize - 1;
    let written = text.len().min(capacity);
    std::ptr::copy_nonoverlapping(text.as_ptr(), buf as *mut u8, written);
    *buf.add(written) = 0;
    if written < text.len() {
        -(size as c_int)
    } else {
        (written + 1) as c_int
    }
}

/// Type of a term
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_term_type()` - C implementation
pub unsafe extern "C" fn enif_term_type(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> ErlNifTermType {
    match classify(term) {
        TermClass::Number => {
            if heap::float_value(term).is_some() {
                ERL_NIF_TERM_TYPE_FLOAT
            } else {
                ERL_NIF_TERM_TYPE_INTEGER
            }
        }
        TermClass::Atom => ERL_NIF_TERM_TYPE_ATOM,
        TermClass::Reference => ERL_NIF_TERM_TYPE_REFERENCE,
        TermClass::Fun => ERL_NIF_TERM_TYPE_FUN,
        TermClass::Port => ERL_NIF_TERM_TYPE_PORT,
        TermClass::Pid => ERL_NIF_TERM_TYPE_PID,
        TermClass::Tuple => ERL_NIF_TERM_TYPE_TUPLE,
        TermClass::Map => ERL_NIF_TERM_TYPE_MAP,
        TermClass::Nil | TermClass::List => ERL_NIF_TERM_TYPE_LIST,
        TermClass::Bitstring => ERL_NIF_TERM_TYPE_BITSTRING,
    }
}

unsafe fn is_class(term: ERL_NIF_TERM, class: TermClass) -> c_int {
    c_int::from(classify(term) == class)
}

pub unsafe extern "C" fn enif_is_atom(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    c_int::from(eterm::is_atom(term))
}

pub unsafe extern "C" fn enif_is_binary(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    is_class(term, TermClass::Bitstring)
}

pub unsafe extern "C" fn enif_is_list(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    c_int::from(classify(term).is_list())
}

pub unsafe extern "C" fn enif_is_empty_list(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    c_int::from(eterm::is_nil(term))
}

pub unsafe extern "C" fn enif_is_tuple(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    is_class(term, TermClass::Tuple)
}

pub unsafe extern "C" fn enif_is_map(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    is_class(term, TermClass::Map)
}

pub unsafe extern "C" fn enif_is_number(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    is_class(term, TermClass::Number)
}

pub unsafe extern "C" fn enif_is_pid(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    c_int::from(eterm::is_pid(term))
}

pub unsafe extern "C" fn enif_is_port(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    c_int::from(eterm::is_port(term))
}

pub unsafe extern "C" fn enif_is_ref(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    is_class(term, TermClass::Reference)
}

pub unsafe extern "C" fn enif_is_fun(_env: *mut ErlNifEnv, term: ERL_NIF_TERM) -> c_int {
    is_class(term, TermClass::Fun)
}

/// True if `term` is a resource term of any type
pub unsafe fn erts_is_resource(term: ERL_NIF_TERM) -> bool {
    matches!(heap::boxed_object(term), Some(HeapObject::Resource(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif_env::EnvKind;
    use crate::term_creation::*;

    fn env() -> Box<ErlNifEnv> {
        Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent))
    }

    #[test]
    fn test_get_int_ranges() {
        let mut env = env();
        let mut i: c_int = 0;
        let mut u: c_uint = 0;
        let mut l: c_long = 0;
        let mut ul: c_ulong = 0;
        unsafe {
            let t = enif_make_int(&mut *env, 42);
            assert_eq!(enif_get_int(&mut *env, t, &mut i), 1);
            assert_eq!(i, 42);

            let big = enif_make_long(&mut *env, i64::from(i32::MAX) + 1);
            assert_eq!(enif_get_int(&mut *env, big, &mut i), 0);
            assert_eq!(enif_get_long(&mut *env, big, &mut l), 1);

            let neg = enif_make_int(&mut *env, -1);
            assert_eq!(enif_get_uint(&mut *env, neg, &mut u), 0);
            assert_eq!(enif_get_ulong(&mut *env, neg, &mut ul), 0);

            let huge = enif_make_uint64(&mut *env, u64::MAX);
            assert_eq!(enif_get_long(&mut *env, huge, &mut l), 0);
            assert_eq!(enif_get_ulong(&mut *env, huge, &mut ul), 1);
            assert_eq!(ul, u64::MAX as c_ulong);
        }
    }

    #[test]
    fn test_get_double_rejects_integers() {
        let mut env = env();
        let mut d = 0.0;
        unsafe {
            let one = enif_make_int(&mut *env, 1);
            assert_eq!(enif_get_double(&mut *env, one, &mut d), 0);
            let f = enif_make_double(&mut *env, 0.25);
            assert_eq!(enif_get_double(&mut *env, f, &mut d), 1);
        }
        assert_eq!(d, 0.25);
    }

    #[test]
    fn test_atom_length_and_text() {
        let mut env = env();
        let mut len = 0;
        let mut buf = [0 as c_char; 8];
        unsafe {
            let atom = enif_make_atom(&mut *env, c"hello".as_ptr());
            assert_eq!(
                enif_get_atom_length(&mut *env, atom, &mut len, ErlNifCharEncoding::ERL_NIF_LATIN1),
                1
            );
            assert_eq!(len, 5);
            assert_eq!(
                enif_get_atom(&mut *env, atom, buf.as_mut_ptr(), 8, ErlNifCharEncoding::ERL_NIF_LATIN1),
                6
            );
            assert_eq!(
                enif_get_atom(&mut *env, atom, buf.as_mut_ptr(), 5, ErlNifCharEncoding::ERL_NIF_LATIN1),
                0
            );
            let wide = "世界".as_bytes();
            let wide = enif_make_atom_len_encoded(
                &mut *env,
                wide.as_ptr() as *const c_char,
                wide.len(),
                ErlNifCharEncoding::ERL_NIF_UTF8,
            );
            assert_eq!(
                enif_get_atom_length(&mut *env, wide, &mut len, ErlNifCharEncoding::ERL_NIF_LATIN1),
                0
            );
            assert_eq!(
                enif_get_atom_length(&mut *env, wide, &mut len, ErlNifCharEncoding::ERL_NIF_UTF8),
                1
            );
            assert_eq!(len, 6);
        }
    }

    #[test]
    fn test_list_length_rejects_improper_lists() {
        let mut env = env();
        let mut len = 0;
        unsafe {
            let one = enif_make_int(&mut *env, 1);
            let improper = enif_make_list_cell(&mut *env, one, one);
            assert_eq!(enif_get_list_length(&mut *env, improper, &mut len), 0);
            let proper = enif_make_list_cell(&mut *env, one, eterm::NIL);
            assert_eq!(enif_get_list_length(&mut *env, proper, &mut len), 1);
            assert_eq!(enif_get_list_length(&mut *env, eterm::NIL, &mut len), 1);
            assert_eq!(len, 0);
        }
    }

    #[test]
    fn test_get_string_truncates() {
        let mut env = env();
        let mut buf = [0 as c_char; 4];
        unsafe {
            let s = enif_make_string(&mut *env, c"abcdef".as_ptr(), ErlNifCharEncoding::ERL_NIF_LATIN1);
            assert_eq!(
                enif_get_string(&mut *env, s, buf.as_mut_ptr(), 4, ErlNifCharEncoding::ERL_NIF_LATIN1),
                -4
            );
            let s = enif_make_string(&mut *env, c"abc".as_ptr(), ErlNifCharEncoding::ERL_NIF_LATIN1);
            assert_eq!(
                enif_get_string(&mut *env, s, buf.as_mut_ptr(), 4, ErlNifCharEncoding::ERL_NIF_LATIN1),
                4
            );
        }
    }

    #[test]
    fn test_term_types() {
        let mut env = env();
        unsafe {
            let e = &mut *env as *mut ErlNifEnv;
            assert_eq!(enif_term_type(e, enif_make_int(e, 1)), ERL_NIF_TERM_TYPE_INTEGER);
            assert_eq!(enif_term_type(e, enif_make_double(e, 1.0)), ERL_NIF_TERM_TYPE_FLOAT);
            assert_eq!(enif_term_type(e, eterm::NIL), ERL_NIF_TERM_TYPE_LIST);
            assert_eq!(enif_term_type(e, enif_make_ref(e)), ERL_NIF_TERM_TYPE_REFERENCE);
            assert_eq!(enif_term_type(e, erts_make_port(3)), ERL_NIF_TERM_TYPE_PORT);
            let m = enif_make_atom(e, c"m".as_ptr());
            assert_eq!(enif_term_type(e, erts_make_fun(e, m, m, 0)), ERL_NIF_TERM_TYPE_FUN);
            assert_eq!(enif_is_empty_list(e, eterm::NIL), 1);
            assert_eq!(enif_is_list(e, eterm::NIL), 1);
            assert_eq!(enif_is_number(e, enif_make_double(e, 1.0)), 1);
        }
    }
}
