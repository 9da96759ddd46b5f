//! Term Comparison
//!
//! The standard term order: number < atom < reference < fun < port < pid <
//! tuple < map < nil < list < bitstring. Numbers compare by value, so `1`
//! and `1.0` are equal under [`enif_compare`]; the exact order used for map
//! keys and [`enif_is_identical`] sorts an integer before an equal float.

use crate::atom_table::atom_text;
use crate::heap::{self, boxed_object, classify, HeapObject, IntegerRef};
use crate::resource_management::resource_id;
use crate::ERL_NIF_TERM;
use entities_data_handling::eterm::{self, Eterm};
use entities_data_handling::TermClass;
use malachite::Integer;
use std::cmp::Ordering;
use std::os::raw::c_int;
use std::str::FromStr;

/// Compare two terms in the standard term order.
///
/// With `exact`, integers sort before floats of equal value and `-0.0`
/// before `0.0`, so only identical terms compare equal.
///
/// # Safety
/// Both terms must be live.
pub unsafe fn compare(a: Eterm, b: Eterm, exact: bool) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let (class_a, class_b) = (classify(a), classify(b));
    if class_a != class_b {
        return class_a.cmp(&class_b);
    }
    match class_a {
        TermClass::Number => compare_numbers(a, b, exact),
        TermClass::Atom => atom_text(a).cmp(&atom_text(b)),
        TermClass::Reference => reference_id(a).cmp(&reference_id(b)),
        TermClass::Fun => compare_funs(a, b),
        TermClass::Port => eterm::port_number(a).cmp(&eterm::port_number(b)),
        TermClass::Pid => eterm::pid_number(a).cmp(&eterm::pid_number(b)),
        TermClass::Tuple => {
            let ta = heap::tuple_elements(a).unwrap_or_default();
            let tb = heap::tuple_elements(b).unwrap_or_default();
            ta.len()
                .cmp(&tb.len())
                .then_with(|| compare_slices(ta, tb, exact))
        }
        TermClass::Map => {
            let ma = heap::map_entries(a).unwrap_or_default();
            let mb = heap::map_entries(b).unwrap_or_default();
            ma.len()
                .cmp(&mb.len())
                .then_with(|| {
                    ma.iter()
                        .zip(mb)
                        .map(|(ea, eb)| compare(ea.0, eb.0, true))
                        .find(|o| o.is_ne())
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| {
                    ma.iter()
                        .zip(mb)
                        .map(|(ea, eb)| compare(ea.1, eb.1, exact))
                        .find(|o| o.is_ne())
                        .unwrap_or(Ordering::Equal)
                })
        }
        TermClass::Nil => Ordering::Equal,
        TermClass::List => compare_lists(a, b, exact),
        TermClass::Bitstring => heap::binary_bytes(a).cmp(&heap::binary_bytes(b)),
    }
}

unsafe fn compare_slices(a: &[Eterm], b: &[Eterm], exact: bool) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| compare(x, y, exact))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

unsafe fn compare_lists(mut a: Eterm, mut b: Eterm, exact: bool) -> Ordering {
    loop {
        match (heap::list_cell(a), heap::list_cell(b)) {
            (Some((ha, ta)), Some((hb, tb))) => {
                let order = compare(ha, hb, exact);
                if order.is_ne() {
                    return order;
                }
                a = ta;
                b = tb;
            }
            // At least one side has reached a tail that is not a cell.
            _ => return compare(a, b, exact),
        }
    }
}

unsafe fn reference_id(term: Eterm) -> u64 {
    match boxed_object(term) {
        Some(HeapObject::Ref(id)) => *id,
        Some(HeapObject::Resource(obj)) => resource_id(*obj),
        _ => 0,
    }
}

unsafe fn compare_funs(a: Eterm, b: Eterm) -> Ordering {
    match (boxed_object(a), boxed_object(b)) {
        (
            Some(HeapObject::Fun {
                module: ma,
                function: fa,
                arity: aa,
            }),
            Some(HeapObject::Fun {
                module: mb,
                function: fb,
                arity: ab,
            }),
        ) => atom_text(*ma)
            .cmp(&atom_text(*mb))
            .then_with(|| atom_text(*fa).cmp(&atom_text(*fb)))
            .then_with(|| aa.cmp(ab)),
        _ => Ordering::Equal,
    }
}

unsafe fn compare_numbers(a: Eterm, b: Eterm, exact: bool) -> Ordering {
    match (heap::integer_ref(a), heap::integer_ref(b)) {
        (Some(IntegerRef::Small(x)), Some(IntegerRef::Small(y))) => x.cmp(&y),
        (Some(x), Some(y)) => x.to_integer().cmp(&y.to_integer()),
        (Some(x), None) => compare_int_float(x, heap::float_value(b).unwrap_or(0.0), exact),
        (None, Some(y)) => compare_int_float(y, heap::float_value(a).unwrap_or(0.0), exact).reverse(),
        (None, None) => {
            let x = heap::float_value(a).unwrap_or(0.0);
            let y = heap::float_value(b).unwrap_or(0.0);
            match x.partial_cmp(&y) {
                Some(Ordering::Equal) if exact => x.is_sign_positive().cmp(&y.is_sign_positive()),
                Some(order) => order,
                None => Ordering::Equal,
            }
        }
    }
}

/// Compare an integer with a finite float without losing precision on
/// either side.
fn compare_int_float(int: IntegerRef<'_>, float: f64, exact: bool) -> Ordering {
    let whole = float.trunc();
    let order = match Integer::from_str(&format!("{:.0}", whole)) {
        Ok(whole) => int.to_integer().cmp(&whole),
        Err(_) => Ordering::Equal,
    };
    if order.is_ne() {
        return order;
    }
    let fraction = float - whole;
    if fraction > 0.0 {
        Ordering::Less
    } else if fraction < 0.0 {
        Ordering::Greater
    } else if exact {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

/// Compare two terms
///
/// # Returns
///
/// * `< 0` - `lhs` sorts before `rhs`
/// * `0` - `lhs` and `rhs` are equal (`1 == 1.0`)
/// * `> 0` - `lhs` sorts after `rhs`
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_compare()` - C implementation
pub unsafe extern "C" fn enif_compare(lhs: ERL_NIF_TERM, rhs: ERL_NIF_TERM) -> c_int {
    match compare(lhs, rhs, false) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// True if two terms are identical (`=:=`)
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_is_identical()` - C implementation
pub unsafe extern "C" fn enif_is_identical(lhs: ERL_NIF_TERM, rhs: ERL_NIF_TERM) -> c_int {
    c_int::from(compare(lhs, rhs, true).is_eq())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif_env::{EnvKind, ErlNifEnv};
    use crate::term_creation::*;

    #[test]
    fn test_class_order() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            let e = &mut env as *mut ErlNifEnv;
            let number = enif_make_int(e, 100);
            let atom = enif_make_atom(e, c"a".as_ptr());
            let reference = enif_make_ref(e);
            let tuple = enif_make_tuple_from_array(e, [number].as_ptr(), 1);
            let list = enif_make_list_from_array(e, [number].as_ptr(), 1);
            let ordered = [number, atom, reference, tuple, eterm::NIL, list];
            for pair in ordered.windows(2) {
                assert_eq!(enif_compare(pair[0], pair[1]), -1);
                assert_eq!(enif_compare(pair[1], pair[0]), 1);
            }
        }
    }

    #[test]
    fn test_int_float_equality() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            let e = &mut env as *mut ErlNifEnv;
            let one = enif_make_int(e, 1);
            let one_f = enif_make_double(e, 1.0);
            let one_half = enif_make_double(e, 1.5);
            assert_eq!(enif_compare(one, one_f), 0);
            assert_eq!(enif_is_identical(one, one_f), 0);
            assert_eq!(enif_compare(one, one_half), -1);
            let two = enif_make_int(e, 2);
            assert_eq!(enif_compare(two, one_half), 1);
        }
    }

    #[test]
    fn test_bignum_against_float() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            let e = &mut env as *mut ErlNifEnv;
            // 2^63 is exactly representable as a float.
            let big = enif_make_uint64(e, 1u64 << 63);
            let float = enif_make_double(e, 9_223_372_036_854_775_808.0);
            assert_eq!(enif_compare(big, float), 0);
            let bigger = enif_make_uint64(e, (1u64 << 63) + 1);
            assert_eq!(enif_compare(bigger, float), 1);
        }
    }

    #[test]
    fn test_atoms_compare_by_text() {
        let mut env = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            let e = &mut env as *mut ErlNifEnv;
            // Interned in the opposite order of their text.
            let zebra = enif_make_atom(e, c"cmp_zebra".as_ptr());
            let apple = enif_make_atom(e, c"cmp_apple".as_ptr());
            assert_eq!(enif_compare(apple, zebra), -1);
        }
    }

    #[test]
    fn test_structural_identity_across_heaps() {
        let mut a = ErlNifEnv::new(EnvKind::ProcessIndependent);
        let mut b = ErlNifEnv::new(EnvKind::ProcessIndependent);
        unsafe {
            let s1 = enif_make_string(&mut a, c"same".as_ptr(), crate::ErlNifCharEncoding::ERL_NIF_LATIN1);
            let s2 = enif_make_string(&mut b, c"same".as_ptr(), crate::ErlNifCharEncoding::ERL_NIF_LATIN1);
            assert_ne!(s1, s2);
            assert_eq!(enif_is_identical(s1, s2), 1);
            let shorter = enif_make_string(&mut b, c"sam".as_ptr(), crate::ErlNifCharEncoding::ERL_NIF_LATIN1);
            assert_eq!(enif_compare(shorter, s1), -1);
        }
    }
}
