//! Numbers
//!
//! Integers of any size are accepted by the constructors; the accessors on
//! [`Term`] report `Overflow` when an integer does not fit. Floats must be
//! finite.

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::Term;
use crate::types::{Decoder, Encoder};
use infrastructure_nif_api::{
    enif_make_double, enif_make_int, enif_make_int64, enif_make_uint, enif_make_uint64,
};

pub fn make_int(env: Env<'_>, value: i32) -> Term<'_> {
    unsafe { Term::new(env, enif_make_int(env.as_ptr(), value)) }
}

pub fn make_uint(env: Env<'_>, value: u32) -> Term<'_> {
    unsafe { Term::new(env, enif_make_uint(env.as_ptr(), value)) }
}

pub fn make_long(env: Env<'_>, value: i64) -> Term<'_> {
    unsafe { Term::new(env, enif_make_int64(env.as_ptr(), value)) }
}

pub fn make_ulong(env: Env<'_>, value: u64) -> Term<'_> {
    unsafe { Term::new(env, enif_make_uint64(env.as_ptr(), value)) }
}

/// Float term
///
/// # Returns
/// * `Err(NifError::BadArg)` - `value` is NaN or infinite
pub fn make_double(env: Env<'_>, value: f64) -> NifResult<Term<'_>> {
    // Checked here so a rejected float leaves no exception in the call.
    if !value.is_finite() {
        return Err(NifError::BadArg);
    }
    Ok(unsafe { Term::new(env, enif_make_double(env.as_ptr(), value)) })
}

macro_rules! impl_number {
    ($ty:ty, $make:ident, $get:ident) => {
        impl Encoder for $ty {
            fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
                Ok($make(env, *self))
            }
        }

        impl<'a> Decoder<'a> for $ty {
            fn decode(term: Term<'a>) -> NifResult<Self> {
                term.$get()
            }
        }
    };
}

impl_number!(i32, make_int, get_int);
impl_number!(u32, make_uint, get_uint);
impl_number!(i64, make_long, get_long);
impl_number!(u64, make_ulong, get_ulong);

impl Encoder for f64 {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        make_double(env, *self)
    }
}

impl<'a> Decoder<'a> for f64 {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        term.get_double()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::TermType;
    use infrastructure_nif_api::nif_env::EnvKind;
    use infrastructure_nif_api::ErlNifEnv;

    #[test]
    fn test_narrow_targets_overflow() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let big = make_long(env, i64::from(i32::MAX) + 1);
        assert_eq!(big.get_int(), Err(NifError::Overflow));
        assert_eq!(big.get_long(), Ok(i64::from(i32::MAX) + 1));
        assert_eq!(make_int(env, -1).get_uint(), Err(NifError::Overflow));
        assert_eq!(make_ulong(env, u64::MAX).get_ulong(), Ok(u64::MAX));
        assert_eq!(make_ulong(env, u64::MAX).get_long(), Err(NifError::Overflow));
    }

    #[test]
    fn test_doubles() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        assert_eq!(make_double(env, f64::NAN), Err(NifError::BadArg));
        assert_eq!(make_double(env, f64::INFINITY), Err(NifError::BadArg));
        assert!(env.pending_exception().is_none());
        let pi = make_double(env, 3.25).unwrap();
        assert_eq!(pi.term_type(), TermType::Float);
        assert_eq!(pi.get_double(), Ok(3.25));
        // A float is not an integer, so this is a type error.
        assert_eq!(pi.get_int(), Err(NifError::BadArg));
        assert_eq!(make_int(env, 3).get_double(), Err(NifError::BadArg));
    }

    #[test]
    fn test_order_and_identity_differ_across_number_kinds() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let one = make_int(env, 1);
        let one_float = make_double(env, 1.0).unwrap();
        assert_eq!(one.compare_to(one_float), std::cmp::Ordering::Equal);
        assert_ne!(one, one_float);
        assert_eq!(one, make_long(env, 1));
        assert_eq!(one.compare_to(make_int(env, 2)), std::cmp::Ordering::Less);
    }
}
