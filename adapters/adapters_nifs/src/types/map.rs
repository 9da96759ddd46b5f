//! Maps
//!
//! Maps are immutable; [`map_put`] and [`map_remove`] return new maps.

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::Term;
use infrastructure_nif_api::{
    enif_get_map_size, enif_get_map_value, enif_make_map_put, enif_make_map_remove,
    enif_make_new_map, ERL_NIF_TERM,
};

pub fn make_new_map(env: Env<'_>) -> Term<'_> {
    unsafe { Term::new(env, enif_make_new_map(env.as_ptr())) }
}

/// `map` with `key` set to `value`
pub fn map_put<'a>(map: Term<'a>, key: Term<'_>, value: Term<'_>) -> NifResult<Term<'a>> {
    let env = map.get_env();
    let (key, value) = (key.in_env(env), value.in_env(env));
    let mut out: ERL_NIF_TERM = 0;
    let ok = unsafe { enif_make_map_put(env.as_ptr(), map.as_raw(), key.as_raw(), value.as_raw(), &mut out) };
    if ok == 0 {
        return Err(NifError::BadArg);
    }
    Ok(unsafe { Term::new(env, out) })
}

/// Value under `key`
///
/// # Returns
/// * `Err(NifError::BadArg)` - Not a map, or no such key
pub fn map_get<'a>(map: Term<'a>, key: Term<'_>) -> NifResult<Term<'a>> {
    let env = map.get_env();
    let key = key.in_env(env);
    let mut value: ERL_NIF_TERM = 0;
    let ok = unsafe { enif_get_map_value(env.as_ptr(), map.as_raw(), key.as_raw(), &mut value) };
    if ok == 0 {
        return Err(NifError::BadArg);
    }
    Ok(unsafe { Term::new(env, value) })
}

/// `map` without `key`; a missing key is not an error.
pub fn map_remove<'a>(map: Term<'a>, key: Term<'_>) -> NifResult<Term<'a>> {
    let env = map.get_env();
    let key = key.in_env(env);
    let mut out: ERL_NIF_TERM = 0;
    let ok = unsafe { enif_make_map_remove(env.as_ptr(), map.as_raw(), key.as_raw(), &mut out) };
    if ok == 0 {
        return Err(NifError::BadArg);
    }
    Ok(unsafe { Term::new(env, out) })
}

pub fn get_map_size(map: Term<'_>) -> NifResult<usize> {
    let mut size = 0usize;
    if unsafe { enif_get_map_size(map.get_env().as_ptr(), map.as_raw(), &mut size) } == 0 {
        return Err(NifError::BadArg);
    }
    Ok(size)
}
