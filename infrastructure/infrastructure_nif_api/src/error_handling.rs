//! Error Handling Functions
//!
//! A native function signals an exception by recording it in its
//! environment and returning the non-value. The runtime checks the
//! environment after every call; a pending exception wins over any return
//! value and over a reschedule request.

use crate::atom_table::am;
use crate::nif_env::{env_mut, ErlNifEnv};
use crate::ERL_NIF_TERM;
use entities_data_handling::eterm;
use std::os::raw::c_int;

/// Raise a `badarg` exception
///
/// # Arguments
///
/// * `env` - Environment of the current call
///
/// # Returns
///
/// * `ERL_NIF_TERM` - The non-value; return it from the native function
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_badarg()` - C implementation
pub unsafe extern "C" fn enif_make_badarg(env: *mut ErlNifEnv) -> ERL_NIF_TERM {
    enif_raise_exception(env, am("badarg"))
}

/// Raise an error exception with an arbitrary reason
///
/// The reason must be a term of `env`. Raising twice keeps the first
/// reason, as the runtime only reports one exception per call.
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_raise_exception()` - C implementation
pub unsafe extern "C" fn enif_raise_exception(
    env: *mut ErlNifEnv,
    reason: ERL_NIF_TERM,
) -> ERL_NIF_TERM {
    if let Some(env) = env_mut(env) {
        env.exception.get_or_insert(reason);
    }
    eterm::THE_NON_VALUE
}

/// Check for a pending exception
///
/// # Returns
///
/// * `1` - An exception is pending; `*reason` is set if non-null
/// * `0` - No exception is pending
pub unsafe extern "C" fn enif_has_pending_exception(
    env: *mut ErlNifEnv,
    reason: *mut ERL_NIF_TERM,
) -> c_int {
    match env_mut(env).and_then(|env| env.exception) {
        Some(pending) => {
            if !reason.is_null() {
                *reason = pending;
            }
            1
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif_env::EnvKind;

    #[test]
    fn test_badarg_sets_pending_exception() {
        let mut env = ErlNifEnv::new(EnvKind::Callback);
        let mut reason = 0;
        unsafe {
            assert_eq!(enif_has_pending_exception(&mut env, &mut reason), 0);
            assert_eq!(enif_make_badarg(&mut env), eterm::THE_NON_VALUE);
            assert_eq!(enif_has_pending_exception(&mut env, &mut reason), 1);
        }
        assert_eq!(reason, am("badarg"));
    }

    #[test]
    fn test_first_exception_wins() {
        let mut env = ErlNifEnv::new(EnvKind::Callback);
        unsafe {
            enif_raise_exception(&mut env, am("first"));
            enif_raise_exception(&mut env, am("second"));
        }
        assert_eq!(env.take_exception(), Some(am("first")));
    }
}
