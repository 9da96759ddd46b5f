//! Fault Barrier
//!
//! Native code must never unwind into the runtime or leave it without an
//! answer. [`run_nif`] is the single place where a [`NifResult`] or a panic
//! becomes something the runtime understands:
//!
//! | Outcome | Result of the call |
//! |---|---|
//! | `Ok(term)` | `term` |
//! | `Err(NifError::Term(t))` | `t`, as an ordinary value |
//! | `Err(NifError::Raise(r))` | exception with reason `r` |
//! | any other `Err` | `badarg` exception |
//! | panic | `nif_panicked` exception, logged |
//!
//! Hard faults (segfaults, stack overflow, use of a freed handle) are not
//! caught and still bring the runtime down.

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::Term;
use crate::types::atom::Atom;
use crate::types::list::ListIterator;
use crate::types::binary::Binary;
use crate::types::pid::LocalPid;
use infrastructure_nif_api::{enif_make_badarg, enif_raise_exception, ErlNifEnv, ERL_NIF_TERM};
use std::any::Any;
use std::os::raw::c_int;
use std::panic::{catch_unwind, AssertUnwindSafe};

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Run the body of a native function
///
/// # Safety
/// The arguments must be exactly those the runtime passed to the native
/// function.
pub unsafe fn run_nif<F>(raw_env: *mut ErlNifEnv, argc: c_int, argv: *const ERL_NIF_TERM, body: F) -> ERL_NIF_TERM
where
    F: for<'a> FnOnce(Env<'a>, &[Term<'a>]) -> NifResult<Term<'a>>,
{
    let env = Env::wrap(raw_env);
    let args: Vec<Term<'_>> = if argc <= 0 || argv.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(argv, argc as usize)
            .iter()
            .map(|&raw| Term::new(env, raw))
            .collect()
    };

    match catch_unwind(AssertUnwindSafe(|| body(env, &args))) {
        Ok(Ok(term)) => term.as_raw(),
        Ok(Err(NifError::Term(value))) => value,
        Ok(Err(NifError::Raise(reason))) => enif_raise_exception(raw_env, reason),
        Ok(Err(err)) => {
            log::debug!("native function failed: {}", err);
            enif_make_badarg(raw_env)
        }
        Err(payload) => {
            log::error!("native function panicked: {}", panic_message(payload.as_ref()));
            match Atom::from_name(env, "nif_panicked") {
                Ok(reason) => enif_raise_exception(raw_env, reason.as_raw()),
                Err(_) => enif_make_badarg(raw_env),
            }
        }
    }
}

/// Run a resource callback; a panic is logged and swallowed.
pub(crate) fn guard_callback<F: FnOnce()>(what: &str, type_name: &str, callback: F) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
        log::error!(
            "{} of resource type {} panicked: {}",
            what,
            type_name,
            panic_message(payload.as_ref())
        );
    }
}

/// Run a load, upgrade or unload hook
///
/// Returns the status code the loader expects: `0` on success.
pub fn guard_hook<F>(module: &str, hook: &str, body: F) -> c_int
where
    F: FnOnce() -> NifResult<()>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            log::warn!("{} hook of {} failed: {}", hook, module, err);
            1
        }
        Err(payload) => {
            log::error!("{} hook of {} panicked: {}", hook, module, panic_message(payload.as_ref()));
            2
        }
    }
}

/// Exactly `expected` arguments
pub fn require_argc(args: &[Term<'_>], expected: usize) -> NifResult<()> {
    if args.len() != expected {
        return Err(NifError::ArgcMismatch {
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

pub fn require_int(term: Term<'_>) -> NifResult<i64> {
    term.get_long()
}

/// An integer in `min..=max`
pub fn require_int_range(term: Term<'_>, min: i64, max: i64) -> NifResult<i64> {
    let value = term.get_long()?;
    if value < min || value > max {
        return Err(NifError::BadArg);
    }
    Ok(value)
}

pub fn require_non_negative(term: Term<'_>) -> NifResult<i64> {
    require_int_range(term, 0, i64::MAX)
}

pub fn require_positive(term: Term<'_>) -> NifResult<i64> {
    require_int_range(term, 1, i64::MAX)
}

pub fn require_atom(term: Term<'_>) -> NifResult<Atom> {
    Atom::from_term(term)
}

pub fn require_binary(term: Term<'_>) -> NifResult<Binary<'_>> {
    term.inspect_binary()
}

pub fn require_list(term: Term<'_>) -> NifResult<ListIterator<'_>> {
    ListIterator::new(term)
}

pub fn require_tuple(term: Term<'_>) -> NifResult<Vec<Term<'_>>> {
    term.get_tuple()
}

pub fn require_map(term: Term<'_>) -> NifResult<Term<'_>> {
    if term.is_map() {
        Ok(term)
    } else {
        Err(NifError::BadArg)
    }
}

pub fn require_pid(term: Term<'_>) -> NifResult<LocalPid> {
    term.get_local_pid()
}

/// Define a native function whose body runs inside [`run_nif`]
///
/// ```ignore
/// native_fn! {
///     fn add(env, args) {
///         require_argc(args, 2)?;
///         let sum = require_int(args[0])? + require_int(args[1])?;
///         sum.encode(env)
///     }
/// }
/// ```
#[macro_export]
macro_rules! native_fn {
    ($(#[$meta:meta])* $vis:vis fn $name:ident($env:ident, $args:ident) $body:block) => {
        $(#[$meta])*
        $vis unsafe extern "C" fn $name(
            env: *mut $crate::ErlNifEnv,
            argc: ::std::os::raw::c_int,
            argv: *const $crate::ERL_NIF_TERM,
        ) -> $crate::ERL_NIF_TERM {
            $crate::barrier::run_nif(env, argc, argv, |$env, $args| $body)
        }
    };
}
