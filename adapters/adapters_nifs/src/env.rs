//! Call-bound Environment
//!
//! [`Env`] wraps the environment handle the runtime passes to a native
//! function. It is `Copy` but neither `Send` nor `Sync`, and its lifetime
//! ties every [`Term`] built in it to the call, so terms cannot escape to
//! another thread or outlive the call.

use crate::error::{NifError, NifResult};
use crate::term::Term;
use crate::types::pid::LocalPid;
use infrastructure_nif_api::{
    enif_consume_timeslice, enif_has_pending_exception, enif_is_current_process_alive,
    enif_is_process_alive, enif_make_badarg, enif_make_ref, enif_priv_data,
    enif_raise_exception, enif_self, enif_send, ErlNifEnv, ErlNifPid, ERL_NIF_TERM,
};
use std::marker::PhantomData;
use std::os::raw::c_void;
use std::ptr;

/// Environment of the current call
#[derive(Clone, Copy)]
pub struct Env<'a> {
    raw: *mut ErlNifEnv,
    // Invariant in 'a; the raw pointer also makes Env !Send and !Sync.
    _call: PhantomData<*mut &'a ()>,
}

impl<'a> Env<'a> {
    /// Adapt a raw environment handle
    ///
    /// # Safety
    /// `raw` must be a live environment that stays valid, and is used by
    /// this thread only, for all of `'a`.
    pub unsafe fn wrap(raw: *mut ErlNifEnv) -> Env<'a> {
        Env {
            raw,
            _call: PhantomData,
        }
    }

    pub fn as_ptr(self) -> *mut ErlNifEnv {
        self.raw
    }

    /// Wrap a raw term of this environment
    ///
    /// # Safety
    /// `raw` must be a live term of this environment.
    pub unsafe fn term(self, raw: ERL_NIF_TERM) -> Term<'a> {
        Term::new(self, raw)
    }

    /// The calling process
    ///
    /// # Returns
    /// * `Err(NifError::NoProcess)` - Process-independent, load or callback
    ///   environments have no calling process
    pub fn self_pid(self) -> NifResult<LocalPid> {
        let mut pid = ErlNifPid { pid: 0 };
        let found = unsafe { enif_self(self.raw, &mut pid) };
        if found.is_null() {
            Err(NifError::NoProcess)
        } else {
            Ok(LocalPid::from_raw(pid))
        }
    }

    /// Send `message` to `pid`
    ///
    /// The message is copied; `message` stays valid in this environment.
    pub fn send(self, pid: &LocalPid, message: Term<'a>) -> NifResult<()> {
        let sent = unsafe { enif_send(self.raw, pid.as_c_arg(), ptr::null_mut(), message.as_raw()) };
        if sent == 0 {
            Err(NifError::NoProcess)
        } else {
            Ok(())
        }
    }

    pub fn is_process_alive(self, pid: &LocalPid) -> bool {
        unsafe { enif_is_process_alive(self.raw, pid.as_c_arg()) != 0 }
    }

    /// True while the calling process is alive
    ///
    /// Long-running dirty work polls this to stop once its caller is gone.
    pub fn is_current_process_alive(self) -> bool {
        unsafe { enif_is_current_process_alive(self.raw) != 0 }
    }

    /// Report `percent` of a timeslice as used
    ///
    /// `percent` is clamped to `1..=100`. Returns `true` once the slice is
    /// exhausted and the function should yield.
    pub fn consume_timeslice(self, percent: i32) -> bool {
        unsafe { enif_consume_timeslice(self.raw, percent) != 0 }
    }

    /// Private data of the module the call belongs to
    pub fn priv_data(self) -> *mut c_void {
        unsafe { enif_priv_data(self.raw) }
    }

    /// Raise `badarg`; return the result from the native function.
    pub fn make_badarg(self) -> Term<'a> {
        unsafe { Term::new(self, enif_make_badarg(self.raw)) }
    }

    /// Raise an error exception with `reason`
    ///
    /// Only the first exception of a call is kept.
    pub fn raise_exception(self, reason: Term<'a>) -> Term<'a> {
        unsafe { Term::new(self, enif_raise_exception(self.raw, reason.as_raw())) }
    }

    /// Reason of the exception raised so far in this call
    pub fn pending_exception(self) -> Option<Term<'a>> {
        let mut reason: ERL_NIF_TERM = 0;
        let pending = unsafe { enif_has_pending_exception(self.raw, &mut reason) };
        (pending != 0).then(|| unsafe { Term::new(self, reason) })
    }

    /// A new unique reference
    pub fn make_ref(self) -> Term<'a> {
        unsafe { Term::new(self, enif_make_ref(self.raw)) }
    }
}

impl PartialEq for Env<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.raw, other.raw)
    }
}

impl std::fmt::Debug for Env<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Env").field(&self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_nif_api::nif_env::EnvKind;

    #[test]
    fn test_independent_env_has_no_process() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        assert_eq!(env.self_pid(), Err(NifError::NoProcess));
        assert!(!env.is_current_process_alive());
        assert!(env.pending_exception().is_none());
    }

    #[test]
    fn test_first_exception_wins() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        env.make_badarg();
        let reason = env.make_ref();
        env.raise_exception(reason);
        let pending = env.pending_exception().unwrap();
        assert!(pending.is_atom());
    }

    #[test]
    fn test_timeslice_exhausts() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        assert!(!env.consume_timeslice(40));
        assert!(!env.consume_timeslice(40));
        assert!(env.consume_timeslice(40));
    }
}
