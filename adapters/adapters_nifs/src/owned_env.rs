//! Process-independent Environments
//!
//! An [`OwnedEnv`] is created and freed by native code rather than by a
//! call. It is how a thread the runtime knows nothing about (a worker, a
//! destructor, a down callback) builds terms and sends messages.
//!
//! Terms built in it borrow it, and [`OwnedEnv::clear`] takes it mutably,
//! so no term can outlive a clear. Terms that must survive one are kept as
//! [`SavedTerm`]s and checked when loaded back.

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::Term;
use crate::types::pid::LocalPid;
use infrastructure_nif_api::{
    enif_alloc_env, enif_clear_env, enif_free_env, enif_send, ErlNifEnv, ERL_NIF_TERM,
};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ENV_ID: AtomicU64 = AtomicU64::new(1);

/// An environment owned by native code
pub struct OwnedEnv {
    raw: *mut ErlNifEnv,
    id: u64,
    generation: u64,
}

// Moved between threads by ownership only; the raw pointer keeps it !Sync.
unsafe impl Send for OwnedEnv {}

impl OwnedEnv {
    /// # Returns
    /// * `Err(NifError::AllocFailed)` - The runtime could not allocate one
    pub fn new() -> NifResult<OwnedEnv> {
        let raw = unsafe { enif_alloc_env() };
        if raw.is_null() {
            return Err(NifError::AllocFailed);
        }
        Ok(OwnedEnv {
            raw,
            id: NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
        })
    }

    /// Borrow the environment to build terms in
    pub fn as_env(&self) -> Env<'_> {
        unsafe { Env::wrap(self.raw) }
    }

    /// Run `f` with the environment
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: for<'a> FnOnce(Env<'a>) -> R,
    {
        f(self.as_env())
    }

    /// Invalidate every term and make the environment reusable
    pub fn clear(&mut self) {
        unsafe { enif_clear_env(self.raw) };
        self.generation += 1;
    }

    /// Destroy the environment; dropping it does the same.
    pub fn free(self) {
        drop(self)
    }

    /// Build a message with `builder` and send it to `pid`
    ///
    /// The environment is cleared afterwards whether or not the message
    /// was delivered.
    ///
    /// # Returns
    /// * `Err(NifError::NoProcess)` - `pid` is not alive
    /// * `Err(NifError)` - Whatever `builder` failed with
    pub fn send<F>(&mut self, pid: &LocalPid, builder: F) -> NifResult<()>
    where
        F: for<'a> FnOnce(Env<'a>) -> NifResult<Term<'a>>,
    {
        let message = self.run(|env| builder(env).map(|t| t.as_raw()));
        let result = message.and_then(|raw| {
            // No caller environment: this may run on any thread.
            let sent = unsafe { enif_send(ptr::null_mut(), pid.as_c_arg(), self.raw, raw) };
            if sent == 0 {
                Err(NifError::NoProcess)
            } else {
                Ok(())
            }
        });
        self.clear();
        result
    }

    /// Keep `term` in this environment until the next clear
    ///
    /// A term of another environment is copied in first.
    pub fn save(&self, term: Term<'_>) -> SavedTerm {
        let term = term.in_env(self.as_env());
        SavedTerm {
            raw: term.as_raw(),
            env_id: self.id,
            generation: self.generation,
        }
    }

    /// Term saved by [`OwnedEnv::save`]
    ///
    /// # Returns
    /// * `Err(NifError::BadArg)` - Saved in another environment, or the
    ///   environment was cleared since
    pub fn load(&self, saved: &SavedTerm) -> NifResult<Term<'_>> {
        if saved.env_id != self.id || saved.generation != self.generation {
            return Err(NifError::BadArg);
        }
        Ok(unsafe { Term::new(self.as_env(), saved.raw) })
    }
}

impl Drop for OwnedEnv {
    fn drop(&mut self) {
        unsafe { enif_free_env(self.raw) };
    }
}

impl std::fmt::Debug for OwnedEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedEnv")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish()
    }
}

/// A term kept in an [`OwnedEnv`] across calls
#[derive(Debug, Clone)]
pub struct SavedTerm {
    raw: ERL_NIF_TERM,
    env_id: u64,
    generation: u64,
}
