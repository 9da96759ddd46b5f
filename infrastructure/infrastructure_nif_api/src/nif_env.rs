//! NIF Environment
//!
//! An `ErlNifEnv` owns the heap that its terms live on, plus the per-call
//! state the runtime inspects after a native function returns (a pending
//! exception, a reschedule request, the timeslice used so far).
//!
//! ## Kinds
//!
//! - **Process**: the heap of a process; passed to every call made on that
//!   process. Never freed by native code.
//! - **ProcessIndependent**: created by `enif_alloc_env`, owned by native
//!   code until `enif_free_env`.
//! - **Callback**: fresh, short-lived; passed to resource destructors and
//!   down callbacks. No calling process.
//! - **Load**: passed to load, upgrade and unload callbacks. The only kind
//!   resource types may be opened in.
//! - **Message**: the heap a sent message travels in.

use crate::heap::{copy_term, TermHeap};
use crate::process::ProcessId;
use crate::scheduling::RescheduleRequest;
use crate::ERL_NIF_TERM;
use entities_data_handling::Eterm;
use std::os::raw::c_void;
use std::sync::Arc;

/// What an environment is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    Process,
    ProcessIndependent,
    Callback,
    Load,
    Message,
}

/// NIF environment
pub struct ErlNifEnv {
    kind: EnvKind,
    pub(crate) heap: TermHeap,
    owner: Option<ProcessId>,
    pub(crate) exception: Option<Eterm>,
    pub(crate) reschedule: Option<RescheduleRequest>,
    pub(crate) timeslice_used: u32,
    priv_data: *mut c_void,
    module: Option<Arc<str>>,
}

// An environment is used by one thread at a time: a process environment
// under the process main lock, any other kind by whoever owns it.
unsafe impl Send for ErlNifEnv {}

impl ErlNifEnv {
    pub fn new(kind: EnvKind) -> Self {
        Self {
            kind,
            heap: TermHeap::new(),
            owner: None,
            exception: None,
            reschedule: None,
            timeslice_used: 0,
            priv_data: std::ptr::null_mut(),
            module: None,
        }
    }

    /// The heap environment of process `owner`
    pub fn for_process(owner: ProcessId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::new(EnvKind::Process)
        }
    }

    /// A load environment for `module`
    pub fn for_load(module: Arc<str>, priv_data: *mut c_void) -> Self {
        Self {
            module: Some(module),
            priv_data,
            ..Self::new(EnvKind::Load)
        }
    }

    pub fn kind(&self) -> EnvKind {
        self.kind
    }

    /// The process this environment belongs to, if any
    pub fn owner(&self) -> Option<ProcessId> {
        self.owner
    }

    /// The NIF module a load environment serves
    pub fn module(&self) -> Option<&Arc<str>> {
        self.module.as_ref()
    }

    pub fn priv_data(&self) -> *mut c_void {
        self.priv_data
    }

    /// Set the private data `enif_priv_data` reports during the next call.
    pub fn set_priv_data(&mut self, priv_data: *mut c_void) {
        self.priv_data = priv_data;
    }

    pub fn heap(&self) -> &TermHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut TermHeap {
        &mut self.heap
    }

    /// Reset per-dispatch state before a native function runs.
    pub fn begin_dispatch(&mut self) {
        self.exception = None;
        self.reschedule = None;
        self.timeslice_used = 0;
    }

    pub fn take_exception(&mut self) -> Option<Eterm> {
        self.exception.take()
    }

    pub fn take_reschedule(&mut self) -> Option<RescheduleRequest> {
        self.reschedule.take()
    }

    /// Timeslice percentage reported since the last dispatch
    pub fn timeslice_used(&self) -> u32 {
        self.timeslice_used
    }
}

/// Dereference a raw environment handle.
///
/// # Safety
/// `env` must be null or point at a live environment not borrowed elsewhere.
pub(crate) unsafe fn env_mut<'a>(env: *mut ErlNifEnv) -> Option<&'a mut ErlNifEnv> {
    env.as_mut()
}

/// Allocate a process-independent environment
///
/// # Returns
///
/// * `*mut ErlNifEnv` - The new environment, owned by the caller
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_alloc_env()` - C implementation
pub unsafe extern "C" fn enif_alloc_env() -> *mut ErlNifEnv {
    Box::into_raw(Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent)))
}

/// Free an environment allocated with [`enif_alloc_env`]
///
/// All terms of the environment become invalid and the resource references
/// they held are released.
pub unsafe extern "C" fn enif_free_env(env: *mut ErlNifEnv) {
    if !env.is_null() {
        drop(Box::from_raw(env));
    }
}

/// Invalidate every term of an environment and make it reusable
pub unsafe extern "C" fn enif_clear_env(env: *mut ErlNifEnv) {
    if let Some(env) = env_mut(env) {
        env.heap.clear();
    }
}

/// Copy a term into another environment
///
/// # Arguments
///
/// * `dst_env` - Environment that will own the copy
/// * `src_term` - Live term from any environment
///
/// # Returns
///
/// * `ERL_NIF_TERM` - The copy, valid as long as `dst_env`
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_copy()` - C implementation
pub unsafe extern "C" fn enif_make_copy(
    dst_env: *mut ErlNifEnv,
    src_term: ERL_NIF_TERM,
) -> ERL_NIF_TERM {
    match env_mut(dst_env) {
        Some(env) => copy_term(&mut env.heap, src_term),
        None => src_term,
    }
}

/// Private data of the module the current call belongs to
pub unsafe extern "C" fn enif_priv_data(env: *mut ErlNifEnv) -> *mut c_void {
    match env_mut(env) {
        Some(env) => env.priv_data,
        None => std::ptr::null_mut(),
    }
}
