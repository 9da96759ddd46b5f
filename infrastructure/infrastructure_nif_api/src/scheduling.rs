//! Scheduling Functions
//!
//! Every scheduler thread records which pool it belongs to; native code
//! reads it back with [`enif_thread_type`]. A native function can hand the
//! rest of its work to another function, possibly on a dirty pool, with
//! [`enif_schedule_nif`]; the call driver picks the request up from the
//! environment after the function returns. [`enif_consume_timeslice`] is the
//! cooperative budget normal-pool functions report against.

use crate::error_handling::enif_make_badarg;
use crate::nif_env::{env_mut, EnvKind, ErlNifEnv};
use crate::{
    NifFn, ERL_NIF_DIRTY_JOB_CPU_BOUND, ERL_NIF_DIRTY_JOB_IO_BOUND, ERL_NIF_TERM,
    ERL_NIF_THR_DIRTY_CPU_SCHEDULER, ERL_NIF_THR_DIRTY_IO_SCHEDULER, ERL_NIF_THR_NORMAL_SCHEDULER,
    ERL_NIF_THR_UNDEFINED,
};
use entities_data_handling::eterm::{self, Eterm};
use std::cell::Cell;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint};

/// Full timeslice, in percent
pub const TIMESLICE_PERCENT: u32 = 100;

thread_local! {
    static THREAD_TYPE: Cell<c_int> = const { Cell::new(ERL_NIF_THR_UNDEFINED) };
}

/// Record the pool the current thread serves.
///
/// Called once by each scheduler thread as it starts.
pub fn erts_set_thread_type(thread_type: c_int) {
    THREAD_TYPE.with(|t| t.set(thread_type));
}

/// Pool of the current thread
///
/// # Returns
///
/// * `ERL_NIF_THR_NORMAL_SCHEDULER`, `ERL_NIF_THR_DIRTY_CPU_SCHEDULER` or
///   `ERL_NIF_THR_DIRTY_IO_SCHEDULER` on a scheduler thread
/// * `ERL_NIF_THR_UNDEFINED` on any other thread
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_thread_type()` - C implementation
pub extern "C" fn enif_thread_type() -> c_int {
    THREAD_TYPE.with(|t| t.get())
}

/// Thread type a call with `flags` runs on
pub fn thread_type_for_flags(flags: c_uint) -> c_int {
    match flags {
        ERL_NIF_DIRTY_JOB_CPU_BOUND => ERL_NIF_THR_DIRTY_CPU_SCHEDULER,
        ERL_NIF_DIRTY_JOB_IO_BOUND => ERL_NIF_THR_DIRTY_IO_SCHEDULER,
        _ => ERL_NIF_THR_NORMAL_SCHEDULER,
    }
}

/// A pending hand-off recorded by [`enif_schedule_nif`]
#[derive(Debug, Clone)]
pub struct RescheduleRequest {
    /// Name reported for the rescheduled function
    pub fun_name: String,
    pub fptr: NifFn,
    /// `0`, `ERL_NIF_DIRTY_JOB_CPU_BOUND` or `ERL_NIF_DIRTY_JOB_IO_BOUND`
    pub flags: c_uint,
    /// Arguments, terms of the calling process heap
    pub argv: Vec<Eterm>,
}

/// Schedule `fp` to run in place of the current function
///
/// The calling function must return the result immediately. The runtime
/// then calls `fp` with `argv` on the pool `flags` selects; its result
/// becomes the result of the original call.
///
/// # Returns
///
/// * `ERL_NIF_TERM` - The non-value on success, or a `badarg` exception if
///   `flags` is invalid or `env` is not a process-bound environment
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_schedule_nif()` - C implementation
pub unsafe extern "C" fn enif_schedule_nif(
    env: *mut ErlNifEnv,
    fun_name: *const c_char,
    flags: c_int,
    fp: NifFn,
    argc: c_int,
    argv: *const ERL_NIF_TERM,
) -> ERL_NIF_TERM {
    let Some(e) = env_mut(env) else {
        return eterm::THE_NON_VALUE;
    };
    let flags = match c_uint::try_from(flags) {
        Ok(f @ (0 | ERL_NIF_DIRTY_JOB_CPU_BOUND | ERL_NIF_DIRTY_JOB_IO_BOUND)) => f,
        _ => return enif_make_badarg(env),
    };
    if e.kind() != EnvKind::Process || argc < 0 || (argc > 0 && argv.is_null()) {
        return enif_make_badarg(env);
    }
    let fun_name = if fun_name.is_null() {
        String::new()
    } else {
        CStr::from_ptr(fun_name).to_string_lossy().into_owned()
    };
    let argv = if argc == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(argv, argc as usize).to_vec()
    };
    log::trace!("rescheduling as {} (flags {})", fun_name, flags);
    e.reschedule = Some(RescheduleRequest {
        fun_name,
        fptr: fp,
        flags,
        argv,
    });
    eterm::THE_NON_VALUE
}

/// Report time spent since the call started or the last report
///
/// `percent` is clamped to `1..=100`.
///
/// # Returns
///
/// * `1` - The timeslice is used up; the function should yield
/// * `0` - Keep going
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_consume_timeslice()` - C implementation
pub unsafe extern "C" fn enif_consume_timeslice(env: *mut ErlNifEnv, percent: c_int) -> c_int {
    let Some(env) = env_mut(env) else {
        return 0;
    };
    let percent = percent.clamp(1, TIMESLICE_PERCENT as c_int) as u32;
    env.timeslice_used = env.timeslice_used.saturating_add(percent);
    c_int::from(env.timeslice_used >= TIMESLICE_PERCENT)
}
