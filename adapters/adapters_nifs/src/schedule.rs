//! Scheduler Dispatch
//!
//! Native functions run on one of three scheduler pools. Quick work stays
//! on the normal pool; work that may block or run long is declared dirty,
//! statically through its entry flags or at run time by handing the call
//! off with [`schedule_dirty_cpu`] or [`schedule_dirty_io`].
//!
//! Work that must stay on the normal pool but does not fit in one timeslice
//! is a [`YieldingTask`]: its state lives in a resource and it re-enters
//! itself through [`schedule_normal`] whenever the slice is used up.

use crate::barrier::{require_argc, run_nif};
use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::resource::{Resource, ResourceArc};
use crate::term::Term;
use infrastructure_nif_api::{
    enif_schedule_nif, enif_thread_type, ErlNifEnv, NifFn, ERL_NIF_DIRTY_JOB_CPU_BOUND,
    ERL_NIF_DIRTY_JOB_IO_BOUND, ERL_NIF_TERM, ERL_NIF_THR_DIRTY_CPU_SCHEDULER,
    ERL_NIF_THR_DIRTY_IO_SCHEDULER, ERL_NIF_THR_NORMAL_SCHEDULER,
};
use parking_lot::Mutex;
use std::ffi::CString;
use std::os::raw::{c_int, c_uint};

/// Resource type name of yielding task state
pub const YIELD_CONTEXT_TYPE: &str = "nif_yield_context";

/// Pool the current thread belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadType {
    /// Not a scheduler thread
    Undefined,
    Normal,
    DirtyCpu,
    DirtyIo,
}

pub fn current_thread_type() -> ThreadType {
    match enif_thread_type() {
        ERL_NIF_THR_NORMAL_SCHEDULER => ThreadType::Normal,
        ERL_NIF_THR_DIRTY_CPU_SCHEDULER => ThreadType::DirtyCpu,
        ERL_NIF_THR_DIRTY_IO_SCHEDULER => ThreadType::DirtyIo,
        _ => ThreadType::Undefined,
    }
}

/// Pool a function runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerFlags {
    #[default]
    Normal,
    DirtyCpu,
    DirtyIo,
}

impl SchedulerFlags {
    pub fn as_raw(self) -> c_uint {
        match self {
            SchedulerFlags::Normal => 0,
            SchedulerFlags::DirtyCpu => ERL_NIF_DIRTY_JOB_CPU_BOUND,
            SchedulerFlags::DirtyIo => ERL_NIF_DIRTY_JOB_IO_BOUND,
        }
    }
}

/// Hand the current call off to `fun` on the pool `flags` selects
///
/// Return the result straight from the native function; the runtime then
/// calls `fun` with `args` and its result becomes the result of the call.
///
/// # Returns
/// * `Err(NifError::BadArg)` - `env` is not bound to a process, or `name`
///   contains a NUL byte
pub fn schedule_nif<'a>(
    env: Env<'a>,
    name: &str,
    flags: SchedulerFlags,
    fun: NifFn,
    args: &[Term<'_>],
) -> NifResult<Term<'a>> {
    let c_name = CString::new(name).map_err(|_| NifError::BadArg)?;
    let argv: Vec<ERL_NIF_TERM> = args.iter().map(|t| t.in_env(env).as_raw()).collect();
    let argc = c_int::try_from(argv.len()).map_err(|_| NifError::BadArg)?;
    let already_raised = env.pending_exception().is_some();
    let raw = unsafe {
        enif_schedule_nif(
            env.as_ptr(),
            c_name.as_ptr(),
            flags.as_raw() as c_int,
            fun,
            argc,
            argv.as_ptr(),
        )
    };
    if !already_raised && env.pending_exception().is_some() {
        return Err(NifError::BadArg);
    }
    Ok(unsafe { Term::new(env, raw) })
}

pub fn schedule_dirty_cpu<'a>(env: Env<'a>, name: &str, fun: NifFn, args: &[Term<'_>]) -> NifResult<Term<'a>> {
    schedule_nif(env, name, SchedulerFlags::DirtyCpu, fun, args)
}

pub fn schedule_dirty_io<'a>(env: Env<'a>, name: &str, fun: NifFn, args: &[Term<'_>]) -> NifResult<Term<'a>> {
    schedule_nif(env, name, SchedulerFlags::DirtyIo, fun, args)
}

pub fn schedule_normal<'a>(env: Env<'a>, name: &str, fun: NifFn, args: &[Term<'_>]) -> NifResult<Term<'a>> {
    schedule_nif(env, name, SchedulerFlags::Normal, fun, args)
}

/// Result of one chunk of a [`YieldingTask`]
pub enum Step<'a> {
    /// More work remains
    Continue,
    /// Finished with this value
    Done(Term<'a>),
}

/// Resumable work run in chunks on the normal pool
pub trait YieldingTask: Send + 'static {
    /// Share of a timeslice one chunk takes, in percent
    fn chunk_cost(&self) -> i32 {
        10
    }

    fn step<'a>(&mut self, env: Env<'a>) -> NifResult<Step<'a>>;
}

/// Resource holding a suspended [`YieldingTask`]
pub struct YieldContext {
    name: String,
    task: Mutex<Box<dyn YieldingTask>>,
}

impl Resource for YieldContext {}

/// Run `task` to completion, yielding whenever the timeslice is used up
///
/// # Returns
/// * `Ok(Term)` - The task's value, or the hand-off to its next slice
/// * `Err(NifError::ResourceError)` - The module registered no resources
pub fn run_yielding<'a, T: YieldingTask>(env: Env<'a>, name: &str, task: T) -> NifResult<Term<'a>> {
    let context = ResourceArc::new(YieldContext {
        name: name.to_owned(),
        task: Mutex::new(Box::new(task)),
    })?;
    drive(env, &context)
}

fn drive<'a>(env: Env<'a>, context: &ResourceArc<YieldContext>) -> NifResult<Term<'a>> {
    let mut task = context.task.lock();
    loop {
        match task.step(env)? {
            Step::Done(value) => return Ok(value),
            Step::Continue => {
                if env.consume_timeslice(task.chunk_cost()) {
                    log::trace!("{} yields", context.name);
                    let handle = context.to_term(env);
                    return schedule_normal(env, &context.name, resume_yielding, &[handle]);
                }
            }
        }
    }
}

unsafe extern "C" fn resume_yielding(env: *mut ErlNifEnv, argc: c_int, argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
    run_nif(env, argc, argv, |env, args| {
        require_argc(args, 1)?;
        let context = ResourceArc::<YieldContext>::from_term(args[0])?;
        drive(env, &context)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_nif_api::erts_set_thread_type;
    use infrastructure_nif_api::nif_env::EnvKind;

    unsafe extern "C" fn noop(_env: *mut ErlNifEnv, _argc: c_int, _argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
        entities_data_handling::eterm::NIL
    }

    #[test]
    fn test_thread_type_of_plain_thread() {
        std::thread::spawn(|| {
            assert_eq!(current_thread_type(), ThreadType::Undefined);
            erts_set_thread_type(ERL_NIF_THR_DIRTY_IO_SCHEDULER);
            assert_eq!(current_thread_type(), ThreadType::DirtyIo);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_schedule_needs_a_process() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        assert_eq!(
            schedule_dirty_cpu(env, "noop", noop, &[]).map(|t| t.as_raw()),
            Err(NifError::BadArg)
        );
        assert_eq!(
            schedule_normal(env, "bad\0name", noop, &[]).map(|t| t.as_raw()),
            Err(NifError::BadArg)
        );
    }

    #[test]
    fn test_flags() {
        assert_eq!(SchedulerFlags::default().as_raw(), 0);
        assert_eq!(SchedulerFlags::DirtyIo.as_raw(), ERL_NIF_DIRTY_JOB_IO_BOUND);
    }
}
