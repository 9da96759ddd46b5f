//! NIF Call Driver
//!
//! Runs a native function on behalf of a process and follows its
//! `enif_schedule_nif` hand-offs until it produces a value or an exception.
//!
//! Each hop is one dispatch: the call is queued on the pool its flags
//! select, the scheduler thread takes the process main lock, resets the
//! per-call state of the process environment and calls the function. After
//! the call the environment is checked in a fixed order: a pending exception
//! wins, then a reschedule request, then the return value.

use crate::initialization::Schedulers;
use crate::scheduler::{ScheduleError, SchedulerKind};
use crossbeam::channel;
use entities_data_handling::Eterm;
use infrastructure_nif_api::process::Process;
use infrastructure_nif_api::scheduling::RescheduleRequest;
use infrastructure_nif_api::{NifFn, ERL_NIF_TERM};
use std::os::raw::{c_int, c_uint, c_void};
use std::sync::Arc;

/// One native function call
#[derive(Debug, Clone)]
pub struct NifCall {
    pub name: String,
    pub fptr: NifFn,
    /// `ErlNifFunc` flags: `0` or a dirty job flag
    pub flags: c_uint,
    /// Arguments, terms on the calling process heap
    pub argv: Vec<Eterm>,
    /// Module private data reported by `enif_priv_data`
    pub priv_data: *mut c_void,
}

/// How a call ended
///
/// Either term lives on the calling process heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Return(Eterm),
    Exception(Eterm),
}

/// A finished call and the pools it passed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReport {
    pub outcome: CallOutcome,
    /// Pool of every dispatch, in order
    pub hops: Vec<SchedulerKind>,
}

/// What a single dispatch produced
enum Step {
    Done(CallOutcome),
    Reschedule(RescheduleRequest),
}

/// Raw pointer moved into a scheduler job
///
/// The pointee is module private data, which native code must make safe to
/// use from any scheduler.
#[derive(Clone, Copy)]
struct SendPtr(*mut c_void);

unsafe impl Send for SendPtr {}

/// Call a native function on behalf of `process`
///
/// Blocks the calling thread until the whole chain of hand-offs completes.
///
/// # Returns
/// * `Ok(CallReport)` - The value or exception and the dispatch trail
/// * `Err(ScheduleError::ProcessExited)` - The process exited before a hop
/// * `Err(ScheduleError::PoolStopped)` - A target pool is not running
pub fn call_nif(
    schedulers: &Schedulers,
    process: &Arc<Process>,
    call: NifCall,
) -> Result<CallReport, ScheduleError> {
    let mut hops = Vec::new();
    let mut next = call;
    loop {
        if !process.is_alive() {
            return Err(ScheduleError::ProcessExited(process.id()));
        }
        let kind = SchedulerKind::from_flags(next.flags);
        hops.push(kind);
        log::trace!("dispatching {} on {:?} scheduler", next.name, kind);
        match dispatch_once(schedulers, process, kind, &next)? {
            Step::Done(outcome) => return Ok(CallReport { outcome, hops }),
            Step::Reschedule(request) => {
                next = NifCall {
                    name: request.fun_name,
                    fptr: request.fptr,
                    flags: request.flags,
                    argv: request.argv,
                    priv_data: next.priv_data,
                }
            }
        }
    }
}

fn dispatch_once(
    schedulers: &Schedulers,
    process: &Arc<Process>,
    kind: SchedulerKind,
    call: &NifCall,
) -> Result<Step, ScheduleError> {
    let (done_tx, done_rx) = channel::bounded(1);
    let process = Arc::clone(process);
    let priv_data = SendPtr(call.priv_data);
    let fptr = call.fptr;
    let argv = call.argv.clone();
    schedulers.pool(kind).submit(Box::new(move || {
        let priv_data = priv_data;
        // SAFETY: the main lock is held for the whole call, so the heap
        // environment is ours alone.
        let step = unsafe { run_on_process(&process, fptr, &argv, priv_data.0) };
        let _ = done_tx.send(step);
    }))?;
    done_rx.recv().map_err(|_| ScheduleError::CallLost)
}

unsafe fn run_on_process(
    process: &Process,
    fptr: NifFn,
    argv: &[ERL_NIF_TERM],
    priv_data: *mut c_void,
) -> Step {
    let lock = process.lock();
    let env = lock.env();
    (*env).begin_dispatch();
    (*env).set_priv_data(priv_data);
    let result = fptr(env, argv.len() as c_int, argv.as_ptr());

    if let Some(reason) = (*env).take_exception() {
        return Step::Done(CallOutcome::Exception(reason));
    }
    if let Some(request) = (*env).take_reschedule() {
        return Step::Reschedule(request);
    }
    Step::Done(CallOutcome::Return(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_nif_api::process::get_global_process_table;
    use infrastructure_nif_api::scheduling::{enif_schedule_nif, enif_thread_type};
    use infrastructure_nif_api::term_creation::enif_make_int;
    use infrastructure_nif_api::{enif_make_badarg, ErlNifEnv, ERL_NIF_DIRTY_JOB_IO_BOUND};

    unsafe extern "C" fn thread_type_nif(
        env: *mut ErlNifEnv,
        _argc: c_int,
        _argv: *const ERL_NIF_TERM,
    ) -> ERL_NIF_TERM {
        enif_make_int(env, enif_thread_type())
    }

    unsafe extern "C" fn hop_to_io(env: *mut ErlNifEnv, argc: c_int, argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
        enif_schedule_nif(
            env,
            c"thread_type_nif".as_ptr(),
            ERL_NIF_DIRTY_JOB_IO_BOUND as c_int,
            thread_type_nif,
            argc,
            argv,
        )
    }

    unsafe extern "C" fn raise_then_reschedule(
        env: *mut ErlNifEnv,
        argc: c_int,
        argv: *const ERL_NIF_TERM,
    ) -> ERL_NIF_TERM {
        enif_make_badarg(env);
        hop_to_io(env, argc, argv)
    }

    fn call(fptr: NifFn) -> NifCall {
        NifCall {
            name: "test".into(),
            fptr,
            flags: 0,
            argv: Vec::new(),
            priv_data: std::ptr::null_mut(),
        }
    }

    #[test]
    fn test_reschedule_moves_to_dirty_pool() {
        let schedulers = Schedulers::start(1, 1, 1).unwrap();
        let process = get_global_process_table().spawn();
        let report = call_nif(&schedulers, &process, call(hop_to_io)).unwrap();
        assert_eq!(report.hops, vec![SchedulerKind::Normal, SchedulerKind::DirtyIo]);
        let expected = entities_data_handling::eterm::make_small(
            infrastructure_nif_api::ERL_NIF_THR_DIRTY_IO_SCHEDULER as i64,
        );
        assert_eq!(Some(report.outcome), expected.map(CallOutcome::Return));
        get_global_process_table().exit(process.id());
    }

    #[test]
    fn test_exception_wins_over_reschedule() {
        let schedulers = Schedulers::start(1, 1, 1).unwrap();
        let process = get_global_process_table().spawn();
        let report = call_nif(&schedulers, &process, call(raise_then_reschedule)).unwrap();
        assert!(matches!(report.outcome, CallOutcome::Exception(_)));
        assert_eq!(report.hops.len(), 1);
        get_global_process_table().exit(process.id());
    }

    #[test]
    fn test_dead_process_is_not_called() {
        let schedulers = Schedulers::start(1, 1, 1).unwrap();
        let process = get_global_process_table().spawn();
        get_global_process_table().exit(process.id());
        assert!(matches!(
            call_nif(&schedulers, &process, call(thread_type_nif)),
            Err(ScheduleError::ProcessExited(_))
        ));
    }
}
