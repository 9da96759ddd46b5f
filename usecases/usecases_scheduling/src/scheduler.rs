//! Scheduler Pools
//!
//! A pool is a set of OS threads serving one run queue. There are three
//! kinds: normal schedulers, which must only run short calls, and the dirty
//! CPU and dirty I/O schedulers, which may run long ones. Each thread
//! records its kind at start-up so native code can ask which pool it is on.
//!
//! Based on the scheduler thread set-up in erl_process.c, with the run
//! queue reduced to a `crossbeam` channel of jobs.

use crossbeam::channel::{self, Receiver, Sender};
use infrastructure_nif_api::scheduling::erts_set_thread_type;
use infrastructure_nif_api::{
    ERL_NIF_DIRTY_JOB_CPU_BOUND, ERL_NIF_DIRTY_JOB_IO_BOUND, ERL_NIF_THR_DIRTY_CPU_SCHEDULER,
    ERL_NIF_THR_DIRTY_IO_SCHEDULER, ERL_NIF_THR_NORMAL_SCHEDULER,
};
use parking_lot::Mutex;
use std::os::raw::{c_int, c_uint};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of work for a scheduler thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Which pool a scheduler belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerKind {
    Normal,
    DirtyCpu,
    DirtyIo,
}

impl SchedulerKind {
    /// The pool a call with `ErlNifFunc`/`enif_schedule_nif` flags runs on
    pub fn from_flags(flags: c_uint) -> Self {
        match flags {
            ERL_NIF_DIRTY_JOB_CPU_BOUND => SchedulerKind::DirtyCpu,
            ERL_NIF_DIRTY_JOB_IO_BOUND => SchedulerKind::DirtyIo,
            _ => SchedulerKind::Normal,
        }
    }

    /// Value `enif_thread_type` reports on threads of this kind
    pub fn thread_type(self) -> c_int {
        match self {
            SchedulerKind::Normal => ERL_NIF_THR_NORMAL_SCHEDULER,
            SchedulerKind::DirtyCpu => ERL_NIF_THR_DIRTY_CPU_SCHEDULER,
            SchedulerKind::DirtyIo => ERL_NIF_THR_DIRTY_IO_SCHEDULER,
        }
    }

    fn thread_prefix(self) -> &'static str {
        match self {
            SchedulerKind::Normal => "erts_sched",
            SchedulerKind::DirtyCpu => "erts_dcpu_sched",
            SchedulerKind::DirtyIo => "erts_dio_sched",
        }
    }
}

/// Scheduler error types
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
    #[error("schedulers already initialized")]
    AlreadyInitialized,
    #[error("failed to spawn scheduler thread {name}: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0:?} scheduler pool is stopped")]
    PoolStopped(SchedulerKind),
    #[error("process {0} has exited")]
    ProcessExited(u64),
    #[error("scheduler thread dropped the call")]
    CallLost,
}

/// A pool of scheduler threads of one kind
pub struct SchedulerPool {
    kind: SchedulerKind,
    queue: Mutex<Option<Sender<Job>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    executed: Arc<AtomicU64>,
}

impl SchedulerPool {
    /// Start `size` threads of `kind`
    ///
    /// # Returns
    /// * `Ok(SchedulerPool)` - All threads are running
    /// * `Err(ScheduleError)` - `size` is 0 or a thread could not be spawned;
    ///   threads already started are stopped again
    pub fn start(kind: SchedulerKind, size: usize) -> Result<Self, ScheduleError> {
        if size == 0 {
            return Err(ScheduleError::InvalidConfig(format!(
                "{:?} pool needs at least one scheduler",
                kind
            )));
        }
        let (sender, receiver) = channel::unbounded::<Job>();
        let pool = Self {
            kind,
            queue: Mutex::new(Some(sender)),
            threads: Mutex::new(Vec::with_capacity(size)),
            size,
            executed: Arc::new(AtomicU64::new(0)),
        };
        for index in 0..size {
            let name = format!("{}_{}", kind.thread_prefix(), index + 1);
            let receiver = receiver.clone();
            let executed = Arc::clone(&pool.executed);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || scheduler_thread_func(kind, receiver, executed));
            match spawned {
                Ok(handle) => pool.threads.lock().push(handle),
                Err(source) => {
                    pool.stop();
                    return Err(ScheduleError::ThreadSpawn { name, source });
                }
            }
        }
        log::debug!("started {} {:?} scheduler(s)", size, kind);
        Ok(pool)
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    /// Number of threads the pool was started with
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs completed so far
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.queue.lock().is_some()
    }

    /// Queue a job on this pool
    pub fn submit(&self, job: Job) -> Result<(), ScheduleError> {
        let queue = self.queue.lock();
        let sender = queue
            .as_ref()
            .ok_or(ScheduleError::PoolStopped(self.kind))?;
        sender
            .send(job)
            .map_err(|_| ScheduleError::PoolStopped(self.kind))
    }

    /// Close the run queue and join every thread once it has drained.
    pub fn stop(&self) {
        let Some(sender) = self.queue.lock().take() else {
            return;
        };
        drop(sender);
        let threads = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            if handle.join().is_err() {
                log::warn!("{:?} scheduler thread panicked", self.kind);
            }
        }
        log::debug!("stopped {:?} schedulers", self.kind);
    }
}

impl Drop for SchedulerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Scheduler thread function
///
/// Based on `sched_thread_func()` from erl_process.c: record the thread
/// type, then run jobs until the run queue is closed.
fn scheduler_thread_func(kind: SchedulerKind, runq: Receiver<Job>, executed: Arc<AtomicU64>) {
    erts_set_thread_type(kind.thread_type());
    for job in runq.iter() {
        job();
        executed.fetch_add(1, Ordering::Relaxed);
    }
}
