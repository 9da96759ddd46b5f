//! Host Processes
//!
//! The processes native functions are called on behalf of. A process owns
//! a heap environment (the call-bound environment of every NIF call it
//! makes), a mailbox, and a liveness flag that dirty work can poll.
//!
//! The heap environment is only touched while the process main lock is
//! held; the runtime takes it around each call and around garbage
//! collection.
//!
//! Exiting a process removes it from the table, fires every resource
//! monitor on it and, if no call is running, collects its heap.

use crate::nif_env::ErlNifEnv;
use crate::resource_management::fire_process_monitors;
use entities_data_handling::eterm::{self, Eterm};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::cell::UnsafeCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Process identifier
pub type ProcessId = u64;

/// A delivered message and the heap it lives on
pub struct Message {
    env: Box<ErlNifEnv>,
    term: Eterm,
}

impl Message {
    pub(crate) fn new(env: Box<ErlNifEnv>, term: Eterm) -> Self {
        Self { env, term }
    }

    /// The message term, valid while the message is alive
    pub fn term(&self) -> Eterm {
        self.term
    }

    /// The environment owning the message term
    pub fn env_ptr(&mut self) -> *mut ErlNifEnv {
        &mut *self.env
    }
}

/// A host process
///
/// Nothing collects the heap between calls: terms built by one call stay
/// valid for the next, and the heap only shrinks on [`Process::garbage_collect`]
/// or exit. Long-lived callers must collect once they no longer need the
/// results of earlier calls.
pub struct Process {
    id: ProcessId,
    alive: AtomicBool,
    main_lock: Mutex<()>,
    heap_env: UnsafeCell<ErlNifEnv>,
    mailbox: Mutex<VecDeque<Message>>,
    mailbox_signal: Condvar,
}

// `heap_env` is only reached through `ProcessLock`, which holds `main_lock`.
unsafe impl Sync for Process {}

/// Main-lock guard exposing the process heap environment
pub struct ProcessLock<'a> {
    _guard: MutexGuard<'a, ()>,
    env: *mut ErlNifEnv,
}

impl ProcessLock<'_> {
    /// The heap environment, valid while the lock is held
    pub fn env(&self) -> *mut ErlNifEnv {
        self.env
    }
}

impl Process {
    fn new(id: ProcessId) -> Self {
        Self {
            id,
            alive: AtomicBool::new(true),
            main_lock: Mutex::new(()),
            heap_env: UnsafeCell::new(ErlNifEnv::for_process(id)),
            mailbox: Mutex::new(VecDeque::new()),
            mailbox_signal: Condvar::new(),
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// The pid term of this process
    pub fn pid_term(&self) -> Eterm {
        eterm::make_pid(self.id)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Take the main lock, blocking until it is free.
    pub fn lock(&self) -> ProcessLock<'_> {
        let guard = self.main_lock.lock();
        ProcessLock {
            _guard: guard,
            env: self.heap_env.get(),
        }
    }

    pub fn try_lock(&self) -> Option<ProcessLock<'_>> {
        let guard = self.main_lock.try_lock()?;
        Some(ProcessLock {
            _guard: guard,
            env: self.heap_env.get(),
        })
    }

    /// Drop everything on the process heap.
    ///
    /// Stands in for the collector discovering that no live data refers to
    /// the heap any more: every term built on it becomes invalid and the
    /// resource references those terms held are released.
    pub fn garbage_collect(&self) {
        let lock = self.lock();
        // SAFETY: the main lock is held.
        unsafe { (*lock.env()).heap_mut().clear() };
    }

    /// Queue `message` unless the process has exited
    ///
    /// Liveness is read under the mailbox lock, so nothing lands in the
    /// mailbox after [`ProcessTable::exit`] has emptied it.
    pub(crate) fn deliver(&self, message: Message) -> bool {
        let mut mailbox = self.mailbox.lock();
        if !self.is_alive() {
            return false;
        }
        mailbox.push_back(message);
        drop(mailbox);
        self.mailbox_signal.notify_all();
        true
    }

    /// Take the oldest message, if any
    pub fn try_receive(&self) -> Option<Message> {
        self.mailbox.lock().pop_front()
    }

    /// Wait up to `timeout` for a message
    pub fn receive(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let mut mailbox = self.mailbox.lock();
        loop {
            if let Some(message) = mailbox.pop_front() {
                return Some(message);
            }
            if self
                .mailbox_signal
                .wait_until(&mut mailbox, deadline)
                .timed_out()
            {
                return mailbox.pop_front();
            }
        }
    }

    pub fn mailbox_len(&self) -> usize {
        self.mailbox.lock().len()
    }
}

/// Process table
///
/// Maps process identifiers to live processes. Based on ErtsPTab in
/// erl_ptab.c, reduced to a locked hash map.
pub struct ProcessTable {
    table: RwLock<HashMap<ProcessId, Arc<Process>>>,
    next_id: AtomicU64,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create and register a new process
    pub fn spawn(&self) -> Arc<Process> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let process = Arc::new(Process::new(id));
        self.table.write().insert(id, Arc::clone(&process));
        log::trace!("spawned process <0.{}.0>", id);
        process
    }

    pub fn lookup(&self, id: ProcessId) -> Option<Arc<Process>> {
        self.table.read().get(&id).cloned()
    }

    /// True if `id` names a registered process that has not exited
    pub fn is_alive(&self, id: ProcessId) -> bool {
        self.lookup(id).is_some_and(|p| p.is_alive())
    }

    pub fn size(&self) -> usize {
        self.table.read().len()
    }

    /// Terminate a process
    ///
    /// Marks it dead, unregisters it and fires its resource monitors. The
    /// heap is collected now if no call holds the main lock, otherwise when
    /// the last reference to the process goes away.
    ///
    /// # Returns
    ///
    /// * `true` - The process was alive and has now exited
    /// * `false` - No such live process
    pub fn exit(&self, id: ProcessId) -> bool {
        let Some(process) = self.table.write().remove(&id) else {
            return false;
        };
        if !process.alive.swap(false, Ordering::AcqRel) {
            return false;
        }
        log::debug!("process <0.{}.0> exited", id);
        fire_process_monitors(id);
        if let Some(lock) = process.try_lock() {
            // SAFETY: the main lock is held.
            unsafe { (*lock.env()).heap_mut().clear() };
        }
        process.mailbox.lock().clear();
        true
    }
}

static GLOBAL_PROCESS_TABLE: OnceLock<ProcessTable> = OnceLock::new();

/// The runtime's process table
pub fn get_global_process_table() -> &'static ProcessTable {
    GLOBAL_PROCESS_TABLE.get_or_init(ProcessTable::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapObject;

    #[test]
    fn test_spawn_lookup_exit() {
        let table = ProcessTable::new();
        let process = table.spawn();
        assert!(table.is_alive(process.id()));
        assert!(table.exit(process.id()));
        assert!(!process.is_alive());
        assert!(!table.is_alive(process.id()));
        assert!(!table.exit(process.id()));
    }

    #[test]
    fn test_garbage_collect_clears_heap() {
        let table = ProcessTable::new();
        let process = table.spawn();
        {
            let lock = process.lock();
            unsafe { (*lock.env()).heap_mut().alloc_boxed(HeapObject::Float(1.0)) };
        }
        process.garbage_collect();
        let lock = process.lock();
        assert_eq!(unsafe { (*lock.env()).heap().object_count() }, 0);
    }

    #[test]
    fn test_heap_grows_until_collected() {
        let table = ProcessTable::new();
        let process = table.spawn();
        for round in 1..=3 {
            let lock = process.lock();
            unsafe { (*lock.env()).heap_mut().alloc_boxed(HeapObject::Float(1.0)) };
            assert_eq!(unsafe { (*lock.env()).heap().object_count() }, round);
        }
        process.garbage_collect();
        assert_eq!(unsafe { (*process.lock().env()).heap().object_count() }, 0);
    }

    fn message() -> Message {
        let mut env = Box::new(ErlNifEnv::new(crate::nif_env::EnvKind::Message));
        let term = env.heap_mut().alloc_boxed(HeapObject::Float(2.0));
        Message::new(env, term)
    }

    #[test]
    fn test_no_delivery_after_exit() {
        let table = ProcessTable::new();
        let process = table.spawn();
        assert!(process.deliver(message()));
        assert!(table.exit(process.id()));
        assert_eq!(process.mailbox_len(), 0);
        assert!(!process.deliver(message()));
        assert_eq!(process.mailbox_len(), 0);
    }

    #[test]
    fn test_concurrent_senders_race_exit() {
        let table = ProcessTable::new();
        let process = table.spawn();
        std::thread::scope(|s| {
            for _ in 0..4 {
                let process = &process;
                s.spawn(move || while process.deliver(message()) {});
            }
            std::thread::sleep(Duration::from_millis(5));
            assert!(table.exit(process.id()));
        });
        assert_eq!(process.mailbox_len(), 0);
    }

    #[test]
    fn test_receive_times_out_on_empty_mailbox() {
        let table = ProcessTable::new();
        let process = table.spawn();
        assert!(process.receive(Duration::from_millis(10)).is_none());
        assert_eq!(process.mailbox_len(), 0);
    }
}
