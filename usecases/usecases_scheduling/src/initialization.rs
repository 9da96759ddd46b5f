//! Scheduling Initialization
//!
//! Creates the three scheduler pools. Based on erts_init_scheduling() from
//! erl_process.c.

use crate::scheduler::{ScheduleError, SchedulerKind, SchedulerPool};
use std::sync::OnceLock;

/// Global schedulers (initialized by erts_init_scheduling)
static GLOBAL_SCHEDULERS: OnceLock<Schedulers> = OnceLock::new();

/// The normal, dirty CPU and dirty I/O pools
pub struct Schedulers {
    normal: SchedulerPool,
    dirty_cpu: SchedulerPool,
    dirty_io: SchedulerPool,
}

impl Schedulers {
    /// Start all three pools
    ///
    /// # Arguments
    /// * `no_schedulers` - Normal scheduler threads
    /// * `no_dirty_cpu_schedulers` - Dirty CPU scheduler threads
    /// * `no_dirty_io_schedulers` - Dirty I/O scheduler threads
    ///
    /// Every count must be at least 1.
    pub fn start(
        no_schedulers: usize,
        no_dirty_cpu_schedulers: usize,
        no_dirty_io_schedulers: usize,
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            normal: SchedulerPool::start(SchedulerKind::Normal, no_schedulers)?,
            dirty_cpu: SchedulerPool::start(SchedulerKind::DirtyCpu, no_dirty_cpu_schedulers)?,
            dirty_io: SchedulerPool::start(SchedulerKind::DirtyIo, no_dirty_io_schedulers)?,
        })
    }

    pub fn pool(&self, kind: SchedulerKind) -> &SchedulerPool {
        match kind {
            SchedulerKind::Normal => &self.normal,
            SchedulerKind::DirtyCpu => &self.dirty_cpu,
            SchedulerKind::DirtyIo => &self.dirty_io,
        }
    }

    /// Stop every pool, letting queued jobs finish first.
    pub fn stop(&self) {
        self.normal.stop();
        self.dirty_cpu.stop();
        self.dirty_io.stop();
    }
}

/// Initialize the global scheduling system
///
/// Based on `erts_init_scheduling()` from erl_process.c
///
/// # Returns
/// * `Ok(&Schedulers)` - The running pools
/// * `Err(ScheduleError::AlreadyInitialized)` - Called twice
/// * `Err(ScheduleError)` - A pool could not be started
pub fn erts_init_scheduling(
    no_schedulers: usize,
    no_dirty_cpu_schedulers: usize,
    no_dirty_io_schedulers: usize,
) -> Result<&'static Schedulers, ScheduleError> {
    if GLOBAL_SCHEDULERS.get().is_some() {
        return Err(ScheduleError::AlreadyInitialized);
    }
    let schedulers = Schedulers::start(no_schedulers, no_dirty_cpu_schedulers, no_dirty_io_schedulers)?;
    // A racing initializer may have won; its pools stay and ours are dropped.
    GLOBAL_SCHEDULERS
        .set(schedulers)
        .map_err(|_| ScheduleError::AlreadyInitialized)?;
    GLOBAL_SCHEDULERS.get().ok_or(ScheduleError::AlreadyInitialized)
}

/// Get the global schedulers, if initialized
pub fn get_global_schedulers() -> Option<&'static Schedulers> {
    GLOBAL_SCHEDULERS.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_validates_every_pool() {
        assert!(Schedulers::start(1, 1, 0).is_err());
        assert!(Schedulers::start(0, 1, 1).is_err());
        let schedulers = Schedulers::start(2, 1, 1).unwrap();
        assert_eq!(schedulers.pool(SchedulerKind::Normal).size(), 2);
        assert_eq!(schedulers.pool(SchedulerKind::DirtyIo).kind(), SchedulerKind::DirtyIo);
        schedulers.stop();
        assert!(!schedulers.pool(SchedulerKind::DirtyCpu).is_running());
    }

    #[test]
    fn test_global_init_once() {
        let first = erts_init_scheduling(1, 1, 1);
        assert!(first.is_ok());
        assert!(get_global_schedulers().is_some());
        assert!(matches!(
            erts_init_scheduling(1, 1, 1),
            Err(ScheduleError::AlreadyInitialized)
        ));
    }
}
