//! Main Initialization Module
//!
//! Brings the runtime up: atom table, allocator limit and the three
//! scheduler pools. Based on `erl_init()` and `erl_start()` from erl_init.c.

use crate::env::{
    read_count, NIF_ALLOC_LIMIT, NIF_ATOM_LIMIT, NIF_DIRTY_CPU_SCHEDULERS, NIF_DIRTY_IO_SCHEDULERS,
    NIF_SCHEDULERS,
};
use infrastructure_nif_api::atom_table::{init_atom_table, DEFAULT_ATOM_LIMIT};
use parking_lot::{const_mutex, Mutex};
use std::sync::OnceLock;
use usecases_memory_management::get_global_allocator;
use usecases_scheduling::{erts_init_scheduling, ScheduleError, Schedulers};

/// Default number of dirty I/O schedulers, as in the reference runtime
pub const DEFAULT_DIRTY_IO_SCHEDULERS: usize = 10;

/// Initialization error types
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to start schedulers: {0}")]
    Scheduling(#[from] ScheduleError),
}

/// Initialization configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfig {
    /// Number of normal schedulers
    pub no_schedulers: usize,
    /// Number of dirty CPU schedulers
    pub no_dirty_cpu_schedulers: usize,
    /// Number of dirty IO schedulers
    pub no_dirty_io_schedulers: usize,
    /// Atom table capacity
    pub atom_limit: usize,
    /// Bytes the `enif_alloc` family may hold at once; `None` is unlimited
    pub alloc_limit: Option<usize>,
}

impl Default for InitConfig {
    fn default() -> Self {
        let ncpu = num_cpus::get().max(1);
        Self {
            no_schedulers: ncpu,
            no_dirty_cpu_schedulers: ncpu,
            no_dirty_io_schedulers: DEFAULT_DIRTY_IO_SCHEDULERS,
            atom_limit: DEFAULT_ATOM_LIMIT,
            alloc_limit: None,
        }
    }
}

impl InitConfig {
    /// Defaults overridden by the `NIF_*` environment variables
    ///
    /// # Returns
    /// * `Ok(InitConfig)` - A validated configuration
    /// * `Err(InitError)` - A variable does not parse or a value is out of range
    pub fn from_env() -> Result<Self, InitError> {
        let defaults = Self::default();
        let config = Self {
            no_schedulers: read_count(NIF_SCHEDULERS)?.unwrap_or(defaults.no_schedulers),
            no_dirty_cpu_schedulers: read_count(NIF_DIRTY_CPU_SCHEDULERS)?
                .unwrap_or(defaults.no_dirty_cpu_schedulers),
            no_dirty_io_schedulers: read_count(NIF_DIRTY_IO_SCHEDULERS)?
                .unwrap_or(defaults.no_dirty_io_schedulers),
            atom_limit: read_count(NIF_ATOM_LIMIT)?.unwrap_or(defaults.atom_limit),
            alloc_limit: read_count(NIF_ALLOC_LIMIT)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every pool has a thread and the atom table has room.
    pub fn validate(&self) -> Result<(), InitError> {
        let pools = [
            ("normal", self.no_schedulers),
            ("dirty CPU", self.no_dirty_cpu_schedulers),
            ("dirty I/O", self.no_dirty_io_schedulers),
        ];
        for (pool, count) in pools {
            if count == 0 {
                return Err(InitError::InvalidConfig(format!(
                    "{} scheduler pool needs at least one thread",
                    pool
                )));
            }
        }
        if self.atom_limit == 0 {
            return Err(InitError::InvalidConfig("atom limit must be positive".into()));
        }
        Ok(())
    }
}

/// A running runtime
pub struct Runtime {
    config: InitConfig,
    schedulers: &'static Schedulers,
}

impl Runtime {
    /// The configuration the runtime was started with
    pub fn config(&self) -> &InitConfig {
        &self.config
    }

    pub fn schedulers(&self) -> &'static Schedulers {
        self.schedulers
    }
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static START_LOCK: Mutex<()> = const_mutex(());

/// Start the runtime
///
/// Based on `erl_start()` from erl_init.c. Runs once per OS process; later
/// calls return the running instance and ignore `config`.
///
/// # Returns
/// * `Ok(&Runtime)` - The running runtime
/// * `Err(InitError)` - `config` is invalid or the schedulers failed to start
pub fn erl_start(config: InitConfig) -> Result<&'static Runtime, InitError> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let _guard = START_LOCK.lock();
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    config.validate()?;
    let runtime = erl_init(config)?;
    Ok(RUNTIME.get_or_init(|| runtime))
}

/// Perform main initialization
///
/// Based on `erl_init()` from erl_init.c.
fn erl_init(config: InitConfig) -> Result<Runtime, InitError> {
    if !init_atom_table(config.atom_limit) {
        log::warn!(
            "atom table created before start-up; limit {} not applied",
            config.atom_limit
        );
    }
    get_global_allocator().set_limit(config.alloc_limit);
    let schedulers = erts_init_scheduling(
        config.no_schedulers,
        config.no_dirty_cpu_schedulers,
        config.no_dirty_io_schedulers,
    )?;
    log::info!(
        "runtime started: {} schedulers, {} dirty CPU, {} dirty I/O",
        config.no_schedulers,
        config.no_dirty_cpu_schedulers,
        config.no_dirty_io_schedulers
    );
    Ok(Runtime { config, schedulers })
}

/// The running runtime, if [`erl_start`] has succeeded
pub fn get_runtime() -> Option<&'static Runtime> {
    RUNTIME.get()
}

pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_config_default() {
        let config = InitConfig::default();
        assert!(config.no_schedulers >= 1);
        assert_eq!(config.no_schedulers, config.no_dirty_cpu_schedulers);
        assert_eq!(config.no_dirty_io_schedulers, DEFAULT_DIRTY_IO_SCHEDULERS);
        assert_eq!(config.alloc_limit, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_pools() {
        let config = InitConfig {
            no_dirty_io_schedulers: 0,
            ..InitConfig::default()
        };
        assert!(matches!(config.validate(), Err(InitError::InvalidConfig(_))));
        let config = InitConfig {
            atom_limit: 0,
            ..InitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_erl_start_runs_once() {
        let config = InitConfig {
            no_schedulers: 2,
            no_dirty_cpu_schedulers: 1,
            no_dirty_io_schedulers: 1,
            ..InitConfig::default()
        };
        let first = erl_start(config).unwrap();
        let second = erl_start(InitConfig::default()).unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(
            first.schedulers().pool(usecases_scheduling::SchedulerKind::Normal).size(),
            first.config().no_schedulers
        );
        assert!(is_initialized());
    }
}
