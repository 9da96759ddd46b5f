//! Frameworks Layer: Runtime Start-up and NIF Loading
//!
//! Brings the in-process runtime up and installs NIF libraries into it.
//!
//! ## Overview
//!
//! The `frameworks_emulator_init` crate is the outermost layer of the
//! runtime. It reads the configuration, starts the atom table, the tracked
//! allocator and the scheduler pools in the right order, and owns the table
//! of loaded NIF modules through which functions are called on behalf of
//! processes.
//!
//! ## Modules
//!
//! - **[`main_init`](main_init/index.html)**: `InitConfig`, `erl_start`
//!
//! - **[`env`](env/index.html)**: The `NIF_*` environment variables
//!
//! - **[`nif_loading`](nif_loading/index.html)**: Loading, upgrading,
//!   unloading and calling NIF modules
//!
//! ## Initialization Sequence
//!
//! 1. Validate the configuration
//! 2. Create the atom table with the configured limit
//! 3. Apply the allocator byte limit
//! 4. Start the normal, dirty CPU and dirty I/O scheduler pools
//!
//! ## See Also
//!
//! - [`usecases_scheduling`](../../usecases/usecases_scheduling/index.html): Scheduler pools
//! - [`infrastructure_nif_api`](../../infrastructure/infrastructure_nif_api/index.html): NIF primitives

pub mod env;
pub mod main_init;
pub mod nif_loading;

pub use main_init::{erl_start, get_runtime, is_initialized, InitConfig, InitError, Runtime};
pub use nif_loading::{get_global_module_table, LoadError, NifFunction, NifInitFn, NifModule, NifModuleTable};
