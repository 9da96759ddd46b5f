//! Use Cases Layer: Scheduling
//!
//! Runs native functions on scheduler threads. There are three pools of
//! threads: normal schedulers for short calls, and dirty CPU and dirty I/O
//! schedulers for calls that may run for a long time. A call moves between
//! pools when it hands its remaining work to another function with
//! `enif_schedule_nif`.
//!
//! ## Modules
//!
//! - **[`scheduler`](scheduler/index.html)**: Scheduler pools and their threads
//!
//! - **[`initialization`](initialization/index.html)**: Start-up of the three
//!   pools, once per runtime
//!
//! - **[`dispatch`](dispatch/index.html)**: Driving a call on behalf of a
//!   process through its hand-offs
//!
//! ## Architecture
//!
//! Based on the scheduler set-up in `erl_process.c` and the dirty NIF
//! scheduling in `erl_nif.c`. Depends on:
//! - `entities_data_handling` for term words
//! - `infrastructure_nif_api` for processes, environments and the thread type
//!
//! ## See Also
//!
//! - [`infrastructure_nif_api`](../../infrastructure/infrastructure_nif_api/index.html): NIF primitives

pub mod dispatch;
pub mod initialization;
pub mod scheduler;

pub use dispatch::{call_nif, CallOutcome, CallReport, NifCall};
pub use initialization::{erts_init_scheduling, get_global_schedulers, Schedulers};
pub use scheduler::{Job, ScheduleError, SchedulerKind, SchedulerPool};
