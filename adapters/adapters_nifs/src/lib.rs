//! Adapters Layer: Safe NIF Interface
//!
//! A typed layer for writing Native Implemented Functions in Rust on top of
//! the raw `enif_*` primitives in `infrastructure_nif_api`.
//!
//! ## Overview
//!
//! Raw native functions trade in untyped handles whose validity depends on
//! rules the compiler cannot see: a term belongs to one environment, a
//! resource handle needs a matching release, and a panic must never cross
//! into the runtime. This crate encodes those rules in types:
//!
//! - **[`env`]** / **[`term`]**: [`Env<'a>`] and [`Term<'a>`] share a call
//!   lifetime, so a term cannot outlive the call that produced it.
//! - **[`types`]**: [`Encoder`] and [`Decoder`] for numbers, atoms,
//!   binaries, lists, tuples, maps and pids.
//! - **[`owned_env`]**: environments owned by native code, for building
//!   messages off the scheduler and keeping terms between calls.
//! - **[`resource`]**: resource type registration, raw and typed handles,
//!   and process monitors.
//! - **[`schedule`]**: dirty scheduling and yielding tasks.
//! - **[`barrier`]**: the fault barrier every native function runs inside,
//!   plus argument validators.
//! - **[`entry`]**: the module entry table and [`nif_init!`].
//! - **[`allocator`]**: the runtime allocator.
//!
//! ## Failures
//!
//! Every fallible operation returns a [`NifResult`]. The barrier turns an
//! error into a value or an exception and a panic into a `nif_panicked`
//! exception. Faults below the language level (segfaults, stack overflow,
//! using a handle after its environment is cleared through raw calls) are
//! not contained and still take the runtime down.
//!
//! ## See Also
//!
//! - [`infrastructure_nif_api`](../infrastructure_nif_api/index.html): the raw primitives
//! - [`entities_data_handling`](../entities_data_handling/index.html): term encoding

pub mod allocator;
pub mod barrier;
pub mod entry;
pub mod env;
pub mod error;
pub mod owned_env;
pub mod resource;
pub mod schedule;
pub mod term;
pub mod types;

pub use barrier::{
    require_argc, require_atom, require_binary, require_int, require_int_range, require_list,
    require_map, require_non_negative, require_pid, require_positive, require_tuple, run_nif,
};
pub use entry::NifEntryBuilder;
pub use env::Env;
pub use error::{NifError, NifResult};
pub use owned_env::{OwnedEnv, SavedTerm};
pub use resource::{Monitor, Registrar, Resource, ResourceArc, ResourcePtr, ResourceRegistry, ResourceType};
pub use schedule::{SchedulerFlags, Step, ThreadType, YieldingTask};
pub use term::{Term, TermType};
pub use types::atom::{atoms, Atom};
pub use types::binary::{Binary, OwnedBinary};
pub use types::list::ListIterator;
pub use types::pid::LocalPid;
pub use types::{Decoder, Encoder};

pub use infrastructure_nif_api::{ErlNifCharEncoding, ErlNifEntry, ErlNifEnv, NifFn, ERL_NIF_TERM};
