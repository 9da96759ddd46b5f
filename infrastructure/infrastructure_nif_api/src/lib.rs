//! Infrastructure NIF API
//!
//! The `erl_nif.h` primitive layer, implemented in Rust and exported with the
//! C ABI. Native code sees exactly what a C NIF sees: raw environment
//! handles (`*mut ErlNifEnv`), term words (`ERL_NIF_TERM`), C-style `int`
//! success flags and null pointers on failure. Nothing here panics on bad
//! input and nothing returns a Rust `Result`; the safe, typed view lives in
//! `adapters_nifs`.
//!
//! ## Overview
//!
//! - **Environments** ([`nif_env`]): process-bound, process-independent,
//!   callback and load environments, each owning a term heap
//! - **Term Creation** ([`term_creation`]): `enif_make_*`
//! - **Term Decoding** ([`term_decoding`]): `enif_get_*`, `enif_is_*`,
//!   `enif_term_type`
//! - **Comparison** ([`comparison`]): `enif_compare`, `enif_is_identical`
//! - **Maps** ([`maps`]): `enif_make_new_map`, `enif_make_map_put`, ...
//! - **Binaries** ([`binary`]): owned and borrowed binaries
//! - **Error Handling** ([`error_handling`]): `enif_make_badarg`,
//!   `enif_raise_exception`
//! - **Resource Management** ([`resource_management`]): resource types,
//!   reference-counted objects, process monitors
//! - **Memory** ([`memory`]): `enif_alloc` family over the tracked allocator
//! - **Scheduling** ([`scheduling`]): thread types, `enif_schedule_nif`,
//!   `enif_consume_timeslice`
//! - **Messaging** ([`messaging`]): `enif_self`, `enif_send`,
//!   `enif_is_process_alive`
//! - **Processes** ([`process`]): the host processes the environments belong to
//!
//! ## Term Representation
//!
//! Terms are tagged words (see `entities_data_handling::eterm`). Immediates
//! are encoded in the word; every other term points at a [`heap::HeapObject`]
//! owned by the heap of the environment that created it.
//!
//! ## See Also
//!
//! - `erts/emulator/beam/erl_nif.c` - C reference implementation
//! - `erts/emulator/beam/erl_nif.h` - C header

/*
 * %CopyrightBegin%
 *
 * SPDX-License-Identifier: Apache-2.0
 *
 * Copyright Lee Barney 2025. All Rights Reserved.
 *
 * This file is derived from work copyrighted by Ericsson AB 1996-2025.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 * %CopyrightEnd%
 */

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::missing_safety_doc)]

use std::os::raw::{c_char, c_int, c_uint, c_void};

pub mod atom_table;
pub mod binary;
pub mod comparison;
pub mod error_handling;
pub mod heap;
pub mod maps;
pub mod memory;
pub mod messaging;
pub mod nif_env;
pub mod process;
pub mod resource_management;
pub mod scheduling;
pub mod term_creation;
pub mod term_decoding;

pub use binary::*;
pub use comparison::*;
pub use error_handling::*;
pub use maps::*;
pub use memory::*;
pub use messaging::*;
pub use nif_env::*;
pub use resource_management::*;
pub use scheduling::*;
pub use term_creation::*;
pub use term_decoding::*;

/// A term word. Matches the C `ERL_NIF_TERM` type.
pub type ERL_NIF_TERM = u64;

pub type ErlNifUInt64 = u64;
pub type ErlNifSInt64 = i64;

pub const ERL_NIF_MAJOR_VERSION: c_int = 2;
pub const ERL_NIF_MINOR_VERSION: c_int = 17;
pub const ERL_NIF_VM_VARIANT: &[u8] = b"beam.vanilla\0";

/// Character encoding for atoms and strings
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErlNifCharEncoding {
    ERL_NIF_LATIN1 = 1,
    ERL_NIF_UTF8 = 2,
}

/// Result of `enif_term_type`
pub type ErlNifTermType = c_int;
pub const ERL_NIF_TERM_TYPE_ATOM: ErlNifTermType = 1;
pub const ERL_NIF_TERM_TYPE_BITSTRING: ErlNifTermType = 2;
pub const ERL_NIF_TERM_TYPE_FLOAT: ErlNifTermType = 3;
pub const ERL_NIF_TERM_TYPE_FUN: ErlNifTermType = 4;
pub const ERL_NIF_TERM_TYPE_INTEGER: ErlNifTermType = 5;
pub const ERL_NIF_TERM_TYPE_LIST: ErlNifTermType = 6;
pub const ERL_NIF_TERM_TYPE_MAP: ErlNifTermType = 7;
pub const ERL_NIF_TERM_TYPE_PID: ErlNifTermType = 8;
pub const ERL_NIF_TERM_TYPE_PORT: ErlNifTermType = 9;
pub const ERL_NIF_TERM_TYPE_REFERENCE: ErlNifTermType = 10;
pub const ERL_NIF_TERM_TYPE_TUPLE: ErlNifTermType = 11;

/// Flags of `ErlNifFunc` and `enif_schedule_nif`
pub const ERL_NIF_DIRTY_JOB_CPU_BOUND: c_uint = 1;
pub const ERL_NIF_DIRTY_JOB_IO_BOUND: c_uint = 2;

/// Results of `enif_thread_type`
pub const ERL_NIF_THR_UNDEFINED: c_int = 0;
pub const ERL_NIF_THR_NORMAL_SCHEDULER: c_int = 1;
pub const ERL_NIF_THR_DIRTY_CPU_SCHEDULER: c_int = 2;
pub const ERL_NIF_THR_DIRTY_IO_SCHEDULER: c_int = 3;

/// Local process identifier
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErlNifPid {
    pub pid: ERL_NIF_TERM,
}

/// Handle of a resource-to-process monitor
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErlNifMonitor {
    pub(crate) id: u64,
    pub(crate) pid: u64,
}

/// Binary descriptor shared with native code
#[repr(C)]
#[derive(Debug)]
pub struct ErlNifBinary {
    pub size: usize,
    pub data: *mut u8,
    pub(crate) ref_bin: *mut c_void,
    pub(crate) __spare__: [*mut c_void; 2],
}

impl Default for ErlNifBinary {
    fn default() -> Self {
        Self {
            size: 0,
            data: std::ptr::null_mut(),
            ref_bin: std::ptr::null_mut(),
            __spare__: [std::ptr::null_mut(); 2],
        }
    }
}

/// Event passed to a resource stop callback
pub type ErlNifEvent = c_int;

pub type ErlNifResourceDtor = unsafe extern "C" fn(env: *mut ErlNifEnv, obj: *mut c_void);
pub type ErlNifResourceStop = unsafe extern "C" fn(
    env: *mut ErlNifEnv,
    obj: *mut c_void,
    event: ErlNifEvent,
    is_direct_call: c_int,
);
pub type ErlNifResourceDown = unsafe extern "C" fn(
    env: *mut ErlNifEnv,
    obj: *mut c_void,
    pid: *const ErlNifPid,
    mon: *const ErlNifMonitor,
);

/// Callbacks of a resource type, for `enif_init_resource_type`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ErlNifResourceTypeInit {
    pub dtor: Option<ErlNifResourceDtor>,
    pub stop: Option<ErlNifResourceStop>,
    pub down: Option<ErlNifResourceDown>,
    pub members: c_int,
    pub dyncall: *const c_void,
}

pub type ErlNifResourceFlags = c_int;
pub const ERL_NIF_RT_CREATE: ErlNifResourceFlags = 1;
pub const ERL_NIF_RT_TAKEOVER: ErlNifResourceFlags = 2;

/// Signature of every native function
pub type NifFn =
    unsafe extern "C" fn(env: *mut ErlNifEnv, argc: c_int, argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM;

/// One row of a library's function table
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ErlNifFunc {
    pub name: *const c_char,
    pub arity: c_uint,
    pub fptr: NifFn,
    pub flags: c_uint,
}

pub type NifLoadFn = unsafe extern "C" fn(
    env: *mut ErlNifEnv,
    priv_data: *mut *mut c_void,
    load_info: ERL_NIF_TERM,
) -> c_int;
pub type NifUpgradeFn = unsafe extern "C" fn(
    env: *mut ErlNifEnv,
    priv_data: *mut *mut c_void,
    old_priv_data: *mut *mut c_void,
    load_info: ERL_NIF_TERM,
) -> c_int;
pub type NifUnloadFn = unsafe extern "C" fn(env: *mut ErlNifEnv, priv_data: *mut c_void);

/// What a NIF library's `nif_init` returns
#[repr(C)]
#[derive(Debug)]
pub struct ErlNifEntry {
    pub major: c_int,
    pub minor: c_int,
    pub name: *const c_char,
    pub num_of_funcs: c_int,
    pub funcs: *const ErlNifFunc,
    pub load: Option<NifLoadFn>,
    pub reload: Option<NifLoadFn>,
    pub upgrade: Option<NifUpgradeFn>,
    pub unload: Option<NifUnloadFn>,
    pub vm_variant: *const c_char,
    pub options: c_uint,
    pub sizeof_ErlNifResourceTypeInit: usize,
    pub min_erts: *const c_char,
}

// Entries and function tables are immutable once built and are read from
// every scheduler thread.
unsafe impl Send for ErlNifEntry {}
unsafe impl Sync for ErlNifEntry {}
unsafe impl Send for ErlNifFunc {}
unsafe impl Sync for ErlNifFunc {}
