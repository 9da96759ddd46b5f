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

//! Module Entry Table
//!
//! A NIF library describes itself with one `ErlNifEntry`: its module name,
//! the function table and the load, upgrade and unload callbacks. The
//! table is built once, from `(name, arity, function, flags)` rows, and
//! lives for the rest of the process.
//!
//! [`nif_init!`](crate::nif_init) generates the `nif_init` function the
//! loader looks up, plus the callback shims that run Rust hooks inside the
//! fault barrier.

use crate::barrier::guard_hook;
use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::schedule::SchedulerFlags;
use crate::term::Term;
use infrastructure_nif_api::{
    ErlNifEntry, ErlNifEnv, ErlNifFunc, ErlNifResourceTypeInit, NifFn, NifLoadFn, NifUnloadFn,
    NifUpgradeFn, ERL_NIF_MAJOR_VERSION, ERL_NIF_MINOR_VERSION, ERL_NIF_TERM, ERL_NIF_VM_VARIANT,
};
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::os::raw::{c_int, c_uint};

/// Rust load hook: load environment and load info
pub type LoadHook = fn(Env<'_>, Term<'_>) -> NifResult<()>;
/// Rust upgrade hook: load environment and load info
pub type UpgradeHook = fn(Env<'_>, Term<'_>) -> NifResult<()>;
/// Rust unload hook
pub type UnloadHook = fn(Env<'_>);

struct FunctionRow {
    name: String,
    arity: c_uint,
    fptr: NifFn,
    flags: SchedulerFlags,
}

/// Builder for a module's `ErlNifEntry`
pub struct NifEntryBuilder {
    name: String,
    functions: Vec<FunctionRow>,
    load: Option<NifLoadFn>,
    upgrade: Option<NifUpgradeFn>,
    unload: Option<NifUnloadFn>,
}

impl NifEntryBuilder {
    pub fn new(module: &str) -> Self {
        Self {
            name: module.to_owned(),
            functions: Vec::new(),
            load: None,
            upgrade: None,
            unload: None,
        }
    }

    pub fn function(self, name: &str, arity: u32, fptr: NifFn) -> Self {
        self.dirty_function(name, arity, fptr, SchedulerFlags::Normal)
    }

    /// Function declared to run on the pool `flags` selects
    pub fn dirty_function(mut self, name: &str, arity: u32, fptr: NifFn, flags: SchedulerFlags) -> Self {
        self.functions.push(FunctionRow {
            name: name.to_owned(),
            arity,
            fptr,
            flags,
        });
        self
    }

    pub fn load(mut self, load: NifLoadFn) -> Self {
        self.load = Some(load);
        self
    }

    pub fn upgrade(mut self, upgrade: NifUpgradeFn) -> Self {
        self.upgrade = Some(upgrade);
        self
    }

    pub fn unload(mut self, unload: NifUnloadFn) -> Self {
        self.unload = Some(unload);
        self
    }

    /// Build the entry
    ///
    /// # Returns
    /// * `Err(NifError::BadArg)` - Empty module name, a name with a NUL
    ///   byte, or the same name and arity twice
    pub fn build(self) -> NifResult<&'static ErlNifEntry> {
        if self.name.is_empty() {
            return Err(NifError::BadArg);
        }
        let mut seen = BTreeSet::new();
        for row in &self.functions {
            if !seen.insert((row.name.as_str(), row.arity)) {
                return Err(NifError::BadArg);
            }
        }
        let module = leak_c_str(&self.name)?;
        let funcs = self
            .functions
            .iter()
            .map(|row| {
                Ok(ErlNifFunc {
                    name: leak_c_str(&row.name)?.as_ptr(),
                    arity: row.arity,
                    fptr: row.fptr,
                    flags: row.flags.as_raw(),
                })
            })
            .collect::<NifResult<Vec<_>>>()?;
        let num_of_funcs = c_int::try_from(funcs.len()).map_err(|_| NifError::BadArg)?;
        let funcs: &'static [ErlNifFunc] = Box::leak(funcs.into_boxed_slice());

        Ok(Box::leak(Box::new(ErlNifEntry {
            major: ERL_NIF_MAJOR_VERSION,
            minor: ERL_NIF_MINOR_VERSION,
            name: module.as_ptr(),
            num_of_funcs,
            funcs: funcs.as_ptr(),
            load: self.load,
            reload: None,
            upgrade: self.upgrade,
            unload: self.unload,
            vm_variant: ERL_NIF_VM_VARIANT.as_ptr().cast(),
            options: 0,
            sizeof_ErlNifResourceTypeInit: std::mem::size_of::<ErlNifResourceTypeInit>(),
            min_erts: std::ptr::null(),
        })))
    }

    /// [`NifEntryBuilder::build`], logging a failure
    pub fn build_or_log(self) -> Option<&'static ErlNifEntry> {
        let module = self.name.clone();
        match self.build() {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::error!("invalid entry table for {}: {}", module, err);
                None
            }
        }
    }
}

fn leak_c_str(text: &str) -> NifResult<&'static CStr> {
    let owned = CString::new(text).map_err(|_| NifError::BadArg)?;
    Ok(Box::leak(owned.into_boxed_c_str()))
}

/// Run a Rust load hook for the loader
///
/// # Safety
/// Only for the `load` callback of an entry.
pub unsafe fn call_load_hook(module: &str, hook: LoadHook, env: *mut ErlNifEnv, load_info: ERL_NIF_TERM) -> c_int {
    guard_hook(module, "load", || {
        let env = Env::wrap(env);
        hook(env, Term::new(env, load_info))
    })
}

/// Run a Rust upgrade hook for the loader
///
/// # Safety
/// Only for the `upgrade` callback of an entry.
pub unsafe fn call_upgrade_hook(
    module: &str,
    hook: UpgradeHook,
    env: *mut ErlNifEnv,
    load_info: ERL_NIF_TERM,
) -> c_int {
    guard_hook(module, "upgrade", || {
        let env = Env::wrap(env);
        hook(env, Term::new(env, load_info))
    })
}

/// Run a Rust unload hook for the loader
///
/// # Safety
/// Only for the `unload` callback of an entry.
pub unsafe fn call_unload_hook(module: &str, hook: UnloadHook, env: *mut ErlNifEnv) {
    guard_hook(module, "unload", || {
        hook(Env::wrap(env));
        Ok(())
    });
}

/// Declare a NIF module
///
/// Generates `pub extern "C" fn nif_init() -> *const ErlNifEntry`, which
/// returns the module's entry table, built on first use. Exporting the
/// symbol from a shared library is left to the build.
///
/// ```ignore
/// nif_init!(
///     name: "counter_nif",
///     functions: [("new", 0, counter_new), ("burn", 1, burn, DirtyCpu)],
///     load: on_load,
///     unload: on_unload,
/// );
/// ```
#[macro_export]
macro_rules! nif_init {
    (@flags) => { $crate::schedule::SchedulerFlags::Normal };
    (@flags $flags:ident) => { $crate::schedule::SchedulerFlags::$flags };
    (
        name: $name:expr,
        functions: [$(($fname:expr, $arity:expr, $fptr:expr $(, $flags:ident)?)),* $(,)?]
        $(, load: $load:expr)?
        $(, upgrade: $upgrade:expr)?
        $(, unload: $unload:expr)?
        $(,)?
    ) => {
        pub extern "C" fn nif_init() -> *const $crate::ErlNifEntry {
            static ENTRY: ::std::sync::OnceLock<::std::option::Option<&'static $crate::ErlNifEntry>> =
                ::std::sync::OnceLock::new();
            let entry = ENTRY.get_or_init(|| {
                let builder = $crate::entry::NifEntryBuilder::new($name)
                    $(.dirty_function($fname, $arity, $fptr, $crate::nif_init!(@flags $($flags)?)))*;
                $(
                    unsafe extern "C" fn __nif_load(
                        env: *mut $crate::ErlNifEnv,
                        _priv_data: *mut *mut ::std::os::raw::c_void,
                        load_info: $crate::ERL_NIF_TERM,
                    ) -> ::std::os::raw::c_int {
                        $crate::entry::call_load_hook($name, $load, env, load_info)
                    }
                    let builder = builder.load(__nif_load);
                )?
                $(
                    unsafe extern "C" fn __nif_upgrade(
                        env: *mut $crate::ErlNifEnv,
                        _priv_data: *mut *mut ::std::os::raw::c_void,
                        _old_priv_data: *mut *mut ::std::os::raw::c_void,
                        load_info: $crate::ERL_NIF_TERM,
                    ) -> ::std::os::raw::c_int {
                        $crate::entry::call_upgrade_hook($name, $upgrade, env, load_info)
                    }
                    let builder = builder.upgrade(__nif_upgrade);
                )?
                $(
                    unsafe extern "C" fn __nif_unload(
                        env: *mut $crate::ErlNifEnv,
                        _priv_data: *mut ::std::os::raw::c_void,
                    ) {
                        $crate::entry::call_unload_hook($name, $unload, env)
                    }
                    let builder = builder.unload(__nif_unload);
                )?
                builder.build_or_log()
            });
            entry.map_or(::std::ptr::null(), |e| e as *const $crate::ErlNifEntry)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn noop(_env: *mut ErlNifEnv, _argc: c_int, _argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
        entities_data_handling::eterm::NIL
    }

    #[test]
    fn test_build_entry() {
        let entry = NifEntryBuilder::new("entry_tests")
            .function("a", 0, noop)
            .function("a", 1, noop)
            .dirty_function("b", 2, noop, SchedulerFlags::DirtyIo)
            .build()
            .unwrap();
        assert_eq!(entry.num_of_funcs, 3);
        let funcs = unsafe { std::slice::from_raw_parts(entry.funcs, 3) };
        assert_eq!(funcs[2].flags, infrastructure_nif_api::ERL_NIF_DIRTY_JOB_IO_BOUND);
        assert_eq!(unsafe { CStr::from_ptr(funcs[1].name) }.to_str(), Ok("a"));
        assert_eq!(unsafe { CStr::from_ptr(entry.name) }.to_str(), Ok("entry_tests"));
    }

    #[test]
    fn test_rejects_duplicates_and_bad_names() {
        let duplicate = NifEntryBuilder::new("m").function("a", 1, noop).function("a", 1, noop);
        assert_eq!(duplicate.build().unwrap_err(), NifError::BadArg);
        assert!(NifEntryBuilder::new("").build().is_err());
        assert!(NifEntryBuilder::new("m").function("a\0b", 0, noop).build_or_log().is_none());
    }

    mod declared {
        use crate::env::Env;
        use crate::error::NifResult;
        use crate::term::Term;
        use infrastructure_nif_api::{ErlNifEnv, ERL_NIF_TERM};
        use std::os::raw::c_int;

        unsafe extern "C" fn ping(_env: *mut ErlNifEnv, _argc: c_int, _argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
            entities_data_handling::eterm::NIL
        }

        fn on_load(_env: Env<'_>, _info: Term<'_>) -> NifResult<()> {
            Ok(())
        }

        crate::nif_init!(
            name: "declared_nif",
            functions: [("ping", 0, ping), ("slow_ping", 0, ping, DirtyCpu)],
            load: on_load,
        );
    }

    #[test]
    fn test_macro_builds_once() {
        let first = declared::nif_init();
        assert!(!first.is_null());
        assert_eq!(first, declared::nif_init());
        let entry = unsafe { &*first };
        assert_eq!(entry.num_of_funcs, 2);
        assert!(entry.load.is_some());
        assert!(entry.unload.is_none());
    }
}
