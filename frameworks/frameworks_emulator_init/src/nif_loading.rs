//! NIF Module Loading
//!
//! Installs NIF libraries into the runtime and calls their functions on
//! behalf of processes. A library is described by the `ErlNifEntry` its
//! `nif_init` returns, either from a dynamic library opened with
//! `libloading` or from an entry linked into the running program.
//!
//! Loading checks the entry (API version, module name, function table),
//! then runs the library's `load` callback in a load environment; resource
//! types can only be opened there. An upgrade replaces a loaded module with
//! a new entry and purges the old one. Unloading runs the `unload` callback
//! with the module's private data.
//!
//! Based on `load_nif/2` and the upgrade/unload paths in erl_nif.c.

use entities_data_handling::eterm::{self, Eterm};
use infrastructure_nif_api::process::Process;
use infrastructure_nif_api::{
    enif_make_copy, ErlNifEntry, ErlNifEnv, NifFn, ERL_NIF_DIRTY_JOB_CPU_BOUND,
    ERL_NIF_DIRTY_JOB_IO_BOUND, ERL_NIF_MAJOR_VERSION, ERL_NIF_MINOR_VERSION,
};
use libloading::{Library, Symbol};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_int, c_uint, c_void};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, OnceLock};
use usecases_scheduling::{call_nif, get_global_schedulers, CallReport, NifCall, ScheduleError};

/// Signature of the `nif_init` symbol every NIF library exports
pub type NifInitFn = unsafe extern "C" fn() -> *const ErlNifEntry;

/// Loader error types
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("{path} has no nif_init entry point: {source}")]
    EntryPointNotFound {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("invalid NIF entry: {0}")]
    InvalidEntry(String),
    #[error("NIF library version {major}.{minor} is not supported")]
    VersionMismatch { major: c_int, minor: c_int },
    #[error("duplicate function {function}/{arity}")]
    DuplicateFunction { function: String, arity: u32 },
    #[error("invalid flags {flags} for function {function}/{arity}")]
    InvalidFlags {
        function: String,
        arity: u32,
        flags: c_uint,
    },
    #[error("module {0} already has a NIF library loaded")]
    AlreadyLoaded(String),
    #[error("module {0} has no NIF library loaded")]
    NotLoaded(String),
    #[error("{callback} callback of module {module} returned {code}")]
    CallbackFailed {
        module: String,
        callback: &'static str,
        code: c_int,
    },
    #[error("module {0} does not support upgrade")]
    UpgradeNotSupported(String),
    #[error("undefined function {module}:{function}/{arity}")]
    UndefinedFunction {
        module: String,
        function: String,
        arity: usize,
    },
    #[error("runtime not started")]
    NotStarted,
    #[error(transparent)]
    Scheduling(#[from] ScheduleError),
}

/// One function of a loaded module
#[derive(Debug, Clone)]
pub struct NifFunction {
    pub name: String,
    pub arity: u32,
    pub fptr: NifFn,
    pub flags: c_uint,
}

/// A loaded NIF library
pub struct NifModule {
    name: Arc<str>,
    functions: Vec<NifFunction>,
    priv_data: AtomicPtr<c_void>,
    entry: *const ErlNifEntry,
    path: Option<PathBuf>,
    // Dropped last: `entry` and every function pointer live in it.
    _library: Option<Library>,
}

// The entry and function table are immutable after load; private data is
// owned by the library and only handed back to it.
unsafe impl Send for NifModule {}
unsafe impl Sync for NifModule {}

impl NifModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> &[NifFunction] {
        &self.functions
    }

    pub fn function(&self, name: &str, arity: usize) -> Option<&NifFunction> {
        self.functions
            .iter()
            .find(|f| f.name == name && f.arity as usize == arity)
    }

    /// Private data set by the load or upgrade callback
    pub fn priv_data(&self) -> *mut c_void {
        self.priv_data.load(Ordering::Acquire)
    }

    /// File the library was opened from, if it was not linked in
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn entry(&self) -> &ErlNifEntry {
        // SAFETY: the entry outlives the module (it is static or lives in
        // `_library`).
        unsafe { &*self.entry }
    }
}

impl std::fmt::Debug for NifModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NifModule")
            .field("name", &self.name)
            .field("functions", &self.functions.len())
            .field("path", &self.path)
            .finish()
    }
}

/// Validated contents of an entry
struct ParsedEntry {
    name: Arc<str>,
    functions: Vec<NifFunction>,
}

/// Check version, name and function table of `entry`.
unsafe fn parse_entry(entry: &ErlNifEntry) -> Result<ParsedEntry, LoadError> {
    if entry.major != ERL_NIF_MAJOR_VERSION || entry.minor > ERL_NIF_MINOR_VERSION {
        return Err(LoadError::VersionMismatch {
            major: entry.major,
            minor: entry.minor,
        });
    }
    if entry.name.is_null() {
        return Err(LoadError::InvalidEntry("missing module name".into()));
    }
    let name = CStr::from_ptr(entry.name)
        .to_str()
        .map_err(|_| LoadError::InvalidEntry("module name is not UTF-8".into()))?;
    if name.is_empty() {
        return Err(LoadError::InvalidEntry("empty module name".into()));
    }
    if entry.num_of_funcs < 0 || (entry.num_of_funcs > 0 && entry.funcs.is_null()) {
        return Err(LoadError::InvalidEntry(format!(
            "bad function table for {}",
            name
        )));
    }

    let table = if entry.num_of_funcs == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(entry.funcs, entry.num_of_funcs as usize)
    };
    let mut functions: Vec<NifFunction> = Vec::with_capacity(table.len());
    for func in table {
        if func.name.is_null() {
            return Err(LoadError::InvalidEntry(format!(
                "unnamed function in {}",
                name
            )));
        }
        let fname = CStr::from_ptr(func.name).to_string_lossy().into_owned();
        if !matches!(
            func.flags,
            0 | ERL_NIF_DIRTY_JOB_CPU_BOUND | ERL_NIF_DIRTY_JOB_IO_BOUND
        ) {
            return Err(LoadError::InvalidFlags {
                function: fname,
                arity: func.arity,
                flags: func.flags,
            });
        }
        if functions
            .iter()
            .any(|f| f.name == fname && f.arity == func.arity)
        {
            return Err(LoadError::DuplicateFunction {
                function: fname,
                arity: func.arity,
            });
        }
        functions.push(NifFunction {
            name: fname,
            arity: func.arity,
            fptr: func.fptr,
            flags: func.flags,
        });
    }
    Ok(ParsedEntry {
        name: Arc::from(name),
        functions,
    })
}

/// Table of loaded NIF modules
pub struct NifModuleTable {
    modules: RwLock<HashMap<String, Arc<NifModule>>>,
}

impl Default for NifModuleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NifModuleTable {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// Load a library linked into the running program
    ///
    /// # Safety
    /// `entry` must be a valid entry whose strings, function table and
    /// callbacks stay valid for the rest of the program.
    pub unsafe fn load_entry(&self, entry: &'static ErlNifEntry) -> Result<Arc<NifModule>, LoadError> {
        self.install(entry, None, None)
    }

    /// Open a dynamic library and load the entry its `nif_init` returns
    ///
    /// # Safety
    /// Opening a library runs its initializers; `nif_init` must have the
    /// [`NifInitFn`] signature.
    pub unsafe fn load_library(&self, path: &Path) -> Result<Arc<NifModule>, LoadError> {
        let library = Library::new(path).map_err(|source| LoadError::Library {
            path: path.to_path_buf(),
            source,
        })?;
        let entry = {
            let init: Symbol<NifInitFn> =
                library
                    .get(b"nif_init\0")
                    .map_err(|source| LoadError::EntryPointNotFound {
                        path: path.to_path_buf(),
                        source,
                    })?;
            init()
        };
        if entry.is_null() {
            return Err(LoadError::InvalidEntry(format!(
                "nif_init of {} returned null",
                path.display()
            )));
        }
        self.install(entry, Some(library), Some(path.to_path_buf()))
    }

    unsafe fn install(
        &self,
        entry: *const ErlNifEntry,
        library: Option<Library>,
        path: Option<PathBuf>,
    ) -> Result<Arc<NifModule>, LoadError> {
        let parsed = parse_entry(&*entry)?;
        let mut modules = self.modules.write();
        if modules.contains_key(&*parsed.name) {
            return Err(LoadError::AlreadyLoaded(parsed.name.to_string()));
        }

        let mut priv_data: *mut c_void = std::ptr::null_mut();
        if let Some(load) = (*entry).load {
            let mut env = ErlNifEnv::for_load(Arc::clone(&parsed.name), std::ptr::null_mut());
            let code = load(&mut env, &mut priv_data, eterm::NIL);
            if code != 0 {
                log::warn!("load callback of {} failed with {}", parsed.name, code);
                return Err(LoadError::CallbackFailed {
                    module: parsed.name.to_string(),
                    callback: "load",
                    code,
                });
            }
        }

        let module = Arc::new(NifModule {
            name: parsed.name,
            functions: parsed.functions,
            priv_data: AtomicPtr::new(priv_data),
            entry,
            path,
            _library: library,
        });
        modules.insert(module.name.to_string(), Arc::clone(&module));
        log::info!(
            "loaded NIF module {} ({} functions)",
            module.name,
            module.functions.len()
        );
        Ok(module)
    }

    /// Replace a loaded module with a new entry
    ///
    /// The new entry's `upgrade` callback gets the old private data and may
    /// take it over. On success the old module is purged: its `unload`
    /// callback runs with whatever private data the upgrade left it.
    ///
    /// # Safety
    /// Same contract as [`NifModuleTable::load_entry`].
    pub unsafe fn upgrade_entry(&self, entry: &'static ErlNifEntry) -> Result<Arc<NifModule>, LoadError> {
        let parsed = parse_entry(entry)?;
        let mut modules = self.modules.write();
        let old = modules
            .get(&*parsed.name)
            .cloned()
            .ok_or_else(|| LoadError::NotLoaded(parsed.name.to_string()))?;
        let upgrade = entry
            .upgrade
            .ok_or_else(|| LoadError::UpgradeNotSupported(parsed.name.to_string()))?;

        let mut priv_data: *mut c_void = std::ptr::null_mut();
        let mut old_priv = old.priv_data();
        let mut env = ErlNifEnv::for_load(Arc::clone(&parsed.name), old_priv);
        let code = upgrade(&mut env, &mut priv_data, &mut old_priv, eterm::NIL);
        drop(env);
        if code != 0 {
            log::warn!("upgrade callback of {} failed with {}", parsed.name, code);
            return Err(LoadError::CallbackFailed {
                module: parsed.name.to_string(),
                callback: "upgrade",
                code,
            });
        }
        old.priv_data.store(old_priv, Ordering::Release);

        let module = Arc::new(NifModule {
            name: parsed.name,
            functions: parsed.functions,
            priv_data: AtomicPtr::new(priv_data),
            entry,
            path: None,
            _library: None,
        });
        modules.insert(module.name.to_string(), Arc::clone(&module));
        drop(modules);
        log::info!("upgraded NIF module {}", module.name);
        purge(&old);
        Ok(module)
    }

    /// Unload a module, running its `unload` callback
    pub fn unload(&self, module: &str) -> Result<(), LoadError> {
        let removed = self
            .modules
            .write()
            .remove(module)
            .ok_or_else(|| LoadError::NotLoaded(module.to_string()))?;
        purge(&removed);
        log::info!("unloaded NIF module {}", module);
        Ok(())
    }

    pub fn get(&self, module: &str) -> Option<Arc<NifModule>> {
        self.modules.read().get(module).cloned()
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Call `module:function/arity` on behalf of `process`
    ///
    /// `args` may live in any environment; they are copied onto the process
    /// heap first. Blocks until the call and all its hand-offs finish.
    ///
    /// # Returns
    /// * `Ok(CallReport)` - The result or exception, on the process heap
    /// * `Err(LoadError::UndefinedFunction)` - No such function
    /// * `Err(LoadError::NotStarted)` - The schedulers are not running
    /// * `Err(LoadError::Scheduling)` - The process exited or a pool stopped
    pub fn call(
        &self,
        process: &Arc<Process>,
        module: &str,
        function: &str,
        args: &[Eterm],
    ) -> Result<CallReport, LoadError> {
        let undefined = || LoadError::UndefinedFunction {
            module: module.to_string(),
            function: function.to_string(),
            arity: args.len(),
        };
        let loaded = self.get(module).ok_or_else(undefined)?;
        let nif = loaded.function(function, args.len()).ok_or_else(undefined)?;
        let schedulers = get_global_schedulers().ok_or(LoadError::NotStarted)?;

        let argv = {
            let lock = process.lock();
            // SAFETY: the main lock is held, so the heap environment is ours.
            args.iter()
                .map(|&arg| unsafe { enif_make_copy(lock.env(), arg) })
                .collect()
        };
        let call = NifCall {
            name: nif.name.clone(),
            fptr: nif.fptr,
            flags: nif.flags,
            argv,
            priv_data: loaded.priv_data(),
        };
        Ok(call_nif(schedulers, process, call)?)
    }
}

/// Run the `unload` callback of a module leaving the runtime.
fn purge(module: &NifModule) {
    if let Some(unload) = module.entry().unload {
        let mut env = ErlNifEnv::for_load(Arc::clone(&module.name), module.priv_data());
        // SAFETY: the callback comes from a validated entry.
        unsafe { unload(&mut env, module.priv_data()) };
    }
}

static GLOBAL_MODULE_TABLE: OnceLock<NifModuleTable> = OnceLock::new();

/// Get the global NIF module table
pub fn get_global_module_table() -> &'static NifModuleTable {
    GLOBAL_MODULE_TABLE.get_or_init(NifModuleTable::new)
}
