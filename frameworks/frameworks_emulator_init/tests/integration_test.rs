//! Integration tests for frameworks_emulator_init crate
//!
//! Starts the runtime, loads NIF modules written against the raw primitives
//! and calls them on behalf of processes.

use entities_data_handling::eterm;
use frameworks_emulator_init::*;
use infrastructure_nif_api::process::get_global_process_table;
use infrastructure_nif_api::*;
use std::os::raw::{c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use usecases_scheduling::{CallOutcome, SchedulerKind};

fn start() -> &'static Runtime {
    erl_start(InitConfig {
        no_schedulers: 2,
        no_dirty_cpu_schedulers: 1,
        no_dirty_io_schedulers: 1,
        ..InitConfig::default()
    })
    .unwrap()
}

fn small(value: i64) -> ERL_NIF_TERM {
    eterm::make_small(value).unwrap()
}

struct Table<const N: usize>([ErlNifFunc; N]);
unsafe impl<const N: usize> Sync for Table<N> {}

// counter_nif: a resource holding an i64, plus a dirty function.

static COUNTER_TYPE: AtomicPtr<ErlNifResourceType> = AtomicPtr::new(ptr::null_mut());
static COUNTERS_DESTROYED: AtomicUsize = AtomicUsize::new(0);
static COUNTER_UNLOADS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn counter_dtor(_env: *mut ErlNifEnv, _obj: *mut c_void) {
    COUNTERS_DESTROYED.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn counter_load(env: *mut ErlNifEnv, priv_data: *mut *mut c_void, _info: ERL_NIF_TERM) -> c_int {
    let init = ErlNifResourceTypeInit {
        dtor: Some(counter_dtor),
        stop: None,
        down: None,
        members: 1,
        dyncall: ptr::null(),
    };
    let rtype = enif_init_resource_type(env, c"counter".as_ptr(), &init, ERL_NIF_RT_CREATE, ptr::null_mut());
    if rtype.is_null() {
        return 1;
    }
    COUNTER_TYPE.store(rtype, Ordering::SeqCst);
    *priv_data = Box::into_raw(Box::new(100i64)) as *mut c_void;
    0
}

unsafe extern "C" fn counter_unload(_env: *mut ErlNifEnv, priv_data: *mut c_void) {
    drop(Box::from_raw(priv_data as *mut i64));
    COUNTER_UNLOADS.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn counter_new(env: *mut ErlNifEnv, _argc: c_int, _argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
    let obj = enif_alloc_resource(COUNTER_TYPE.load(Ordering::SeqCst), std::mem::size_of::<i64>());
    *(obj as *mut i64) = *(enif_priv_data(env) as *const i64);
    let term = enif_make_resource(env, obj);
    enif_release_resource(obj);
    term
}

unsafe extern "C" fn counter_add(env: *mut ErlNifEnv, _argc: c_int, argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
    let args = std::slice::from_raw_parts(argv, 2);
    let mut obj: *mut c_void = ptr::null_mut();
    let mut delta: i64 = 0;
    if enif_get_resource(env, args[0], COUNTER_TYPE.load(Ordering::SeqCst), &mut obj) == 0
        || enif_get_int64(env, args[1], &mut delta) == 0
    {
        return enif_make_badarg(env);
    }
    let value = &mut *(obj as *mut i64);
    *value += delta;
    enif_make_int64(env, *value)
}

unsafe extern "C" fn counter_thread(env: *mut ErlNifEnv, _argc: c_int, _argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
    enif_make_int(env, enif_thread_type())
}

static COUNTER_FUNCS: Table<3> = Table([
    ErlNifFunc {
        name: c"new".as_ptr(),
        arity: 0,
        fptr: counter_new,
        flags: 0,
    },
    ErlNifFunc {
        name: c"add".as_ptr(),
        arity: 2,
        fptr: counter_add,
        flags: 0,
    },
    ErlNifFunc {
        name: c"thread".as_ptr(),
        arity: 0,
        fptr: counter_thread,
        flags: ERL_NIF_DIRTY_JOB_CPU_BOUND,
    },
]);

fn entry<const N: usize>(
    name: &'static std::ffi::CStr,
    funcs: &'static Table<N>,
    load: Option<NifLoadFn>,
    upgrade: Option<NifUpgradeFn>,
    unload: Option<NifUnloadFn>,
) -> &'static ErlNifEntry {
    Box::leak(Box::new(ErlNifEntry {
        major: ERL_NIF_MAJOR_VERSION,
        minor: ERL_NIF_MINOR_VERSION,
        name: name.as_ptr(),
        num_of_funcs: N as c_int,
        funcs: funcs.0.as_ptr(),
        load,
        reload: None,
        upgrade,
        unload,
        vm_variant: ERL_NIF_VM_VARIANT.as_ptr().cast(),
        options: 0,
        sizeof_ErlNifResourceTypeInit: std::mem::size_of::<ErlNifResourceTypeInit>(),
        min_erts: ptr::null(),
    }))
}

#[test]
fn test_load_call_and_collect() {
    start();
    let modules = get_global_module_table();
    let counter = entry(
        c"counter_nif",
        &COUNTER_FUNCS,
        Some(counter_load),
        None,
        Some(counter_unload),
    );
    let module = unsafe { modules.load_entry(counter) }.unwrap();
    assert_eq!(module.name(), "counter_nif");
    let process = get_global_process_table().spawn();

    let created = modules.call(&process, "counter_nif", "new", &[]).unwrap();
    let CallOutcome::Return(resource) = created.outcome else {
        panic!("new raised");
    };
    let added = modules
        .call(&process, "counter_nif", "add", &[resource, small(5)])
        .unwrap();
    assert_eq!(added.outcome, CallOutcome::Return(small(105)));

    let bad = modules
        .call(&process, "counter_nif", "add", &[small(1), small(5)])
        .unwrap();
    assert!(matches!(bad.outcome, CallOutcome::Exception(_)));

    let dirty = modules.call(&process, "counter_nif", "thread", &[]).unwrap();
    assert_eq!(dirty.hops, vec![SchedulerKind::DirtyCpu]);
    assert_eq!(
        dirty.outcome,
        CallOutcome::Return(small(ERL_NIF_THR_DIRTY_CPU_SCHEDULER as i64))
    );

    assert!(matches!(
        modules.call(&process, "counter_nif", "add", &[resource]),
        Err(LoadError::UndefinedFunction { arity: 1, .. })
    ));

    assert_eq!(COUNTERS_DESTROYED.load(Ordering::SeqCst), 0);
    get_global_process_table().exit(process.id());
    assert_eq!(COUNTERS_DESTROYED.load(Ordering::SeqCst), 1);

    modules.unload("counter_nif").unwrap();
    assert_eq!(COUNTER_UNLOADS.load(Ordering::SeqCst), 1);
    assert!(modules.get("counter_nif").is_none());
}

// versioned_nif: private data taken over across an upgrade.

static OLD_UNLOADED_WITH: AtomicUsize = AtomicUsize::new(usize::MAX);

unsafe extern "C" fn v1_load(_env: *mut ErlNifEnv, priv_data: *mut *mut c_void, _info: ERL_NIF_TERM) -> c_int {
    *priv_data = Box::into_raw(Box::new(1i64)) as *mut c_void;
    0
}

unsafe extern "C" fn v2_upgrade(
    _env: *mut ErlNifEnv,
    priv_data: *mut *mut c_void,
    old_priv_data: *mut *mut c_void,
    _info: ERL_NIF_TERM,
) -> c_int {
    let state = *old_priv_data as *mut i64;
    *state += 1;
    *priv_data = state as *mut c_void;
    *old_priv_data = ptr::null_mut();
    0
}

unsafe extern "C" fn versioned_unload(_env: *mut ErlNifEnv, priv_data: *mut c_void) {
    OLD_UNLOADED_WITH.store(priv_data as usize, Ordering::SeqCst);
}

unsafe extern "C" fn version(env: *mut ErlNifEnv, _argc: c_int, _argv: *const ERL_NIF_TERM) -> ERL_NIF_TERM {
    enif_make_int64(env, *(enif_priv_data(env) as *const i64))
}

static VERSION_FUNCS: Table<1> = Table([ErlNifFunc {
    name: c"version".as_ptr(),
    arity: 0,
    fptr: version,
    flags: 0,
}]);

#[test]
fn test_upgrade_takes_over_private_data() {
    start();
    let modules = get_global_module_table();
    let v1 = entry(c"versioned_nif", &VERSION_FUNCS, Some(v1_load), None, Some(versioned_unload));
    let v2 = entry(
        c"versioned_nif",
        &VERSION_FUNCS,
        None,
        Some(v2_upgrade),
        Some(versioned_unload),
    );
    unsafe { modules.load_entry(v1) }.unwrap();
    let process = get_global_process_table().spawn();
    let before = modules.call(&process, "versioned_nif", "version", &[]).unwrap();
    assert_eq!(before.outcome, CallOutcome::Return(small(1)));

    unsafe { modules.upgrade_entry(v2) }.unwrap();
    // The old instance is purged with the private data it was left.
    assert_eq!(OLD_UNLOADED_WITH.load(Ordering::SeqCst), 0);
    let after = modules.call(&process, "versioned_nif", "version", &[]).unwrap();
    assert_eq!(after.outcome, CallOutcome::Return(small(2)));
    get_global_process_table().exit(process.id());
}

#[test]
fn test_unknown_module_and_exited_caller() {
    start();
    let modules = get_global_module_table();
    let process = get_global_process_table().spawn();
    assert!(matches!(
        modules.call(&process, "no_such_module", "f", &[]),
        Err(LoadError::UndefinedFunction { .. })
    ));

    let exiting = entry(c"exiting_nif", &VERSION_FUNCS, Some(v1_load), None, None);
    unsafe { modules.load_entry(exiting) }.unwrap();
    get_global_process_table().exit(process.id());
    assert!(matches!(
        modules.call(&process, "exiting_nif", "version", &[]),
        Err(LoadError::Scheduling(usecases_scheduling::ScheduleError::ProcessExited(_)))
    ));
}
