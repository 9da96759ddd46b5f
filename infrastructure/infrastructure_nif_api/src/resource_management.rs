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

//! Resource Management Functions
//!
//! Resource objects are native memory blocks the runtime can hand out as
//! opaque terms. Each block carries a header in front of the payload:
//!
//! ```text
//! [ ResourceHeader | padding ][ payload (size bytes, zeroed) ]
//!                              ^ pointer native code sees
//! ```
//!
//! ## Reference counting
//!
//! A new object starts with one reference, owned by the allocating code.
//! `enif_make_resource` gives the term's heap another one and
//! `enif_keep_resource` adds one without a term. Every
//! `enif_release_resource` and every collected heap drops one. The thread
//! that drops the last reference runs the type's destructor in a fresh
//! callback environment and frees the block.
//!
//! ## Monitors
//!
//! A resource whose type has a down callback can monitor a process. All
//! monitors live in one table. Process exit, demonitor and destruction all
//! take its lock, so a down callback runs at most once, never after a
//! successful demonitor, and never for an object that is being destroyed.

use crate::heap::{boxed_object, HeapObject};
use crate::nif_env::{env_mut, EnvKind, ErlNifEnv};
use crate::process::{get_global_process_table, ProcessId};
use crate::{
    ErlNifMonitor, ErlNifPid, ErlNifResourceDown, ErlNifResourceDtor, ErlNifResourceFlags,
    ErlNifResourceStop, ErlNifResourceTypeInit, ERL_NIF_RT_CREATE, ERL_NIF_RT_TAKEOVER,
    ERL_NIF_TERM,
};
use entities_data_handling::eterm;
use parking_lot::{const_mutex, Mutex, RwLock};
use std::alloc::Layout;
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::sync::atomic::{fence, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Callbacks of a resource type
#[derive(Debug, Clone, Copy, Default)]
struct ResourceCallbacks {
    dtor: Option<ErlNifResourceDtor>,
    stop: Option<ErlNifResourceStop>,
    down: Option<ErlNifResourceDown>,
}

/// A registered resource type
///
/// Opaque to native code. Types are never freed; a module upgrade takes
/// them over and replaces their callbacks.
#[derive(Debug)]
pub struct ErlNifResourceType {
    name: String,
    module: Option<Arc<str>>,
    callbacks: RwLock<ResourceCallbacks>,
}

impl ErlNifResourceType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// True if objects of this type may monitor processes
    pub fn has_down(&self) -> bool {
        self.callbacks.read().down.is_some()
    }

    /// True if a stop callback was registered
    pub fn has_stop(&self) -> bool {
        self.callbacks.read().stop.is_some()
    }
}

static RESOURCE_TYPES: Mutex<Vec<&'static ErlNifResourceType>> = const_mutex(Vec::new());

#[repr(C)]
struct ResourceHeader {
    rtype: &'static ErlNifResourceType,
    refc: AtomicUsize,
    size: usize,
    id: u64,
}

const RESOURCE_ALIGN: usize = 16;
const HEADER_SPACE: usize =
    (std::mem::size_of::<ResourceHeader>() + RESOURCE_ALIGN - 1) & !(RESOURCE_ALIGN - 1);

static NEXT_REF_ID: AtomicU64 = AtomicU64::new(1);
static LIVE_RESOURCES: AtomicUsize = AtomicUsize::new(0);

/// Next identity for a reference term. Resources share the counter so
/// references and resource terms order consistently.
pub(crate) fn next_ref_id() -> u64 {
    NEXT_REF_ID.fetch_add(1, Ordering::Relaxed)
}

unsafe fn header<'a>(obj: *mut c_void) -> &'a ResourceHeader {
    &*((obj as *mut u8).sub(HEADER_SPACE) as *const ResourceHeader)
}

fn layout_for(size: usize) -> Option<Layout> {
    let total = HEADER_SPACE.checked_add(size)?;
    Layout::from_size_align(total, RESOURCE_ALIGN).ok()
}

fn open_resource_type(
    env: *mut ErlNifEnv,
    name: *const c_char,
    callbacks: ResourceCallbacks,
    flags: ErlNifResourceFlags,
    tried: *mut ErlNifResourceFlags,
) -> *mut ErlNifResourceType {
    // SAFETY: the caller passes a live environment or null.
    let Some(env) = (unsafe { env_mut(env) }) else {
        return std::ptr::null_mut();
    };
    if env.kind() != EnvKind::Load || name.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: checked non-null; NUL termination is the caller's contract.
    let Ok(name) = (unsafe { CStr::from_ptr(name) }).to_str() else {
        return std::ptr::null_mut();
    };
    let module = env.module().cloned();

    let mut types = RESOURCE_TYPES.lock();
    let existing = types
        .iter()
        .copied()
        .find(|t| t.name == name && t.module == module);
    let (rtype, done) = match existing {
        Some(rtype) if flags & ERL_NIF_RT_TAKEOVER != 0 => {
            *rtype.callbacks.write() = callbacks;
            (rtype, ERL_NIF_RT_TAKEOVER)
        }
        None if flags & ERL_NIF_RT_CREATE != 0 => {
            let rtype: &'static ErlNifResourceType = Box::leak(Box::new(ErlNifResourceType {
                name: name.to_owned(),
                module,
                callbacks: RwLock::new(callbacks),
            }));
            types.push(rtype);
            (rtype, ERL_NIF_RT_CREATE)
        }
        _ => return std::ptr::null_mut(),
    };
    if !tried.is_null() {
        // SAFETY: checked non-null.
        unsafe { *tried = done };
    }
    log::debug!(
        "resource type {} {}",
        name,
        if done == ERL_NIF_RT_CREATE { "created" } else { "taken over" }
    );
    rtype as *const ErlNifResourceType as *mut ErlNifResourceType
}

/// Open a resource type with a destructor
///
/// Only valid in a load environment.
///
/// # Arguments
///
/// * `env` - Load environment
/// * `module_str` - Ignored, as in the reference runtime
/// * `name` - NUL-terminated type name, unique per module
/// * `dtor` - Destructor, or `None`
/// * `flags` - `ERL_NIF_RT_CREATE` and/or `ERL_NIF_RT_TAKEOVER`
/// * `tried` - Receives the operation performed, may be null
///
/// # Returns
///
/// * `*mut ErlNifResourceType` - The type, or null on failure
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_open_resource_type()` - C implementation
pub unsafe extern "C" fn enif_open_resource_type(
    env: *mut ErlNifEnv,
    _module_str: *const c_char,
    name: *const c_char,
    dtor: Option<ErlNifResourceDtor>,
    flags: ErlNifResourceFlags,
    tried: *mut ErlNifResourceFlags,
) -> *mut ErlNifResourceType {
    let callbacks = ResourceCallbacks {
        dtor,
        ..ResourceCallbacks::default()
    };
    open_resource_type(env, name, callbacks, flags, tried)
}

/// Open a resource type with destructor, stop and down callbacks
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_init_resource_type()` - C implementation
pub unsafe extern "C" fn enif_init_resource_type(
    env: *mut ErlNifEnv,
    name: *const c_char,
    init: *const ErlNifResourceTypeInit,
    flags: ErlNifResourceFlags,
    tried: *mut ErlNifResourceFlags,
) -> *mut ErlNifResourceType {
    let Some(init) = init.as_ref() else {
        return std::ptr::null_mut();
    };
    let callbacks = ResourceCallbacks {
        dtor: init.dtor,
        stop: init.stop,
        down: init.down,
    };
    open_resource_type(env, name, callbacks, flags, tried)
}

/// Allocate a resource object
///
/// The payload is zeroed. The caller owns the single initial reference.
///
/// # Arguments
///
/// * `rtype` - Type returned by `enif_open_resource_type`
/// * `size` - Payload size in bytes
///
/// # Returns
///
/// * `*mut c_void` - The payload, or null if allocation failed
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_alloc_resource()` - C implementation
pub unsafe extern "C" fn enif_alloc_resource(
    rtype: *const ErlNifResourceType,
    size: usize,
) -> *mut c_void {
    if rtype.is_null() {
        return std::ptr::null_mut();
    }
    let Some(layout) = layout_for(size) else {
        return std::ptr::null_mut();
    };
    let base = std::alloc::alloc_zeroed(layout);
    if base.is_null() {
        return std::ptr::null_mut();
    }
    // Types are leaked on creation, so the borrow is 'static.
    let rtype: &'static ErlNifResourceType = &*rtype;
    std::ptr::write(
        base as *mut ResourceHeader,
        ResourceHeader {
            rtype,
            refc: AtomicUsize::new(1),
            size,
            id: next_ref_id(),
        },
    );
    LIVE_RESOURCES.fetch_add(1, Ordering::Relaxed);
    base.add(HEADER_SPACE) as *mut c_void
}

/// Add a reference to a resource object
pub unsafe extern "C" fn enif_keep_resource(obj: *mut c_void) -> c_int {
    if obj.is_null() {
        return 0;
    }
    header(obj).refc.fetch_add(1, Ordering::Relaxed);
    1
}

/// Drop a reference to a resource object
///
/// Runs the destructor and frees the object when this was the last
/// reference. Releasing more references than were taken is undefined
/// behaviour, as in C.
pub unsafe extern "C" fn enif_release_resource(obj: *mut c_void) {
    if !obj.is_null() {
        release_resource(obj);
    }
}

pub(crate) unsafe fn release_resource(obj: *mut c_void) {
    if header(obj).refc.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    fence(Ordering::Acquire);
    destroy_resource(obj);
}

unsafe fn destroy_resource(obj: *mut c_void) {
    let addr = obj as usize;
    MONITORS.lock().retain(|_, m| m.resource != addr);

    let hdr = header(obj);
    let dtor = hdr.rtype.callbacks.read().dtor;
    if let Some(dtor) = dtor {
        let mut env = Box::new(ErlNifEnv::new(EnvKind::Callback));
        dtor(&mut *env, obj);
    }

    let Some(layout) = layout_for(hdr.size) else {
        return;
    };
    let base = (obj as *mut u8).sub(HEADER_SPACE);
    std::ptr::drop_in_place(base as *mut ResourceHeader);
    std::alloc::dealloc(base, layout);
    LIVE_RESOURCES.fetch_sub(1, Ordering::Relaxed);
}

/// Take a reference only if the object is still alive.
unsafe fn try_upgrade(obj: *mut c_void) -> bool {
    header(obj)
        .refc
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n > 0).then_some(n + 1)
        })
        .is_ok()
}

/// Make a term for a resource object
///
/// The term's heap takes its own reference; the caller's reference is
/// unaffected.
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_make_resource()` - C implementation
pub unsafe extern "C" fn enif_make_resource(
    env: *mut ErlNifEnv,
    obj: *mut c_void,
) -> ERL_NIF_TERM {
    let Some(env) = env_mut(env) else {
        return eterm::THE_NON_VALUE;
    };
    if obj.is_null() {
        return crate::error_handling::enif_make_badarg(env);
    }
    enif_keep_resource(obj);
    env.heap.hold_resource(obj)
}

/// Get the resource object behind a term
///
/// # Returns
///
/// * `1` - `*objp` is set; the term is a resource of type `rtype`
/// * `0` - Not a resource term, or a resource of another type
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_get_resource()` - C implementation
pub unsafe extern "C" fn enif_get_resource(
    _env: *mut ErlNifEnv,
    term: ERL_NIF_TERM,
    rtype: *const ErlNifResourceType,
    objp: *mut *mut c_void,
) -> c_int {
    let Some(HeapObject::Resource(obj)) = boxed_object(term) else {
        return 0;
    };
    if !std::ptr::eq(header(*obj).rtype, rtype) {
        return 0;
    }
    if !objp.is_null() {
        *objp = *obj;
    }
    1
}

/// Payload size of a resource object
pub unsafe extern "C" fn enif_sizeof_resource(obj: *mut c_void) -> usize {
    if obj.is_null() {
        0
    } else {
        header(obj).size
    }
}

/// Current reference count of a resource object
///
/// # Safety
/// `obj` must be a live resource object.
pub unsafe fn resource_refcount(obj: *mut c_void) -> usize {
    header(obj).refc.load(Ordering::Acquire)
}

/// Identity used when ordering resource terms
pub(crate) unsafe fn resource_id(obj: *mut c_void) -> u64 {
    header(obj).id
}

/// Type of a resource object
///
/// # Safety
/// `obj` must be a live resource object.
pub unsafe fn resource_type(obj: *mut c_void) -> &'static ErlNifResourceType {
    header(obj).rtype
}

/// Number of resource objects not yet destroyed
pub fn live_resource_count() -> usize {
    LIVE_RESOURCES.load(Ordering::Relaxed)
}

struct MonitorEntry {
    resource: usize,
    pid: ProcessId,
}

static MONITORS: Mutex<BTreeMap<u64, MonitorEntry>> = const_mutex(BTreeMap::new());
static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

/// Monitor a process from a resource
///
/// # Returns
///
/// * `0` - Monitor created; `*mon` identifies it
/// * `> 0` - The target is not an alive local process
/// * `< 0` - The resource type has no down callback
///
/// # See Also
///
/// - `erts/emulator/beam/erl_nif.c:enif_monitor_process()` - C implementation
pub unsafe extern "C" fn enif_monitor_process(
    _env: *mut ErlNifEnv,
    obj: *mut c_void,
    target_pid: *const ErlNifPid,
    mon: *mut ErlNifMonitor,
) -> c_int {
    if obj.is_null() || !header(obj).rtype.has_down() {
        return -1;
    }
    let Some(target) = target_pid.as_ref() else {
        return 1;
    };
    if !eterm::is_pid(target.pid) {
        return 1;
    }
    let pid = eterm::pid_number(target.pid);

    let mut monitors = MONITORS.lock();
    // Checked under the monitor lock: an exit either sees this entry when
    // it drains the table or has already marked the process dead.
    if !get_global_process_table().is_alive(pid) {
        return 1;
    }
    let id = NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed);
    monitors.insert(
        id,
        MonitorEntry {
            resource: obj as usize,
            pid,
        },
    );
    if !mon.is_null() {
        *mon = ErlNifMonitor { id, pid };
    }
    0
}

/// Cancel a monitor
///
/// # Returns
///
/// * `0` - The monitor was removed; its down callback will not run
/// * `1` - The monitor was not found (already fired, firing, or never existed)
pub unsafe extern "C" fn enif_demonitor_process(
    _env: *mut ErlNifEnv,
    obj: *mut c_void,
    mon: *const ErlNifMonitor,
) -> c_int {
    let Some(mon) = mon.as_ref() else {
        return 1;
    };
    let mut monitors = MONITORS.lock();
    match monitors.get(&mon.id) {
        Some(entry) if entry.resource == obj as usize => {
            monitors.remove(&mon.id);
            0
        }
        _ => 1,
    }
}

/// Order two monitors
pub unsafe extern "C" fn enif_compare_monitors(
    a: *const ErlNifMonitor,
    b: *const ErlNifMonitor,
) -> c_int {
    match (a.as_ref(), b.as_ref()) {
        (Some(a), Some(b)) => a.id.cmp(&b.id) as c_int,
        _ => 0,
    }
}

/// Number of monitors not yet fired or cancelled
pub fn active_monitor_count() -> usize {
    MONITORS.lock().len()
}

/// Deliver down callbacks for every monitor on an exited process.
///
/// Entries are removed under the monitor lock and each resource is pinned
/// with a reference before the lock is dropped, so the callbacks run
/// without the lock on objects that cannot be destroyed underneath them.
pub(crate) fn fire_process_monitors(pid: ProcessId) {
    let fired: Vec<(u64, *mut c_void)> = {
        let mut monitors = MONITORS.lock();
        let ids: Vec<u64> = monitors
            .iter()
            .filter(|(_, m)| m.pid == pid)
            .map(|(&id, _)| id)
            .collect();
        ids.into_iter()
            .filter_map(|id| {
                let entry = monitors.remove(&id)?;
                let obj = entry.resource as *mut c_void;
                // SAFETY: destruction removes an object's entries under this
                // lock before freeing it, so a listed object is still allocated.
                unsafe { try_upgrade(obj) }.then_some((id, obj))
            })
            .collect()
    };

    let dead = ErlNifPid {
        pid: eterm::make_pid(pid),
    };
    for (id, obj) in fired {
        // SAFETY: pinned by try_upgrade above.
        unsafe {
            let down = header(obj).rtype.callbacks.read().down;
            if let Some(down) = down {
                let mut env = Box::new(ErlNifEnv::new(EnvKind::Callback));
                let mon = ErlNifMonitor { id, pid };
                down(&mut *env, obj, &dead, &mon);
            }
            release_resource(obj);
        }
    }
}
