//! Resources
//!
//! Reference-counted native blocks handed to managed code as opaque terms.
//!
//! ## Registration
//!
//! Types are registered through the [`Registrar`] that
//! [`ResourceRegistry::init`] hands out while the module's load callback
//! runs. A registry is initialised once; afterwards it is frozen and every
//! lookup is lock-free.
//!
//! ## Layout
//!
//! Each object starts with a small header written by [`ResourceRegistry::alloc`]
//! that points at the type's callbacks, followed by the payload the caller
//! sees. The runtime's destructor, down and stop callbacks for every type
//! are the shims in this module; they read the header and call the Rust
//! callbacks inside the fault barrier.
//!
//! ## Counting
//!
//! An object starts with one reference, owned by the caller. [`ResourcePtr::to_term`]
//! adds one owned by the term, [`ResourcePtr::keep`] adds one without a term
//! and [`ResourcePtr::release`] drops one. The destructor runs exactly once,
//! on whatever thread drops the last reference. [`ResourceArc`] does the
//! same counting with `Clone` and `Drop`.

use crate::barrier::guard_callback;
use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::Term;
use crate::types::pid::LocalPid;
use crate::types::{Decoder, Encoder};
use infrastructure_nif_api::{
    enif_alloc_resource, enif_compare_monitors, enif_demonitor_process, enif_get_resource,
    enif_init_resource_type, enif_keep_resource, enif_make_resource, enif_monitor_process,
    enif_release_resource, enif_sizeof_resource, resource_refcount, ErlNifEnv, ErlNifEvent,
    ErlNifMonitor, ErlNifPid, ErlNifResourceFlags, ErlNifResourceType, ErlNifResourceTypeInit,
    ERL_NIF_RT_CREATE, ERL_NIF_RT_TAKEOVER,
};
use parking_lot::{const_rwlock, RwLock};
use std::any::TypeId;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ffi::CString;
use std::marker::PhantomData;
use std::ops::Deref;
use std::os::raw::{c_int, c_void};
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

/// Runs once, when the last reference is dropped
pub type Destructor = fn(Env<'_>, ResourcePtr);
/// Runs when a monitored process exits
pub type DownCallback = fn(Env<'_>, ResourcePtr, LocalPid, Monitor);
/// Runs for stop events on the object
pub type StopCallback = fn(Env<'_>, ResourcePtr, ErlNifEvent, bool);

/// A registered resource type
pub struct ResourceType {
    name: String,
    raw: *mut ErlNifResourceType,
    dtor: Option<Destructor>,
    down: Option<DownCallback>,
    stop: Option<StopCallback>,
    // Payload is a Rust value owned by the typed layer.
    typed: bool,
}

// The runtime's type handles are immutable and live forever.
unsafe impl Send for ResourceType {}
unsafe impl Sync for ResourceType {}

impl ResourceType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if objects of this type may monitor processes
    pub fn has_down(&self) -> bool {
        self.down.is_some()
    }

    pub fn has_stop(&self) -> bool {
        self.stop.is_some()
    }

    /// True for types registered with [`Registrar::register`]; their objects
    /// are only reachable through [`ResourceArc`].
    pub fn is_typed(&self) -> bool {
        self.typed
    }

    pub fn as_raw(&self) -> *mut ErlNifResourceType {
        self.raw
    }
}

impl std::fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceType")
            .field("name", &self.name)
            .field("down", &self.has_down())
            .field("stop", &self.has_stop())
            .field("typed", &self.typed)
            .finish()
    }
}

#[repr(C, align(16))]
struct ObjectHeader {
    rtype: *const ResourceType,
}

const HEADER_SIZE: usize = std::mem::size_of::<ObjectHeader>();

/// Alignment guaranteed for resource payloads
pub const PAYLOAD_ALIGN: usize = 16;

/// Pointer to the payload of a live resource object
///
/// Valid while its holder owns a reference (or, for one returned by
/// [`ResourceRegistry::get`], while the term it came from is valid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourcePtr {
    payload: NonNull<u8>,
}

// An address; the reference count is atomic and the payload's own
// synchronisation is the owner's business.
unsafe impl Send for ResourcePtr {}
unsafe impl Sync for ResourcePtr {}

impl ResourcePtr {
    /// # Safety
    /// `obj` must be a live object allocated by this module.
    unsafe fn from_host(obj: *mut c_void) -> Option<ResourcePtr> {
        let obj = NonNull::new(obj as *mut u8)?;
        Some(ResourcePtr {
            payload: NonNull::new_unchecked(obj.as_ptr().add(HEADER_SIZE)),
        })
    }

    fn host(self) -> *mut c_void {
        unsafe { self.payload.as_ptr().sub(HEADER_SIZE) as *mut c_void }
    }

    fn header(&self) -> &ObjectHeader {
        unsafe { &*(self.host() as *const ObjectHeader) }
    }

    fn rtype(&self) -> Option<&'static ResourceType> {
        unsafe { self.header().rtype.as_ref() }
    }

    /// Start of the payload, aligned to [`PAYLOAD_ALIGN`]
    pub fn as_ptr(self) -> *mut u8 {
        self.payload.as_ptr()
    }

    /// Payload size in bytes
    pub fn size(self) -> usize {
        unsafe { enif_sizeof_resource(self.host()) }.saturating_sub(HEADER_SIZE)
    }

    pub fn type_name(self) -> &'static str {
        self.rtype().map_or("", |t| t.name.as_str())
    }

    /// Current reference count
    pub fn refcount(self) -> usize {
        unsafe { resource_refcount(self.host()) }
    }

    /// Add a reference not tied to any term
    pub fn keep(self) {
        unsafe { enif_keep_resource(self.host()) };
    }

    /// Drop a reference
    ///
    /// # Safety
    /// The caller must own the reference it gives up. When it is the last
    /// one the destructor runs and the pointer dangles.
    pub unsafe fn release(self) {
        enif_release_resource(self.host());
    }

    /// Term for the object; the term owns a reference of its own.
    pub fn to_term(self, env: Env<'_>) -> Term<'_> {
        unsafe { Term::new(env, enif_make_resource(env.as_ptr(), self.host())) }
    }

    /// Monitor `pid` from this object
    ///
    /// # Returns
    /// * `Err(NifError::ResourceError)` - The type has no down callback
    /// * `Err(NifError::NoProcess)` - `pid` is not alive
    pub fn monitor_process(self, env: Option<Env<'_>>, pid: &LocalPid) -> NifResult<Monitor> {
        let mut raw = ErlNifMonitor::default();
        let env = env.map_or(ptr::null_mut(), |e| e.as_ptr());
        match unsafe { enif_monitor_process(env, self.host(), pid.as_c_arg(), &mut raw) } {
            0 => Ok(Monitor { raw }),
            code if code < 0 => Err(NifError::ResourceError),
            _ => Err(NifError::NoProcess),
        }
    }

    /// Cancel a monitor
    ///
    /// Returns `false` if it already fired or never existed. Once this
    /// returns `true` the down callback will not run for it.
    pub fn demonitor_process(self, env: Option<Env<'_>>, monitor: &Monitor) -> bool {
        let env = env.map_or(ptr::null_mut(), |e| e.as_ptr());
        unsafe { enif_demonitor_process(env, self.host(), &monitor.raw) == 0 }
    }
}

/// A process monitor held by a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Monitor {
    raw: ErlNifMonitor,
}

impl Monitor {
    pub fn as_c_arg(&self) -> &ErlNifMonitor {
        &self.raw
    }
}

impl PartialOrd for Monitor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Monitor {
    fn cmp(&self, other: &Self) -> Ordering {
        unsafe { enif_compare_monitors(&self.raw, &other.raw) }.cmp(&0)
    }
}

unsafe extern "C" fn dtor_shim(env: *mut ErlNifEnv, obj: *mut c_void) {
    let Some(ptr) = ResourcePtr::from_host(obj) else {
        return;
    };
    let Some(rtype) = ptr.rtype() else {
        return;
    };
    if let Some(dtor) = rtype.dtor {
        guard_callback("destructor", &rtype.name, || dtor(Env::wrap(env), ptr));
    }
}

unsafe extern "C" fn down_shim(
    env: *mut ErlNifEnv,
    obj: *mut c_void,
    pid: *const ErlNifPid,
    mon: *const ErlNifMonitor,
) {
    let (Some(ptr), Some(pid), Some(mon)) = (ResourcePtr::from_host(obj), pid.as_ref(), mon.as_ref()) else {
        return;
    };
    let Some(rtype) = ptr.rtype() else {
        return;
    };
    if let Some(down) = rtype.down {
        let pid = LocalPid::from_raw(*pid);
        let monitor = Monitor { raw: *mon };
        guard_callback("down callback", &rtype.name, || down(Env::wrap(env), ptr, pid, monitor));
    }
}

unsafe extern "C" fn stop_shim(env: *mut ErlNifEnv, obj: *mut c_void, event: ErlNifEvent, is_direct_call: c_int) {
    let Some(ptr) = ResourcePtr::from_host(obj) else {
        return;
    };
    let Some(rtype) = ptr.rtype() else {
        return;
    };
    if let Some(stop) = rtype.stop {
        guard_callback("stop callback", &rtype.name, || {
            stop(Env::wrap(env), ptr, event, is_direct_call != 0)
        });
    }
}

/// Types of typed resources, shared by every registry in the process
static TYPED_RESOURCES: RwLock<BTreeMap<TypeId, &'static ResourceType>> = const_rwlock(BTreeMap::new());

/// Hands out type registrations while a module loads
pub struct Registrar<'a> {
    env: Env<'a>,
    types: BTreeMap<String, &'static ResourceType>,
}

impl<'a> Registrar<'a> {
    /// Register a type with a destructor
    pub fn register_type(&mut self, name: &str, dtor: Option<Destructor>) -> NifResult<&'static ResourceType> {
        self.register_type_full(name, dtor, None, None)
    }

    /// Register a type with destructor, down and stop callbacks
    ///
    /// # Returns
    /// * `Err(NifError::ResourceError)` - The name is taken, or the runtime
    ///   refused the type
    /// * `Err(NifError::BadArg)` - The name contains a NUL byte
    pub fn register_type_full(
        &mut self,
        name: &str,
        dtor: Option<Destructor>,
        down: Option<DownCallback>,
        stop: Option<StopCallback>,
    ) -> NifResult<&'static ResourceType> {
        self.create(name, dtor, down, stop, false)
    }

    fn create(
        &mut self,
        name: &str,
        dtor: Option<Destructor>,
        down: Option<DownCallback>,
        stop: Option<StopCallback>,
        typed: bool,
    ) -> NifResult<&'static ResourceType> {
        if self.types.contains_key(name) {
            return Err(NifError::ResourceError);
        }
        let c_name = CString::new(name).map_err(|_| NifError::BadArg)?;
        let init = ErlNifResourceTypeInit {
            dtor: Some(dtor_shim),
            stop: stop.map(|_| stop_shim as infrastructure_nif_api::ErlNifResourceStop),
            down: down.map(|_| down_shim as infrastructure_nif_api::ErlNifResourceDown),
            members: 3,
            dyncall: ptr::null(),
        };
        let mut tried: ErlNifResourceFlags = 0;
        let raw = unsafe {
            enif_init_resource_type(
                self.env.as_ptr(),
                c_name.as_ptr(),
                &init,
                ERL_NIF_RT_CREATE | ERL_NIF_RT_TAKEOVER,
                &mut tried,
            )
        };
        if raw.is_null() {
            log::warn!("runtime refused resource type {}", name);
            return Err(NifError::ResourceError);
        }
        let rtype: &'static ResourceType = Box::leak(Box::new(ResourceType {
            name: name.to_owned(),
            raw,
            dtor,
            down,
            stop,
            typed,
        }));
        self.types.insert(name.to_owned(), rtype);
        log::debug!("registered resource type {}", name);
        Ok(rtype)
    }

    /// Register `T` as a typed resource named `name`
    ///
    /// # Returns
    /// * `Err(NifError::ResourceError)` - `T` is already registered, or
    ///   needs more alignment than [`PAYLOAD_ALIGN`]
    pub fn register<T: Resource>(&mut self, name: &str) -> NifResult<&'static ResourceType> {
        if std::mem::align_of::<T>() > PAYLOAD_ALIGN || TYPED_RESOURCES.read().contains_key(&TypeId::of::<T>()) {
            return Err(NifError::ResourceError);
        }
        self.register_typed::<T>(name)
    }

    fn register_typed<T: Resource>(&mut self, name: &str) -> NifResult<&'static ResourceType> {
        let down = if T::IMPLEMENTS_DOWN {
            Some(typed_down::<T> as DownCallback)
        } else {
            None
        };
        let rtype = self.create(name, Some(typed_drop::<T>), down, None, true)?;
        TYPED_RESOURCES.write().entry(TypeId::of::<T>()).or_insert(rtype);
        Ok(rtype)
    }
}

/// Resource types of one NIF module
///
/// Declared as a static by the module and initialised from its load
/// callback.
pub struct ResourceRegistry {
    types: OnceLock<BTreeMap<String, &'static ResourceType>>,
}

impl ResourceRegistry {
    pub const fn new() -> Self {
        Self { types: OnceLock::new() }
    }

    /// Register this module's types, then freeze the registry
    ///
    /// `env` must be the load environment. The yield context used by
    /// [`crate::schedule::run_yielding`] is registered as well.
    ///
    /// # Returns
    /// * `Err(NifError::RegistrationClosed)` - Already initialised
    /// * `Err(NifError)` - A registration failed; nothing is frozen
    pub fn init<F>(&'static self, env: Env<'_>, register: F) -> NifResult<()>
    where
        F: FnOnce(&mut Registrar<'_>) -> NifResult<()>,
    {
        if self.types.get().is_some() {
            return Err(NifError::RegistrationClosed);
        }
        let mut registrar = Registrar {
            env,
            types: BTreeMap::new(),
        };
        register(&mut registrar)?;
        if !TYPED_RESOURCES
            .read()
            .contains_key(&TypeId::of::<crate::schedule::YieldContext>())
        {
            registrar.register_typed::<crate::schedule::YieldContext>(crate::schedule::YIELD_CONTEXT_TYPE)?;
        }
        self.types
            .set(registrar.types)
            .map_err(|_| NifError::RegistrationClosed)
    }

    pub fn is_frozen(&self) -> bool {
        self.types.get().is_some()
    }

    /// Registered type called `name`
    pub fn lookup(&self, name: &str) -> NifResult<&'static ResourceType> {
        self.types
            .get()
            .and_then(|types| types.get(name).copied())
            .ok_or(NifError::ResourceError)
    }

    fn lookup_untyped(&self, name: &str) -> NifResult<&'static ResourceType> {
        match self.lookup(name)? {
            rtype if rtype.typed => Err(NifError::ResourceError),
            rtype => Ok(rtype),
        }
    }

    /// New zeroed object of `size` bytes with one reference
    ///
    /// # Returns
    /// * `Err(NifError::ResourceError)` - No such type, a typed resource
    ///   type, or out of memory
    pub fn alloc(&self, type_name: &str, size: usize) -> NifResult<ResourcePtr> {
        alloc_object(self.lookup_untyped(type_name)?, size)
    }

    /// Object behind `term`
    ///
    /// The pointer borrows the term's reference.
    ///
    /// # Returns
    /// * `Err(NifError::BadArg)` - Not a resource of this type, or the type
    ///   is a typed resource type
    pub fn get(&self, type_name: &str, term: Term<'_>) -> NifResult<ResourcePtr> {
        let rtype = self.lookup_untyped(type_name).map_err(|_| NifError::BadArg)?;
        get_object(rtype, term)
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn alloc_object(rtype: &'static ResourceType, size: usize) -> NifResult<ResourcePtr> {
    let total = size.checked_add(HEADER_SIZE).ok_or(NifError::ResourceError)?;
    let obj = unsafe { enif_alloc_resource(rtype.raw, total) };
    let ptr = unsafe { ResourcePtr::from_host(obj) }.ok_or(NifError::ResourceError)?;
    unsafe {
        ptr::write(
            obj as *mut ObjectHeader,
            ObjectHeader {
                rtype: rtype as *const ResourceType,
            },
        )
    };
    Ok(ptr)
}

fn get_object(rtype: &'static ResourceType, term: Term<'_>) -> NifResult<ResourcePtr> {
    let mut obj: *mut c_void = ptr::null_mut();
    let found = unsafe { enif_get_resource(term.get_env().as_ptr(), term.as_raw(), rtype.raw, &mut obj) };
    if found == 0 {
        return Err(NifError::BadArg);
    }
    unsafe { ResourcePtr::from_host(obj) }.ok_or(NifError::BadArg)
}

/// A Rust value stored in a resource
pub trait Resource: Sized + Send + Sync + 'static {
    /// Set to `true` when [`Resource::down`] is implemented; objects of
    /// the type may then monitor processes.
    const IMPLEMENTS_DOWN: bool = false;

    /// A monitored process exited
    fn down(&self, _env: Env<'_>, _pid: LocalPid, _monitor: Monitor) {}
}

fn typed_drop<T: Resource>(_env: Env<'_>, ptr: ResourcePtr) {
    unsafe { ptr::drop_in_place(ptr.as_ptr() as *mut T) };
}

fn typed_down<T: Resource>(env: Env<'_>, ptr: ResourcePtr, pid: LocalPid, monitor: Monitor) {
    let value = unsafe { &*(ptr.as_ptr() as *const T) };
    value.down(env, pid, monitor);
}

fn typed_type<T: Resource>() -> NifResult<&'static ResourceType> {
    TYPED_RESOURCES
        .read()
        .get(&TypeId::of::<T>())
        .copied()
        .ok_or(NifError::ResourceError)
}

/// Counted reference to a typed resource
pub struct ResourceArc<T: Resource> {
    ptr: ResourcePtr,
    _value: PhantomData<T>,
}

impl<T: Resource> ResourceArc<T> {
    /// Move `value` into a new object
    ///
    /// # Returns
    /// * `Err(NifError::ResourceError)` - `T` was never registered
    pub fn new(value: T) -> NifResult<Self> {
        let ptr = alloc_object(typed_type::<T>()?, std::mem::size_of::<T>())?;
        unsafe { ptr::write(ptr.as_ptr() as *mut T, value) };
        Ok(ResourceArc {
            ptr,
            _value: PhantomData,
        })
    }

    /// New reference to the object behind `term`
    pub fn from_term(term: Term<'_>) -> NifResult<Self> {
        let rtype = typed_type::<T>().map_err(|_| NifError::BadArg)?;
        let ptr = get_object(rtype, term)?;
        ptr.keep();
        Ok(ResourceArc {
            ptr,
            _value: PhantomData,
        })
    }

    pub fn to_term<'a>(&self, env: Env<'a>) -> Term<'a> {
        self.ptr.to_term(env)
    }

    pub fn as_resource_ptr(&self) -> ResourcePtr {
        self.ptr
    }

    pub fn monitor(&self, env: Option<Env<'_>>, pid: &LocalPid) -> NifResult<Monitor> {
        self.ptr.monitor_process(env, pid)
    }

    pub fn demonitor(&self, env: Option<Env<'_>>, monitor: &Monitor) -> bool {
        self.ptr.demonitor_process(env, monitor)
    }
}

impl<T: Resource> Deref for ResourceArc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*(self.ptr.as_ptr() as *const T) }
    }
}

impl<T: Resource> Clone for ResourceArc<T> {
    fn clone(&self) -> Self {
        self.ptr.keep();
        ResourceArc {
            ptr: self.ptr,
            _value: PhantomData,
        }
    }
}

impl<T: Resource> Drop for ResourceArc<T> {
    fn drop(&mut self) {
        unsafe { self.ptr.release() };
    }
}

impl<T: Resource> Encoder for ResourceArc<T> {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        Ok(self.to_term(env))
    }
}

impl<'a, T: Resource> Decoder<'a> for ResourceArc<T> {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        ResourceArc::from_term(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_nif_api::nif_env::EnvKind;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    static REGISTRY: ResourceRegistry = ResourceRegistry::new();
    static BLOCKS_DESTROYED: AtomicUsize = AtomicUsize::new(0);

    fn count_block(_env: Env<'_>, ptr: ResourcePtr) {
        assert_eq!(ptr.type_name(), "Block");
        BLOCKS_DESTROYED.fetch_add(1, AtomicOrdering::SeqCst);
    }

    struct Tag(u64);

    impl Resource for Tag {}

    fn registry() -> &'static ResourceRegistry {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let mut raw = Box::new(ErlNifEnv::for_load(Arc::from("resource_tests"), ptr::null_mut()));
            let env = unsafe { Env::wrap(&mut *raw) };
            REGISTRY
                .init(env, |r| {
                    r.register_type("Block", Some(count_block))?;
                    r.register_type("Plain", None)?;
                    r.register::<Tag>("Tagged")?;
                    Ok(())
                })
                .unwrap();
        });
        &REGISTRY
    }

    #[test]
    fn test_registry_freezes() {
        let registry = registry();
        assert!(registry.is_frozen());
        let mut raw = Box::new(ErlNifEnv::for_load(Arc::from("resource_tests"), ptr::null_mut()));
        let env = unsafe { Env::wrap(&mut *raw) };
        assert_eq!(
            registry.init(env, |_| Ok(())).unwrap_err(),
            NifError::RegistrationClosed
        );
        assert_eq!(registry.alloc("Missing", 8).unwrap_err(), NifError::ResourceError);
    }

    #[test]
    fn test_payload_is_zeroed_and_aligned() {
        let ptr = registry().alloc("Plain", 24).unwrap();
        assert_eq!(ptr.as_ptr() as usize % PAYLOAD_ALIGN, 0);
        assert_eq!(ptr.size(), 24);
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 24) };
        assert!(bytes.iter().all(|&b| b == 0));
        assert_eq!(ptr.refcount(), 1);
        unsafe { ptr.release() };
    }

    #[test]
    fn test_term_holds_a_reference() {
        let before = BLOCKS_DESTROYED.load(AtomicOrdering::SeqCst);
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let ptr = registry().alloc("Block", 8).unwrap();
        let term = ptr.to_term(env);
        assert_eq!(ptr.refcount(), 2);
        assert_eq!(registry().get("Block", term).unwrap(), ptr);
        assert_eq!(registry().get("Plain", term).unwrap_err(), NifError::BadArg);
        unsafe { ptr.release() };
        assert_eq!(BLOCKS_DESTROYED.load(AtomicOrdering::SeqCst), before);
        drop(raw);
        assert_eq!(BLOCKS_DESTROYED.load(AtomicOrdering::SeqCst), before + 1);
    }

    #[test]
    fn test_monitor_needs_down_callback() {
        let ptr = registry().alloc("Plain", 0).unwrap();
        let pid = LocalPid::from_raw(ErlNifPid {
            pid: entities_data_handling::eterm::make_pid(1),
        });
        assert_eq!(ptr.monitor_process(None, &pid), Err(NifError::ResourceError));
        unsafe { ptr.release() };
    }

    #[test]
    fn test_typed_types_are_hidden_from_raw_access() {
        let registry = registry();
        assert!(registry.lookup("Tagged").unwrap().is_typed());
        assert!(!registry.lookup("Block").unwrap().is_typed());
        assert_eq!(registry.alloc("Tagged", 8).unwrap_err(), NifError::ResourceError);
        assert_eq!(registry.alloc("Tagged", 0).unwrap_err(), NifError::ResourceError);
        assert_eq!(
            registry.alloc(crate::schedule::YIELD_CONTEXT_TYPE, 64).unwrap_err(),
            NifError::ResourceError
        );

        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let tag = ResourceArc::new(Tag(5)).unwrap();
        let term = tag.to_term(env);
        assert_eq!(registry.get("Tagged", term).unwrap_err(), NifError::BadArg);
        assert_eq!(registry.get("Block", term).unwrap_err(), NifError::BadArg);
        assert_eq!(ResourceArc::<Tag>::from_term(term).unwrap().0, 5);

        let plain = registry.alloc("Plain", 8).unwrap();
        let plain_term = plain.to_term(env);
        assert!(ResourceArc::<Tag>::from_term(plain_term).is_err());
        unsafe { plain.release() };
    }
}
