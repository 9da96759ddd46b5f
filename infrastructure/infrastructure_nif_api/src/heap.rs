//! Term Heap
//!
//! Every environment owns a [`TermHeap`]. Non-immediate terms point at
//! [`HeapObject`]s boxed inside it, so a term is valid exactly as long as
//! the heap that holds its object. Clearing or dropping the heap invalidates
//! all of its terms at once and releases the resource references those terms
//! held.
//!
//! List cells are tagged with the list primary tag; every other object is
//! tagged boxed.

use crate::resource_management::{enif_keep_resource, release_resource};
use entities_data_handling::eterm::{self, Eterm};
use entities_data_handling::TermClass;
use malachite::Integer;
use std::os::raw::c_void;

/// A heap-allocated term body
#[derive(Debug)]
pub enum HeapObject {
    Cons { head: Eterm, tail: Eterm },
    Tuple(Box<[Eterm]>),
    /// Integer outside the small range
    BigInt(Integer),
    Float(f64),
    Binary(Box<[u8]>),
    /// Entries sorted by key in exact term order
    Map(Vec<(Eterm, Eterm)>),
    Ref(u64),
    Fun { module: Eterm, function: Eterm, arity: u32 },
    /// Pointer to a resource payload; the heap holds one reference
    Resource(*mut c_void),
}

/// Objects and resource references owned by one environment
#[derive(Debug, Default)]
pub struct TermHeap {
    objects: Vec<Box<HeapObject>>,
    resources: Vec<*mut c_void>,
}

impl TermHeap {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, object: HeapObject) -> usize {
        let object = Box::new(object);
        let addr = &*object as *const HeapObject as usize;
        self.objects.push(object);
        addr
    }

    /// Move `object` onto the heap and return its boxed term.
    pub fn alloc_boxed(&mut self, object: HeapObject) -> Eterm {
        debug_assert!(!matches!(object, HeapObject::Cons { .. }));
        eterm::make_boxed(self.push(object))
    }

    pub fn cons(&mut self, head: Eterm, tail: Eterm) -> Eterm {
        eterm::make_list(self.push(HeapObject::Cons { head, tail }))
    }

    /// Build a proper list from `elements`.
    pub fn list_from(&mut self, elements: &[Eterm]) -> Eterm {
        elements
            .iter()
            .rev()
            .fold(eterm::NIL, |tail, &head| self.cons(head, tail))
    }

    /// Store an integer, using the small encoding whenever it fits.
    pub fn integer(&mut self, value: Integer) -> Eterm {
        match i64::try_from(&value).ok().and_then(eterm::make_small) {
            Some(small) => small,
            None => self.alloc_boxed(HeapObject::BigInt(value)),
        }
    }

    /// Box a resource term. The caller transfers one reference to the heap.
    pub(crate) fn hold_resource(&mut self, obj: *mut c_void) -> Eterm {
        self.resources.push(obj);
        self.alloc_boxed(HeapObject::Resource(obj))
    }

    /// Number of objects on the heap
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of resource references the heap holds
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Drop every object and release every held resource reference.
    pub fn clear(&mut self) {
        self.objects.clear();
        for obj in std::mem::take(&mut self.resources) {
            // SAFETY: each entry is a reference this heap took ownership of.
            unsafe { release_resource(obj) };
        }
    }
}

impl Drop for TermHeap {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Borrow the object behind a boxed term.
///
/// # Safety
/// `term` must be a live term, i.e. its heap has not been cleared.
pub unsafe fn boxed_object<'a>(term: Eterm) -> Option<&'a HeapObject> {
    if eterm::is_boxed(term) {
        Some(&*(eterm::ptr_val(term) as *const HeapObject))
    } else {
        None
    }
}

/// Head and tail of a non-empty list cell.
///
/// # Safety
/// `term` must be a live term.
pub unsafe fn list_cell(term: Eterm) -> Option<(Eterm, Eterm)> {
    if !eterm::is_list_cell(term) {
        return None;
    }
    match &*(eterm::ptr_val(term) as *const HeapObject) {
        HeapObject::Cons { head, tail } => Some((*head, *tail)),
        _ => None,
    }
}

/// Borrowed view of an integer term
#[derive(Debug, Clone, Copy)]
pub enum IntegerRef<'a> {
    Small(i64),
    Big(&'a Integer),
}

impl IntegerRef<'_> {
    pub fn to_integer(self) -> Integer {
        match self {
            IntegerRef::Small(v) => Integer::from(v),
            IntegerRef::Big(v) => v.clone(),
        }
    }

    pub fn to_i64(self) -> Option<i64> {
        match self {
            IntegerRef::Small(v) => Some(v),
            IntegerRef::Big(v) => i64::try_from(v).ok(),
        }
    }

    pub fn to_u64(self) -> Option<u64> {
        match self {
            IntegerRef::Small(v) => u64::try_from(v).ok(),
            IntegerRef::Big(v) => u64::try_from(v).ok(),
        }
    }
}

/// # Safety
/// `term` must be a live term.
pub unsafe fn integer_ref<'a>(term: Eterm) -> Option<IntegerRef<'a>> {
    if eterm::is_small(term) {
        return Some(IntegerRef::Small(eterm::small_value(term)));
    }
    match boxed_object(term)? {
        HeapObject::BigInt(value) => Some(IntegerRef::Big(value)),
        _ => None,
    }
}

/// # Safety
/// `term` must be a live term.
pub unsafe fn float_value(term: Eterm) -> Option<f64> {
    match boxed_object(term)? {
        HeapObject::Float(value) => Some(*value),
        _ => None,
    }
}

/// # Safety
/// `term` must be a live term.
pub unsafe fn binary_bytes<'a>(term: Eterm) -> Option<&'a [u8]> {
    match boxed_object(term)? {
        HeapObject::Binary(bytes) => Some(bytes),
        _ => None,
    }
}

/// # Safety
/// `term` must be a live term.
pub unsafe fn tuple_elements<'a>(term: Eterm) -> Option<&'a [Eterm]> {
    match boxed_object(term)? {
        HeapObject::Tuple(elements) => Some(elements),
        _ => None,
    }
}

/// # Safety
/// `term` must be a live term.
pub unsafe fn map_entries<'a>(term: Eterm) -> Option<&'a [(Eterm, Eterm)]> {
    match boxed_object(term)? {
        HeapObject::Map(entries) => Some(entries),
        _ => None,
    }
}

/// Class of a term in the canonical order.
///
/// # Safety
/// `term` must be a live term.
pub unsafe fn classify(term: Eterm) -> TermClass {
    if eterm::is_small(term) {
        TermClass::Number
    } else if eterm::is_atom(term) {
        TermClass::Atom
    } else if eterm::is_nil(term) {
        TermClass::Nil
    } else if eterm::is_pid(term) {
        TermClass::Pid
    } else if eterm::is_port(term) {
        TermClass::Port
    } else if eterm::is_list_cell(term) {
        TermClass::List
    } else {
        match boxed_object(term) {
            Some(HeapObject::BigInt(_)) | Some(HeapObject::Float(_)) => TermClass::Number,
            Some(HeapObject::Tuple(_)) => TermClass::Tuple,
            Some(HeapObject::Map(_)) => TermClass::Map,
            Some(HeapObject::Binary(_)) => TermClass::Bitstring,
            Some(HeapObject::Ref(_)) | Some(HeapObject::Resource(_)) => TermClass::Reference,
            Some(HeapObject::Fun { .. }) => TermClass::Fun,
            // Neither reachable for a live term.
            Some(HeapObject::Cons { .. }) | None => TermClass::List,
        }
    }
}

/// Deep-copy `term` onto `heap`.
///
/// Immediates are returned unchanged; resource terms take a new reference.
///
/// # Safety
/// `term` must be a live term.
pub unsafe fn copy_term(heap: &mut TermHeap, term: Eterm) -> Eterm {
    if eterm::is_immed(term) {
        return term;
    }
    if eterm::is_list_cell(term) {
        // Walk the spine iteratively; long lists must not recurse per cell.
        let mut heads = Vec::new();
        let mut rest = term;
        while let Some((head, tail)) = list_cell(rest) {
            heads.push(head);
            rest = tail;
        }
        let mut copy = copy_term(heap, rest);
        for head in heads.into_iter().rev() {
            let head = copy_term(heap, head);
            copy = heap.cons(head, copy);
        }
        return copy;
    }
    let Some(object) = boxed_object(term) else {
        return term;
    };
    let copied = match object {
        HeapObject::Tuple(elements) => {
            HeapObject::Tuple(elements.iter().map(|&e| copy_term(heap, e)).collect())
        }
        HeapObject::BigInt(value) => HeapObject::BigInt(value.clone()),
        HeapObject::Float(value) => HeapObject::Float(*value),
        HeapObject::Binary(bytes) => HeapObject::Binary(bytes.clone()),
        HeapObject::Map(entries) => HeapObject::Map(
            entries
                .iter()
                .map(|&(k, v)| (copy_term(heap, k), copy_term(heap, v)))
                .collect(),
        ),
        HeapObject::Ref(id) => HeapObject::Ref(*id),
        HeapObject::Fun {
            module,
            function,
            arity,
        } => HeapObject::Fun {
            module: *module,
            function: *function,
            arity: *arity,
        },
        HeapObject::Resource(obj) => {
            enif_keep_resource(*obj);
            return heap.hold_resource(*obj);
        }
        HeapObject::Cons { head, tail } => {
            let (head, tail) = (*head, *tail);
            let head = copy_term(heap, head);
            let tail = copy_term(heap, tail);
            return heap.cons(head, tail);
        }
    };
    heap.alloc_boxed(copied)
}
