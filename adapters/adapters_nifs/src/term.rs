//! Term Handles
//!
//! A [`Term`] is a raw term word plus the environment it lives in. It owns
//! no memory and is only valid while its environment is. Predicates are
//! infallible; every accessor returns a value or a [`NifError`], never
//! panics, and tells a wrong type (`BadArg`) apart from a value outside the
//! target range (`Overflow`).

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::types::binary::Binary;
use crate::types::pid::LocalPid;
use crate::types::Decoder;
use infrastructure_nif_api::{
    enif_compare, enif_get_atom_length, enif_get_double, enif_get_int, enif_get_int64,
    enif_get_list_cell, enif_get_list_length, enif_get_local_pid, enif_get_tuple,
    enif_get_uint, enif_get_uint64, enif_inspect_binary, enif_is_atom, enif_is_binary,
    enif_is_empty_list, enif_is_fun, enif_is_identical, enif_is_list, enif_is_map,
    enif_is_number, enif_is_pid, enif_is_port, enif_is_ref, enif_is_tuple, enif_make_copy,
    enif_term_type, ErlNifBinary, ErlNifCharEncoding, ErlNifPid, ERL_NIF_TERM,
    ERL_NIF_TERM_TYPE_ATOM, ERL_NIF_TERM_TYPE_BITSTRING, ERL_NIF_TERM_TYPE_FLOAT,
    ERL_NIF_TERM_TYPE_FUN, ERL_NIF_TERM_TYPE_INTEGER, ERL_NIF_TERM_TYPE_LIST,
    ERL_NIF_TERM_TYPE_MAP, ERL_NIF_TERM_TYPE_PID, ERL_NIF_TERM_TYPE_PORT,
    ERL_NIF_TERM_TYPE_REFERENCE, ERL_NIF_TERM_TYPE_TUPLE,
};
use std::cmp::Ordering;
use std::os::raw::{c_int, c_uint};

/// Type of a term, as reported by `enif_term_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermType {
    Atom,
    Bitstring,
    Float,
    Fun,
    Integer,
    List,
    Map,
    Pid,
    Port,
    Reference,
    Tuple,
    Unknown,
}

impl TermType {
    fn from_raw(raw: c_int) -> TermType {
        match raw {
            ERL_NIF_TERM_TYPE_ATOM => TermType::Atom,
            ERL_NIF_TERM_TYPE_BITSTRING => TermType::Bitstring,
            ERL_NIF_TERM_TYPE_FLOAT => TermType::Float,
            ERL_NIF_TERM_TYPE_FUN => TermType::Fun,
            ERL_NIF_TERM_TYPE_INTEGER => TermType::Integer,
            ERL_NIF_TERM_TYPE_LIST => TermType::List,
            ERL_NIF_TERM_TYPE_MAP => TermType::Map,
            ERL_NIF_TERM_TYPE_PID => TermType::Pid,
            ERL_NIF_TERM_TYPE_PORT => TermType::Port,
            ERL_NIF_TERM_TYPE_REFERENCE => TermType::Reference,
            ERL_NIF_TERM_TYPE_TUPLE => TermType::Tuple,
            _ => TermType::Unknown,
        }
    }
}

/// A term of environment `'a`
#[derive(Clone, Copy)]
pub struct Term<'a> {
    raw: ERL_NIF_TERM,
    env: Env<'a>,
}

fn check(ok: c_int, err: NifError) -> NifResult<()> {
    if ok == 0 {
        Err(err)
    } else {
        Ok(())
    }
}

fn check_with(ok: c_int, err: impl FnOnce() -> NifError) -> NifResult<()> {
    if ok == 0 {
        Err(err())
    } else {
        Ok(())
    }
}

impl<'a> Term<'a> {
    /// # Safety
    /// `raw` must be a live term of `env`.
    pub unsafe fn new(env: Env<'a>, raw: ERL_NIF_TERM) -> Term<'a> {
        Term { raw, env }
    }

    pub fn as_raw(&self) -> ERL_NIF_TERM {
        self.raw
    }

    pub fn get_env(&self) -> Env<'a> {
        self.env
    }

    /// This term, usable in `env`
    ///
    /// Terms are never combined across environments: a term of another
    /// environment is copied into `env` first.
    pub fn in_env<'b>(&self, env: Env<'b>) -> Term<'b> {
        if self.env.as_ptr() == env.as_ptr() {
            unsafe { Term::new(env, self.raw) }
        } else {
            unsafe { Term::new(env, enif_make_copy(env.as_ptr(), self.raw)) }
        }
    }

    pub fn decode<T: Decoder<'a>>(self) -> NifResult<T> {
        T::decode(self)
    }

    fn env_ptr(&self) -> *mut infrastructure_nif_api::ErlNifEnv {
        self.env.as_ptr()
    }

    pub fn is_atom(&self) -> bool {
        unsafe { enif_is_atom(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_binary(&self) -> bool {
        unsafe { enif_is_binary(self.env_ptr(), self.raw) != 0 }
    }

    /// True for `[]` and for non-empty lists
    pub fn is_list(&self) -> bool {
        unsafe { enif_is_list(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_empty_list(&self) -> bool {
        unsafe { enif_is_empty_list(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_tuple(&self) -> bool {
        unsafe { enif_is_tuple(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_map(&self) -> bool {
        unsafe { enif_is_map(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_number(&self) -> bool {
        unsafe { enif_is_number(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_pid(&self) -> bool {
        unsafe { enif_is_pid(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_port(&self) -> bool {
        unsafe { enif_is_port(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_ref(&self) -> bool {
        unsafe { enif_is_ref(self.env_ptr(), self.raw) != 0 }
    }

    pub fn is_fun(&self) -> bool {
        unsafe { enif_is_fun(self.env_ptr(), self.raw) != 0 }
    }

    pub fn term_type(&self) -> TermType {
        TermType::from_raw(unsafe { enif_term_type(self.env_ptr(), self.raw) })
    }

    /// Failure of an integer accessor: an integer that did not fit, or a
    /// term that is no integer at all.
    fn integer_failure(&self) -> NifError {
        if self.term_type() == TermType::Integer {
            NifError::Overflow
        } else {
            NifError::BadArg
        }
    }

    pub fn get_int(&self) -> NifResult<i32> {
        let mut value: c_int = 0;
        check_with(unsafe { enif_get_int(self.env_ptr(), self.raw, &mut value) }, || self.integer_failure())?;
        Ok(value)
    }

    pub fn get_uint(&self) -> NifResult<u32> {
        let mut value: c_uint = 0;
        check_with(unsafe { enif_get_uint(self.env_ptr(), self.raw, &mut value) }, || self.integer_failure())?;
        Ok(value)
    }

    pub fn get_long(&self) -> NifResult<i64> {
        let mut value: i64 = 0;
        check_with(unsafe { enif_get_int64(self.env_ptr(), self.raw, &mut value) }, || self.integer_failure())?;
        Ok(value)
    }

    pub fn get_ulong(&self) -> NifResult<u64> {
        let mut value: u64 = 0;
        check_with(unsafe { enif_get_uint64(self.env_ptr(), self.raw, &mut value) }, || self.integer_failure())?;
        Ok(value)
    }

    /// Value of a float term; integers are not converted.
    pub fn get_double(&self) -> NifResult<f64> {
        let mut value: f64 = 0.0;
        check(unsafe { enif_get_double(self.env_ptr(), self.raw, &mut value) }, NifError::BadArg)?;
        Ok(value)
    }

    /// Byte length of an atom's text in `encoding`
    ///
    /// # Returns
    /// * `Err(NifError::BadArg)` - Not an atom
    /// * `Err(NifError::Encoding)` - The text has no Latin1 form
    pub fn get_atom_length(&self, encoding: ErlNifCharEncoding) -> NifResult<usize> {
        let mut len: c_uint = 0;
        if unsafe { enif_get_atom_length(self.env_ptr(), self.raw, &mut len, encoding) } != 0 {
            return Ok(len as usize);
        }
        if self.is_atom() {
            Err(NifError::Encoding)
        } else {
            Err(NifError::BadArg)
        }
    }

    pub fn get_local_pid(&self) -> NifResult<LocalPid> {
        let mut pid = ErlNifPid { pid: 0 };
        check(unsafe { enif_get_local_pid(self.env_ptr(), self.raw, &mut pid) }, NifError::BadArg)?;
        Ok(LocalPid::from_raw(pid))
    }

    /// Elements of a tuple
    pub fn get_tuple(&self) -> NifResult<Vec<Term<'a>>> {
        let mut arity: c_int = 0;
        let mut array: *const ERL_NIF_TERM = std::ptr::null();
        check(
            unsafe { enif_get_tuple(self.env_ptr(), self.raw, &mut arity, &mut array) },
            NifError::BadArg,
        )?;
        if arity == 0 {
            return Ok(Vec::new());
        }
        let elements = unsafe { std::slice::from_raw_parts(array, arity as usize) };
        Ok(elements
            .iter()
            .map(|&raw| unsafe { Term::new(self.env, raw) })
            .collect())
    }

    /// Head and tail of a non-empty list
    pub fn get_list_cell(&self) -> NifResult<(Term<'a>, Term<'a>)> {
        let mut head: ERL_NIF_TERM = 0;
        let mut tail: ERL_NIF_TERM = 0;
        check(
            unsafe { enif_get_list_cell(self.env_ptr(), self.raw, &mut head, &mut tail) },
            NifError::BadArg,
        )?;
        Ok(unsafe { (Term::new(self.env, head), Term::new(self.env, tail)) })
    }

    /// Length of a proper list; improper lists are `BadArg`.
    pub fn get_list_length(&self) -> NifResult<usize> {
        let mut len: c_uint = 0;
        check(unsafe { enif_get_list_length(self.env_ptr(), self.raw, &mut len) }, NifError::BadArg)?;
        Ok(len as usize)
    }

    /// Read-only view of a binary, valid as long as this term
    pub fn inspect_binary(&self) -> NifResult<Binary<'a>> {
        let mut bin = ErlNifBinary::default();
        check(unsafe { enif_inspect_binary(self.env_ptr(), self.raw, &mut bin) }, NifError::BadArg)?;
        Ok(unsafe { Binary::from_raw(*self, &bin) })
    }

    /// Exact identity of the underlying values: `1` and `1.0` differ.
    pub fn equals(&self, other: Term<'_>) -> bool {
        unsafe { enif_is_identical(self.raw, other.raw) != 0 }
    }

    /// Standard term order: numbers < atoms < references < funs < ports
    /// < pids < tuples < maps < lists < bitstrings
    pub fn compare_to(&self, other: Term<'_>) -> Ordering {
        unsafe { enif_compare(self.raw, other.raw) }.cmp(&0)
    }
}

impl PartialEq for Term<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(*other)
    }
}

impl Eq for Term<'_> {}

impl std::fmt::Debug for Term<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Term({:?}, {:#x})", self.term_type(), self.raw)
    }
}
