//! Atoms
//!
//! Atom terms are immediates, so an [`Atom`] is not bound to an
//! environment and can be cached in statics.

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::Term;
use crate::types::{Decoder, Encoder};
use infrastructure_nif_api::{
    enif_get_atom, enif_make_atom_len_encoded, enif_make_existing_atom_len, ErlNifCharEncoding,
    ERL_NIF_TERM,
};
use std::os::raw::{c_char, c_uint};

/// An atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom {
    raw: ERL_NIF_TERM,
}

impl Atom {
    /// Intern `name`, creating the atom if needed
    ///
    /// # Returns
    /// * `Err(NifError::BadArg)` - The name is too long or the atom table is full
    pub fn from_name(env: Env<'_>, name: &str) -> NifResult<Atom> {
        let raw = unsafe {
            enif_make_atom_len_encoded(
                env.as_ptr(),
                name.as_ptr() as *const c_char,
                name.len(),
                ErlNifCharEncoding::ERL_NIF_UTF8,
            )
        };
        if entities_data_handling::eterm::is_atom(raw) {
            Ok(Atom { raw })
        } else {
            Err(NifError::BadArg)
        }
    }

    /// Look up `name` without creating it
    pub fn try_from_existing(env: Env<'_>, name: &str) -> NifResult<Atom> {
        let mut raw: ERL_NIF_TERM = 0;
        let found = unsafe {
            enif_make_existing_atom_len(
                env.as_ptr(),
                name.as_ptr() as *const c_char,
                name.len(),
                &mut raw,
                ErlNifCharEncoding::ERL_NIF_UTF8,
            )
        };
        if found == 0 {
            Err(NifError::AtomNotFound)
        } else {
            Ok(Atom { raw })
        }
    }

    pub fn from_term(term: Term<'_>) -> NifResult<Atom> {
        if term.is_atom() {
            Ok(Atom { raw: term.as_raw() })
        } else {
            Err(NifError::BadArg)
        }
    }

    pub fn to_term(self, env: Env<'_>) -> Term<'_> {
        unsafe { Term::new(env, self.raw) }
    }

    pub fn as_raw(self) -> ERL_NIF_TERM {
        self.raw
    }
}

/// Atom term for `name`, created if needed
pub fn make_atom<'a>(env: Env<'a>, name: &str) -> NifResult<Term<'a>> {
    Ok(Atom::from_name(env, name)?.to_term(env))
}

/// Atom term for `name` only if that atom already exists
///
/// # Returns
/// * `Err(NifError::AtomNotFound)` - No such atom; none is created
pub fn make_existing_atom<'a>(env: Env<'a>, name: &str) -> NifResult<Term<'a>> {
    Ok(Atom::try_from_existing(env, name)?.to_term(env))
}

/// Text of an atom term
pub fn atom_to_string(term: Term<'_>) -> NifResult<String> {
    let len = term.get_atom_length(ErlNifCharEncoding::ERL_NIF_UTF8)?;
    let mut buf = vec![0u8; len + 1];
    let size = c_uint::try_from(buf.len()).map_err(|_| NifError::BadArg)?;
    let written = unsafe {
        enif_get_atom(
            term.get_env().as_ptr(),
            term.as_raw(),
            buf.as_mut_ptr() as *mut c_char,
            size,
            ErlNifCharEncoding::ERL_NIF_UTF8,
        )
    };
    if written <= 0 {
        return Err(NifError::BadArg);
    }
    buf.truncate(written as usize - 1);
    String::from_utf8(buf).map_err(|_| NifError::Encoding)
}

impl Encoder for Atom {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        Ok(self.to_term(env))
    }
}

impl<'a> Decoder<'a> for Atom {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        Atom::from_term(term)
    }
}

impl Encoder for bool {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        make_atom(env, if *self { "true" } else { "false" })
    }
}

impl<'a> Decoder<'a> for bool {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        match atom_to_string(term)?.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(NifError::BadArg),
        }
    }
}

/// Frequently used atoms
pub mod atoms {
    use super::*;

    pub fn ok(env: Env<'_>) -> NifResult<Term<'_>> {
        make_atom(env, "ok")
    }

    pub fn error(env: Env<'_>) -> NifResult<Term<'_>> {
        make_atom(env, "error")
    }

    pub fn undefined(env: Env<'_>) -> NifResult<Term<'_>> {
        make_atom(env, "undefined")
    }

    pub fn nif_panicked(env: Env<'_>) -> NifResult<Term<'_>> {
        make_atom(env, "nif_panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_nif_api::nif_env::EnvKind;
    use infrastructure_nif_api::ErlNifEnv;

    #[test]
    fn test_existing_atoms_only() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let ok = make_atom(env, "ok").unwrap();
        assert_eq!(make_existing_atom(env, "ok").unwrap(), ok);
        assert_eq!(
            make_existing_atom(env, "atom_module_never_interned"),
            Err(NifError::AtomNotFound)
        );
        assert_eq!(
            make_existing_atom(env, "atom_module_never_interned"),
            Err(NifError::AtomNotFound)
        );
    }

    #[test]
    fn test_atom_text_round_trip() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let term = make_atom(env, "héllo").unwrap();
        assert_eq!(atom_to_string(term).unwrap(), "héllo");
        assert_eq!(term.decode::<Atom>().unwrap().to_term(env), term);
        assert!(true.encode(env).unwrap().decode::<bool>().unwrap());
        assert_eq!(make_atom(env, &"x".repeat(256)), Err(NifError::BadArg));
    }
}
