//! Lists and Character Lists

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::{Term, TermType};
use crate::types::{Decoder, Encoder};
use infrastructure_nif_api::{
    enif_get_string, enif_make_empty_list, enif_make_list_cell, enif_make_list_from_array,
    enif_make_string_len, ErlNifCharEncoding, ERL_NIF_TERM,
};
use std::os::raw::{c_char, c_uint};

/// Iterator over the elements of a list
///
/// Stops at the first tail that is not a list cell; [`ListIterator::is_proper`]
/// tells whether that tail was `[]`.
#[derive(Clone, Copy, Debug)]
pub struct ListIterator<'a> {
    rest: Term<'a>,
}

impl<'a> ListIterator<'a> {
    pub fn new(term: Term<'a>) -> NifResult<ListIterator<'a>> {
        if term.is_list() {
            Ok(ListIterator { rest: term })
        } else {
            Err(NifError::BadArg)
        }
    }

    /// True once the iterator has reached a `[]` tail
    pub fn is_proper(&self) -> bool {
        self.rest.is_empty_list()
    }
}

impl<'a> Iterator for ListIterator<'a> {
    type Item = Term<'a>;

    fn next(&mut self) -> Option<Term<'a>> {
        let (head, tail) = self.rest.get_list_cell().ok()?;
        self.rest = tail;
        Some(head)
    }
}

pub fn make_empty_list(env: Env<'_>) -> Term<'_> {
    unsafe { Term::new(env, enif_make_empty_list(env.as_ptr())) }
}

/// `[head | tail]`
pub fn make_list_cell<'a>(env: Env<'a>, head: Term<'_>, tail: Term<'_>) -> Term<'a> {
    let head = head.in_env(env);
    let tail = tail.in_env(env);
    unsafe { Term::new(env, enif_make_list_cell(env.as_ptr(), head.as_raw(), tail.as_raw())) }
}

/// Proper list of `elements`
pub fn make_list<'a>(env: Env<'a>, elements: &[Term<'_>]) -> NifResult<Term<'a>> {
    let raw: Vec<ERL_NIF_TERM> = elements.iter().map(|t| t.in_env(env).as_raw()).collect();
    let count = c_uint::try_from(raw.len()).map_err(|_| NifError::BadArg)?;
    Ok(unsafe { Term::new(env, enif_make_list_from_array(env.as_ptr(), raw.as_ptr(), count)) })
}

/// Character list of `text`
pub fn make_string<'a>(env: Env<'a>, text: &str) -> Term<'a> {
    make_string_len(env, text.as_bytes(), ErlNifCharEncoding::ERL_NIF_UTF8)
        .unwrap_or_else(|_| make_empty_list(env))
}

/// Character list of `bytes` in `encoding`
///
/// # Returns
/// * `Err(NifError::Encoding)` - `bytes` is not valid UTF-8
pub fn make_string_len<'a>(
    env: Env<'a>,
    bytes: &[u8],
    encoding: ErlNifCharEncoding,
) -> NifResult<Term<'a>> {
    // Validated first so invalid text leaves no exception in the call.
    if encoding == ErlNifCharEncoding::ERL_NIF_UTF8 && std::str::from_utf8(bytes).is_err() {
        return Err(NifError::Encoding);
    }
    let raw = unsafe {
        enif_make_string_len(env.as_ptr(), bytes.as_ptr() as *const c_char, bytes.len(), encoding)
    };
    Ok(unsafe { Term::new(env, raw) })
}

/// Text of a character list
///
/// # Returns
/// * `Err(NifError::BadArg)` - Not a proper list of integers
/// * `Err(NifError::Encoding)` - A character has no form in `encoding`
pub fn get_string(term: Term<'_>, encoding: ErlNifCharEncoding) -> NifResult<String> {
    let len = term.get_list_length()?;
    if ListIterator::new(term)?.any(|c| c.term_type() != TermType::Integer) {
        return Err(NifError::BadArg);
    }
    let per_char = match encoding {
        ErlNifCharEncoding::ERL_NIF_LATIN1 => 1,
        ErlNifCharEncoding::ERL_NIF_UTF8 => 4,
    };
    let mut buf = vec![0u8; len * per_char + 1];
    let size = c_uint::try_from(buf.len()).map_err(|_| NifError::BadArg)?;
    let written = unsafe {
        enif_get_string(
            term.get_env().as_ptr(),
            term.as_raw(),
            buf.as_mut_ptr() as *mut c_char,
            size,
            encoding,
        )
    };
    if written <= 0 {
        return Err(NifError::Encoding);
    }
    buf.truncate(written as usize - 1);
    match encoding {
        ErlNifCharEncoding::ERL_NIF_UTF8 => String::from_utf8(buf).map_err(|_| NifError::Encoding),
        ErlNifCharEncoding::ERL_NIF_LATIN1 => Ok(buf.into_iter().map(char::from).collect()),
    }
}

impl<T: Encoder> Encoder for [T] {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        let elements = self
            .iter()
            .map(|e| e.encode(env))
            .collect::<NifResult<Vec<_>>>()?;
        make_list(env, &elements)
    }
}

impl<T: Encoder> Encoder for Vec<T> {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        self.as_slice().encode(env)
    }
}

impl<'a, T: Decoder<'a>> Decoder<'a> for Vec<T> {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        let len = term.get_list_length()?;
        let mut out = Vec::with_capacity(len);
        for element in ListIterator::new(term)? {
            out.push(element.decode()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::number::make_int;
    use infrastructure_nif_api::nif_env::EnvKind;
    use infrastructure_nif_api::ErlNifEnv;

    #[test]
    fn test_lists() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let list = vec![1i64, 2, 3].encode(env).unwrap();
        assert_eq!(list.get_list_length(), Ok(3));
        assert_eq!(list.decode::<Vec<i64>>().unwrap(), vec![1, 2, 3]);

        let improper = make_list_cell(env, make_int(env, 1), make_int(env, 2));
        assert_eq!(improper.get_list_length(), Err(NifError::BadArg));
        let mut iter = ListIterator::new(improper).unwrap();
        assert_eq!(iter.next().and_then(|t| t.get_int().ok()), Some(1));
        assert!(iter.next().is_none());
        assert!(!iter.is_proper());
        assert!(make_empty_list(env).is_empty_list());
    }

    #[test]
    fn test_character_lists() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let text = make_string(env, "añb");
        assert_eq!(text.get_list_length(), Ok(3));
        assert_eq!(get_string(text, ErlNifCharEncoding::ERL_NIF_UTF8).unwrap(), "añb");
        assert_eq!(get_string(text, ErlNifCharEncoding::ERL_NIF_LATIN1).unwrap(), "añb");

        let wide = make_string(env, "€");
        assert_eq!(
            get_string(wide, ErlNifCharEncoding::ERL_NIF_LATIN1),
            Err(NifError::Encoding)
        );
        assert_eq!(
            make_string_len(env, &[0xc3], ErlNifCharEncoding::ERL_NIF_UTF8),
            Err(NifError::Encoding)
        );
        assert_eq!(get_string(make_int(env, 5), ErlNifCharEncoding::ERL_NIF_UTF8), Err(NifError::BadArg));
    }
}
