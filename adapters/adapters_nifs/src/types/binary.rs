//! Binaries
//!
//! [`Binary`] is a borrowed, read-only view of a binary term.
//! [`OwnedBinary`] is an explicitly allocated buffer: it is either handed
//! to the runtime with [`OwnedBinary::release`] or given back when dropped.

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::Term;
use crate::types::{Decoder, Encoder};
use infrastructure_nif_api::{
    enif_alloc_binary, enif_make_binary, enif_make_new_binary, enif_realloc_binary,
    enif_release_binary, ErlNifBinary, ERL_NIF_TERM,
};
use std::ops::{Deref, DerefMut};

/// Read-only view of a binary term
#[derive(Clone, Copy)]
pub struct Binary<'a> {
    bytes: &'a [u8],
    term: Term<'a>,
}

impl<'a> Binary<'a> {
    /// # Safety
    /// `bin` must have been filled in by `enif_inspect_binary` for `term`.
    pub(crate) unsafe fn from_raw(term: Term<'a>, bin: &ErlNifBinary) -> Binary<'a> {
        let bytes = if bin.size == 0 || bin.data.is_null() {
            &[][..]
        } else {
            std::slice::from_raw_parts(bin.data, bin.size)
        };
        Binary { bytes, term }
    }

    pub fn from_term(term: Term<'a>) -> NifResult<Binary<'a>> {
        term.inspect_binary()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_term(self) -> Term<'a> {
        self.term
    }

    /// Contents as UTF-8 text
    pub fn as_str(&self) -> NifResult<&'a str> {
        std::str::from_utf8(self.bytes).map_err(|_| NifError::Encoding)
    }
}

impl Deref for Binary<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl std::fmt::Debug for Binary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Binary").field(&self.bytes).finish()
    }
}

/// A binary buffer owned by native code
pub struct OwnedBinary {
    inner: ErlNifBinary,
    released: bool,
}

// The buffer is exclusively owned until it is released to the runtime.
unsafe impl Send for OwnedBinary {}

impl OwnedBinary {
    /// Zeroed buffer of `size` bytes
    pub fn new(size: usize) -> NifResult<OwnedBinary> {
        let mut inner = ErlNifBinary::default();
        if unsafe { enif_alloc_binary(size, &mut inner) } == 0 {
            return Err(NifError::AllocFailed);
        }
        Ok(OwnedBinary {
            inner,
            released: false,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> NifResult<OwnedBinary> {
        let mut binary = OwnedBinary::new(bytes.len())?;
        binary.as_mut_slice().copy_from_slice(bytes);
        Ok(binary)
    }

    pub fn len(&self) -> usize {
        self.inner.size
    }

    pub fn is_empty(&self) -> bool {
        self.inner.size == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.inner.size == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.inner.data, self.inner.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.inner.size == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.inner.data, self.inner.size) }
    }

    /// Resize, keeping `min(old, new)` bytes
    ///
    /// On failure the buffer is unchanged.
    pub fn realloc(&mut self, size: usize) -> NifResult<()> {
        if unsafe { enif_realloc_binary(&mut self.inner, size) } == 0 {
            return Err(NifError::AllocFailed);
        }
        Ok(())
    }

    /// Hand the buffer to the runtime as a binary term of `env`
    pub fn release(mut self, env: Env<'_>) -> Term<'_> {
        self.released = true;
        let raw: ERL_NIF_TERM = unsafe { enif_make_binary(env.as_ptr(), &mut self.inner) };
        unsafe { Term::new(env, raw) }
    }
}

impl Deref for OwnedBinary {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for OwnedBinary {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl Drop for OwnedBinary {
    fn drop(&mut self) {
        if !self.released {
            unsafe { enif_release_binary(&mut self.inner) };
        }
    }
}

/// Binary term from an owned buffer; same as [`OwnedBinary::release`]
pub fn make_binary(env: Env<'_>, binary: OwnedBinary) -> Term<'_> {
    binary.release(env)
}

/// New binary term of `size` bytes, filled in by `fill`
pub fn make_new_binary<'a, F>(env: Env<'a>, size: usize, fill: F) -> NifResult<Term<'a>>
where
    F: FnOnce(&mut [u8]),
{
    let mut raw: ERL_NIF_TERM = 0;
    let data = unsafe { enif_make_new_binary(env.as_ptr(), size, &mut raw) };
    if data.is_null() {
        return Err(NifError::AllocFailed);
    }
    if size > 0 {
        fill(unsafe { std::slice::from_raw_parts_mut(data, size) });
    }
    Ok(unsafe { Term::new(env, raw) })
}

/// UTF-8 text of a binary term
///
/// # Returns
/// * `Err(NifError::BadArg)` - Not a binary
/// * `Err(NifError::Encoding)` - Not valid UTF-8
pub fn get_str<'a>(term: Term<'a>) -> NifResult<&'a str> {
    term.inspect_binary()?.as_str()
}

impl<'a> Decoder<'a> for Binary<'a> {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        term.inspect_binary()
    }
}

impl<'a> Decoder<'a> for &'a str {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        get_str(term)
    }
}

impl<'a> Decoder<'a> for String {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        get_str(term).map(str::to_owned)
    }
}

impl Encoder for str {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        make_new_binary(env, self.len(), |buf| buf.copy_from_slice(self.as_bytes()))
    }
}

impl Encoder for String {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        self.as_str().encode(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_nif_api::nif_env::EnvKind;
    use infrastructure_nif_api::ErlNifEnv;

    #[test]
    fn test_owned_binary_becomes_term() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let mut owned = OwnedBinary::new(3).unwrap();
        owned.copy_from_slice(b"abc");
        owned.realloc(5).unwrap();
        assert_eq!(owned.as_slice(), b"abc\0\0");
        owned.realloc(2).unwrap();
        let term = make_binary(env, owned);
        assert!(term.is_binary());
        assert_eq!(term.inspect_binary().unwrap().as_slice(), b"ab");
    }

    #[test]
    fn test_text_needs_utf8() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let text = "grüße".encode(env).unwrap();
        assert_eq!(get_str(text), Ok("grüße"));
        let bad = make_new_binary(env, 2, |buf| buf.copy_from_slice(&[0xff, 0xfe])).unwrap();
        assert_eq!(get_str(bad), Err(NifError::Encoding));
        assert_eq!(bad.decode::<Binary>().unwrap().len(), 2);
        let not_binary = crate::types::number::make_int(env, 1);
        assert_eq!(get_str(not_binary), Err(NifError::BadArg));
    }
}
