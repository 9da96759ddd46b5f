//! Typed Conversions
//!
//! [`Encoder`] builds a term from a Rust value and [`Decoder`] extracts one.
//! The per-type modules also hold the `make_*` constructors.

use crate::env::Env;
use crate::error::NifResult;
use crate::term::Term;

pub mod atom;
pub mod binary;
pub mod list;
pub mod map;
pub mod number;
pub mod pid;
pub mod tuple;

/// Build a term from a Rust value
pub trait Encoder {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>>;
}

/// Extract a Rust value from a term
pub trait Decoder<'a>: Sized {
    fn decode(term: Term<'a>) -> NifResult<Self>;
}

impl Encoder for Term<'_> {
    fn encode<'b>(&self, env: Env<'b>) -> NifResult<Term<'b>> {
        Ok(self.in_env(env))
    }
}

impl<'a> Decoder<'a> for Term<'a> {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        Ok(term)
    }
}

impl<T: Encoder + ?Sized> Encoder for &T {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        (**self).encode(env)
    }
}
