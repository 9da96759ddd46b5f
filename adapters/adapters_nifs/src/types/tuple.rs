//! Tuples

use crate::env::Env;
use crate::error::{NifError, NifResult};
use crate::term::Term;
use crate::types::{Decoder, Encoder};
use infrastructure_nif_api::{enif_make_tuple_from_array, ERL_NIF_TERM};
use std::os::raw::c_uint;

/// Tuple of `elements`
pub fn make_tuple_from_array<'a>(env: Env<'a>, elements: &[Term<'_>]) -> NifResult<Term<'a>> {
    let raw: Vec<ERL_NIF_TERM> = elements.iter().map(|t| t.in_env(env).as_raw()).collect();
    let count = c_uint::try_from(raw.len()).map_err(|_| NifError::BadArg)?;
    Ok(unsafe { Term::new(env, enif_make_tuple_from_array(env.as_ptr(), raw.as_ptr(), count)) })
}

/// Elements of a tuple of exactly `arity` elements
pub fn get_tuple_of(term: Term<'_>, arity: usize) -> NifResult<Vec<Term<'_>>> {
    let elements = term.get_tuple()?;
    if elements.len() != arity {
        return Err(NifError::BadArg);
    }
    Ok(elements)
}

macro_rules! impl_tuple {
    ($arity:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: Encoder),+> Encoder for ($($name,)+) {
            fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
                make_tuple_from_array(env, &[$(self.$idx.encode(env)?),+])
            }
        }

        impl<'a, $($name: Decoder<'a>),+> Decoder<'a> for ($($name,)+) {
            fn decode(term: Term<'a>) -> NifResult<Self> {
                let elements = get_tuple_of(term, $arity)?;
                Ok(($(elements[$idx].decode::<$name>()?,)+))
            }
        }
    };
}

impl_tuple!(1; A: 0);
impl_tuple!(2; A: 0, B: 1);
impl_tuple!(3; A: 0, B: 1, C: 2);
impl_tuple!(4; A: 0, B: 1, C: 2, D: 3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::atom::{make_atom, Atom};
    use infrastructure_nif_api::nif_env::EnvKind;
    use infrastructure_nif_api::ErlNifEnv;

    #[test]
    fn test_tuples() {
        let mut raw = Box::new(ErlNifEnv::new(EnvKind::ProcessIndependent));
        let env = unsafe { Env::wrap(&mut *raw) };
        let ok = make_atom(env, "ok").unwrap();
        let pair = (ok, 7i32).encode(env).unwrap();
        assert!(pair.is_tuple());
        let (tag, value): (Atom, i32) = pair.decode().unwrap();
        assert_eq!(tag.to_term(env), ok);
        assert_eq!(value, 7);
        assert_eq!(pair.decode::<(Atom, i32, i32)>().unwrap_err(), NifError::BadArg);
        assert_eq!(make_tuple_from_array(env, &[]).unwrap().get_tuple().unwrap().len(), 0);
    }
}
