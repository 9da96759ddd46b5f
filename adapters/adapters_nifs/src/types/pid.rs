//! Local Process Identifiers

use crate::env::Env;
use crate::error::NifResult;
use crate::term::Term;
use crate::types::{Decoder, Encoder};
use infrastructure_nif_api::{enif_make_pid, ErlNifPid};

/// Pid of a local process
///
/// Not bound to an environment; safe to keep and to move between threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPid {
    raw: ErlNifPid,
}

impl LocalPid {
    pub fn from_raw(raw: ErlNifPid) -> LocalPid {
        LocalPid { raw }
    }

    pub fn as_c_arg(&self) -> &ErlNifPid {
        &self.raw
    }

    /// Process number, as used by the process table
    pub fn number(&self) -> u64 {
        entities_data_handling::eterm::pid_number(self.raw.pid)
    }
}

pub fn make_pid<'a>(env: Env<'a>, pid: &LocalPid) -> Term<'a> {
    unsafe { Term::new(env, enif_make_pid(env.as_ptr(), pid.as_c_arg())) }
}

impl Encoder for LocalPid {
    fn encode<'a>(&self, env: Env<'a>) -> NifResult<Term<'a>> {
        Ok(make_pid(env, self))
    }
}

impl<'a> Decoder<'a> for LocalPid {
    fn decode(term: Term<'a>) -> NifResult<Self> {
        term.get_local_pid()
    }
}
