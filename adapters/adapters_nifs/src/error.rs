//! NIF Errors
//!
//! Every fallible operation of the safe layer returns [`NifResult`]. Inner
//! code composes with `?`; the fault barrier in [`crate::barrier`] is the
//! one place an error becomes something the runtime sees.

use crate::term::Term;
use infrastructure_nif_api::ERL_NIF_TERM;

/// Result of a safe NIF operation
pub type NifResult<T> = Result<T, NifError>;

/// Error taxonomy of the safe layer
///
/// The two carriers hold raw terms of the call environment: `Raise` becomes
/// an exception with that reason, `Term` is returned as an ordinary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NifError {
    #[error("bad argument")]
    BadArg,
    #[error("integer out of range for the target type")]
    Overflow,
    #[error("invalid text encoding")]
    Encoding,
    #[error("allocation failed")]
    AllocFailed,
    #[error("resource error")]
    ResourceError,
    #[error("expected {expected} arguments, got {got}")]
    ArgcMismatch { expected: usize, got: usize },
    #[error("no such process")]
    NoProcess,
    #[error("atom does not exist")]
    AtomNotFound,
    #[error("resource types can only be registered while loading")]
    RegistrationClosed,
    #[error("raise with reason {0:#x}")]
    Raise(ERL_NIF_TERM),
    #[error("early return of {0:#x}")]
    Term(ERL_NIF_TERM),
}

impl NifError {
    /// Raise `reason` as an exception from the current call
    pub fn raise(reason: Term<'_>) -> Self {
        NifError::Raise(reason.as_raw())
    }

    /// Return `value` from the current call
    pub fn term(value: Term<'_>) -> Self {
        NifError::Term(value.as_raw())
    }

    /// Short name used in log output
    pub fn kind(&self) -> &'static str {
        match self {
            NifError::BadArg => "badarg",
            NifError::Overflow => "overflow",
            NifError::Encoding => "encoding",
            NifError::AllocFailed => "alloc_failed",
            NifError::ResourceError => "resource_error",
            NifError::ArgcMismatch { .. } => "argc_mismatch",
            NifError::NoProcess => "no_process",
            NifError::AtomNotFound => "atom_not_found",
            NifError::RegistrationClosed => "registration_closed",
            NifError::Raise(_) => "raise",
            NifError::Term(_) => "term",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(NifError::BadArg.to_string(), "bad argument");
        assert_eq!(
            NifError::ArgcMismatch { expected: 2, got: 3 }.to_string(),
            "expected 2 arguments, got 3"
        );
        assert_eq!(NifError::Overflow.kind(), "overflow");
    }
}
