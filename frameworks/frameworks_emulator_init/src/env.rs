//! Environment Variable Configuration
//!
//! Reads runtime settings from the process environment. Unset and empty
//! variables mean "use the default"; anything else must parse.

use crate::main_init::InitError;
use std::env;

pub const NIF_SCHEDULERS: &str = "NIF_SCHEDULERS";
pub const NIF_DIRTY_CPU_SCHEDULERS: &str = "NIF_DIRTY_CPU_SCHEDULERS";
pub const NIF_DIRTY_IO_SCHEDULERS: &str = "NIF_DIRTY_IO_SCHEDULERS";
pub const NIF_ATOM_LIMIT: &str = "NIF_ATOM_LIMIT";
/// Allocator byte limit; unset means unlimited
pub const NIF_ALLOC_LIMIT: &str = "NIF_ALLOC_LIMIT";

/// Read a count from `name`
///
/// # Returns
/// * `Ok(Some(n))` - The variable is set to a number
/// * `Ok(None)` - The variable is unset or empty
/// * `Err(InitError::InvalidEnv)` - The variable is set to something else
pub fn read_count(name: &'static str) -> Result<Option<usize>, InitError> {
    match env::var(name) {
        Ok(value) => parse_count(name, &value),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(raw)) => Err(InitError::InvalidEnv {
            name,
            value: raw.to_string_lossy().into_owned(),
        }),
    }
}

pub(crate) fn parse_count(name: &'static str, value: &str) -> Result<Option<usize>, InitError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<usize>().map(Some).map_err(|_| InitError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}
