//! Global Atom Table
//!
//! One atom table per runtime. The limit can be set once, before the first
//! atom is created; later calls to [`init_atom_table`] report whether the
//! requested limit took effect.


use entities_data_handling::eterm::{self, Eterm};
use entities_data_handling::{AtomEncoding, AtomTable};
use std::sync::OnceLock;

/// Default capacity, as in the reference runtime
pub const DEFAULT_ATOM_LIMIT: usize = 1_048_576;

static GLOBAL_ATOM_TABLE: OnceLock<AtomTable> = OnceLock::new();

/// Create the global atom table with `limit`. Returns `false` if the table
/// already existed, in which case its original limit stays.
pub fn init_atom_table(limit: usize) -> bool {
    let mut created = false;
    GLOBAL_ATOM_TABLE.get_or_init(|| {
        created = true;
        AtomTable::new(limit)
    });
    created
}

/// Get the global atom table, creating it with the default limit if needed.
pub fn get_global_atom_table() -> &'static AtomTable {
    GLOBAL_ATOM_TABLE.get_or_init(|| AtomTable::new(DEFAULT_ATOM_LIMIT))
}

/// Intern a Latin1 name and return its atom term.
///
/// Only for names known to be valid, such as `ok` or `badarg`.
pub(crate) fn am(name: &str) -> Eterm {
    match get_global_atom_table().put_index(name.as_bytes(), AtomEncoding::Latin1) {
        Ok(index) => eterm::make_atom(index),
        // Only reachable when the table is full; `[]` is the least harmful
        // stand-in for a reason atom.
        Err(_) => eterm::NIL,
    }
}

/// UTF-8 text of an atom term
pub(crate) fn atom_text(term: Eterm) -> Option<std::sync::Arc<str>> {
    if !eterm::is_atom(term) {
        return None;
    }
    get_global_atom_table().get_name(eterm::atom_index(term))
}
