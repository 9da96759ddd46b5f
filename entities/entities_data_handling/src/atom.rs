//! Atom Table Module
//!
//! Atoms are interned names. Every atom text is stored once, as UTF-8, and
//! identified by its index in the table. Atom terms carry that index, so two
//! atom terms are identical exactly when their indices are.
//!
//! ## Encodings
//!
//! - **SevenBitAscii**: bytes 0x00-0x7F only
//! - **Latin1**: ISO-8859-1 bytes, converted to UTF-8 on insertion
//! - **Utf8**: well-formed UTF-8
//!
//! ## Limits
//!
//! - At most [`MAX_ATOM_CHARACTERS`] characters per atom
//! - At most `limit` atoms per table (set by [`AtomTable::new`])
//!
//! ## Examples
//!
//! ```rust
//! use entities_data_handling::{AtomTable, AtomEncoding};
//!
//! let table = AtomTable::new(1000);
//! let index = table.put_index(b"my_atom", AtomEncoding::SevenBitAscii).unwrap();
//! assert_eq!(table.get(b"my_atom", AtomEncoding::SevenBitAscii), Some(index));
//! assert_eq!(table.get_name(index).as_deref(), Some("my_atom"));
//! ```

/*
 * %CopyrightBegin%
 *
 * SPDX-License-Identifier: Apache-2.0
 *
 * Copyright Lee Barney 2025. All Rights Reserved.
 *
 * This file is derived from work copyrighted by Ericsson AB 1996-2025.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 * %CopyrightEnd%
 */

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Character encoding of an atom name passed to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomEncoding {
    /// 7-bit ASCII (0x00-0x7F)
    SevenBitAscii,
    /// ISO-8859-1, stored as UTF-8
    Latin1,
    /// UTF-8
    Utf8,
}

/// Maximum number of characters in an atom
pub const MAX_ATOM_CHARACTERS: usize = 255;

/// Atom table errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AtomError {
    /// The name has more than [`MAX_ATOM_CHARACTERS`] characters
    #[error("atom name exceeds {MAX_ATOM_CHARACTERS} characters")]
    TooLong,
    /// The bytes are not valid in the requested encoding
    #[error("atom name is not valid in the requested encoding")]
    InvalidEncoding,
    /// The table reached its configured limit
    #[error("atom table is full")]
    TableFull,
}

#[derive(Default)]
struct AtomTableInner {
    by_name: HashMap<Arc<str>, usize>,
    names: Vec<Arc<str>>,
}

/// Atom table shared by every environment of a runtime.
///
/// Lookups take a read lock; only the insertion of a new atom takes the
/// write lock. Atoms are never removed.
pub struct AtomTable {
    inner: RwLock<AtomTableInner>,
    limit: usize,
}

impl AtomTable {
    /// Create an empty atom table holding at most `limit` atoms.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: RwLock::new(AtomTableInner::default()),
            limit,
        }
    }

    /// Get or create an atom by name
    ///
    /// # Arguments
    /// * `name` - Atom name bytes
    /// * `encoding` - Encoding of `name`
    ///
    /// # Returns
    /// * `Ok(usize)` - The index of the (possibly new) atom
    /// * `Err(AtomError)` - The name is invalid or the table is full
    ///
    /// # See Also
    ///
    /// - [`get`](Self::get): Look up without creating
    pub fn put_index(&self, name: &[u8], encoding: AtomEncoding) -> Result<usize, AtomError> {
        let text = normalize_name(name, encoding)?;

        if let Some(&index) = self.inner.read().by_name.get(text.as_str()) {
            return Ok(index);
        }

        let mut inner = self.inner.write();
        // Another thread may have inserted it between the two locks.
        if let Some(&index) = inner.by_name.get(text.as_str()) {
            return Ok(index);
        }
        if inner.names.len() >= self.limit {
            return Err(AtomError::TableFull);
        }
        let index = inner.names.len();
        let text: Arc<str> = Arc::from(text);
        inner.names.push(Arc::clone(&text));
        inner.by_name.insert(text, index);
        Ok(index)
    }

    /// Look up an existing atom without creating it.
    ///
    /// Returns `None` when the atom does not exist or `name` is not valid in
    /// `encoding`.
    pub fn get(&self, name: &[u8], encoding: AtomEncoding) -> Option<usize> {
        let text = normalize_name(name, encoding).ok()?;
        self.inner.read().by_name.get(text.as_str()).copied()
    }

    /// Get the UTF-8 text of the atom at `index`.
    pub fn get_name(&self, index: usize) -> Option<Arc<str>> {
        self.inner.read().names.get(index).cloned()
    }

    /// Number of atoms in the table
    pub fn size(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Configured capacity
    pub fn limit(&self) -> usize {
        self.limit
    }
}

fn normalize_name(name: &[u8], encoding: AtomEncoding) -> Result<String, AtomError> {
    let text = match encoding {
        AtomEncoding::SevenBitAscii => {
            if !name.is_ascii() {
                return Err(AtomError::InvalidEncoding);
            }
            latin1_to_utf8(name)
        }
        AtomEncoding::Latin1 => latin1_to_utf8(name),
        AtomEncoding::Utf8 => std::str::from_utf8(name)
            .map_err(|_| AtomError::InvalidEncoding)?
            .to_owned(),
    };
    if text.chars().count() > MAX_ATOM_CHARACTERS {
        return Err(AtomError::TooLong);
    }
    Ok(text)
}

/// Convert ISO-8859-1 bytes to a UTF-8 string.
pub fn latin1_to_utf8(latin1: &[u8]) -> String {
    latin1.iter().map(|&b| char::from(b)).collect()
}

/// Convert UTF-8 text to ISO-8859-1 bytes.
///
/// Returns `None` if any character is above U+00FF.
pub fn utf8_to_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}
