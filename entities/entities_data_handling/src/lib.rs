//! Entities Layer: Data Handling
//!
//! The innermost building blocks of the term model used by the NIF runtime:
//!
//! - **[`eterm`](eterm/index.html)**: the tagged-word encoding of terms
//!   (immediates, list and boxed pointers, the non-value marker).
//! - **[`atom`](atom/index.html)**: the atom table, with 7-bit ASCII, Latin1
//!   and UTF-8 input and UTF-8 storage.
//! - **[`term_order`](term_order/index.html)**: the canonical ordering of
//!   term classes.
//!
//! ## Usage
//!
//! ```rust
//! use entities_data_handling::{AtomTable, AtomEncoding};
//! use entities_data_handling::eterm::{make_atom, atom_index, is_atom};
//!
//! let table = AtomTable::new(1000);
//! let index = table.put_index(b"ok", AtomEncoding::Latin1).unwrap();
//! let term = make_atom(index);
//! assert!(is_atom(term));
//! assert_eq!(atom_index(term), index);
//! ```
//!
//! ## Architecture
//!
//! This crate has no dependencies on other crates of the workspace.

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

pub mod atom;
pub mod eterm;
pub mod term_order;

pub use atom::{AtomEncoding, AtomError, AtomTable};
pub use eterm::Eterm;
pub use term_order::TermClass;
