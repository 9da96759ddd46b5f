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

//! Canonical Term Order
//!
//! Terms of different classes compare by class:
//!
//! ```text
//! number < atom < reference < fun < port < pid < tuple < map < [] < list < bitstring
//! ```
//!
//! Terms of the same class compare by value; that part lives with the heap
//! representation in the NIF API crate.

/// Term class, declared in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TermClass {
    Number,
    Atom,
    Reference,
    Fun,
    Port,
    Pid,
    Tuple,
    Map,
    Nil,
    List,
    Bitstring,
}

impl TermClass {
    /// Empty and non-empty lists are one type to the outside world.
    pub fn is_list(self) -> bool {
        matches!(self, TermClass::Nil | TermClass::List)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_order() {
        let ordered = [
            TermClass::Number,
            TermClass::Atom,
            TermClass::Reference,
            TermClass::Fun,
            TermClass::Port,
            TermClass::Pid,
            TermClass::Tuple,
            TermClass::Map,
            TermClass::Nil,
            TermClass::List,
            TermClass::Bitstring,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} < {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_nil_and_cons_are_lists() {
        assert!(TermClass::Nil.is_list());
        assert!(TermClass::List.is_list());
        assert!(!TermClass::Tuple.is_list());
    }
}
