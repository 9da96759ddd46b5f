//! Tagged Term Words
//!
//! A term is one machine word (`Eterm`). The two low bits are the primary
//! tag:
//!
//! | primary | meaning |
//! |---|---|
//! | `00` | header (never a valid term word; `THE_NON_VALUE` lives here) |
//! | `01` | list cell pointer |
//! | `10` | boxed pointer |
//! | `11` | immediate |
//!
//! Immediates are split further by the next two bits into pids, ports,
//! small integers and a second immediate class holding atoms and `[]`.
//! Pointer words carry the address of a heap object aligned to at least
//! four bytes, with the primary tag in the low bits.

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

/// A tagged term word
pub type Eterm = u64;

pub const TAG_PRIMARY_SIZE: u32 = 2;
pub const TAG_PRIMARY_MASK: u64 = 0x3;
pub const TAG_PRIMARY_HEADER: u64 = 0x0;
pub const TAG_PRIMARY_LIST: u64 = 0x1;
pub const TAG_PRIMARY_BOXED: u64 = 0x2;
pub const TAG_PRIMARY_IMMED1: u64 = 0x3;

pub const TAG_IMMED1_SIZE: u32 = 4;
pub const TAG_IMMED1_MASK: u64 = 0xF;
pub const TAG_IMMED1_PID: u64 = 0x3;
pub const TAG_IMMED1_PORT: u64 = 0x7;
pub const TAG_IMMED1_IMMED2: u64 = 0xB;
pub const TAG_IMMED1_SMALL: u64 = 0xF;

pub const TAG_IMMED2_SIZE: u32 = 6;
pub const TAG_IMMED2_MASK: u64 = 0x3F;
pub const TAG_IMMED2_ATOM: u64 = 0x0B;
pub const TAG_IMMED2_NIL: u64 = 0x3B;

/// The empty list
pub const NIL: Eterm = (!0u64 << TAG_IMMED2_SIZE) | TAG_IMMED2_NIL;

/// Marker word returned by a native function that raised an exception.
pub const THE_NON_VALUE: Eterm = 0;

/// Bits available to a small integer
pub const SMALL_BITS: u32 = 64 - TAG_IMMED1_SIZE;
pub const MAX_SMALL: i64 = (1i64 << (SMALL_BITS - 1)) - 1;
pub const MIN_SMALL: i64 = -(1i64 << (SMALL_BITS - 1));

#[inline]
pub fn primary_tag(term: Eterm) -> u64 {
    term & TAG_PRIMARY_MASK
}

#[inline]
pub fn is_immed(term: Eterm) -> bool {
    primary_tag(term) == TAG_PRIMARY_IMMED1
}

#[inline]
pub fn is_boxed(term: Eterm) -> bool {
    primary_tag(term) == TAG_PRIMARY_BOXED
}

/// True for a non-empty list cell
#[inline]
pub fn is_list_cell(term: Eterm) -> bool {
    primary_tag(term) == TAG_PRIMARY_LIST
}

#[inline]
pub fn is_nil(term: Eterm) -> bool {
    term == NIL
}

#[inline]
pub fn is_value(term: Eterm) -> bool {
    term != THE_NON_VALUE
}

/// Encode a small integer, or `None` if `value` needs a bignum.
#[inline]
pub fn make_small(value: i64) -> Option<Eterm> {
    if (MIN_SMALL..=MAX_SMALL).contains(&value) {
        Some(((value as u64) << TAG_IMMED1_SIZE) | TAG_IMMED1_SMALL)
    } else {
        None
    }
}

#[inline]
pub fn is_small(term: Eterm) -> bool {
    term & TAG_IMMED1_MASK == TAG_IMMED1_SMALL
}

/// Decode a small integer. The shift is arithmetic so the sign survives.
#[inline]
pub fn small_value(term: Eterm) -> i64 {
    (term as i64) >> TAG_IMMED1_SIZE
}

#[inline]
pub fn make_atom(index: usize) -> Eterm {
    ((index as u64) << TAG_IMMED2_SIZE) | TAG_IMMED2_ATOM
}

#[inline]
pub fn is_atom(term: Eterm) -> bool {
    term & TAG_IMMED2_MASK == TAG_IMMED2_ATOM
}

#[inline]
pub fn atom_index(term: Eterm) -> usize {
    (term >> TAG_IMMED2_SIZE) as usize
}

#[inline]
pub fn make_pid(number: u64) -> Eterm {
    (number << TAG_IMMED1_SIZE) | TAG_IMMED1_PID
}

#[inline]
pub fn is_pid(term: Eterm) -> bool {
    term & TAG_IMMED1_MASK == TAG_IMMED1_PID
}

#[inline]
pub fn pid_number(term: Eterm) -> u64 {
    term >> TAG_IMMED1_SIZE
}

#[inline]
pub fn make_port(number: u64) -> Eterm {
    (number << TAG_IMMED1_SIZE) | TAG_IMMED1_PORT
}

#[inline]
pub fn is_port(term: Eterm) -> bool {
    term & TAG_IMMED1_MASK == TAG_IMMED1_PORT
}

#[inline]
pub fn port_number(term: Eterm) -> u64 {
    term >> TAG_IMMED1_SIZE
}

/// Tag a heap address as a boxed term. `addr` must be 4-byte aligned.
#[inline]
pub fn make_boxed(addr: usize) -> Eterm {
    debug_assert_eq!(addr as u64 & TAG_PRIMARY_MASK, 0);
    addr as u64 | TAG_PRIMARY_BOXED
}

/// Tag a heap address as a list cell. `addr` must be 4-byte aligned.
#[inline]
pub fn make_list(addr: usize) -> Eterm {
    debug_assert_eq!(addr as u64 & TAG_PRIMARY_MASK, 0);
    addr as u64 | TAG_PRIMARY_LIST
}

/// Strip the primary tag from a pointer term.
#[inline]
pub fn ptr_val(term: Eterm) -> usize {
    (term & !TAG_PRIMARY_MASK) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_round_trip_at_the_edges() {
        for value in [0, 1, -1, 42, MAX_SMALL, MIN_SMALL] {
            let term = make_small(value).unwrap();
            assert!(is_small(term));
            assert!(is_immed(term));
            assert_eq!(small_value(term), value);
        }
        assert_eq!(make_small(MAX_SMALL + 1), None);
        assert_eq!(make_small(MIN_SMALL - 1), None);
    }

    #[test]
    fn test_immediate_classes_are_disjoint() {
        let atom = make_atom(7);
        let pid = make_pid(7);
        let port = make_port(7);
        let small = make_small(7).unwrap();
        assert!(is_atom(atom) && !is_pid(atom) && !is_small(atom) && !is_nil(atom));
        assert!(is_pid(pid) && !is_atom(pid) && !is_port(pid));
        assert!(is_port(port) && !is_pid(port) && !is_small(port));
        assert!(is_small(small) && !is_atom(small));
        assert!(is_nil(NIL) && !is_atom(NIL) && is_immed(NIL));
        assert_eq!(atom_index(atom), 7);
        assert_eq!(pid_number(pid), 7);
        assert_eq!(port_number(port), 7);
    }

    #[test]
    fn test_pointer_tags() {
        let addr = 0x1000usize;
        let boxed = make_boxed(addr);
        let cell = make_list(addr);
        assert!(is_boxed(boxed) && !is_list_cell(boxed));
        assert!(is_list_cell(cell) && !is_boxed(cell));
        assert_eq!(ptr_val(boxed), addr);
        assert_eq!(ptr_val(cell), addr);
        assert!(!is_value(THE_NON_VALUE));
    }
}
