//! Identifiers: totally ordered positions in the shared sequence.
//!
//! An identifier is a non-empty list of [`Tuple`]s. Order is lexicographic
//! over the tuples, and an identifier that is a strict prefix of a longer
//! one sorts *before* it. This gives an unbounded-density total order: a
//! fresh identifier can always be minted strictly between any two existing
//! ones (see [`crate::alloc`]) without renumbering anything.
//!
//! The *base* of an identifier is everything except the final tuple's
//! offset. All identifiers minted by one allocation share a base and
//! differ only in that offset, which is what lets
//! [`crate::interval::IdentifierInterval`] store a whole run compactly.

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;

use crate::tuple::Tuple;

/// Error rejecting an identifier with no tuples at the decode boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identifier must contain at least one tuple")]
pub struct EmptyIdentifier;

/// A flattened base path, usable as a dictionary key.
///
/// Contains every field of every tuple except the final tuple's offset,
/// so two identifiers map to the same `Base` exactly when `equals_base`
/// holds between them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Base(SmallVec<[i32; 8]>);

/// A totally ordered position in the sequence.
///
/// Most identifiers are a single tuple deep; depth grows only when an
/// allocation has to descend between two adjacent random values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tuple>", into = "Vec<Tuple>")]
pub struct Identifier {
    tuples: SmallVec<[Tuple; 1]>,
}

impl Identifier {
    /// Create an identifier from its tuples. Must be non-empty.
    pub fn new(tuples: SmallVec<[Tuple; 1]>) -> Identifier {
        assert!(!tuples.is_empty(), "identifier must be non-empty");
        return Identifier { tuples };
    }

    /// Create a depth-one identifier from a single tuple.
    pub fn from_tuple(tuple: Tuple) -> Identifier {
        let mut tuples = SmallVec::new();
        tuples.push(tuple);
        return Identifier { tuples };
    }

    /// The tuples, outermost first.
    pub fn tuples(&self) -> &[Tuple] {
        return &self.tuples;
    }

    /// Depth of this identifier.
    pub fn len(&self) -> usize {
        return self.tuples.len();
    }

    /// The final tuple.
    pub fn last(&self) -> &Tuple {
        return self.tuples.last().unwrap();
    }

    /// Offset field of the final tuple.
    pub fn last_offset(&self) -> i32 {
        return self.last().offset;
    }

    /// Authoring replica, read from the final tuple.
    pub fn replica(&self) -> i32 {
        return self.last().replica;
    }

    /// Authoring logical clock, read from the final tuple.
    pub fn clock(&self) -> i32 {
        return self.last().clock;
    }

    /// Copy of this identifier rebased at a different final offset.
    pub fn with_last_offset(&self, offset: i32) -> Identifier {
        let mut tuples = self.tuples.clone();
        let last = tuples.last_mut().unwrap();
        *last = last.with_offset(offset);
        return Identifier { tuples };
    }

    /// Whether both identifiers share a base: equal depth, all tuples but
    /// the last pairwise equal, and the last tuples equal up to offset.
    pub fn equals_base(&self, other: &Identifier) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let n = self.len() - 1;
        return self.tuples[..n] == other.tuples[..n]
            && self.last().equals_base(other.last());
    }

    /// The flattened base path of this identifier.
    pub fn base(&self) -> Base {
        let mut path = SmallVec::new();
        for (i, t) in self.tuples.iter().enumerate() {
            path.push(t.random);
            path.push(t.replica);
            path.push(t.clock);
            if i + 1 < self.tuples.len() {
                path.push(t.offset);
            }
        }
        return Base(path);
    }

    /// Number of leading tuples equal in both identifiers.
    pub fn longest_common_prefix(&self, other: &Identifier) -> usize {
        let mut i = 0;
        while i < self.len() && i < other.len() && self.tuples[i] == other.tuples[i] {
            i += 1;
        }
        return i;
    }

    /// Length of the longest common base: the common prefix, extended by
    /// one more tuple if the first divergent tuples still share a base.
    pub fn longest_common_base(&self, other: &Identifier) -> usize {
        let i = self.longest_common_prefix(other);
        if i < self.len() && i < other.len() && self.tuples[i].equals_base(&other.tuples[i]) {
            return i + 1;
        }
        return i;
    }

    /// Whether `other` descends below this identifier's base: its path
    /// runs through some offset of this base and continues deeper.
    fn base_prefix_of(&self, other: &Identifier) -> bool {
        if other.len() <= self.len() {
            return false;
        }
        let n = self.len() - 1;
        return self.tuples[..n] == other.tuples[..n]
            && self.last().equals_base(&other.tuples[n]);
    }

    /// Largest offset `o <= max` such that rebasing this identifier at
    /// `o` still sorts strictly before `next`. Callers pass `max` in i64
    /// so an out-of-range answer surfaces instead of wrapping.
    ///
    /// Requires `self < next`.
    pub fn max_offset_before_next(&self, next: &Identifier, max: i64) -> i64 {
        if self.equals_base(next) {
            // Same base: stay strictly below the neighbour's offset.
            return max.min(next.last_offset() as i64 - 1);
        }
        if self.base_prefix_of(next) {
            // The neighbour descends below some offset of this base; that
            // offset itself is still fine (a strict prefix sorts before).
            return max.min(next.tuples[self.len() - 1].offset as i64);
        }
        // Order is already decided above the final offset.
        return max;
    }

    /// Smallest offset `o >= min` such that rebasing this identifier at
    /// `o` still sorts strictly after `prev`.
    ///
    /// Requires `prev < self`.
    pub fn min_offset_after_prev(&self, prev: &Identifier, min: i64) -> i64 {
        if self.equals_base(prev) {
            return min.max(prev.last_offset() as i64 + 1);
        }
        if self.base_prefix_of(prev) {
            // Rebasing exactly at the descend offset would sort before
            // `prev` (strict prefix), so the first legal offset is one up.
            return min.max(prev.tuples[self.len() - 1].offset as i64 + 1);
        }
        return min;
    }

    /// Whether `length` more identifiers sharing this base fit directly
    /// after this one without colliding with `next` or overflowing i32.
    pub fn has_place_after(&self, next: &Identifier, length: usize) -> bool {
        debug_assert!(length > 0);
        let wanted = self.last_offset() as i64 + length as i64;
        if wanted > i32::MAX as i64 {
            return false;
        }
        return self.max_offset_before_next(next, wanted) == wanted;
    }

    /// Whether `length` more identifiers sharing this base fit directly
    /// before this one without colliding with `prev` or underflowing i32.
    pub fn has_place_before(&self, prev: &Identifier, length: usize) -> bool {
        debug_assert!(length > 0);
        let wanted = self.last_offset() as i64 - length as i64;
        if wanted < i32::MIN as i64 {
            return false;
        }
        return self.min_offset_after_prev(prev, wanted) == wanted;
    }

    /// Fold this identifier into a 32-bit digest accumulator.
    pub fn digest(&self) -> i32 {
        let mut h: i32 = 0;
        for t in &self.tuples {
            h = h.wrapping_mul(31).wrapping_add(t.digest());
        }
        return h;
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lexicographic over tuples; running out while the prefix matches
        // makes the shorter identifier strictly less.
        for (a, b) in self.tuples.iter().zip(other.tuples.iter()) {
            match a.cmp(b) {
                Ordering::Equal => {}
                order => return order,
            }
        }
        return self.len().cmp(&other.len());
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, t) in self.tuples.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", t)?;
        }
        return Ok(());
    }
}

impl TryFrom<Vec<Tuple>> for Identifier {
    type Error = EmptyIdentifier;

    fn try_from(tuples: Vec<Tuple>) -> Result<Identifier, EmptyIdentifier> {
        if tuples.is_empty() {
            return Err(EmptyIdentifier);
        }
        return Ok(Identifier {
            tuples: SmallVec::from_vec(tuples),
        });
    }
}

impl From<Identifier> for Vec<Tuple> {
    fn from(id: Identifier) -> Vec<Tuple> {
        return id.tuples.into_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tuples: &[(i32, i32, i32, i32)]) -> Identifier {
        let tuples = tuples
            .iter()
            .map(|&(r, rep, c, o)| Tuple::new(r, rep, c, o))
            .collect();
        return Identifier::new(tuples);
    }

    #[test]
    fn lexicographic_order() {
        let a = id(&[(1, 0, 0, 0)]);
        let b = id(&[(1, 0, 0, 1)]);
        let c = id(&[(2, 0, 0, -5)]);

        assert!(a < b);
        assert!(b < c);
        assert!(a < c); // transitivity
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn strict_prefix_sorts_before() {
        let short = id(&[(1, 0, 0, 4)]);
        let long = id(&[(1, 0, 0, 4), (7, 1, 0, 0)]);

        assert!(short < long);
        assert!(long > short);
    }

    #[test]
    fn base_equality() {
        let a = id(&[(1, 0, 0, 4), (7, 1, 2, 0)]);
        let b = id(&[(1, 0, 0, 4), (7, 1, 2, 9)]);
        let c = id(&[(1, 0, 0, 5), (7, 1, 2, 0)]);
        let d = id(&[(7, 1, 2, 0)]);

        assert!(a.equals_base(&b));
        assert!(!a.equals_base(&c)); // earlier tuple differs
        assert!(!a.equals_base(&d)); // different depth
        assert_eq!(a.base(), b.base());
        assert_ne!(a.base(), c.base());
    }

    #[test]
    fn rebase_at_offset() {
        let a = id(&[(1, 0, 0, 4), (7, 1, 2, 3)]);
        let b = a.with_last_offset(10);

        assert!(a.equals_base(&b));
        assert_eq!(b.last_offset(), 10);
        assert!(a < b);
    }

    #[test]
    fn common_prefix_and_base() {
        let a = id(&[(1, 0, 0, 4), (7, 1, 2, 3)]);
        let b = id(&[(1, 0, 0, 4), (7, 1, 2, 9)]);
        let c = id(&[(1, 0, 0, 4), (8, 1, 2, 9)]);

        assert_eq!(a.longest_common_prefix(&b), 1);
        assert_eq!(a.longest_common_base(&b), 2); // divergent tuples share a base
        assert_eq!(a.longest_common_prefix(&c), 1);
        assert_eq!(a.longest_common_base(&c), 1);
    }

    #[test]
    fn place_after_same_base() {
        let a = id(&[(1, 0, 0, 4)]);
        let next = id(&[(1, 0, 0, 10)]);

        assert!(a.has_place_after(&next, 5)); // offsets 5..=9 fit
        assert!(!a.has_place_after(&next, 6)); // offset 10 collides
    }

    #[test]
    fn place_after_deeper_neighbour() {
        let a = id(&[(1, 0, 0, 4)]);
        // Neighbour descends below offset 6 of a's base.
        let next = id(&[(1, 0, 0, 6), (3, 2, 0, 0)]);

        // Offsets 5 and 6 both sort before next (6 is a strict prefix).
        assert!(a.has_place_after(&next, 2));
        assert!(!a.has_place_after(&next, 3));
    }

    #[test]
    fn place_after_unrelated_neighbour() {
        let a = id(&[(1, 0, 0, 4)]);
        let next = id(&[(2, 0, 0, i32::MIN)]);

        assert!(a.has_place_after(&next, 1000));
    }

    #[test]
    fn place_after_detects_overflow() {
        let a = id(&[(1, 0, 0, i32::MAX - 2)]);
        let next = id(&[(2, 0, 0, 0)]);

        assert!(a.has_place_after(&next, 2));
        assert!(!a.has_place_after(&next, 3)); // would pass i32::MAX
    }

    #[test]
    fn place_before_same_base() {
        let a = id(&[(1, 0, 0, 10)]);
        let prev = id(&[(1, 0, 0, 4)]);

        assert!(a.has_place_before(&prev, 5)); // offsets 5..=9 fit
        assert!(!a.has_place_before(&prev, 6)); // offset 4 collides
    }

    #[test]
    fn place_before_deeper_neighbour() {
        let a = id(&[(1, 0, 0, 10)]);
        // Previous neighbour descends below offset 6 of a's base; rebasing
        // at 6 would be a strict prefix of it and sort before it.
        let prev = id(&[(1, 0, 0, 6), (3, 2, 0, 0)]);

        assert!(a.has_place_before(&prev, 3)); // offsets 7..=9
        assert!(!a.has_place_before(&prev, 4)); // offset 6 is not after prev
    }

    #[test]
    fn place_before_detects_underflow() {
        let a = id(&[(1, 0, 0, i32::MIN + 2)]);
        let prev = id(&[(0, 0, 0, 0)]);

        assert!(a.has_place_before(&prev, 2));
        assert!(!a.has_place_before(&prev, 3)); // would pass i32::MIN
    }

    #[test]
    fn serde_rejects_empty() {
        let err = serde_json::from_str::<Identifier>("[]");
        assert!(err.is_err());

        let ok: Identifier = serde_json::from_str(
            r#"[{"random":1,"replica":2,"clock":3,"offset":4}]"#,
        )
        .unwrap();
        assert_eq!(ok.last_offset(), 4);
    }
}
