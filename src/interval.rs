//! Compact runs of identifiers sharing one base.
//!
//! An [`IdentifierInterval`] is the closed range of identifiers obtained
//! from one base by varying only the final tuple's offset, stored as the
//! first identifier plus the end offset. One local insertion mints one
//! interval; splits and deletions carve tree nodes out of it without ever
//! touching the identifiers themselves.
//!
//! [`compare_base`] classifies how two intervals relate positionally.
//! Its result is a closed enum — every branch of remote merge dispatches
//! on it, so the set of cases is fixed and exhaustively matched.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifier::Base;
use crate::identifier::Identifier;

/// Error rejecting an interval whose bounds are out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("interval begin {begin} exceeds end {end}")]
pub struct InvertedInterval {
    pub begin: i32,
    pub end: i32,
}

/// Untrusted mirror of [`IdentifierInterval`] used for serde decoding.
#[derive(Serialize, Deserialize)]
struct IntervalPlain {
    id_begin: Identifier,
    end: i32,
}

/// A closed run of identifiers sharing one base, differing only in the
/// final tuple's offset: `id_begin.last_offset() ..= end`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IntervalPlain", into = "IntervalPlain")]
pub struct IdentifierInterval {
    id_begin: Identifier,
    end: i32,
}

impl IdentifierInterval {
    /// Create an interval. Requires `id_begin.last_offset() <= end`.
    pub fn new(id_begin: Identifier, end: i32) -> IdentifierInterval {
        assert!(
            id_begin.last_offset() <= end,
            "interval begin {} exceeds end {}",
            id_begin.last_offset(),
            end
        );
        return IdentifierInterval { id_begin, end };
    }

    /// The identifier of the first element.
    pub fn id_begin(&self) -> &Identifier {
        return &self.id_begin;
    }

    /// The identifier of the last element.
    pub fn id_end(&self) -> Identifier {
        return self.id_begin.with_last_offset(self.end);
    }

    /// First covered offset.
    pub fn begin(&self) -> i32 {
        return self.id_begin.last_offset();
    }

    /// Last covered offset.
    pub fn end(&self) -> i32 {
        return self.end;
    }

    /// Number of identifiers in the run.
    pub fn len(&self) -> usize {
        return (self.end as i64 - self.begin() as i64 + 1) as usize;
    }

    /// The identifier at a given offset of this base.
    pub fn id_at(&self, offset: i32) -> Identifier {
        debug_assert!(self.begin() <= offset && offset <= self.end);
        return self.id_begin.with_last_offset(offset);
    }

    /// The flattened base path shared by every identifier in the run.
    pub fn base(&self) -> Base {
        return self.id_begin.base();
    }

    /// Widened copy covering `begin ..= end` in addition to the current
    /// range. Only the owning block ever widens its interval.
    pub fn union(&self, begin: i32, end: i32) -> IdentifierInterval {
        let new_begin = self.begin().min(begin);
        let new_end = self.end.max(end);
        return IdentifierInterval {
            id_begin: self.id_begin.with_last_offset(new_begin),
            end: new_end,
        };
    }

    /// Fold this interval into a 32-bit digest accumulator.
    pub fn digest(&self) -> i32 {
        return self
            .id_begin
            .digest()
            .wrapping_mul(31)
            .wrapping_add(self.end);
    }
}

impl std::fmt::Display for IdentifierInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}..={}", self.id_begin, self.end);
    }
}

impl TryFrom<IntervalPlain> for IdentifierInterval {
    type Error = InvertedInterval;

    fn try_from(plain: IntervalPlain) -> Result<IdentifierInterval, InvertedInterval> {
        if plain.id_begin.last_offset() > plain.end {
            return Err(InvertedInterval {
                begin: plain.id_begin.last_offset(),
                end: plain.end,
            });
        }
        return Ok(IdentifierInterval {
            id_begin: plain.id_begin,
            end: plain.end,
        });
    }
}

impl From<IdentifierInterval> for IntervalPlain {
    fn from(interval: IdentifierInterval) -> IntervalPlain {
        return IntervalPlain {
            id_begin: interval.id_begin,
            end: interval.end,
        };
    }
}

/// How the identifiers of interval `a` relate to those of interval `b`.
///
/// The nesting variants carry the offset of the shallower base below
/// which the deeper base descends, so callers can split at it directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalRelation {
    /// Every identifier of `a` sorts before every identifier of `b`,
    /// with no same-base adjacency.
    Before,
    /// Every identifier of `a` sorts after every identifier of `b`.
    After,
    /// `a`'s base descends between two consecutive elements of `b`:
    /// `a` sits strictly inside `b`'s run, after `b`'s offset `at`.
    NestedIn { at: i32 },
    /// `b`'s base descends between two consecutive elements of `a`,
    /// after `a`'s offset `at`.
    Surrounds { at: i32 },
    /// Same base, and `a` ends exactly where `b` begins
    /// (`a.end + 1 == b.begin`): `a` is a direct left extension of `b`.
    Prepends,
    /// Same base, and `b` ends exactly where `a` begins: `a` is a direct
    /// right extension of `b`.
    Appends,
    /// Same base and identical range.
    Equal,
    /// Same base with overlapping but non-identical ranges. Never occurs
    /// under correct allocation of fresh intervals; insertion treats it
    /// as an anomaly, deletion as an ordinary intersection.
    Overlap,
}

/// Classify how two intervals relate, walking their bases tuple by tuple
/// to the first divergence.
pub fn compare_base(a: &IdentifierInterval, b: &IdentifierInterval) -> IntervalRelation {
    let ta = a.id_begin().tuples();
    let tb = b.id_begin().tuples();
    let depth = ta.len().min(tb.len());

    // Tuples above the shorter base's final position are fixed in full,
    // offset included; the first difference decides the order outright.
    for i in 0..depth - 1 {
        match ta[i].cmp(&tb[i]) {
            std::cmp::Ordering::Less => return IntervalRelation::Before,
            std::cmp::Ordering::Greater => return IntervalRelation::After,
            std::cmp::Ordering::Equal => {}
        }
    }

    let x = &ta[depth - 1];
    let y = &tb[depth - 1];
    if !x.equals_base(y) {
        // Bases diverge at the shallowest final position; offsets cannot
        // matter because the base fields sort first.
        return match x.cmp_base(y) {
            std::cmp::Ordering::Less => IntervalRelation::Before,
            _ => IntervalRelation::After,
        };
    }

    if ta.len() == tb.len() {
        // Identical base all the way down: compare the numeric ranges.
        let (ab, ae) = (a.begin() as i64, a.end() as i64);
        let (bb, be) = (b.begin() as i64, b.end() as i64);
        if ab == bb && ae == be {
            return IntervalRelation::Equal;
        }
        if ae + 1 == bb {
            return IntervalRelation::Prepends;
        }
        if be + 1 == ab {
            return IntervalRelation::Appends;
        }
        if ae < bb {
            return IntervalRelation::Before;
        }
        if be < ab {
            return IntervalRelation::After;
        }
        return IntervalRelation::Overlap;
    }

    if ta.len() < tb.len() {
        // b descends below offset `at` of a's base. Elements of b sort
        // after exactly the elements of a at offsets <= at.
        let at = y.offset;
        if at < a.begin() {
            return IntervalRelation::After;
        }
        if at >= a.end() {
            return IntervalRelation::Before;
        }
        return IntervalRelation::Surrounds { at };
    }

    // a descends below offset `at` of b's base.
    let at = x.offset;
    if at < b.begin() {
        return IntervalRelation::Before;
    }
    if at >= b.end() {
        return IntervalRelation::After;
    }
    return IntervalRelation::NestedIn { at };
}

#[cfg(test)]
mod tests {
    use smallvec::SmallVec;

    use super::*;
    use crate::tuple::Tuple;

    fn id(tuples: &[(i32, i32, i32, i32)]) -> Identifier {
        let tuples: SmallVec<[Tuple; 1]> = tuples
            .iter()
            .map(|&(r, rep, c, o)| Tuple::new(r, rep, c, o))
            .collect();
        return Identifier::new(tuples);
    }

    fn ival(tuples: &[(i32, i32, i32, i32)], end: i32) -> IdentifierInterval {
        return IdentifierInterval::new(id(tuples), end);
    }

    #[test]
    fn derived_accessors() {
        let a = ival(&[(1, 0, 0, 3)], 7);

        assert_eq!(a.begin(), 3);
        assert_eq!(a.end(), 7);
        assert_eq!(a.len(), 5);
        assert_eq!(a.id_end().last_offset(), 7);
        assert_eq!(a.id_at(5).last_offset(), 5);
    }

    #[test]
    fn union_widens_both_edges() {
        let a = ival(&[(1, 0, 0, 3)], 7);

        let wider = a.union(0, 9);
        assert_eq!(wider.begin(), 0);
        assert_eq!(wider.end(), 9);

        let same = a.union(4, 6);
        assert_eq!(same.begin(), 3);
        assert_eq!(same.end(), 7);
    }

    #[test]
    fn relation_same_base_disjoint_and_adjacent() {
        let low = ival(&[(1, 0, 0, 0)], 4);
        let high = ival(&[(1, 0, 0, 5)], 9);
        let far = ival(&[(1, 0, 0, 20)], 30);

        assert_eq!(compare_base(&low, &high), IntervalRelation::Prepends);
        assert_eq!(compare_base(&high, &low), IntervalRelation::Appends);
        assert_eq!(compare_base(&low, &far), IntervalRelation::Before);
        assert_eq!(compare_base(&far, &low), IntervalRelation::After);
        assert_eq!(compare_base(&low, &low), IntervalRelation::Equal);
    }

    #[test]
    fn relation_same_base_overlap_is_anomalous() {
        let a = ival(&[(1, 0, 0, 0)], 6);
        let b = ival(&[(1, 0, 0, 4)], 9);

        assert_eq!(compare_base(&a, &b), IntervalRelation::Overlap);
        assert_eq!(compare_base(&b, &a), IntervalRelation::Overlap);
    }

    #[test]
    fn relation_divergent_random() {
        let a = ival(&[(1, 0, 0, 0)], 4);
        let b = ival(&[(5, 0, 0, -100)], -90);

        assert_eq!(compare_base(&a, &b), IntervalRelation::Before);
        assert_eq!(compare_base(&b, &a), IntervalRelation::After);
    }

    #[test]
    fn relation_divergence_above_final_position() {
        // Bases diverge at depth 0, which is above b's final position,
        // so the offset there participates in the order.
        let a = ival(&[(1, 0, 0, 2), (3, 1, 0, 0)], 5);
        let b = ival(&[(1, 0, 0, 6), (3, 1, 0, 0)], 5);

        assert_eq!(compare_base(&a, &b), IntervalRelation::Before);
        assert_eq!(compare_base(&b, &a), IntervalRelation::After);
    }

    #[test]
    fn relation_nested() {
        let outer = ival(&[(1, 0, 0, 0)], 9);
        // Descends below offset 4 of outer's base.
        let inner = ival(&[(1, 0, 0, 4), (8, 2, 0, 0)], 3);

        assert_eq!(
            compare_base(&inner, &outer),
            IntervalRelation::NestedIn { at: 4 }
        );
        assert_eq!(
            compare_base(&outer, &inner),
            IntervalRelation::Surrounds { at: 4 }
        );
    }

    #[test]
    fn relation_descent_outside_range_is_ordered() {
        let outer = ival(&[(1, 0, 0, 3)], 9);
        let below = ival(&[(1, 0, 0, 1), (8, 2, 0, 0)], 3);
        let at_end = ival(&[(1, 0, 0, 9), (8, 2, 0, 0)], 3);

        // Descending below offset 1 lands before outer's whole range.
        assert_eq!(compare_base(&below, &outer), IntervalRelation::Before);
        assert_eq!(compare_base(&outer, &below), IntervalRelation::After);
        // Descending below the last element lands after the whole range.
        assert_eq!(compare_base(&at_end, &outer), IntervalRelation::After);
        assert_eq!(compare_base(&outer, &at_end), IntervalRelation::Before);
    }

    #[test]
    fn relation_nested_at_first_element() {
        let outer = ival(&[(1, 0, 0, 3)], 9);
        let inner = ival(&[(1, 0, 0, 3), (8, 2, 0, 0)], 3);

        // Descending below the first element still splits the run.
        assert_eq!(
            compare_base(&inner, &outer),
            IntervalRelation::NestedIn { at: 3 }
        );
    }

    #[test]
    fn serde_rejects_inverted_bounds() {
        let json = r#"{"id_begin":[{"random":1,"replica":0,"clock":0,"offset":5}],"end":2}"#;
        assert!(serde_json::from_str::<IdentifierInterval>(json).is_err());

        let json = r#"{"id_begin":[{"random":1,"replica":0,"clock":0,"offset":2}],"end":5}"#;
        let ok: IdentifierInterval = serde_json::from_str(json).unwrap();
        assert_eq!(ok.len(), 4);
    }

    #[test]
    fn digest_distinguishes_ranges() {
        let a = ival(&[(1, 0, 0, 0)], 4);
        let b = ival(&[(1, 0, 0, 0)], 5);

        assert_eq!(a.digest(), a.digest());
        assert_ne!(a.digest(), b.digest());
    }
}
