//! Minting fresh identifiers between two existing ones.
//!
//! The allocator walks both bounding identifiers in lock step, padding a
//! side with its ±∞ sentinel tuple once it runs out. At each depth it
//! looks at the gap between the two `random` fields: a gap wide enough to
//! hold a fresh value ends the walk with one new tuple; otherwise the low
//! tuple is copied into the common prefix and both sides advance one
//! level deeper. Random fields are bounded, so the walk terminates, and
//! identifiers only grow as deep as needed to find room.

use rand::Rng;

use crate::identifier::Identifier;
use crate::tuple::MAX_TUPLE;
use crate::tuple::MIN_TUPLE;
use crate::tuple::Tuple;

/// Mint an identifier strictly between `lo` and `hi`.
///
/// `None` bounds mean −∞ / +∞. The caller's `replica` and `clock` end up
/// in the final tuple, so the result's author is the caller
/// (`result.replica() == replica`).
pub fn between(
    rng: &mut impl Rng,
    lo: Option<&Identifier>,
    hi: Option<&Identifier>,
    replica: i32,
    clock: i32,
) -> Identifier {
    debug_assert!(match (lo, hi) {
        (Some(l), Some(h)) => l < h,
        _ => true,
    });

    let lo_tuples: &[Tuple] = lo.map(Identifier::tuples).unwrap_or(&[]);
    let hi_tuples: &[Tuple] = hi.map(Identifier::tuples).unwrap_or(&[]);

    let mut prefix: Vec<Tuple> = Vec::new();
    let mut depth = 0;
    loop {
        let low = *lo_tuples.get(depth).unwrap_or(&MIN_TUPLE);
        let high = *hi_tuples.get(depth).unwrap_or(&MAX_TUPLE);

        let gap = high.random as i64 - low.random as i64;
        if gap > 2 {
            // Room at this depth: pick strictly inside (low, high).
            let pick = rng.gen_range(low.random as i64 + 1..high.random as i64) as i32;
            prefix.push(Tuple::new(pick, replica, clock, 0));
            return Identifier::new(prefix.into_iter().collect());
        }

        // Too tight; keep the low side's tuple and descend.
        prefix.push(low);
        depth += 1;
    }
}
