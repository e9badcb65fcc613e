//! The atomic ordered unit of an identifier.
//!
//! A tuple is `<random, replica, clock, offset>`, compared field by field
//! in that order. The `random` field spreads concurrent allocations apart,
//! `replica` and `clock` make the tuple globally unique, and `offset`
//! addresses one element within a run minted in a single operation.
//!
//! Two tuples that agree on everything but `offset` are said to share a
//! *base*: they belong to the same allocation lineage, and a contiguous
//! run of offsets over one base is what [`crate::interval`] compacts.

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;

/// One ordered unit of an identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    /// Randomly drawn component separating concurrent allocations.
    pub random: i32,
    /// The replica that minted this tuple.
    pub replica: i32,
    /// The replica's logical clock value at mint time.
    pub clock: i32,
    /// Offset of this element within its base.
    pub offset: i32,
}

/// Sentinel standing for the −∞ bound when allocating below everything.
pub const MIN_TUPLE: Tuple = Tuple {
    random: i32::MIN,
    replica: 0,
    clock: 0,
    offset: 0,
};

/// Sentinel standing for the +∞ bound when allocating above everything.
pub const MAX_TUPLE: Tuple = Tuple {
    random: i32::MAX,
    replica: 0,
    clock: 0,
    offset: 0,
};

impl Tuple {
    /// Create a new tuple.
    pub fn new(random: i32, replica: i32, clock: i32, offset: i32) -> Tuple {
        return Tuple {
            random,
            replica,
            clock,
            offset,
        };
    }

    /// Copy of this tuple rebased at a different offset.
    pub fn with_offset(&self, offset: i32) -> Tuple {
        return Tuple { offset, ..*self };
    }

    /// Whether both tuples belong to the same base, i.e. agree on
    /// everything but `offset`.
    pub fn equals_base(&self, other: &Tuple) -> bool {
        return self.random == other.random
            && self.replica == other.replica
            && self.clock == other.clock;
    }

    /// Order on the base fields only, ignoring `offset`.
    pub fn cmp_base(&self, other: &Tuple) -> Ordering {
        match self.random.cmp(&other.random) {
            Ordering::Equal => match self.replica.cmp(&other.replica) {
                Ordering::Equal => self.clock.cmp(&other.clock),
                order => order,
            },
            order => order,
        }
    }

    /// Fold this tuple into a 32-bit digest accumulator.
    pub fn digest(&self) -> i32 {
        let mut h: i32 = self.random;
        h = h.wrapping_mul(31).wrapping_add(self.replica);
        h = h.wrapping_mul(31).wrapping_add(self.clock);
        h = h.wrapping_mul(31).wrapping_add(self.offset);
        return h;
    }
}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare fields in declared order; first difference decides.
        match self.cmp_base(other) {
            Ordering::Equal => self.offset.cmp(&other.offset),
            order => order,
        }
    }
}

impl std::fmt::Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(
            f,
            "<{},{},{},{}>",
            self.random, self.replica, self.clock, self.offset
        );
    }
}
