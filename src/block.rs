//! Per-base ledgers shared by every tree node carved from one run.
//!
//! A [`Block`] records, for one identifier base, the widest interval ever
//! minted, the number of still-live elements, and whether the local
//! replica owns the base. Several tree nodes can reference one block
//! after splits, so blocks live in an arena and nodes hold `u32` handles
//! into it; a dictionary from base path to handle lets remote merges find
//! the ledger for an incoming interval.

use rustc_hash::FxHashMap;

use crate::identifier::Base;
use crate::interval::IdentifierInterval;

/// Ledger for one identifier base.
#[derive(Clone, Debug)]
pub struct Block {
    interval: IdentifierInterval,
    nb_elements: u32,
    mine: bool,
}

impl Block {
    /// Ledger for a locally minted run; every element starts live.
    pub fn mine(interval: IdentifierInterval) -> Block {
        let nb_elements = interval.len() as u32;
        return Block {
            interval,
            nb_elements,
            mine: true,
        };
    }

    /// Ledger for a remotely authored run. Starts empty; elements are
    /// counted in as the merge attaches them.
    pub fn foreign(interval: IdentifierInterval) -> Block {
        return Block {
            interval,
            nb_elements: 0,
            mine: false,
        };
    }

    /// The widest interval ever covered by this base.
    pub fn interval(&self) -> &IdentifierInterval {
        return &self.interval;
    }

    /// Count of still-live elements. Can be smaller than the interval
    /// length: deletion shrinks the count without narrowing the record.
    pub fn nb_elements(&self) -> u32 {
        return self.nb_elements;
    }

    /// Whether the local replica minted this base and may extend it in
    /// place. Immutable after construction.
    pub fn is_mine(&self) -> bool {
        return self.mine;
    }

    /// Account `begin ..= end` live elements in, widening the interval.
    pub fn grow(&mut self, begin: i32, end: i32) {
        debug_assert!(begin <= end);
        self.interval = self.interval.union(begin, end);
        self.nb_elements += (end as i64 - begin as i64 + 1) as u32;
    }

    /// Account `count` deleted elements out.
    pub fn shrink(&mut self, count: u32) {
        debug_assert!(count <= self.nb_elements);
        self.nb_elements = self.nb_elements.saturating_sub(count);
    }
}

/// Arena of blocks plus the base → block dictionary.
#[derive(Clone, Debug, Default)]
pub struct BlockStore {
    blocks: Vec<Block>,
    free: Vec<u32>,
    by_base: FxHashMap<Base, u32>,
}

impl BlockStore {
    pub fn new() -> BlockStore {
        return BlockStore::default();
    }

    pub fn get(&self, idx: u32) -> &Block {
        return &self.blocks[idx as usize];
    }

    pub fn get_mut(&mut self, idx: u32) -> &mut Block {
        return &mut self.blocks[idx as usize];
    }

    /// Number of registered bases.
    pub fn len(&self) -> usize {
        return self.by_base.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.by_base.is_empty();
    }

    /// Handle of the block owning `base`, if registered.
    pub fn find(&self, base: &Base) -> Option<u32> {
        return self.by_base.get(base).copied();
    }

    /// Register a new block. Its base must not be registered yet.
    pub fn insert(&mut self, block: Block) -> u32 {
        let base = block.interval().base();
        let idx = match self.free.pop() {
            Some(idx) => {
                self.blocks[idx as usize] = block;
                idx
            }
            None => {
                self.blocks.push(block);
                (self.blocks.len() - 1) as u32
            }
        };
        let previous = self.by_base.insert(base, idx);
        debug_assert!(previous.is_none(), "base registered twice");
        return idx;
    }

    /// Handle for an incoming interval's base: the existing block, or a
    /// fresh foreign ledger covering the interval.
    pub fn find_or_insert_foreign(&mut self, interval: &IdentifierInterval) -> u32 {
        if let Some(idx) = self.find(&interval.base()) {
            return idx;
        }
        return self.insert(Block::foreign(interval.clone()));
    }

    /// Drop an empty ledger from the dictionary and recycle its slot.
    pub fn remove(&mut self, idx: u32) {
        debug_assert_eq!(self.blocks[idx as usize].nb_elements(), 0);
        let base = self.blocks[idx as usize].interval().base();
        self.by_base.remove(&base);
        self.free.push(idx);
    }
}
