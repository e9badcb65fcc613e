//! The replicated document.
//!
//! A [`Doc`] owns the interval tree, the block ledger, and a realized
//! text cache that always equals the in-order concatenation of live
//! spans. Local edits are position-addressed and return an op for
//! broadcast; remote ops are identifier-addressed and merge through
//! [`compare_base`] dispatch, so the outcome is independent of delivery
//! order. Deletion is physical: removed spans leave no tombstones, and
//! a block whose live count reaches zero is dropped from the ledger.
//!
//! One `Doc` is single-threaded; replicas coordinate only through the
//! commutative, idempotent ops, never through shared state.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::warn;

use crate::alloc::between;
use crate::block::Block;
use crate::block::BlockStore;
use crate::identifier::Identifier;
use crate::interval::IdentifierInterval;
use crate::interval::IntervalRelation;
use crate::interval::compare_base;
use crate::op::DeleteOp;
use crate::op::InsertOp;
use crate::op::TextDelete;
use crate::op::TextInsert;
use crate::tree::NONE;
use crate::tree::Node;
use crate::tree::Tree;

/// One replica's copy of the shared sequence.
#[derive(Clone, Debug)]
pub struct Doc {
    pub(crate) replica: i32,
    /// Monotonic counter, bumped once per locally minted identifier.
    pub(crate) clock: i32,
    pub(crate) tree: Tree,
    pub(crate) blocks: BlockStore,
    pub(crate) text: String,
    rng: StdRng,
}

impl Doc {
    pub fn new(replica: i32) -> Doc {
        return Doc::with_rng(replica, StdRng::from_entropy());
    }

    /// Deterministic variant for tests and replayable setups.
    pub fn with_seed(replica: i32, seed: u64) -> Doc {
        return Doc::with_rng(replica, StdRng::seed_from_u64(seed));
    }

    fn with_rng(replica: i32, rng: StdRng) -> Doc {
        return Doc {
            replica,
            clock: 0,
            tree: Tree::new(),
            blocks: BlockStore::new(),
            text: String::new(),
            rng,
        };
    }

    /// Rebuild a document by replaying a list of insertions, as the
    /// renaming layer does after transforming identifiers.
    pub fn from_inserts(replica: i32, inserts: &[InsertOp]) -> Doc {
        let mut doc = Doc::new(replica);
        for op in inserts {
            op.apply(&mut doc);
        }
        return doc;
    }

    pub fn replica(&self) -> i32 {
        return self.replica;
    }

    pub fn clock(&self) -> i32 {
        return self.clock;
    }

    /// The realized text.
    pub fn str(&self) -> &str {
        return &self.text;
    }

    /// Live length in characters.
    pub fn len(&self) -> usize {
        return self.tree.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.tree.is_empty();
    }

    /// In-order enumeration of every live identifier interval. Whether
    /// one run of a base sits in one node or several adjacent ones
    /// depends on delivery order, so consecutive same-base intervals are
    /// reported as one: the enumeration only reflects the live
    /// identifiers.
    pub fn to_list(&self) -> Vec<IdentifierInterval> {
        let mut list: Vec<IdentifierInterval> = Vec::new();
        self.tree.visit_in_order(|n| {
            let iv = self.node_interval(n);
            if let Some(last) = list.last_mut() {
                if last.id_begin().equals_base(iv.id_begin())
                    && last.end() as i64 + 1 == iv.begin() as i64
                {
                    *last = last.union(iv.begin(), iv.end());
                    return;
                }
            }
            list.push(iv);
        });
        return list;
    }

    /// Order-sensitive fold of the canonical interval enumeration. Two
    /// replicas that have applied the same set of ops produce equal
    /// digests, however their trees are fragmented; it is a convergence
    /// check, not a content hash.
    pub fn digest(&self) -> i32 {
        let mut h: i32 = 0;
        for iv in self.to_list() {
            h = h.wrapping_mul(17).wrapping_add(iv.digest());
        }
        return h;
    }

    /// Insert `content` at character position `pos`, returning the op to
    /// broadcast. Extends a locally owned block in place when the edit
    /// sits at its edge and the identifier space has room; mints a fresh
    /// identifier otherwise.
    pub fn insert_local(&mut self, pos: usize, content: &str) -> InsertOp {
        let length = content.chars().count();
        assert!(length > 0, "empty insertion");
        assert!(pos <= self.len(), "insert position {pos} out of bounds");

        let id;
        if self.tree.is_empty() {
            id = self.mint(None, None);
            let block = self.mine_block(&id, length);
            self.tree.root = self
                .tree
                .alloc(Node::leaf(block, id.last_offset(), length as u32));
        } else if pos == 0 {
            id = self.insert_at_front(length);
        } else if pos == self.len() {
            id = self.insert_at_back(length);
        } else {
            id = self.insert_interior(pos, length);
        }
        self.splice_in(pos, content);
        return InsertOp::new(id, content.to_owned());
    }

    /// Delete characters `begin ..= end`, returning the op to broadcast.
    /// One identifier interval is recorded per physically distinct node
    /// touched.
    pub fn delete_local(&mut self, begin: usize, end: usize) -> DeleteOp {
        assert!(
            begin <= end && end < self.len(),
            "delete range {begin}..={end} out of bounds"
        );
        let mut intervals = Vec::new();
        let mut remaining = end - begin + 1;
        while remaining > 0 {
            let (path, local) = self.tree.search_pos(begin);
            let n = self.tree.node(*path.last().unwrap()).clone();
            let take = remaining.min((n.len - local) as usize) as u32;
            let cut_begin = n.offset + local as i32;
            let interval = self.blocks.get(n.block).interval();
            intervals.push(IdentifierInterval::new(
                interval.id_at(cut_begin),
                cut_begin + take as i32 - 1,
            ));
            self.delete_span(path, local, take);
            remaining -= take as usize;
        }
        self.splice_out(begin, end - begin + 1);
        return DeleteOp::new(intervals, self.replica);
    }

    /// Merge a remote insertion of `content` whose first element carries
    /// `id`. Returns the realized-text edits, in application order.
    /// Idempotent: an already-present interval is skipped.
    pub fn add_block(&mut self, id: &Identifier, content: &str) -> Vec<TextInsert> {
        let chars: Vec<char> = content.chars().collect();
        assert!(!chars.is_empty(), "empty insertion");
        let origin = id.last_offset() as i64;
        let end = origin + chars.len() as i64 - 1;
        debug_assert!(end <= i32::MAX as i64, "interval escapes i32");

        let mut edits = Vec::new();
        let mut work = vec![IdentifierInterval::new(id.clone(), end as i32)];
        while let Some(iv) = work.pop() {
            self.add_interval(iv, &chars, origin, &mut work, &mut edits);
        }
        return edits;
    }

    /// Merge a remote deletion of one identifier interval. Returns the
    /// realized-text edits. Idempotent: identifiers already gone simply
    /// produce nothing.
    pub fn del_block(&mut self, interval: &IdentifierInterval, author: i32) -> Vec<TextDelete> {
        let mut edits = Vec::new();
        let mut work = vec![interval.clone()];
        while let Some(iv) = work.pop() {
            self.del_interval(&iv, author, &mut work, &mut edits);
        }
        return edits;
    }

    /// Mint an identifier strictly between the bounds and advance the
    /// local clock.
    fn mint(&mut self, lo: Option<&Identifier>, hi: Option<&Identifier>) -> Identifier {
        let id = between(&mut self.rng, lo, hi, self.replica, self.clock);
        self.clock += 1;
        return id;
    }

    /// Fresh locally owned block covering `length` elements from `id`.
    fn mine_block(&mut self, id: &Identifier, length: usize) -> u32 {
        let end = id.last_offset() as i64 + length as i64 - 1;
        debug_assert!(end <= i32::MAX as i64);
        let interval = IdentifierInterval::new(id.clone(), end as i32);
        return self.blocks.insert(Block::mine(interval));
    }

    /// Ledger entry for a remotely authored interval, created foreign on
    /// first sight; either way its live count grows by the interval.
    fn foreign_block(&mut self, iv: &IdentifierInterval) -> u32 {
        let idx = self.blocks.find_or_insert_foreign(iv);
        self.blocks.get_mut(idx).grow(iv.begin(), iv.end());
        return idx;
    }

    /// The interval covered by one tree node's span.
    fn node_interval(&self, n: &Node) -> IdentifierInterval {
        let interval = self.blocks.get(n.block).interval();
        return IdentifierInterval::new(interval.id_at(n.offset), n.end_offset());
    }

    fn insert_at_front(&mut self, length: usize) -> Identifier {
        let mut path = self.tree.leftmost_path();
        let idx = *path.last().unwrap();
        let n = self.tree.node(idx).clone();
        let block = self.blocks.get(n.block);
        let first = block.interval().id_at(n.offset);

        // In-place extension needs ownership, the node at the block's
        // historical low edge (so freed offsets are never reissued), and
        // offset room above i32::MIN.
        if block.is_mine()
            && n.offset == block.interval().begin()
            && n.offset as i64 - length as i64 >= i32::MIN as i64
        {
            let new_offset = n.offset - length as i32;
            self.blocks.get_mut(n.block).grow(new_offset, n.offset - 1);
            let node = self.tree.node_mut(idx);
            node.offset = new_offset;
            node.len += length as u32;
            self.tree.rebalance(&path);
            return first.with_last_offset(new_offset);
        }

        let id = self.mint(None, Some(&first));
        let block = self.mine_block(&id, length);
        let leaf = self
            .tree
            .alloc(Node::leaf(block, id.last_offset(), length as u32));
        self.tree.node_mut(idx).left = leaf;
        path.push(leaf);
        self.tree.rebalance(&path);
        return id;
    }

    fn insert_at_back(&mut self, length: usize) -> Identifier {
        let mut path = self.tree.rightmost_path();
        let idx = *path.last().unwrap();
        let n = self.tree.node(idx).clone();
        let block = self.blocks.get(n.block);
        let last = block.interval().id_at(n.end_offset());

        if block.is_mine()
            && n.end_offset() == block.interval().end()
            && n.end_offset() as i64 + length as i64 <= i32::MAX as i64
        {
            let new_end = n.end_offset() + length as i32;
            self.blocks.get_mut(n.block).grow(n.end_offset() + 1, new_end);
            self.tree.node_mut(idx).len += length as u32;
            self.tree.rebalance(&path);
            return last.with_last_offset(n.end_offset() + 1);
        }

        let id = self.mint(Some(&last), None);
        let block = self.mine_block(&id, length);
        let leaf = self
            .tree
            .alloc(Node::leaf(block, id.last_offset(), length as u32));
        self.tree.node_mut(idx).right = leaf;
        path.push(leaf);
        self.tree.rebalance(&path);
        return id;
    }

    fn insert_interior(&mut self, pos: usize, length: usize) -> Identifier {
        let (mut path, local) = self.tree.search_pos(pos);
        let idx = *path.last().unwrap();

        if local > 0 {
            // Strict interior of one span: both neighbours share the
            // node's base with consecutive offsets, so there is never
            // room in place and a fresh identifier descends between.
            let n = self.tree.node(idx).clone();
            let interval = self.blocks.get(n.block).interval().clone();
            let before = interval.id_at(n.offset + local as i32 - 1);
            let after = interval.id_at(n.offset + local as i32);
            let id = self.mint(Some(&before), Some(&after));
            let block = self.mine_block(&id, length);
            let child = self
                .tree
                .alloc(Node::leaf(block, id.last_offset(), length as u32));
            let sibling = self.tree.split(idx, local, Some(child));
            path.push(sibling);
            self.tree.rebalance(&path);
            return id;
        }

        // Boundary between the node covering pos-1 and this node.
        let (mut prev_path, prev_local) = self.tree.search_pos(pos - 1);
        let prev_idx = *prev_path.last().unwrap();
        let p = self.tree.node(prev_idx).clone();
        debug_assert_eq!(prev_local, p.len - 1);
        let n = self.tree.node(idx).clone();
        let prev_last = self.blocks.get(p.block).interval().id_at(p.end_offset());
        let next_first = self.blocks.get(n.block).interval().id_at(n.offset);

        // Prefer extending the left neighbour, then the right one.
        let prev_block = self.blocks.get(p.block);
        if prev_block.is_mine()
            && p.end_offset() == prev_block.interval().end()
            && prev_last.has_place_after(&next_first, length)
        {
            let new_end = p.end_offset() + length as i32;
            self.blocks.get_mut(p.block).grow(p.end_offset() + 1, new_end);
            self.tree.node_mut(prev_idx).len += length as u32;
            self.tree.rebalance(&prev_path);
            return prev_last.with_last_offset(p.end_offset() + 1);
        }
        let next_block = self.blocks.get(n.block);
        if next_block.is_mine()
            && n.offset == next_block.interval().begin()
            && next_first.has_place_before(&prev_last, length)
        {
            let new_offset = n.offset - length as i32;
            self.blocks.get_mut(n.block).grow(new_offset, n.offset - 1);
            let node = self.tree.node_mut(idx);
            node.offset = new_offset;
            node.len += length as u32;
            self.tree.rebalance(&path);
            return next_first.with_last_offset(new_offset);
        }

        let id = self.mint(Some(&prev_last), Some(&next_first));
        let block = self.mine_block(&id, length);
        let leaf = self
            .tree
            .alloc(Node::leaf(block, id.last_offset(), length as u32));
        if n.left == NONE {
            self.tree.node_mut(idx).left = leaf;
            path.push(leaf);
            self.tree.rebalance(&path);
        } else {
            // The predecessor is the rightmost of the left subtree, so
            // its right slot is free.
            debug_assert_eq!(p.right, NONE);
            self.tree.node_mut(prev_idx).right = leaf;
            prev_path.push(leaf);
            self.tree.rebalance(&prev_path);
        }
        return id;
    }

    /// Place one same-base piece of a remote insertion, descending from
    /// the root. Pieces carved off along the way go back on `work` and
    /// restart from the root, since any structural change invalidates
    /// recorded positions.
    fn add_interval(
        &mut self,
        iv: IdentifierInterval,
        chars: &[char],
        origin: i64,
        work: &mut Vec<IdentifierInterval>,
        edits: &mut Vec<TextInsert>,
    ) {
        let author = iv.id_begin().replica();
        if self.tree.is_empty() {
            let block = self.foreign_block(&iv);
            self.tree.root = self
                .tree
                .alloc(Node::leaf(block, iv.begin(), iv.len() as u32));
            self.record_insert(0, &iv, chars, origin, author, edits);
            return;
        }

        let mut path: Vec<u32> = Vec::new();
        let mut idx = self.tree.root;
        // Document position of the current subtree's first element.
        let mut subtree_pos = 0usize;
        // Bounding identifiers inherited from ancestors we turned away
        // from; they cap in-place extension of an adjacent node.
        let mut pred_above: Option<Identifier> = None;
        let mut succ_above: Option<Identifier> = None;

        loop {
            path.push(idx);
            let n = self.tree.node(idx).clone();
            let node_iv = self.node_interval(&n);
            let node_pos = subtree_pos + self.tree.size(n.left);

            match compare_base(&iv, &node_iv) {
                IntervalRelation::Before => {
                    if n.left == NONE {
                        let block = self.foreign_block(&iv);
                        let leaf = self
                            .tree
                            .alloc(Node::leaf(block, iv.begin(), iv.len() as u32));
                        self.tree.node_mut(idx).left = leaf;
                        path.push(leaf);
                        self.tree.rebalance(&path);
                        self.record_insert(node_pos, &iv, chars, origin, author, edits);
                        return;
                    }
                    succ_above = Some(node_iv.id_begin().clone());
                    idx = n.left;
                }
                IntervalRelation::After => {
                    if n.right == NONE {
                        let block = self.foreign_block(&iv);
                        let leaf = self
                            .tree
                            .alloc(Node::leaf(block, iv.begin(), iv.len() as u32));
                        self.tree.node_mut(idx).right = leaf;
                        path.push(leaf);
                        self.tree.rebalance(&path);
                        let pos = node_pos + n.len as usize;
                        self.record_insert(pos, &iv, chars, origin, author, edits);
                        return;
                    }
                    pred_above = Some(node_iv.id_end());
                    subtree_pos = node_pos + n.len as usize;
                    idx = n.right;
                }
                IntervalRelation::Equal => return,
                IntervalRelation::Overlap => {
                    // Conflicting reuse of one base range: only a buggy
                    // or malicious peer produces this. Skip the op.
                    warn!(interval = %iv, node = %node_iv, "overlapping insert ignored");
                    return;
                }
                IntervalRelation::NestedIn { at } => {
                    // iv descends between two consecutive elements of
                    // this span: split after the element at `at` and
                    // hang the new leaf between the halves.
                    let local = (at - n.offset) as u32 + 1;
                    let block = self.foreign_block(&iv);
                    let child = self
                        .tree
                        .alloc(Node::leaf(block, iv.begin(), iv.len() as u32));
                    let sibling = self.tree.split(idx, local, Some(child));
                    path.push(sibling);
                    self.tree.rebalance(&path);
                    self.record_insert(node_pos + local as usize, &iv, chars, origin, author, edits);
                    return;
                }
                IntervalRelation::Surrounds { at } => {
                    // An existing span sits inside iv: place the two
                    // halves independently.
                    work.push(IdentifierInterval::new(iv.id_begin().clone(), at));
                    work.push(IdentifierInterval::new(
                        iv.id_begin().with_last_offset(at + 1),
                        iv.end(),
                    ));
                    return;
                }
                IntervalRelation::Prepends => {
                    // iv is a direct left extension of this span, but the
                    // in-order predecessor may own identifiers inside the
                    // gap; extend only down to the first legal offset.
                    let prev = match n.left {
                        NONE => pred_above.clone(),
                        left => {
                            let mut r = left;
                            while self.tree.node(r).right != NONE {
                                r = self.tree.node(r).right;
                            }
                            Some(self.node_interval(self.tree.node(r)).id_end())
                        }
                    };
                    let bound = match &prev {
                        Some(p) => iv.id_begin().min_offset_after_prev(p, iv.begin() as i64),
                        None => iv.begin() as i64,
                    };
                    if bound > iv.end() as i64 {
                        // Fully blocked; iv belongs left of the blocker.
                        // An inherited bound can never block a same-base
                        // extension, so the blocker lives in the left
                        // subtree.
                        debug_assert_ne!(n.left, NONE);
                        succ_above = Some(node_iv.id_begin().clone());
                        idx = n.left;
                        continue;
                    }
                    let ext = IdentifierInterval::new(
                        iv.id_begin().with_last_offset(bound as i32),
                        iv.end(),
                    );
                    self.blocks.get_mut(n.block).grow(ext.begin(), ext.end());
                    let node = self.tree.node_mut(idx);
                    node.offset = ext.begin();
                    node.len += ext.len() as u32;
                    self.tree.rebalance(&path);
                    self.record_insert(node_pos, &ext, chars, origin, author, edits);
                    if bound > iv.begin() as i64 {
                        work.push(IdentifierInterval::new(
                            iv.id_begin().clone(),
                            bound as i32 - 1,
                        ));
                    }
                    return;
                }
                IntervalRelation::Appends => {
                    // Mirror image: extension capped by the successor.
                    let next = match n.right {
                        NONE => succ_above.clone(),
                        right => {
                            let mut l = right;
                            while self.tree.node(l).left != NONE {
                                l = self.tree.node(l).left;
                            }
                            Some(self.node_interval(self.tree.node(l)).id_begin().clone())
                        }
                    };
                    let bound = match &next {
                        Some(s) => iv.id_begin().max_offset_before_next(s, iv.end() as i64),
                        None => iv.end() as i64,
                    };
                    if bound < iv.begin() as i64 {
                        // Mirror invariant: the blocking successor lives
                        // in the right subtree.
                        debug_assert_ne!(n.right, NONE);
                        pred_above = Some(node_iv.id_end());
                        subtree_pos = node_pos + n.len as usize;
                        idx = n.right;
                        continue;
                    }
                    let ext = IdentifierInterval::new(iv.id_begin().clone(), bound as i32);
                    self.blocks.get_mut(n.block).grow(ext.begin(), ext.end());
                    self.tree.node_mut(idx).len += ext.len() as u32;
                    self.tree.rebalance(&path);
                    let pos = node_pos + n.len as usize;
                    self.record_insert(pos, &ext, chars, origin, author, edits);
                    if bound < iv.end() as i64 {
                        work.push(IdentifierInterval::new(
                            iv.id_begin().with_last_offset(bound as i32 + 1),
                            iv.end(),
                        ));
                    }
                    return;
                }
            }
        }
    }

    /// Remove what survives of one same-base interval, descending by
    /// identifier. Portions falling outside the first intersected node
    /// go back on `work`.
    fn del_interval(
        &mut self,
        iv: &IdentifierInterval,
        author: i32,
        work: &mut Vec<IdentifierInterval>,
        edits: &mut Vec<TextDelete>,
    ) {
        let mut path: Vec<u32> = Vec::new();
        let mut idx = self.tree.root;
        let mut subtree_pos = 0usize;

        while idx != NONE {
            path.push(idx);
            let n = self.tree.node(idx).clone();
            let node_iv = self.node_interval(&n);
            let node_pos = subtree_pos + self.tree.size(n.left);

            match compare_base(iv, &node_iv) {
                IntervalRelation::Before | IntervalRelation::Prepends => {
                    idx = n.left;
                }
                IntervalRelation::After | IntervalRelation::Appends => {
                    subtree_pos = node_pos + n.len as usize;
                    idx = n.right;
                }
                IntervalRelation::NestedIn { .. } => {
                    // iv's base descends inside this contiguous span, so
                    // no node anywhere holds its identifiers.
                    return;
                }
                IntervalRelation::Surrounds { at } => {
                    // A deeper span splits iv's range in two; its own
                    // identifiers are not targets.
                    work.push(IdentifierInterval::new(iv.id_begin().clone(), at));
                    work.push(IdentifierInterval::new(
                        iv.id_begin().with_last_offset(at + 1),
                        iv.end(),
                    ));
                    return;
                }
                IntervalRelation::Equal | IntervalRelation::Overlap => {
                    // Delete the intersection here; whatever sticks out
                    // may survive in other nodes.
                    let cut_begin = iv.begin().max(n.offset);
                    let cut_end = iv.end().min(n.end_offset());
                    if iv.begin() < cut_begin {
                        work.push(IdentifierInterval::new(
                            iv.id_begin().clone(),
                            cut_begin - 1,
                        ));
                    }
                    if cut_end < iv.end() {
                        work.push(IdentifierInterval::new(
                            iv.id_begin().with_last_offset(cut_end + 1),
                            iv.end(),
                        ));
                    }
                    let local = (cut_begin - n.offset) as u32;
                    let count = (cut_end - cut_begin + 1) as u32;
                    let pos = node_pos + local as usize;
                    self.splice_out(pos, count as usize);
                    self.delete_span(path, local, count);
                    edits.push(TextDelete {
                        pos,
                        length: count as usize,
                        author,
                    });
                    return;
                }
            }
        }
        // Nothing found: the identifiers are already gone.
    }

    /// Remove `count` elements starting at `local` from the node ending
    /// `path`, shrinking its block and carving the node as needed.
    fn delete_span(&mut self, mut path: Vec<u32>, local: u32, count: u32) {
        let idx = *path.last().unwrap();
        let (block, len) = {
            let n = self.tree.node(idx);
            (n.block, n.len)
        };
        debug_assert!(count > 0 && local + count <= len);
        self.blocks.get_mut(block).shrink(count);

        if local == 0 && count == len {
            self.tree.remove(path);
            if self.blocks.get(block).nb_elements() == 0 {
                self.blocks.remove(block);
            }
            return;
        }
        if local == 0 {
            // Prefix gone.
            let n = self.tree.node_mut(idx);
            n.offset += count as i32;
            n.len -= count;
            self.tree.rebalance(&path);
            return;
        }
        if local + count == len {
            // Suffix gone.
            self.tree.node_mut(idx).len -= count;
            self.tree.rebalance(&path);
            return;
        }
        // Interior gone: keep the prefix here, carve the suffix into a
        // sibling over the same block.
        let sibling = self.tree.split(idx, local + count, None);
        self.tree.node_mut(idx).len = local;
        path.push(sibling);
        self.tree.rebalance(&path);
    }

    /// Splice one placed piece into the text cache and record the edit.
    fn record_insert(
        &mut self,
        pos: usize,
        iv: &IdentifierInterval,
        chars: &[char],
        origin: i64,
        author: i32,
        edits: &mut Vec<TextInsert>,
    ) {
        let start = (iv.begin() as i64 - origin) as usize;
        let content: String = chars[start..start + iv.len()].iter().collect();
        self.splice_in(pos, &content);
        edits.push(TextInsert {
            pos,
            content,
            author,
        });
    }

    fn byte_at(&self, char_pos: usize) -> usize {
        match self.text.char_indices().nth(char_pos) {
            Some((b, _)) => return b,
            None => return self.text.len(),
        }
    }

    fn splice_in(&mut self, pos: usize, content: &str) {
        let at = self.byte_at(pos);
        self.text.insert_str(at, content);
    }

    fn splice_out(&mut self, pos: usize, count: usize) {
        let begin = self.byte_at(pos);
        let end = self.byte_at(pos + count);
        self.text.replace_range(begin..end, "");
    }
}

#[cfg(test)]
impl Doc {
    /// Validate the whole document: tree structure, ledger counts, and
    /// the text cache against the tree.
    pub fn check(&self) {
        use rustc_hash::FxHashMap;

        self.tree.check(&self.blocks);
        assert_eq!(self.text.chars().count(), self.tree.len());

        let mut live: FxHashMap<u32, u32> = FxHashMap::default();
        self.tree.visit_in_order(|n| {
            *live.entry(n.block).or_insert(0) += n.len;
        });
        assert_eq!(live.len(), self.blocks.len(), "zombie block in ledger");
        for (&block, &count) in &live {
            assert_eq!(
                self.blocks.get(block).nb_elements(),
                count,
                "ledger count out of sync"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_typing_extends_in_place() {
        let mut doc = Doc::with_seed(1, 42);
        doc.insert_local(0, "hel");
        doc.insert_local(3, "lo ");
        doc.insert_local(6, "world");

        assert_eq!(doc.str(), "hello world");
        // Appends reuse the first mint's base, so only one identifier
        // was ever minted and the ledger holds a single block.
        assert_eq!(doc.clock(), 1);
        assert_eq!(doc.blocks.len(), 1);
        doc.check();
    }

    #[test]
    fn interior_insert_splits_the_span() {
        let mut doc = Doc::with_seed(1, 42);
        doc.insert_local(0, "helloworld");
        doc.insert_local(5, ", ");

        assert_eq!(doc.str(), "hello, world");
        assert_eq!(doc.clock(), 2);
        doc.check();
    }

    #[test]
    fn front_insert_prepends() {
        let mut doc = Doc::with_seed(1, 42);
        doc.insert_local(0, "world");
        doc.insert_local(0, "hello ");

        assert_eq!(doc.str(), "hello world");
        // Extending the owned block downward mints nothing new.
        assert_eq!(doc.clock(), 1);
        doc.check();
    }

    #[test]
    fn delete_whole_then_reuse() {
        let mut doc = Doc::with_seed(1, 42);
        doc.insert_local(0, "abc");
        doc.delete_local(0, 2);

        assert_eq!(doc.str(), "");
        assert!(doc.is_empty());
        assert_eq!(doc.blocks.len(), 0);

        doc.insert_local(0, "xyz");
        assert_eq!(doc.str(), "xyz");
        doc.check();
    }

    #[test]
    fn interior_delete_splits_and_shrinks_ledger() {
        let mut doc = Doc::with_seed(1, 42);
        doc.insert_local(0, "hello world");
        let before = doc.blocks.get(doc.tree.node(doc.tree.root).block).nb_elements();

        let op = doc.delete_local(2, 5);
        assert_eq!(doc.str(), "heworld");
        assert_eq!(op.intervals().len(), 1);

        let root = doc.tree.node(doc.tree.root).block;
        assert_eq!(doc.blocks.get(root).nb_elements(), before - 4);
        doc.check();
    }

    #[test]
    fn delete_across_several_nodes() {
        let mut doc = Doc::with_seed(1, 42);
        doc.insert_local(0, "aaabbb");
        doc.insert_local(3, "XYZ"); // splits, three nodes
        assert_eq!(doc.str(), "aaaXYZbbb");

        let op = doc.delete_local(1, 7);
        assert_eq!(doc.str(), "ab");
        assert!(op.intervals().len() >= 3);
        doc.check();
    }

    #[test]
    fn remote_insert_matches_local_order() {
        let mut a = Doc::with_seed(1, 7);
        let mut b = Doc::with_seed(2, 8);

        let op1 = a.insert_local(0, "hello");
        let op2 = a.insert_local(5, " world");

        // Deliver in reverse order.
        op2.apply(&mut b);
        op1.apply(&mut b);

        assert_eq!(b.str(), "hello world");
        assert_eq!(a.digest(), b.digest());
        a.check();
        b.check();
    }

    #[test]
    fn remote_apply_is_idempotent() {
        let mut a = Doc::with_seed(1, 7);
        let mut b = Doc::with_seed(2, 8);

        let ins = a.insert_local(0, "hello world");
        let del = a.delete_local(6, 10);

        ins.apply(&mut b);
        del.apply(&mut b);
        let digest = b.digest();

        let ins_again = ins.apply(&mut b);
        let del_again = del.apply(&mut b);
        assert!(ins_again.is_empty());
        assert!(del_again.is_empty());
        assert_eq!(b.digest(), digest);
        assert_eq!(b.str(), "hello ");
        b.check();
    }

    #[test]
    fn remote_delete_before_insert_of_other_content() {
        let mut a = Doc::with_seed(1, 7);
        let mut b = Doc::with_seed(2, 8);

        let ins1 = a.insert_local(0, "hello");
        let ins2 = a.insert_local(5, " world");
        let del = a.delete_local(0, 4); // removes "hello"

        // b sees the second insert and the delete before the first
        // insert ever arrives.
        ins2.apply(&mut b);
        del.apply(&mut b); // nothing to delete yet, must not corrupt
        ins1.apply(&mut b);

        // The delete was consumed before its target arrived, so b keeps
        // "hello": physical deletion cannot pre-tombstone. Replaying the
        // delete now converges.
        del.apply(&mut b);
        assert_eq!(b.str(), a.str());
        assert_eq!(a.digest(), b.digest());
        b.check();
    }

    #[test]
    fn digest_tracks_content_not_history() {
        let mut a = Doc::with_seed(1, 7);
        let mut b = Doc::with_seed(2, 8);

        let ops: Vec<InsertOp> = vec![
            a.insert_local(0, "abc"),
            a.insert_local(3, "def"),
            a.insert_local(2, "XY"),
        ];
        for op in ops.iter().rev() {
            op.apply(&mut b);
        }

        assert_eq!(a.str(), b.str());
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn digest_is_stable_across_node_fragmentation() {
        let mut whole = Doc::with_seed(1, 42);
        whole.insert_local(0, "abcdef");

        // Same live identifiers, physically carved into two nodes, as a
        // different delivery order would leave them.
        let mut carved = whole.clone();
        let sibling = carved.tree.split(carved.tree.root, 2, None);
        carved.tree.rebalance(&[carved.tree.root, sibling]);
        carved.check();

        assert_eq!(carved.str(), whole.str());
        assert_eq!(carved.to_list(), whole.to_list());
        assert_eq!(carved.to_list().len(), 1);
        assert_eq!(carved.digest(), whole.digest());
    }

    #[test]
    fn from_inserts_replays() {
        let mut a = Doc::with_seed(1, 7);
        let ops = vec![a.insert_local(0, "one "), a.insert_local(4, "two")];

        let b = Doc::from_inserts(9, &ops);
        assert_eq!(b.str(), "one two");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn multibyte_positions() {
        let mut doc = Doc::with_seed(1, 42);
        doc.insert_local(0, "héllo");
        doc.insert_local(2, "χ");

        assert_eq!(doc.str(), "héχllo");
        assert_eq!(doc.len(), 6);

        doc.delete_local(1, 2);
        assert_eq!(doc.str(), "hllo");
        doc.check();
    }

    #[test]
    fn to_list_is_ordered_and_covers_content() {
        let mut doc = Doc::with_seed(1, 42);
        doc.insert_local(0, "aaa");
        doc.insert_local(3, "bbb");
        doc.insert_local(2, "c");

        let list = doc.to_list();
        let total: usize = list.iter().map(IdentifierInterval::len).sum();
        assert_eq!(total, doc.len());
        for pair in list.windows(2) {
            assert!(pair[0].id_end() < *pair[1].id_begin());
        }
    }
}
