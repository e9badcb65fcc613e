//! The AVL-balanced interval tree mapping identifiers to live content.
//!
//! Nodes live in a `Vec` arena and reference each other through `u32`
//! indices (`NONE` = absent), with a free list for recycled slots. There
//! are no parent pointers: every mutating traversal records its ancestor
//! path explicitly and rebalancing pops that path bottom-up, recomputing
//! heights and subtree sizes and rotating where the AVL balance breaks.
//!
//! A node owns one contiguous span `[offset, offset + len)` of one
//! block's base; several nodes reference the same block after splits.
//! In-order traversal yields identifiers in strictly increasing order,
//! and subtree sizes make position lookup O(log n).

/// Sentinel index meaning "no node".
pub(crate) const NONE: u32 = u32::MAX;

/// One contiguous physical span of a block.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    /// Handle into the block arena.
    pub block: u32,
    /// First base offset covered by this node.
    pub offset: i32,
    /// Number of covered elements, always > 0 while in the tree.
    pub len: u32,
    pub left: u32,
    pub right: u32,
    /// Height of this subtree; a leaf has height 1.
    pub height: u32,
    /// Total element count of this subtree.
    pub size: usize,
}

impl Node {
    pub fn leaf(block: u32, offset: i32, len: u32) -> Node {
        debug_assert!(len > 0);
        return Node {
            block,
            offset,
            len,
            left: NONE,
            right: NONE,
            height: 1,
            size: len as usize,
        };
    }

    /// Last base offset covered by this node.
    pub fn end_offset(&self) -> i32 {
        return (self.offset as i64 + self.len as i64 - 1) as i32;
    }
}

/// Arena-backed AVL tree of content spans.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
    free: Vec<u32>,
    pub root: u32,
}

impl Tree {
    pub fn new() -> Tree {
        return Tree {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NONE,
        };
    }

    #[inline]
    pub fn node(&self, idx: u32) -> &Node {
        return &self.nodes[idx as usize];
    }

    #[inline]
    pub fn node_mut(&mut self, idx: u32) -> &mut Node {
        return &mut self.nodes[idx as usize];
    }

    /// Total live element count.
    pub fn len(&self) -> usize {
        return self.size(self.root);
    }

    pub fn is_empty(&self) -> bool {
        return self.root == NONE;
    }

    #[inline]
    pub fn size(&self, idx: u32) -> usize {
        if idx == NONE {
            return 0;
        }
        return self.nodes[idx as usize].size;
    }

    #[inline]
    fn height(&self, idx: u32) -> u32 {
        if idx == NONE {
            return 0;
        }
        return self.nodes[idx as usize].height;
    }

    /// Store a node, reusing a freed slot when available.
    pub fn alloc(&mut self, node: Node) -> u32 {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = node;
                return idx;
            }
            None => {
                self.nodes.push(node);
                return (self.nodes.len() - 1) as u32;
            }
        }
    }

    /// Detach a node's slot for reuse.
    pub fn free_node(&mut self, idx: u32) {
        self.free.push(idx);
    }

    /// Recompute one node's height and size from its children.
    fn update(&mut self, idx: u32) {
        let n = self.node(idx);
        let (l, r) = (n.left, n.right);
        let height = 1 + self.height(l).max(self.height(r));
        let size = self.node(idx).len as usize + self.size(l) + self.size(r);
        let n = self.node_mut(idx);
        n.height = height;
        n.size = size;
    }

    /// AVL balance: positive when the right side is taller.
    fn balance_score(&self, idx: u32) -> i32 {
        let n = self.node(idx);
        return self.height(n.right) as i32 - self.height(n.left) as i32;
    }

    /// Rotate left around `idx`, returning the new subtree root. Only
    /// the two affected nodes are recomputed.
    fn rotate_left(&mut self, idx: u32) -> u32 {
        let r = self.node(idx).right;
        debug_assert_ne!(r, NONE, "rotate_left without right child");
        self.node_mut(idx).right = self.node(r).left;
        self.node_mut(r).left = idx;
        self.update(idx);
        self.update(r);
        return r;
    }

    /// Rotate right around `idx`, returning the new subtree root.
    fn rotate_right(&mut self, idx: u32) -> u32 {
        let l = self.node(idx).left;
        debug_assert_ne!(l, NONE, "rotate_right without left child");
        self.node_mut(idx).left = self.node(l).right;
        self.node_mut(l).right = idx;
        self.update(idx);
        self.update(l);
        return l;
    }

    /// Restore the AVL property at one subtree root, rotating as many
    /// times as needed (splits can hang an arbitrarily tall old subtree
    /// under a fresh sibling). Returns the new subtree root.
    fn settle(&mut self, mut idx: u32) -> u32 {
        self.update(idx);
        loop {
            let score = self.balance_score(idx);
            if score > 1 {
                let right = self.node(idx).right;
                if self.balance_score(right) < 0 {
                    let new_right = self.rotate_right(right);
                    self.node_mut(idx).right = new_right;
                }
                idx = self.rotate_left(idx);
            } else if score < -1 {
                let left = self.node(idx).left;
                if self.balance_score(left) > 0 {
                    let new_left = self.rotate_left(left);
                    self.node_mut(idx).left = new_left;
                }
                idx = self.rotate_right(idx);
            } else {
                return idx;
            }
        }
    }

    /// Rebalance a recorded root-to-change ancestor path, bottom-up.
    /// `path[i]` must be the parent of `path[i + 1]`.
    pub fn rebalance(&mut self, path: &[u32]) {
        for i in (0..path.len()).rev() {
            let idx = path[i];
            let settled = self.settle(idx);
            if settled == idx {
                continue;
            }
            if i == 0 {
                self.root = settled;
            } else {
                let parent = self.node_mut(path[i - 1]);
                if parent.left == idx {
                    parent.left = settled;
                } else {
                    debug_assert_eq!(parent.right, idx);
                    parent.right = settled;
                }
            }
        }
    }

    /// Path from the root to the leftmost node.
    pub fn leftmost_path(&self) -> Vec<u32> {
        let mut path = Vec::new();
        let mut idx = self.root;
        while idx != NONE {
            path.push(idx);
            idx = self.node(idx).left;
        }
        return path;
    }

    /// Path from the root to the rightmost node.
    pub fn rightmost_path(&self) -> Vec<u32> {
        let mut path = Vec::new();
        let mut idx = self.root;
        while idx != NONE {
            path.push(idx);
            idx = self.node(idx).right;
        }
        return path;
    }

    /// Locate the node covering element position `pos`. Returns the
    /// ancestor path (ending at the covering node) and the local index
    /// of `pos` within that node's span.
    pub fn search_pos(&self, mut pos: usize) -> (Vec<u32>, u32) {
        debug_assert!(pos < self.len());
        let mut path = Vec::new();
        let mut idx = self.root;
        loop {
            path.push(idx);
            let n = self.node(idx);
            let left_size = self.size(n.left);
            if pos < left_size {
                idx = n.left;
            } else if pos < left_size + n.len as usize {
                let local = (pos - left_size) as u32;
                return (path, local);
            } else {
                pos -= left_size + n.len as usize;
                idx = n.right;
            }
        }
    }

    /// Truncate `idx` to its first `at` elements and move the rest to a
    /// fresh right sibling over the same block. The old right subtree is
    /// re-parented under the sibling; `child`, when given, hangs under
    /// the sibling's left (the caller minted it to sit between the two
    /// halves). Returns the sibling's index; the caller must rebalance
    /// `[.., idx, sibling]`.
    pub fn split(&mut self, idx: u32, at: u32, child: Option<u32>) -> u32 {
        let n = self.node(idx);
        debug_assert!(0 < at && at < n.len);
        let mut sibling = Node::leaf(n.block, n.offset + at as i32, n.len - at);
        sibling.left = child.unwrap_or(NONE);
        sibling.right = n.right;
        let sibling_idx = self.alloc(sibling);
        self.update(sibling_idx);
        let n = self.node_mut(idx);
        n.len = at;
        n.right = sibling_idx;
        return sibling_idx;
    }

    /// Physically remove the node at the end of `path`, splicing its
    /// in-order successor into its place when both children exist, then
    /// rebalance. The slot is recycled.
    pub fn remove(&mut self, mut path: Vec<u32>) {
        let target = path.pop().expect("empty removal path");
        let (t_left, t_right) = {
            let t = self.node(target);
            (t.left, t.right)
        };

        let replacement;
        if t_left == NONE || t_right == NONE {
            replacement = if t_left == NONE { t_right } else { t_left };
        } else {
            // Splice the successor (leftmost of the right subtree) out of
            // its spot and into the target's.
            let mut chain = Vec::new();
            let mut succ = t_right;
            while self.node(succ).left != NONE {
                chain.push(succ);
                succ = self.node(succ).left;
            }
            if let Some(&succ_parent) = chain.last() {
                let succ_right = self.node(succ).right;
                self.node_mut(succ_parent).left = succ_right;
                self.node_mut(succ).right = t_right;
            }
            self.node_mut(succ).left = t_left;
            replacement = succ;
            path.push(succ);
            path.extend(chain);
        }

        let attach_under = path.iter().position(|&p| {
            self.node(p).left == target || self.node(p).right == target
        });
        match attach_under {
            Some(i) => {
                let parent = self.node_mut(path[i]);
                if parent.left == target {
                    parent.left = replacement;
                } else {
                    parent.right = replacement;
                }
            }
            None => self.root = replacement,
        }

        self.free_node(target);
        self.rebalance(&path);
    }

    /// Visit every node in identifier order.
    pub fn visit_in_order(&self, mut visit: impl FnMut(&Node)) {
        let mut stack = Vec::new();
        let mut cur = self.root;
        while cur != NONE || !stack.is_empty() {
            while cur != NONE {
                stack.push(cur);
                cur = self.node(cur).left;
            }
            let idx = stack.pop().unwrap();
            visit(self.node(idx));
            cur = self.node(idx).right;
        }
    }
}

#[cfg(test)]
impl Tree {
    /// Validate every structural invariant; test builds only.
    pub fn check(&self, blocks: &crate::block::BlockStore) {
        use crate::identifier::Identifier;

        fn walk(
            tree: &Tree,
            blocks: &crate::block::BlockStore,
            idx: u32,
            last: &mut Option<Identifier>,
        ) -> (u32, usize) {
            if idx == NONE {
                return (0, 0);
            }
            let n = tree.node(idx);
            assert!(n.len > 0, "zero-length node in tree");
            let interval = blocks.get(n.block).interval();
            assert!(interval.begin() <= n.offset && n.end_offset() <= interval.end());

            let (lh, ls) = walk(tree, blocks, n.left, last);

            let id_begin = interval.id_at(n.offset);
            if let Some(prev) = last.take() {
                assert!(prev < id_begin, "identifiers out of order");
            }
            *last = Some(interval.id_at(n.end_offset()));

            let (rh, rs) = walk(tree, blocks, n.right, last);

            assert_eq!(n.height, 1 + lh.max(rh), "bad height");
            assert_eq!(n.size, n.len as usize + ls + rs, "bad size");
            assert!(
                (rh as i32 - lh as i32).abs() <= 1,
                "AVL balance broken: {} vs {}",
                lh,
                rh
            );
            return (n.height, n.size);
        }

        let mut last = None;
        walk(self, blocks, self.root, &mut last);
    }
}
