//! Plain persisted form of a document.
//!
//! [`DocPlain`] mirrors the structure a peer or a disk snapshot carries:
//! `{replica, clock, root, text}` with the tree encoded recursively and
//! each node repeating its block's ledger record. Decoding validates
//! every structural invariant and returns a [`DecodeError`] instead of
//! ever constructing an inconsistent [`Doc`]; malformed identifiers and
//! inverted intervals are already rejected underneath by their own serde
//! boundaries.
//!
//! Heights and subtree sizes are not persisted (they are recomputed),
//! and neither is block ownership: every reloaded block is foreign, so
//! edits after a reload mint fresh identifiers rather than extending
//! runs the snapshot author owned.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::block::Block;
use crate::doc::Doc;
use crate::identifier::Base;
use crate::identifier::Identifier;
use crate::interval::IdentifierInterval;
use crate::tree::NONE;
use crate::tree::Node;

/// Why a plain payload could not become a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("zero-length node")]
    ZeroLengthNode,
    #[error("node span {begin}..={end} escapes its block interval {interval}")]
    SpanEscapesBlock {
        begin: i32,
        end: i64,
        interval: String,
    },
    #[error("conflicting ledger records for base of {interval}")]
    InconsistentBlock { interval: String },
    #[error("ledger records {recorded} live elements for {interval}, tree holds {actual}")]
    BadElementCount {
        interval: String,
        recorded: u32,
        actual: u32,
    },
    #[error("identifiers out of order at {at}")]
    OutOfOrder { at: String },
    #[error("text length {text} does not match tree length {tree}")]
    TextMismatch { text: usize, tree: usize },
}

/// Ledger record repeated on every node carved from one base.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPlain {
    pub interval: IdentifierInterval,
    pub nb_elements: u32,
}

/// One persisted tree node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePlain {
    pub block: BlockPlain,
    pub offset: i32,
    pub length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Box<NodePlain>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Box<NodePlain>>,
}

/// The persisted form of a whole document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocPlain {
    pub replica: i32,
    pub clock: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Box<NodePlain>>,
    pub text: String,
}

impl Doc {
    /// The plain persisted form of this document.
    pub fn to_plain(&self) -> DocPlain {
        return DocPlain {
            replica: self.replica,
            clock: self.clock,
            root: self.node_plain(self.tree.root),
            text: self.text.clone(),
        };
    }

    fn node_plain(&self, idx: u32) -> Option<Box<NodePlain>> {
        if idx == NONE {
            return None;
        }
        let n = self.tree.node(idx);
        let b = self.blocks.get(n.block);
        return Some(Box::new(NodePlain {
            block: BlockPlain {
                interval: b.interval().clone(),
                nb_elements: b.nb_elements(),
            },
            offset: n.offset,
            length: n.len,
            left: self.node_plain(n.left),
            right: self.node_plain(n.right),
        }));
    }

    /// Rebuild a document from its plain form, validating every
    /// structural invariant along the way.
    pub fn from_plain(plain: &DocPlain) -> Result<Doc, DecodeError> {
        let mut doc = Doc::new(plain.replica);
        doc.clock = plain.clock;
        doc.text = plain.text.clone();

        let mut decoder = Decoder {
            doc: &mut doc,
            ledger: FxHashMap::default(),
            last_id: None,
        };
        if let Some(root) = &plain.root {
            let (idx, _, _) = decoder.build(root)?;
            decoder.verify_ledger()?;
            decoder.doc.tree.root = idx;
        }

        let text = doc.text.chars().count();
        let tree = doc.tree.len();
        if text != tree {
            return Err(DecodeError::TextMismatch { text, tree });
        }
        return Ok(doc);
    }
}

struct Decoder<'a> {
    doc: &'a mut Doc,
    /// Recorded ledger per base: block handle, recorded count and
    /// interval for cross-checking duplicate records.
    ledger: FxHashMap<Base, (u32, u32, IdentifierInterval)>,
    /// Highest identifier seen so far by the in-order walk.
    last_id: Option<Identifier>,
}

impl Decoder<'_> {
    /// Rebuild one subtree, returning (index, height, size). The walk is
    /// in-order so identifier ordering can be checked on the fly.
    fn build(&mut self, plain: &NodePlain) -> Result<(u32, u32, usize), DecodeError> {
        let (left, left_height, left_size) = match &plain.left {
            Some(child) => self.build(child)?,
            None => (NONE, 0, 0),
        };

        if plain.length == 0 {
            return Err(DecodeError::ZeroLengthNode);
        }
        let interval = &plain.block.interval;
        let span_end = plain.offset as i64 + plain.length as i64 - 1;
        if plain.offset < interval.begin() || span_end > interval.end() as i64 {
            return Err(DecodeError::SpanEscapesBlock {
                begin: plain.offset,
                end: span_end,
                interval: interval.to_string(),
            });
        }

        let block = self.register_block(&plain.block)?;
        self.doc
            .blocks
            .get_mut(block)
            .grow(plain.offset, span_end as i32);

        let id_begin = interval.id_at(plain.offset);
        if let Some(last) = self.last_id.take() {
            if last >= id_begin {
                return Err(DecodeError::OutOfOrder {
                    at: id_begin.to_string(),
                });
            }
        }
        self.last_id = Some(interval.id_at(span_end as i32));

        let (right, right_height, right_size) = match &plain.right {
            Some(child) => self.build(child)?,
            None => (NONE, 0, 0),
        };

        let height = 1 + left_height.max(right_height);
        let size = plain.length as usize + left_size + right_size;
        let idx = self.doc.tree.alloc(Node {
            block,
            offset: plain.offset,
            len: plain.length,
            left,
            right,
            height,
            size,
        });
        return Ok((idx, height, size));
    }

    /// Resolve the ledger entry for one recorded block, rejecting
    /// conflicting duplicate records. Live counts accumulate separately
    /// and are checked at the end.
    fn register_block(&mut self, plain: &BlockPlain) -> Result<u32, DecodeError> {
        let base = plain.interval.base();
        if let Some((idx, recorded, interval)) = self.ledger.get(&base) {
            if *recorded != plain.nb_elements || *interval != plain.interval {
                return Err(DecodeError::InconsistentBlock {
                    interval: plain.interval.to_string(),
                });
            }
            return Ok(*idx);
        }
        // Foreign and empty; each node's span is counted in as it is
        // rebuilt.
        let idx = self.doc.blocks.insert(Block::foreign(plain.interval.clone()));
        self.ledger
            .insert(base, (idx, plain.nb_elements, plain.interval.clone()));
        return Ok(idx);
    }

    /// Recorded live counts must match what the tree actually holds.
    fn verify_ledger(&self) -> Result<(), DecodeError> {
        for (idx, recorded, interval) in self.ledger.values() {
            let actual = self.doc.blocks.get(*idx).nb_elements();
            if actual != *recorded {
                return Err(DecodeError::BadElementCount {
                    interval: interval.to_string(),
                    recorded: *recorded,
                    actual,
                });
            }
        }
        return Ok(());
    }
}
