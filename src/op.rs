//! Replicated edit descriptors.
//!
//! A local edit on one replica produces an [`InsertOp`] or [`DeleteOp`];
//! the descriptor is broadcast and applied on every other replica. Ops
//! address content by identifier, never by position, so they commute:
//! any two replicas that apply the same set of ops (each at least once,
//! in any order) converge to the same document.
//!
//! Applying an op yields position-addressed [`TextInsert`] / [`TextDelete`]
//! edits describing what changed in the realized text, for propagation
//! into whatever buffer mirrors the document.

use serde::Deserialize;
use serde::Serialize;

use crate::doc::Doc;
use crate::identifier::Identifier;
use crate::interval::IdentifierInterval;

/// One contiguous insertion, addressed by the identifier of its first
/// element. The interval it occupies is `id ..` widened by the content
/// length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertOp {
    id: Identifier,
    content: String,
}

impl InsertOp {
    pub fn new(id: Identifier, content: String) -> InsertOp {
        debug_assert!(!content.is_empty());
        return InsertOp { id, content };
    }

    /// Identifier of the first inserted element.
    pub fn id(&self) -> &Identifier {
        return &self.id;
    }

    pub fn content(&self) -> &str {
        return &self.content;
    }

    /// Replica that produced this insertion.
    pub fn author(&self) -> i32 {
        return self.id.replica();
    }

    /// Merge this insertion into `doc`. Idempotent: re-applying a
    /// delivered op is a no-op.
    pub fn apply(&self, doc: &mut Doc) -> Vec<TextInsert> {
        return doc.add_block(&self.id, &self.content);
    }
}

/// One deletion, addressed by the identifier intervals it removed. A
/// single local deletion can touch several tree nodes and so carry
/// several intervals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOp {
    intervals: Vec<IdentifierInterval>,
    author: i32,
}

impl DeleteOp {
    pub fn new(intervals: Vec<IdentifierInterval>, author: i32) -> DeleteOp {
        return DeleteOp { intervals, author };
    }

    pub fn intervals(&self) -> &[IdentifierInterval] {
        return &self.intervals;
    }

    pub fn author(&self) -> i32 {
        return self.author;
    }

    /// Merge this deletion into `doc`. Idempotent: identifiers already
    /// gone are skipped.
    pub fn apply(&self, doc: &mut Doc) -> Vec<TextDelete> {
        let mut edits = Vec::new();
        for interval in &self.intervals {
            edits.extend(doc.del_block(interval, self.author));
        }
        return edits;
    }
}

/// Either kind of replicated op, as carried by a transport layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteOp {
    Insert(InsertOp),
    Delete(DeleteOp),
}

impl RemoteOp {
    pub fn apply(&self, doc: &mut Doc) -> Vec<TextEdit> {
        match self {
            RemoteOp::Insert(op) => {
                return op.apply(doc).into_iter().map(TextEdit::Insert).collect();
            }
            RemoteOp::Delete(op) => {
                return op.apply(doc).into_iter().map(TextEdit::Delete).collect();
            }
        }
    }
}

/// A position-addressed insertion into the realized text, valid at the
/// moment it was produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInsert {
    /// Character position of the insertion.
    pub pos: usize,
    pub content: String,
    pub author: i32,
}

/// A position-addressed removal from the realized text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDelete {
    /// Character position of the first removed character.
    pub pos: usize,
    /// Number of removed characters.
    pub length: usize,
    pub author: i32,
}

/// A realized-text edit of either kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEdit {
    Insert(TextInsert),
    Delete(TextDelete),
}
