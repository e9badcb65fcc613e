//! Logoot-Split - a replicated sequence CRDT for collaborative text.
//!
//! Every replica owns an independent [`Doc`]. Local edits are addressed
//! by character position and return an op; ops are addressed by
//! identifier and can be applied on any other replica any number of
//! times, in any order, with the same result. Deletion is physical:
//! no tombstones survive.
//!
//! # Quick Start
//!
//! ```
//! use logoot_split::Doc;
//!
//! // Two replicas, no coordinator.
//! let mut alice = Doc::new(1);
//! let mut bob = Doc::new(2);
//!
//! let hello = alice.insert_local(0, "Hello, World!");
//! let trim = alice.delete_local(5, 11);
//! assert_eq!(alice.str(), "Hello!");
//!
//! // Delivery order does not matter, and neither does duplication.
//! trim.apply(&mut bob);
//! hello.apply(&mut bob);
//! trim.apply(&mut bob);
//! assert_eq!(bob.str(), "Hello!");
//! assert_eq!(alice.digest(), bob.digest());
//! ```

pub mod alloc;
mod block;
pub mod doc;
pub mod encode;
pub mod identifier;
pub mod interval;
pub mod op;
mod tree;
pub mod tuple;

pub use alloc::between;
pub use doc::Doc;
pub use encode::BlockPlain;
pub use encode::DecodeError;
pub use encode::DocPlain;
pub use encode::NodePlain;
pub use identifier::Base;
pub use identifier::EmptyIdentifier;
pub use identifier::Identifier;
pub use interval::IdentifierInterval;
pub use interval::IntervalRelation;
pub use interval::InvertedInterval;
pub use interval::compare_base;
pub use op::DeleteOp;
pub use op::InsertOp;
pub use op::RemoteOp;
pub use op::TextDelete;
pub use op::TextEdit;
pub use op::TextInsert;
pub use tuple::MAX_TUPLE;
pub use tuple::MIN_TUPLE;
pub use tuple::Tuple;
