//! Order-5 B+ tree over the index file.
//!
//! - Leaves hold keys and are chained left to right through `next_leaf`
//! - Internal nodes hold separators, each a copy of the first key of the
//!   leaf it was split off
//! - Full nodes are split on the way down during insertion, so the tree
//!   never needs to walk back up
//!
//! There is no deletion; records are only ever appended or rewritten in
//! place.

mod cursor;
mod inspect;
mod invariants;
mod node;
mod traverse;
mod tree;

pub use cursor::LeafCursor;
pub use inspect::{Inspection, TreeSummary};
pub use invariants::InvariantViolation;
pub use node::{Key, MAX_CHILDREN, MAX_KEYS, MIN_KEYS, Node, NodeError, ORDER, SPLIT_POINT};
pub use traverse::TraversalEntry;
pub use tree::{BPlusTree, BTreeError};
