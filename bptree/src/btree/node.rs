//! B+ tree node type and record serialization.
//!
//! Leaves and internal nodes share one fixed-size record:
//! - keys: `MAX_KEYS` slots, unused slots hold the sentinel `-1`
//! - children: `MAX_CHILDREN` slots (internal nodes only)
//! - `next_leaf`: link to the next leaf in key order (leaves only)
//! - `num_keys`, `is_leaf`, and the node's own identity mirrored for validation
//! - a CRC32 over all of the above

#![allow(clippy::cast_possible_truncation)]

use crate::storage::{NodeId, RECORD_SIZE, Record, SENTINEL, record_offsets as offsets};

/// A key in the index. The index stores keys only, with no payload.
pub type Key = i64;

/// Maximum number of children of an internal node.
pub const ORDER: usize = 5;

/// Maximum number of keys in any node.
pub const MAX_KEYS: usize = ORDER - 1;

/// Maximum number of child slots in a record.
pub const MAX_CHILDREN: usize = ORDER;

/// Minimum number of keys in a non-root node after a deletion.
///
/// Keys are never removed, so this bound is not enforced.
pub const MIN_KEYS: usize = ORDER / 2;

/// Index at which a full node is split.
pub const SPLIT_POINT: usize = ORDER / 2;

const KEY_WIDTH: usize = 8;
const CHILD_WIDTH: usize = 8;

const _: () = assert!(offsets::KEYS + MAX_KEYS * KEY_WIDTH == offsets::CHILDREN);
const _: () = assert!(offsets::CHILDREN + MAX_CHILDREN * CHILD_WIDTH == offsets::NEXT_LEAF);
const _: () = assert!(offsets::CHECKSUM + 4 == RECORD_SIZE);
const _: () = assert!(SPLIT_POINT < MAX_KEYS);

/// A B+ tree node.
///
/// Internal nodes hold `keys.len() + 1` children: `children[i]` holds keys
/// `>= keys[i - 1]` and `<= keys[i]`. Leaves hold no children and link to the
/// next leaf to the right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Identity in the file, `None` until the node is first written.
    pub id: Option<NodeId>,
    /// Leaf or internal node.
    pub is_leaf: bool,
    /// Keys in non-decreasing order.
    pub keys: Vec<Key>,
    /// Child identities (internal nodes only).
    pub children: Vec<NodeId>,
    /// Next leaf in key order (leaves only).
    pub next_leaf: Option<NodeId>,
}

impl Node {
    /// Create a new empty leaf.
    #[must_use]
    pub fn new_leaf() -> Self {
        Self {
            id: None,
            is_leaf: true,
            keys: Vec::with_capacity(MAX_KEYS),
            children: Vec::new(),
            next_leaf: None,
        }
    }

    /// Create a new internal node whose only child is `first_child`.
    #[must_use]
    pub fn new_internal(first_child: NodeId) -> Self {
        let mut children = Vec::with_capacity(MAX_CHILDREN);
        children.push(first_child);
        Self {
            id: None,
            is_leaf: false,
            keys: Vec::with_capacity(MAX_KEYS),
            children,
            next_leaf: None,
        }
    }

    /// Whether the node holds the maximum number of keys.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn is_full(&self) -> bool {
        self.keys.len() >= MAX_KEYS
    }

    /// Index of the child whose subtree receives `key` on insertion.
    ///
    /// Keys equal to a separator go right, like the first key of a split leaf.
    #[must_use]
    pub fn child_index(&self, key: Key) -> usize {
        self.keys.partition_point(|&k| k <= key)
    }

    /// Index of the first key `>= key`, or `keys.len()` if there is none.
    #[must_use]
    pub fn search_index(&self, key: Key) -> usize {
        self.keys.partition_point(|&k| k < key)
    }

    /// Insert a key into a leaf after every key that is `<= key`.
    pub fn insert_key(&mut self, key: Key) {
        debug_assert!(self.is_leaf, "keys are only inserted into leaves");
        debug_assert!(!self.is_full(), "leaf must have room");
        let pos = self
            .keys
            .iter()
            .rposition(|&k| k <= key)
            .map_or(0, |i| i + 1);
        self.keys.insert(pos, key);
    }

    /// Insert `separator` at `idx` and `right_child` at `idx + 1`.
    pub fn insert_separator(&mut self, idx: usize, separator: Key, right_child: NodeId) {
        debug_assert!(!self.is_leaf, "separators go into internal nodes");
        debug_assert!(!self.is_full(), "parent must have room");
        self.keys.insert(idx, separator);
        self.children.insert(idx + 1, right_child);
    }

    /// Split a full node, returning the separator and the new right sibling.
    ///
    /// A leaf keeps `[..SPLIT_POINT]`; the sibling takes the rest and its first
    /// key is copied up as the separator. The sibling takes over `next_leaf`;
    /// the caller links this leaf to the sibling once the sibling has an
    /// identity.
    ///
    /// An internal node promotes its key at `SPLIT_POINT`, keeping neither copy.
    #[must_use]
    pub fn split(&mut self) -> (Key, Self) {
        debug_assert!(self.is_full(), "only full nodes are split");

        if self.is_leaf {
            let right_keys = self.keys.split_off(SPLIT_POINT);
            let separator = right_keys[0];
            let sibling = Self {
                id: None,
                is_leaf: true,
                keys: right_keys,
                children: Vec::new(),
                next_leaf: self.next_leaf,
            };
            (separator, sibling)
        } else {
            debug_assert_eq!(self.children.len(), self.keys.len() + 1);
            let right_keys = self.keys.split_off(SPLIT_POINT + 1);
            let right_children = self.children.split_off(SPLIT_POINT + 1);
            let separator = self.keys[SPLIT_POINT];
            self.keys.truncate(SPLIT_POINT);
            let sibling = Self {
                id: None,
                is_leaf: false,
                keys: right_keys,
                children: right_children,
                next_leaf: None,
            };
            (separator, sibling)
        }
    }

    /// Serialize the node into a record stored at `id`.
    #[must_use]
    pub fn to_record(&self, id: NodeId) -> Record {
        debug_assert!(self.keys.len() <= MAX_KEYS);
        debug_assert!(self.children.len() <= MAX_CHILDREN);

        let mut record = Record::new();

        for slot in 0..MAX_KEYS {
            let key = self.keys.get(slot).copied().unwrap_or(SENTINEL);
            record.write_i64(offsets::KEYS + slot * KEY_WIDTH, key);
        }

        for slot in 0..MAX_CHILDREN {
            let child = if self.is_leaf {
                None
            } else {
                self.children.get(slot).copied()
            };
            record.write_i64(offsets::CHILDREN + slot * CHILD_WIDTH, NodeId::to_raw(child));
        }

        let next_leaf = if self.is_leaf { self.next_leaf } else { None };
        record.write_i64(offsets::NEXT_LEAF, NodeId::to_raw(next_leaf));
        record.write_u32(offsets::NUM_KEYS, self.keys.len() as u32);
        record.write_u8(offsets::IS_LEAF, u8::from(self.is_leaf));
        record.write_i64(offsets::SELF_OFFSET, NodeId::to_raw(Some(id)));
        record.seal();

        record
    }

    /// Deserialize the node stored at `id`.
    pub fn from_record(id: NodeId, record: &Record) -> Result<Self, NodeError> {
        let expected = record.stored_checksum();
        let actual = record.compute_checksum();
        if expected != actual {
            return Err(NodeError::ChecksumMismatch { expected, actual });
        }

        let is_leaf = match record.read_u8(offsets::IS_LEAF) {
            0 => false,
            1 => true,
            flag => return Err(NodeError::InvalidLeafFlag(flag)),
        };

        let num_keys = record.read_u32(offsets::NUM_KEYS);
        let key_count = num_keys as usize;
        if key_count > MAX_KEYS {
            return Err(NodeError::InvalidKeyCount(num_keys));
        }

        let self_offset = record.read_i64(offsets::SELF_OFFSET);
        if NodeId::from_raw(self_offset) != Some(id) {
            return Err(NodeError::IdentityMismatch {
                expected: id,
                found: self_offset,
            });
        }

        let keys = (0..key_count)
            .map(|slot| record.read_i64(offsets::KEYS + slot * KEY_WIDTH))
            .collect();

        let children = if is_leaf {
            Vec::new()
        } else {
            (0..=key_count)
                .map(|slot| {
                    let raw = record.read_i64(offsets::CHILDREN + slot * CHILD_WIDTH);
                    NodeId::from_raw(raw).ok_or(NodeError::MissingChild { node: id, slot })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let next_leaf = if is_leaf {
            NodeId::from_raw(record.read_i64(offsets::NEXT_LEAF))
        } else {
            None
        };

        Ok(Self {
            id: Some(id),
            is_leaf,
            keys,
            children,
            next_leaf,
        })
    }
}

/// Errors that can occur when decoding a node record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Stored checksum does not match the record contents.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Leaf flag other than 0 or 1.
    InvalidLeafFlag(u8),
    /// Key count larger than `MAX_KEYS`.
    InvalidKeyCount(u32),
    /// Mirrored self-offset differs from the offset the record was read at.
    IdentityMismatch { expected: NodeId, found: i64 },
    /// Internal node with a sentinel in one of its `num_keys + 1` child slots.
    MissingChild { node: NodeId, slot: usize },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
            Self::InvalidLeafFlag(flag) => write!(f, "invalid leaf flag: {flag}"),
            Self::InvalidKeyCount(count) => {
                write!(f, "invalid key count: {count} (max {MAX_KEYS})")
            }
            Self::IdentityMismatch { expected, found } => {
                write!(f, "record at {expected} claims offset {found}")
            }
            Self::MissingChild { node, slot } => {
                write!(f, "internal node {node} has no child in slot {slot}")
            }
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> NodeId {
        NodeId::new(8 + n * 100)
    }

    #[test]
    fn test_leaf_record_roundtrip() {
        let mut node = Node::new_leaf();
        node.keys = vec![5, 6, 10];
        node.next_leaf = Some(id(3));

        let record = node.to_record(id(1));
        let restored = Node::from_record(id(1), &record).expect("should parse");

        assert_eq!(restored.id, Some(id(1)));
        assert!(restored.is_leaf);
        assert_eq!(restored.keys, vec![5, 6, 10]);
        assert!(restored.children.is_empty());
        assert_eq!(restored.next_leaf, Some(id(3)));
    }

    #[test]
    fn test_internal_record_roundtrip() {
        let mut node = Node::new_internal(id(0));
        node.keys = vec![10, 20];
        node.children = vec![id(0), id(1), id(2)];

        let record = node.to_record(id(4));
        let restored = Node::from_record(id(4), &record).expect("should parse");

        assert!(!restored.is_leaf);
        assert_eq!(restored.keys, vec![10, 20]);
        assert_eq!(restored.children, vec![id(0), id(1), id(2)]);
        assert_eq!(restored.next_leaf, None);
    }

    #[test]
    fn test_unused_slots_hold_sentinel() {
        let mut node = Node::new_leaf();
        node.keys = vec![7];

        let record = node.to_record(id(0));
        assert_eq!(record.read_i64(offsets::KEYS), 7);
        for slot in 1..MAX_KEYS {
            assert_eq!(record.read_i64(offsets::KEYS + slot * 8), SENTINEL);
        }
        for slot in 0..MAX_CHILDREN {
            assert_eq!(record.read_i64(offsets::CHILDREN + slot * 8), SENTINEL);
        }
        assert_eq!(record.read_i64(offsets::NEXT_LEAF), SENTINEL);
        assert_eq!(record.read_i64(offsets::SELF_OFFSET), 8);
    }

    #[test]
    fn test_negative_keys_survive_sentinel_encoding() {
        let mut node = Node::new_leaf();
        node.keys = vec![-1, 0, 3];

        let record = node.to_record(id(0));
        let restored = Node::from_record(id(0), &record).expect("should parse");
        assert_eq!(restored.keys, vec![-1, 0, 3]);
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut node = Node::new_leaf();
        node.keys = vec![1, 2];
        let mut record = node.to_record(id(0));
        record.as_bytes_mut()[0] ^= 0xFF;

        let result = Node::from_record(id(0), &record);
        assert!(matches!(result, Err(NodeError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_decode_rejects_wrong_identity() {
        let record = Node::new_leaf().to_record(id(0));

        let result = Node::from_record(id(1), &record);
        assert!(matches!(result, Err(NodeError::IdentityMismatch { found: 8, .. })));
    }

    #[test]
    fn test_decode_rejects_bad_key_count() {
        let mut record = Node::new_leaf().to_record(id(0));
        record.write_u32(offsets::NUM_KEYS, 9);
        record.seal();

        let result = Node::from_record(id(0), &record);
        assert_eq!(result, Err(NodeError::InvalidKeyCount(9)));
    }

    #[test]
    fn test_decode_rejects_missing_child() {
        let mut node = Node::new_internal(id(0));
        node.keys = vec![10];
        node.children = vec![id(0), id(1)];
        let mut record = node.to_record(id(2));
        record.write_i64(offsets::CHILDREN + 8, SENTINEL);
        record.seal();

        let result = Node::from_record(id(2), &record);
        assert_eq!(
            result,
            Err(NodeError::MissingChild {
                node: id(2),
                slot: 1
            })
        );
    }

    #[test]
    fn test_insert_key_keeps_order_and_duplicates() {
        let mut node = Node::new_leaf();
        for key in [10, 5, 10, 7] {
            node.insert_key(key);
        }
        assert_eq!(node.keys, vec![5, 7, 10, 10]);
        assert!(node.is_full());
    }

    #[test]
    fn test_child_and_search_index() {
        let mut node = Node::new_internal(id(0));
        node.keys = vec![10, 20, 30];
        node.children = vec![id(0), id(1), id(2), id(3)];

        // Insertion routes equal keys right.
        assert_eq!(node.child_index(5), 0);
        assert_eq!(node.child_index(10), 1);
        assert_eq!(node.child_index(15), 1);
        assert_eq!(node.child_index(35), 3);

        // Search stops at the first key >= target.
        assert_eq!(node.search_index(5), 0);
        assert_eq!(node.search_index(10), 0);
        assert_eq!(node.search_index(15), 1);
        assert_eq!(node.search_index(35), 3);
    }

    #[test]
    fn test_leaf_split() {
        let mut node = Node::new_leaf();
        node.keys = vec![5, 6, 10, 20];
        node.next_leaf = Some(id(9));

        let (separator, sibling) = node.split();

        assert_eq!(node.keys, vec![5, 6]);
        assert_eq!(sibling.keys, vec![10, 20]);
        assert_eq!(separator, 10);
        assert!(sibling.is_leaf);
        assert_eq!(sibling.id, None);
        assert_eq!(sibling.next_leaf, Some(id(9)));
    }

    #[test]
    fn test_internal_split_promotes_middle_key() {
        let mut node = Node::new_internal(id(0));
        node.keys = vec![10, 20, 30, 40];
        node.children = vec![id(0), id(1), id(2), id(3), id(4)];

        let (separator, sibling) = node.split();

        assert_eq!(separator, 30);
        assert_eq!(node.keys, vec![10, 20]);
        assert_eq!(node.children, vec![id(0), id(1), id(2)]);
        assert_eq!(sibling.keys, vec![40]);
        assert_eq!(sibling.children, vec![id(3), id(4)]);
        assert!(!sibling.is_leaf);
    }

    #[test]
    fn test_internal_split_promotes_negative_key() {
        let mut node = Node::new_internal(id(0));
        node.keys = vec![-40, -30, -20, -10];
        node.children = vec![id(0), id(1), id(2), id(3), id(4)];

        let (separator, sibling) = node.split();

        assert_eq!(separator, -20);
        assert_eq!(node.keys, vec![-40, -30]);
        assert_eq!(sibling.keys, vec![-10]);
    }

    #[test]
    fn test_insert_separator_shifts_right() {
        let mut node = Node::new_internal(id(0));
        node.keys = vec![10, 30];
        node.children = vec![id(0), id(1), id(2)];

        node.insert_separator(1, 20, id(5));

        assert_eq!(node.keys, vec![10, 20, 30]);
        assert_eq!(node.children, vec![id(0), id(1), id(5), id(2)]);
    }
}
