//! Structural invariant checking.
//!
//! Walks the whole tree and the leaf chain, collecting every violation
//! instead of stopping at the first one:
//! - keys within a node are non-decreasing
//! - an internal node with `k` keys has `k + 1` children
//! - every key lies within the bounds set by the separators above it
//! - all leaves sit at the same depth
//! - the leaf chain visits exactly the leaves of the pre-order walk, in the
//!   same order, and ends at none

use std::collections::HashSet;

use crate::btree::node::{Key, MAX_KEYS, Node};
use crate::btree::tree::{BPlusTree, BTreeError};
use crate::storage::{NodeId, Storage};

/// A broken structural invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Keys of a node are not in non-decreasing order.
    KeysOutOfOrder { node: NodeId, keys: Vec<Key> },
    /// A node holds more than `MAX_KEYS` keys.
    Overfull { node: NodeId, num_keys: usize },
    /// An internal node's child count is not its key count plus one.
    FanOut {
        node: NodeId,
        num_keys: usize,
        children: usize,
    },
    /// A key lies outside the range its ancestors' separators allow.
    SeparatorBounds {
        node: NodeId,
        key: Key,
        lower: Option<Key>,
        upper: Option<Key>,
    },
    /// A leaf at a different depth than the first leaf.
    UnevenLeafDepth {
        node: NodeId,
        depth: usize,
        expected: usize,
    },
    /// The leaf chain diverges from the left-to-right order of leaves.
    LeafChain {
        position: usize,
        expected: Option<NodeId>,
        found: Option<NodeId>,
    },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeysOutOfOrder { node, keys } => {
                write!(f, "node {node}: keys out of order: {keys:?}")
            }
            Self::Overfull { node, num_keys } => {
                write!(f, "node {node}: {num_keys} keys (max {MAX_KEYS})")
            }
            Self::FanOut {
                node,
                num_keys,
                children,
            } => write!(f, "node {node}: {num_keys} keys but {children} children"),
            Self::SeparatorBounds {
                node,
                key,
                lower,
                upper,
            } => write!(
                f,
                "node {node}: key {key} outside bounds [{lower:?}, {upper:?}]"
            ),
            Self::UnevenLeafDepth {
                node,
                depth,
                expected,
            } => write!(f, "leaf {node} at depth {depth}, expected {expected}"),
            Self::LeafChain {
                position,
                expected,
                found,
            } => write!(
                f,
                "leaf chain position {position}: expected {expected:?}, found {found:?}"
            ),
        }
    }
}

impl std::error::Error for InvariantViolation {}

/// Key range a subtree must respect.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    lower: Option<Key>,
    upper: Option<Key>,
}

impl Bounds {
    const UNBOUNDED: Self = Self {
        lower: None,
        upper: None,
    };

    fn contains(self, key: Key) -> bool {
        self.lower.is_none_or(|lower| lower <= key) && self.upper.is_none_or(|upper| key <= upper)
    }

    /// Bounds of child `i` of `node`.
    fn for_child(self, node: &Node, i: usize) -> Self {
        Self {
            lower: if i == 0 {
                self.lower
            } else {
                node.keys.get(i - 1).copied()
            },
            upper: node.keys.get(i).copied().or(self.upper),
        }
    }
}

impl<S: Storage> BPlusTree<S> {
    /// Check every structural invariant, returning all violations found.
    ///
    /// An empty result means the tree is well formed. Storage and decoding
    /// failures, including child links to records that were never written,
    /// are returned as errors.
    pub fn check_invariants(&mut self) -> Result<Vec<InvariantViolation>, BTreeError> {
        let mut violations = Vec::new();
        let mut leaves = Vec::new();
        let mut leaf_depth = None;
        let mut seen = HashSet::new();
        let mut stack = vec![(self.root_id(), 0usize, Bounds::UNBOUNDED)];

        while let Some((id, depth, bounds)) = stack.pop() {
            if !seen.insert(id) {
                return Err(BTreeError::Cycle(id));
            }
            let node = self.read_node(id)?;

            check_node(&node, id, bounds, &mut violations);

            if node.is_leaf {
                let expected = *leaf_depth.get_or_insert(depth);
                if depth != expected {
                    violations.push(InvariantViolation::UnevenLeafDepth {
                        node: id,
                        depth,
                        expected,
                    });
                }
                leaves.push(id);
            } else {
                for (i, &child) in node.children.iter().enumerate().rev() {
                    stack.push((child, depth + 1, bounds.for_child(&node, i)));
                }
            }
        }

        self.check_leaf_chain(&leaves, &mut violations)?;
        Ok(violations)
    }

    /// Follow `next_leaf` from the leftmost leaf and compare against `leaves`.
    fn check_leaf_chain(
        &mut self,
        leaves: &[NodeId],
        violations: &mut Vec<InvariantViolation>,
    ) -> Result<(), BTreeError> {
        let mut current = leaves.first().copied();

        // One step past the last leaf, where the chain must end.
        for position in 0..=leaves.len() {
            let expected = leaves.get(position).copied();
            if current != expected {
                violations.push(InvariantViolation::LeafChain {
                    position,
                    expected,
                    found: current,
                });
                return Ok(());
            }

            let Some(id) = current else {
                return Ok(());
            };
            current = self.read_node(id)?.next_leaf;
        }

        Ok(())
    }
}

fn check_node(node: &Node, id: NodeId, bounds: Bounds, violations: &mut Vec<InvariantViolation>) {
    if node.keys.windows(2).any(|pair| pair[0] > pair[1]) {
        violations.push(InvariantViolation::KeysOutOfOrder {
            node: id,
            keys: node.keys.clone(),
        });
    }

    if node.keys.len() > MAX_KEYS {
        violations.push(InvariantViolation::Overfull {
            node: id,
            num_keys: node.keys.len(),
        });
    }

    if !node.is_leaf && node.children.len() != node.keys.len() + 1 {
        violations.push(InvariantViolation::FanOut {
            node: id,
            num_keys: node.keys.len(),
            children: node.children.len(),
        });
    }

    for &key in &node.keys {
        if !bounds.contains(key) {
            violations.push(InvariantViolation::SeparatorBounds {
                node: id,
                key,
                lower: bounds.lower,
                upper: bounds.upper,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulatedStorage;

    fn tree_with(keys: impl IntoIterator<Item = Key>) -> BPlusTree<SimulatedStorage> {
        let mut tree = BPlusTree::open(SimulatedStorage::new(7)).expect("open tree");
        for key in keys {
            tree.insert(key).expect("insert");
        }
        tree
    }

    #[test]
    fn test_well_formed_tree_has_no_violations() {
        let mut tree = tree_with((0..100).rev());
        assert_eq!(tree.check_invariants().expect("check"), vec![]);
    }

    #[test]
    fn test_detects_keys_out_of_order() {
        let mut tree = tree_with([1, 2, 3]);
        let root = tree.root_id();
        let mut node = tree.read_node(root).expect("read");
        node.keys = vec![3, 1, 2];
        tree.write_node(&mut node).expect("write");

        let violations = tree.check_invariants().expect("check");
        assert!(matches!(
            violations.as_slice(),
            [InvariantViolation::KeysOutOfOrder { .. }]
        ));
    }

    #[test]
    fn test_detects_separator_bounds() {
        let mut tree = tree_with(0..5);
        let root = tree.read_node(tree.root_id()).expect("read root");
        let mut left = tree.read_node(root.children[0]).expect("read left");
        left.keys.push(50);
        tree.write_node(&mut left).expect("write");

        let violations = tree.check_invariants().expect("check");
        assert!(violations.iter().any(|v| matches!(
            v,
            InvariantViolation::SeparatorBounds { key: 50, .. }
        )));
    }

    #[test]
    fn test_detects_broken_leaf_chain() {
        let mut tree = tree_with(0..12);
        let mut first = tree.leftmost_leaf().expect("leftmost");
        first.next_leaf = None;
        tree.write_node(&mut first).expect("write");

        let violations = tree.check_invariants().expect("check");
        assert!(matches!(
            violations.as_slice(),
            [InvariantViolation::LeafChain {
                position: 1,
                found: None,
                ..
            }]
        ));
    }

    #[test]
    fn test_detects_uneven_leaf_depth() {
        let mut tree = tree_with(0..5);
        let mut root = tree.read_node(tree.root_id()).expect("read root");

        // Hang an internal node with a single leaf under the right slot.
        let right = root.children[1];
        let mut extra = Node::new_internal(right);
        let extra_id = tree.write_node(&mut extra).expect("write");
        root.children[1] = extra_id;
        tree.write_node(&mut root).expect("write root");

        let violations = tree.check_invariants().expect("check");
        assert!(violations.iter().any(|v| matches!(
            v,
            InvariantViolation::UnevenLeafDepth {
                depth: 2,
                expected: 1,
                ..
            }
        )));
    }

    #[test]
    fn test_violation_display() {
        let violation = InvariantViolation::FanOut {
            node: NodeId::FIRST,
            num_keys: 2,
            children: 2,
        };
        assert_eq!(violation.to_string(), "node @8: 2 keys but 2 children");
    }
}
