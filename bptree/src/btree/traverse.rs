//! Read-only pre-order traversal for inspection.
//!
//! The dump prints one line per node, indented two spaces per level:
//!
//! ```text
//! Level 0: [10, 20]
//!   Level 1: [5, 6, 7] (leaf)
//!   Level 1: [10, 12, 17] (leaf)
//!   Level 1: [20, 30] (leaf)
//! ```

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::btree::node::{Key, Node};
use crate::btree::tree::{BPlusTree, BTreeError};
use crate::storage::{NodeId, Storage};

/// One visited node of a pre-order traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalEntry {
    /// Distance from the root (the root is at depth 0).
    pub depth: usize,
    /// Identity of the node.
    pub id: NodeId,
    /// The node's keys in order.
    pub keys: Vec<Key>,
    /// Whether the node is a leaf.
    pub is_leaf: bool,
}

impl std::fmt::Display for TraversalEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:indent$}Level {}: [", "", self.depth, indent = self.depth * 2)?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}")?;
        }
        write!(f, "]")?;
        if self.is_leaf {
            write!(f, " (leaf)")?;
        }
        Ok(())
    }
}

impl<S: Storage> BPlusTree<S> {
    /// Visit every node depth-first, parents before children, children
    /// left to right. `visit` receives each node with its depth.
    pub(crate) fn walk_preorder(
        &mut self,
        mut visit: impl FnMut(usize, &Node),
    ) -> Result<(), BTreeError> {
        let mut seen = HashSet::new();
        let mut stack = vec![(self.root_id(), 0usize)];

        while let Some((id, depth)) = stack.pop() {
            if !seen.insert(id) {
                return Err(BTreeError::Cycle(id));
            }

            let node = self.read_node(id)?;
            visit(depth, &node);

            if !node.is_leaf {
                stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
            }
        }

        Ok(())
    }

    /// Collect every node in pre-order.
    pub fn traverse(&mut self) -> Result<Vec<TraversalEntry>, BTreeError> {
        let mut entries = Vec::new();
        self.walk_preorder(|depth, node| {
            if let Some(id) = node.id {
                entries.push(TraversalEntry {
                    depth,
                    id,
                    keys: node.keys.clone(),
                    is_leaf: node.is_leaf,
                });
            }
        })?;
        Ok(entries)
    }

    /// Render the tree, one line per node in pre-order.
    pub fn dump(&mut self) -> Result<String, BTreeError> {
        let mut out = String::new();
        for entry in self.traverse()? {
            // Writing to a String cannot fail.
            let _ = writeln!(out, "{entry}");
        }
        Ok(out)
    }
}
