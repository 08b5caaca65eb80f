//! Ordered scans over the leaf chain.

use std::collections::HashSet;

use crate::btree::node::{Key, Node};
use crate::btree::tree::{BPlusTree, BTreeError};
use crate::storage::{NodeId, Storage};

/// Cursor over every key in order, following `next_leaf` links.
pub struct LeafCursor<'a, S: Storage> {
    tree: &'a mut BPlusTree<S>,
    leaf: Option<Node>,
    index: usize,
    /// Leaves already entered; a chain that loops back is an error.
    visited: HashSet<NodeId>,
}

impl<S: Storage> LeafCursor<'_, S> {
    /// Get the next key.
    pub fn next_key(&mut self) -> Result<Option<Key>, BTreeError> {
        loop {
            let Some(leaf) = &self.leaf else {
                return Ok(None);
            };

            if let Some(&key) = leaf.keys.get(self.index) {
                self.index += 1;
                return Ok(Some(key));
            }

            let Some(next) = leaf.next_leaf else {
                self.leaf = None;
                return Ok(None);
            };
            if !self.visited.insert(next) {
                return Err(BTreeError::Cycle(next));
            }
            self.index = 0;
            self.leaf = Some(self.tree.read_node(next)?);
        }
    }
}

impl<S: Storage> BPlusTree<S> {
    /// Create a cursor positioned before the smallest key.
    pub fn cursor(&mut self) -> Result<LeafCursor<'_, S>, BTreeError> {
        let leaf = self.leftmost_leaf()?;
        Ok(LeafCursor {
            tree: self,
            visited: leaf.id.into_iter().collect(),
            leaf: Some(leaf),
            index: 0,
        })
    }

    /// Collect every key in order.
    pub fn keys(&mut self) -> Result<Vec<Key>, BTreeError> {
        let mut cursor = self.cursor()?;
        let mut keys = Vec::new();
        while let Some(key) = cursor.next_key()? {
            keys.push(key);
        }
        Ok(keys)
    }

    /// Count the keys in the tree, duplicates included.
    pub fn count(&mut self) -> Result<usize, BTreeError> {
        let mut cursor = self.cursor()?;
        let mut count = 0;
        while cursor.next_key()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::btree::{BPlusTree, BTreeError};
    use crate::simulation::SimulatedStorage;
    use tempfile::tempdir;

    #[test]
    fn test_cursor_on_empty_tree() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = BPlusTree::open_path(&dir.path().join("index.dat")).expect("open tree");

        let mut cursor = tree.cursor().expect("cursor");
        assert_eq!(cursor.next_key().expect("next"), None);
        assert_eq!(tree.count().expect("count"), 0);
    }

    #[test]
    fn test_cursor_yields_sorted_keys() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = BPlusTree::open_path(&dir.path().join("index.dat")).expect("open tree");

        for key in [5, 3, 7, 1, 9, 2, 8, 4, 6, 0] {
            tree.insert(key).expect("insert");
        }

        let mut cursor = tree.cursor().expect("cursor");
        let mut prev = None;
        while let Some(key) = cursor.next_key().expect("next") {
            if let Some(p) = prev {
                assert!(key > p, "keys should be in sorted order");
            }
            prev = Some(key);
        }
        assert_eq!(prev, Some(9));
        assert_eq!(tree.count().expect("count"), 10);
    }

    #[test]
    fn test_cursor_stops_on_looping_chain() {
        let mut tree = BPlusTree::open(SimulatedStorage::new(5)).expect("open tree");
        for key in 0..8 {
            tree.insert(key).expect("insert");
        }

        let mut first = tree.leftmost_leaf().expect("leftmost");
        let first_id = first.id;
        first.next_leaf = first_id;
        tree.write_node(&mut first).expect("write");

        assert!(matches!(
            tree.count(),
            Err(BTreeError::Cycle(id)) if Some(id) == first_id
        ));
        assert!(matches!(tree.keys(), Err(BTreeError::Cycle(_))));
    }
}
