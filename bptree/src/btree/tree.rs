//! B+ tree over record storage.
//!
//! Insertion splits full nodes on the way down, so a recursive step never
//! receives a node without room for one more key. The tree grows in height
//! only at the root: a full root moves under a fresh internal root before
//! the descent starts.
//!
//! Nodes reference each other by identity (byte offset). A new node must be
//! written, and so receive its identity, before anything points at it; a
//! split therefore writes the sibling, then the truncated child, then the
//! parent. There is no rollback: a failed write leaves the earlier writes of
//! the same insertion in place.

use std::collections::HashSet;
use std::path::Path;

use crate::btree::node::{Key, Node, NodeError};
use crate::config::TreeConfig;
use crate::storage::{FileStorage, NodeId, Storage, StorageError};

/// A B+ tree backed by record storage.
///
/// Only the root identity is cached; every node access goes to storage.
pub struct BPlusTree<S: Storage> {
    storage: S,
    root: NodeId,
}

impl BPlusTree<FileStorage> {
    /// Open the index file at `path`, creating an empty tree if the file is
    /// missing or empty.
    pub fn open_path(path: &Path) -> Result<Self, BTreeError> {
        Self::open_with_config(&TreeConfig::at(path))
    }

    /// Open the index file described by `config`.
    pub fn open_with_config(config: &TreeConfig) -> Result<Self, BTreeError> {
        Self::open(FileStorage::open(&config.path, config.sync_writes)?)
    }

    /// Open the index file described by `config`, failing if it is missing
    /// instead of creating it.
    pub fn open_existing(config: &TreeConfig) -> Result<Self, BTreeError> {
        Self::open(FileStorage::open_existing(&config.path, config.sync_writes)?)
    }
}

impl<S: Storage> BPlusTree<S> {
    /// Open a tree over `storage`.
    ///
    /// If the header holds no root yet, an empty leaf is written as the root
    /// and its identity is persisted into the header.
    pub fn open(mut storage: S) -> Result<Self, BTreeError> {
        if let Some(root) = storage.read_root()? {
            tracing::info!("Opened index with root {root}");
            return Ok(Self { storage, root });
        }

        let leaf = Node::new_leaf();
        let root = storage.allocate_record()?;
        storage.write_record(root, &leaf.to_record(root))?;
        storage.write_root(root)?;
        storage.sync()?;
        tracing::info!("Created empty index with root {root}");

        Ok(Self { storage, root })
    }

    /// Identity of the current root.
    #[must_use]
    pub const fn root_id(&self) -> NodeId {
        self.root
    }

    /// Get a reference to the underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Get mutable access to the underlying storage.
    pub const fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Read and decode the node stored at `id`.
    pub(crate) fn read_node(&mut self, id: NodeId) -> Result<Node, BTreeError> {
        let record = self.storage.read_record(id)?;
        Ok(Node::from_record(id, &record)?)
    }

    /// Write `node`, appending it if it has no identity yet.
    ///
    /// Returns the node's identity, which is assigned on the first write and
    /// kept on every later one.
    pub(crate) fn write_node(&mut self, node: &mut Node) -> Result<NodeId, BTreeError> {
        let id = match node.id {
            Some(id) => id,
            None => self.storage.allocate_record()?,
        };
        self.storage.write_record(id, &node.to_record(id))?;
        node.id = Some(id);
        Ok(id)
    }

    /// Replace the root, updating the cached identity and the header.
    fn write_root_offset(&mut self, root: NodeId) -> Result<(), BTreeError> {
        self.storage.write_root(root)?;
        self.root = root;
        Ok(())
    }

    /// Insert a key. Duplicates are stored alongside existing copies.
    pub fn insert(&mut self, key: Key) -> Result<(), BTreeError> {
        let result = self.insert_from_root(key);
        if let Err(e) = &result {
            tracing::warn!("Insert of key {key} aborted: {e}");
        }
        result
    }

    fn insert_from_root(&mut self, key: Key) -> Result<(), BTreeError> {
        let root = self.read_node(self.root)?;

        let root = if root.is_full() {
            let old_root = self.root;
            let mut new_root = Node::new_internal(old_root);
            let new_root_id = self.write_node(&mut new_root)?;
            self.split_child(&mut new_root, 0, root)?;
            self.write_root_offset(new_root_id)?;
            tracing::debug!("Root {old_root} was full; tree grew under new root {new_root_id}");
            new_root
        } else {
            root
        };

        self.insert_non_full(root, key)
    }

    /// Insert `key` into the subtree rooted at `node`, which is not full.
    fn insert_non_full(&mut self, mut node: Node, key: Key) -> Result<(), BTreeError> {
        let mut seen: HashSet<NodeId> = node.id.into_iter().collect();
        loop {
            debug_assert!(!node.is_full(), "descent reached a full node");

            if node.is_leaf {
                node.insert_key(key);
                self.write_node(&mut node)?;
                return Ok(());
            }

            let mut idx = node.child_index(key);
            let child_id = node.children[idx];
            if !seen.insert(child_id) {
                return Err(BTreeError::Cycle(child_id));
            }
            let child = self.read_node(child_id)?;

            if child.is_full() {
                self.split_child(&mut node, idx, child)?;
                if key > node.keys[idx] {
                    idx += 1;
                    seen.insert(node.children[idx]);
                }
                node = self.read_node(node.children[idx])?;
            } else {
                node = child;
            }
        }
    }

    /// Split `child`, the full child of `parent` at `idx`.
    ///
    /// The separator lands in `parent` at `idx` and the new sibling at
    /// `idx + 1`. Writes the sibling, then the child, then the parent.
    fn split_child(
        &mut self,
        parent: &mut Node,
        idx: usize,
        mut child: Node,
    ) -> Result<(), BTreeError> {
        debug_assert!(child.is_full(), "only full children are split");
        debug_assert_eq!(child.id, parent.children.get(idx).copied());

        let (separator, mut sibling) = child.split();
        let sibling_id = self.write_node(&mut sibling)?;

        if child.is_leaf {
            child.next_leaf = Some(sibling_id);
        }
        let child_id = self.write_node(&mut child)?;

        parent.insert_separator(idx, separator, sibling_id);
        let parent_id = self.write_node(parent)?;

        tracing::debug!(
            leaf = child.is_leaf,
            "Split {child_id} under {parent_id}: separator {separator}, new sibling {sibling_id}"
        );
        Ok(())
    }

    /// Whether `key` is in the tree.
    pub fn search(&mut self, key: Key) -> Result<bool, BTreeError> {
        self.search_node(Some(self.root), key, &mut HashSet::new())
    }

    /// Search the subtree at `id`; `None` is an empty subtree.
    ///
    /// A key equal to a separator is a match even at an internal node, since
    /// every separator is a copy of a key that was inserted into a leaf.
    fn search_node(
        &mut self,
        id: Option<NodeId>,
        key: Key,
        seen: &mut HashSet<NodeId>,
    ) -> Result<bool, BTreeError> {
        let Some(id) = id else {
            return Ok(false);
        };
        if !seen.insert(id) {
            return Err(BTreeError::Cycle(id));
        }

        let node = self.read_node(id)?;
        let idx = node.search_index(key);

        if node.keys.get(idx) == Some(&key) {
            return Ok(true);
        }
        if node.is_leaf {
            return Ok(false);
        }

        self.search_node(node.children.get(idx).copied(), key, seen)
    }

    /// Follow first children from the root, returning the leftmost leaf and
    /// the number of levels passed.
    fn leftmost_path(&mut self) -> Result<(Node, usize), BTreeError> {
        let mut seen = HashSet::from([self.root]);
        let mut levels = 1;
        let mut node = self.read_node(self.root)?;
        while !node.is_leaf {
            let child = node.children[0];
            if !seen.insert(child) {
                return Err(BTreeError::Cycle(child));
            }
            node = self.read_node(child)?;
            levels += 1;
        }
        Ok((node, levels))
    }

    /// Read the leftmost leaf.
    pub(crate) fn leftmost_leaf(&mut self) -> Result<Node, BTreeError> {
        Ok(self.leftmost_path()?.0)
    }

    /// Number of levels from the root down to the leaves.
    pub fn height(&mut self) -> Result<usize, BTreeError> {
        Ok(self.leftmost_path()?.1)
    }
}

/// Errors that can occur during B+ tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Storage error.
    Storage(StorageError),
    /// Node decoding error.
    Node(NodeError),
    /// A node was reached twice while walking the tree or the leaf chain.
    Cycle(NodeId),
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Cycle(id) => write!(f, "node {id} reached twice"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Cycle(_) => None,
        }
    }
}

impl From<StorageError> for BTreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for BTreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}
