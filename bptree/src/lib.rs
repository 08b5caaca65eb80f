// Test code may use unwrap()/expect() for convenience.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

// Layout of the index file:
//  - 8-byte header holding the root node's offset
//  - fixed-size node records appended after it, addressed by byte offset
//
// Components, leaf first:
//  - storage: record codec, storage trait, file-backed storage
//  - btree: node model, insertion and search, cursor, traversal, invariants
//  - simulation: in-memory storage with fault injection for tests

pub mod btree;
pub mod config;
pub mod simulation;
pub mod storage;

pub use btree::{BPlusTree, BTreeError, Key};
pub use config::{ConfigError, TreeConfig};
pub use storage::{FileStorage, NodeId, Storage, StorageError};
