//! Deterministic simulation testing infrastructure.
//!
//! This module provides tools for testing the tree with:
//! - In-memory storage with fault injection
//! - Seeded randomness, so a failing run can be replayed from its seed
//! - A log of every write, for checking the order in which nodes reach
//!   storage
//!
//! # Usage
//!
//! ```
//! use bptree::btree::BPlusTree;
//! use bptree::simulation::{FaultConfig, SimulatedStorage};
//!
//! let storage = SimulatedStorage::with_config(12345, FaultConfig::no_faults());
//! let mut tree = BPlusTree::open(storage).expect("open tree");
//!
//! tree.insert(42).expect("insert");
//! assert!(tree.search(42).expect("search"));
//! assert!(tree.check_invariants().expect("check").is_empty());
//! ```

mod storage;

pub use storage::{FaultConfig, SimulatedStorage, SimulatedStorageStats, WriteEvent};
