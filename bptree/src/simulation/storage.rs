//! Simulated in-memory storage for deterministic testing.
//!
//! This module provides an in-memory implementation of the `Storage` trait
//! with support for fault injection:
//! - Record-level read/write errors
//! - Bit flips on read
//! - Sync failures
//! - A hard write budget, after which every write fails

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{
    HEADER_SIZE_U64, NodeId, RECORD_SIZE, RECORD_SIZE_U64, Record, Storage, StorageError,
    check_record_bounds,
};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
    /// Probability of record corruption on read (0.0 - 1.0).
    pub corruption_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config that only disturbs reads.
    ///
    /// Failed reads never leave a partial write behind, so the tree stays
    /// well formed under this config.
    #[must_use]
    pub const fn read_faults(rate: f64) -> Self {
        Self {
            read_error_rate: rate,
            write_error_rate: 0.0,
            sync_error_rate: 0.0,
            corruption_rate: rate,
        }
    }
}

/// A successful write, in the order it reached storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEvent {
    /// A record was appended or overwritten.
    Record(NodeId),
    /// The header was updated to point at a new root.
    Root(NodeId),
}

/// Statistics about simulated storage operations.
#[derive(Debug, Default, Clone)]
pub struct SimulatedStorageStats {
    /// Number of record reads.
    pub reads: u64,
    /// Number of record writes.
    pub writes: u64,
    /// Number of header writes.
    pub root_writes: u64,
    /// Number of syncs.
    pub syncs: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of injected sync errors.
    pub injected_sync_errors: u64,
    /// Number of corrupted records returned.
    pub corrupted_reads: u64,
}

/// In-memory storage implementation for deterministic testing.
///
/// Records are laid out by identity exactly as in the index file, so
/// identities handed out here match the ones a file would produce for the
/// same sequence of writes.
pub struct SimulatedStorage {
    /// Records in append order; index `i` has identity `@8 + 100 * i`.
    records: Vec<Record>,
    /// Root identity from the header.
    root: Option<NodeId>,

    /// Fault injection configuration.
    fault_config: FaultConfig,
    /// Random number generator for fault injection.
    rng: StdRng,
    /// Writes allowed before every write fails; `None` is unlimited.
    write_budget: Option<u64>,

    /// Successful writes, oldest first.
    write_log: Vec<WriteEvent>,
    /// Statistics for tracking.
    stats: SimulatedStorageStats,
}

impl SimulatedStorage {
    /// Create a new simulated storage with the given seed.
    ///
    /// The seed ensures deterministic behavior - the same seed will
    /// produce the same sequence of faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::default())
    }

    /// Create a new simulated storage with custom fault configuration.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            records: Vec::new(),
            root: None,
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            write_budget: None,
            write_log: Vec::new(),
            stats: SimulatedStorageStats::default(),
        }
    }

    /// Get the current statistics.
    #[must_use]
    pub const fn stats(&self) -> &SimulatedStorageStats {
        &self.stats
    }

    /// Reset statistics.
    pub fn reset_stats(&mut self) {
        self.stats = SimulatedStorageStats::default();
    }

    /// Update the fault configuration.
    pub const fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Let the next `count` writes succeed, then fail every write after.
    pub const fn fail_writes_after(&mut self, count: u64) {
        self.write_budget = Some(count);
    }

    /// Remove the write budget set by `fail_writes_after`.
    pub const fn clear_write_budget(&mut self) {
        self.write_budget = None;
    }

    /// Successful writes, oldest first.
    #[must_use]
    pub fn write_log(&self) -> &[WriteEvent] {
        &self.write_log
    }

    /// Forget recorded writes.
    pub fn clear_write_log(&mut self) {
        self.write_log.clear();
    }

    /// Number of records stored.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Identity one past the last record.
    fn end(&self) -> NodeId {
        NodeId::new(HEADER_SIZE_U64 + self.records.len() as u64 * RECORD_SIZE_U64)
    }

    /// Position of `id` in `records`.
    fn index_of(&self, id: NodeId) -> Result<usize, StorageError> {
        let end = self.end();
        check_record_bounds(id, end)?;
        usize::try_from((id.offset() - HEADER_SIZE_U64) / RECORD_SIZE_U64)
            .map_err(|_| StorageError::RecordOutOfBounds { id, end })
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    /// Consume one write from the budget, failing once it is spent.
    fn take_write(&mut self) -> Result<(), StorageError> {
        if let Some(remaining) = self.write_budget.as_mut() {
            if *remaining == 0 {
                self.stats.injected_write_errors += 1;
                return Err(StorageError::InjectedFault(
                    "write budget exhausted".to_string(),
                ));
            }
            *remaining -= 1;
        }

        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated write error".to_string(),
            ));
        }

        Ok(())
    }

    /// Corrupt a record by flipping one random bit.
    fn corrupt_record(&mut self, record: &mut Record) {
        let byte_offset = self.rng.random_range(0..RECORD_SIZE);
        let bit = self.rng.random_range(0..8u8);
        record.as_bytes_mut()[byte_offset] ^= 1 << bit;
    }
}

impl Storage for SimulatedStorage {
    fn read_record(&mut self, id: NodeId) -> Result<Record, StorageError> {
        self.stats.reads += 1;

        let index = self.index_of(id)?;

        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated read error".to_string(),
            ));
        }

        let mut record = self.records[index].clone();

        if self.should_inject_fault(self.fault_config.corruption_rate) {
            self.stats.corrupted_reads += 1;
            self.corrupt_record(&mut record);
        }

        Ok(record)
    }

    fn write_record(&mut self, id: NodeId, record: &Record) -> Result<(), StorageError> {
        self.stats.writes += 1;

        let appending = id == self.end();
        let index = if appending {
            self.records.len()
        } else {
            self.index_of(id)?
        };

        self.take_write()?;

        if appending {
            self.records.push(record.clone());
        } else {
            self.records[index] = record.clone();
        }
        self.write_log.push(WriteEvent::Record(id));
        Ok(())
    }

    fn allocate_record(&mut self) -> Result<NodeId, StorageError> {
        Ok(self.end())
    }

    fn read_root(&mut self) -> Result<Option<NodeId>, StorageError> {
        Ok(self.root)
    }

    fn write_root(&mut self, root: NodeId) -> Result<(), StorageError> {
        self.stats.root_writes += 1;
        self.index_of(root)?;
        self.take_write()?;

        self.root = Some(root);
        self.write_log.push(WriteEvent::Root(root));
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.stats.syncs += 1;

        if self.should_inject_fault(self.fault_config.sync_error_rate) {
            self.stats.injected_sync_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated sync error".to_string(),
            ));
        }

        // Writes are already "durable" in memory.
        Ok(())
    }
}
