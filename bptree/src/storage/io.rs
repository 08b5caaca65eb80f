//! Storage abstraction for the index file.
//!
//! This module provides a `Storage` trait over record-based storage, allowing
//! the tree to run against the real file in production and against simulated
//! in-memory storage in tests.
//!
//! # Design
//!
//! The trait is a minimal abstraction over the index file:
//! - Record read/write by identity (byte offset)
//! - Record allocation at the end of the file (append-only, no free list)
//! - The header slot holding the root identity
//! - File synchronization

use crate::storage::record::{NodeId, Record};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error (open, seek, short read, write).
    Io(std::io::Error),
    /// Record identity at or past the end of the record area.
    RecordOutOfBounds { id: NodeId, end: NodeId },
    /// Identity that does not fall on a record boundary.
    MisalignedRecord(NodeId),
    /// File length that is not a header plus whole records.
    TruncatedFile { len: u64 },
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::RecordOutOfBounds { id, end } => {
                write!(f, "record {id} out of bounds (end of records: {end})")
            }
            Self::MisalignedRecord(id) => write!(f, "record {id} is not on a record boundary"),
            Self::TruncatedFile { len } => {
                write!(f, "file length {len} is not a header plus whole records")
            }
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Abstraction over record-based index storage.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_record` returns the last written content for an identity
/// - `write_record` at `allocate_record()` appends; anywhere else it
///   overwrites in place and never moves another record
/// - identities are never reused
/// - `read_root` returns `None` until `write_root` has been called once
pub trait Storage {
    /// Read the record stored at `id`.
    fn read_record(&mut self, id: NodeId) -> Result<Record, StorageError>;

    /// Write a record at `id`.
    ///
    /// `id` must be an existing record or the identity returned by
    /// `allocate_record`, in which case the record is appended.
    fn write_record(&mut self, id: NodeId, record: &Record) -> Result<(), StorageError>;

    /// The identity the next appended record will receive.
    fn allocate_record(&mut self) -> Result<NodeId, StorageError>;

    /// Read the root identity from the header.
    fn read_root(&mut self) -> Result<Option<NodeId>, StorageError>;

    /// Persist the root identity into the header.
    fn write_root(&mut self, root: NodeId) -> Result<(), StorageError>;

    /// Sync all pending writes to durable storage.
    fn sync(&mut self) -> Result<(), StorageError>;
}

/// Check that `id` names an existing record given the end of the record area.
pub fn check_record_bounds(id: NodeId, end: NodeId) -> Result<(), StorageError> {
    if !id.is_aligned() {
        return Err(StorageError::MisalignedRecord(id));
    }
    if id >= end {
        return Err(StorageError::RecordOutOfBounds { id, end });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let e = StorageError::RecordOutOfBounds {
            id: NodeId::new(208),
            end: NodeId::new(108),
        };
        assert!(e.to_string().contains("record @208"));
        assert!(e.to_string().contains("end of records: @108"));

        let e = StorageError::InjectedFault("test fault".to_string());
        assert!(e.to_string().contains("test fault"));
    }

    #[test]
    fn test_check_record_bounds() {
        let end = NodeId::new(208);
        assert!(check_record_bounds(NodeId::FIRST, end).is_ok());
        assert!(check_record_bounds(NodeId::new(108), end).is_ok());
        assert!(matches!(
            check_record_bounds(NodeId::new(208), end),
            Err(StorageError::RecordOutOfBounds { .. })
        ));
        assert!(matches!(
            check_record_bounds(NodeId::new(50), end),
            Err(StorageError::MisalignedRecord(_))
        ));
        assert!(matches!(
            check_record_bounds(NodeId::new(0), end),
            Err(StorageError::MisalignedRecord(_))
        ));
    }
}
