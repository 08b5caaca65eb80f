//! Index file storage.
//!
//! The index lives in a single flat file:
//!
//! - Bytes 0-7: header holding the root identity (little-endian `i64`,
//!   `-1` while unset)
//! - Bytes 8 onward: fixed-size 100-byte node records, appended and never
//!   moved
//!
//! A node's identity is the byte offset of its record, so the first record
//! is always `@8`.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use bptree::storage::{FileStorage, NodeId, Record, Storage};
//!
//! # fn main() -> Result<(), bptree::storage::StorageError> {
//! let mut storage = FileStorage::open(Path::new("index.dat"), false)?;
//!
//! let id = storage.allocate_record()?;
//! let mut record = Record::new();
//! record.seal();
//! storage.write_record(id, &record)?;
//! storage.write_root(id)?;
//!
//! assert_eq!(storage.read_root()?, Some(NodeId::FIRST));
//! # Ok(())
//! # }
//! ```

mod file;
mod io;
mod record;

pub use file::FileStorage;
pub use io::{Storage, StorageError, check_record_bounds};
pub use record::{
    HEADER_SIZE, HEADER_SIZE_U64, NodeId, RECORD_SIZE, RECORD_SIZE_U64, Record, SENTINEL,
    decode_header, encode_header, offsets as record_offsets,
};
