//! Index file I/O operations.
//!
//! Every access opens the file, seeks, reads or writes, and releases the
//! handle when the scope ends, on success and error paths alike. No handle
//! is held between calls.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::io::{Storage, StorageError, check_record_bounds};
use crate::storage::record::{
    HEADER_SIZE, HEADER_SIZE_U64, NodeId, RECORD_SIZE, RECORD_SIZE_U64, Record, decode_header,
    encode_header,
};

/// How a scoped access opens the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    ReadWrite,
}

/// A handle to the index file by path.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    sync_writes: bool,
}

impl FileStorage {
    /// Open the index file at `path`, creating it if it does not exist.
    ///
    /// A new or empty file gets an unset header, so that the first record is
    /// appended directly after it. An existing file must be a header followed
    /// by whole records.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self, StorageError> {
        Self::open_with(path, sync_writes, true)
    }

    /// Open the index file at `path`, which must already exist.
    pub fn open_existing(path: &Path, sync_writes: bool) -> Result<Self, StorageError> {
        Self::open_with(path, sync_writes, false)
    }

    fn open_with(path: &Path, sync_writes: bool, create: bool) -> Result<Self, StorageError> {
        let storage = Self {
            path: path.to_path_buf(),
            sync_writes,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.write_all(&encode_header(None))?;
            if sync_writes {
                file.sync_all()?;
            }
            tracing::info!("Initialized index file {}", path.display());
        } else {
            records_end(len)?;
        }

        Ok(storage)
    }

    /// Path of the index file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether every write is followed by a data sync.
    #[must_use]
    pub const fn sync_writes(&self) -> bool {
        self.sync_writes
    }

    /// Run `op` against a freshly opened handle; the handle is dropped when
    /// this returns, whatever `op` returned.
    fn with_file<T>(
        &self,
        access: Access,
        op: impl FnOnce(&mut File) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(access == Access::ReadWrite)
            .open(&self.path)?;
        op(&mut file)
    }
}

/// The identity the next appended record receives, given the file length.
fn records_end(len: u64) -> Result<NodeId, StorageError> {
    if len < HEADER_SIZE_U64 || (len - HEADER_SIZE_U64) % RECORD_SIZE_U64 != 0 {
        return Err(StorageError::TruncatedFile { len });
    }
    Ok(NodeId::new(len))
}

fn file_records_end(file: &File) -> Result<NodeId, StorageError> {
    records_end(file.metadata()?.len())
}

impl Storage for FileStorage {
    fn read_record(&mut self, id: NodeId) -> Result<Record, StorageError> {
        self.with_file(Access::Read, |file| {
            let end = file_records_end(file)?;
            check_record_bounds(id, end)?;

            let mut buf = [0u8; RECORD_SIZE];
            file.seek(SeekFrom::Start(id.offset()))?;
            file.read_exact(&mut buf)?;
            tracing::trace!("read record {id}");
            Ok(Record::from_bytes(buf))
        })
    }

    fn write_record(&mut self, id: NodeId, record: &Record) -> Result<(), StorageError> {
        let sync_writes = self.sync_writes;
        self.with_file(Access::ReadWrite, |file| {
            let end = file_records_end(file)?;
            if id != end {
                check_record_bounds(id, end)?;
            }

            file.seek(SeekFrom::Start(id.offset()))?;
            file.write_all(record.as_bytes())?;
            if sync_writes {
                file.sync_data()?;
            }
            let appended = id == end;
            tracing::trace!(appended, "wrote record {id}");
            Ok(())
        })
    }

    fn allocate_record(&mut self) -> Result<NodeId, StorageError> {
        self.with_file(Access::Read, |file| file_records_end(file))
    }

    fn read_root(&mut self) -> Result<Option<NodeId>, StorageError> {
        self.with_file(Access::Read, |file| {
            file_records_end(file)?;
            let mut buf = [0u8; HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            Ok(decode_header(buf))
        })
    }

    fn write_root(&mut self, root: NodeId) -> Result<(), StorageError> {
        let sync_writes = self.sync_writes;
        self.with_file(Access::ReadWrite, |file| {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&encode_header(Some(root)))?;
            if sync_writes {
                file.sync_data()?;
            }
            tracing::trace!("wrote root {root} to header");
            Ok(())
        })
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.with_file(Access::ReadWrite, |file| Ok(file.sync_all()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record_with(byte: u8) -> Record {
        Record::from_bytes([byte; RECORD_SIZE])
    }

    #[test]
    fn test_open_creates_header() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("index.dat");

        let mut storage = FileStorage::open(&path, false).expect("open");
        assert_eq!(fs::metadata(&path).expect("metadata").len(), HEADER_SIZE_U64);
        assert_eq!(storage.read_root().expect("read root"), None);
        assert_eq!(storage.allocate_record().expect("allocate"), NodeId::FIRST);
    }

    #[test]
    fn test_open_existing_refuses_missing_file() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("index.dat");

        let result = FileStorage::open_existing(&path, false);
        assert!(matches!(
            result,
            Err(StorageError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound
        ));
        assert!(!path.exists());

        FileStorage::open(&path, false).expect("create");
        let storage = FileStorage::open_existing(&path, true).expect("open existing");
        assert_eq!(storage.path(), path.as_path());
        assert!(storage.sync_writes());
    }

    #[test]
    fn test_open_empty_existing_file() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("index.dat");
        fs::write(&path, b"").expect("write file");

        let mut storage = FileStorage::open(&path, false).expect("open");
        assert_eq!(storage.read_root().expect("read root"), None);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("index.dat");
        fs::write(&path, [0u8; HEADER_SIZE + 7]).expect("write file");

        let result = FileStorage::open(&path, false);
        assert!(matches!(result, Err(StorageError::TruncatedFile { len: 15 })));
    }

    #[test]
    fn test_append_and_overwrite_in_place() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("index.dat");
        let mut storage = FileStorage::open(&path, true).expect("open");

        let first = storage.allocate_record().expect("allocate");
        storage.write_record(first, &record_with(1)).expect("append first");
        let second = storage.allocate_record().expect("allocate");
        assert_eq!(second, first.next());
        storage.write_record(second, &record_with(2)).expect("append second");

        // Overwrite the first record; the second must be untouched.
        storage.write_record(first, &record_with(3)).expect("overwrite");
        assert_eq!(storage.read_record(first).expect("read"), record_with(3));
        assert_eq!(storage.read_record(second).expect("read"), record_with(2));

        let len = fs::metadata(&path).expect("metadata").len();
        assert_eq!(len, HEADER_SIZE_U64 + 2 * RECORD_SIZE_U64);
    }

    #[test]
    fn test_record_out_of_bounds() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("index.dat");
        let mut storage = FileStorage::open(&path, false).expect("open");

        let result = storage.read_record(NodeId::FIRST);
        assert!(matches!(result, Err(StorageError::RecordOutOfBounds { .. })));

        // Writing past the end would leave a gap.
        let result = storage.write_record(NodeId::FIRST.next(), &record_with(1));
        assert!(matches!(result, Err(StorageError::RecordOutOfBounds { .. })));

        let result = storage.read_record(NodeId::new(3));
        assert!(matches!(result, Err(StorageError::MisalignedRecord(_))));
    }

    #[test]
    fn test_root_persistence() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("index.dat");

        {
            let mut storage = FileStorage::open(&path, false).expect("open");
            let id = storage.allocate_record().expect("allocate");
            storage.write_record(id, &record_with(9)).expect("write");
            storage.write_root(id).expect("write root");
            storage.sync().expect("sync");
        }

        let mut storage = FileStorage::open(&path, false).expect("reopen");
        assert_eq!(storage.read_root().expect("read root"), Some(NodeId::FIRST));
        assert_eq!(
            storage.read_record(NodeId::FIRST).expect("read"),
            record_with(9)
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("index.dat");
        let mut storage = FileStorage::open(&path, false).expect("open");
        fs::remove_file(&path).expect("remove");

        let result = storage.read_root();
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
