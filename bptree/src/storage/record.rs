//! Record buffers, node identities and file layout constants.
//!
//! The index file is a fixed 8-byte header followed by fixed-size node
//! records. A record's identity is its byte offset in the file, so every
//! identity sits on a record boundary after the header.

// RECORD_SIZE is a compile-time constant that fits in u64.
#![allow(clippy::cast_possible_truncation)]

/// Size of the file header in bytes (the persisted root identity).
pub const HEADER_SIZE: usize = 8;

/// Header size as u64 for offset calculations.
pub const HEADER_SIZE_U64: u64 = HEADER_SIZE as u64;

/// Size of one node record in bytes.
pub const RECORD_SIZE: usize = 100;

/// Record size as u64 for offset calculations.
pub const RECORD_SIZE_U64: u64 = RECORD_SIZE as u64;

/// On-disk sentinel for an absent key slot, child slot or leaf link.
pub const SENTINEL: i64 = -1;

/// Identity of a node: its byte offset within the index file.
///
/// Assigned once, when the node is first written, and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Identity of the first record, directly after the header.
    pub const FIRST: Self = Self(HEADER_SIZE_U64);

    /// Wrap a raw byte offset.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// The raw byte offset.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0
    }

    /// Whether this offset lies on a record boundary after the header.
    #[must_use]
    pub const fn is_aligned(self) -> bool {
        self.0 >= HEADER_SIZE_U64 && (self.0 - HEADER_SIZE_U64) % RECORD_SIZE_U64 == 0
    }

    /// Identity of the record following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + RECORD_SIZE_U64)
    }

    /// Decode an optional identity from its on-disk form (`-1` is none).
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().map(Self)
    }

    /// Encode an optional identity into its on-disk form.
    #[must_use]
    pub fn to_raw(id: Option<Self>) -> i64 {
        id.and_then(|id| i64::try_from(id.0).ok()).unwrap_or(SENTINEL)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Field offsets within a record.
pub mod offsets {
    pub const KEYS: usize = 0;
    pub const CHILDREN: usize = 32;
    pub const NEXT_LEAF: usize = 72;
    pub const NUM_KEYS: usize = 80;
    pub const IS_LEAF: usize = 84;
    // 85-87: reserved
    pub const SELF_OFFSET: usize = 88;
    pub const CHECKSUM: usize = 96;
}

/// A raw record buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    data: [u8; RECORD_SIZE],
}

impl Record {
    /// Create a new zeroed record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: [0u8; RECORD_SIZE],
        }
    }

    /// Create a record from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Self { data: bytes }
    }

    /// Get the raw record data.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.data
    }

    /// Get mutable access to the raw record data.
    pub const fn as_bytes_mut(&mut self) -> &mut [u8; RECORD_SIZE] {
        &mut self.data
    }

    /// Read a u8 at the given offset.
    #[must_use]
    pub const fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Write a u8 at the given offset.
    pub const fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Read a u32 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(buf)
    }

    /// Write a u32 (little-endian) at the given offset.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read an i64 (little-endian) at the given offset.
    #[must_use]
    pub fn read_i64(&self, offset: usize) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        i64::from_le_bytes(buf)
    }

    /// Write an i64 (little-endian) at the given offset.
    pub fn write_i64(&mut self, offset: usize, value: i64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Compute the CRC32 of everything before the checksum field.
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        crc32fast::hash(&self.data[..offsets::CHECKSUM])
    }

    /// Store the checksum of the current contents.
    pub fn seal(&mut self) {
        let checksum = self.compute_checksum();
        self.write_u32(offsets::CHECKSUM, checksum);
    }

    /// The checksum stored in the record.
    #[must_use]
    pub fn stored_checksum(&self) -> u32 {
        self.read_u32(offsets::CHECKSUM)
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("self_offset", &self.read_i64(offsets::SELF_OFFSET))
            .field("num_keys", &self.read_u32(offsets::NUM_KEYS))
            .finish_non_exhaustive()
    }
}

/// Encode a header (the root identity) into its fixed-width form.
#[must_use]
pub fn encode_header(root: Option<NodeId>) -> [u8; HEADER_SIZE] {
    NodeId::to_raw(root).to_le_bytes()
}

/// Decode a header from its fixed-width form.
#[must_use]
pub fn decode_header(bytes: [u8; HEADER_SIZE]) -> Option<NodeId> {
    NodeId::from_raw(i64::from_le_bytes(bytes))
}
