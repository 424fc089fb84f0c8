//! Q-table storage and binary blob persistence.
//!
//! The table maps action keys (`"<state_key>_<row>_<col>"`) to value
//! estimates. Reads never insert; missing keys read as `0.0`. The core only
//! ever adds keys, so the table grows monotonically during a run.
//!
//! # Blob Format
//!
//! | Offset | Size | Field | Description |
//! |--------|------|-------|-------------|
//! | 0 | 4 | magic | "RVQT" |
//! | 4 | 4 | version | u32 (current: 1) |
//! | 8 | 4 | flags | bit 0: gzip-compressed payload |
//! | 12 | 4 | checksum | CRC32 of the stored payload |
//! | 16 | 8 | entries | u64 little-endian |
//! | 24 | 8 | timestamp | i64 Unix timestamp |
//! | 32 | .. | payload | bincode `Vec<(String, f64)>` sorted by key |
//!
//! Entries are sorted before encoding so that equal tables produce equal
//! blobs regardless of hash order.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crc32fast::Hasher as Crc32Hasher;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::learning::LearningError;
use crate::learning::persist;

/// 4-byte magic header for Q-table blobs ("RVQT").
pub const QTABLE_MAGIC: &[u8; 4] = b"RVQT";

/// Current blob format version.
pub const QTABLE_VERSION: u32 = 1;

/// Flag bit indicating a gzip-compressed payload.
pub const FLAG_COMPRESSED: u32 = 1;

/// Blob header with version, flags and CRC32 checksum.
#[derive(Clone, Debug, PartialEq)]
pub struct QTableHeader {
    /// Magic bytes ("RVQT").
    pub magic: [u8; 4],
    /// Format version number.
    pub version: u32,
    /// Flags (bit 0: compressed).
    pub flags: u32,
    /// CRC32 checksum of the payload as stored.
    pub checksum: u32,
    /// Number of entries in the payload.
    pub entries: u64,
    /// Unix timestamp when the blob was written.
    pub timestamp: i64,
}

impl QTableHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 32;

    /// Create a header for `entries` entries; the checksum is set later.
    pub fn new(entries: u64, compressed: bool) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            magic: *QTABLE_MAGIC,
            version: QTABLE_VERSION,
            flags: if compressed { FLAG_COMPRESSED } else { 0 },
            checksum: 0,
            entries,
            timestamp,
        }
    }

    /// Check if the compression flag is set.
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.flags.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.entries.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    ///
    /// # Errors
    ///
    /// `LearningError::InvalidBlob` if the input is short, the magic bytes
    /// don't match or the version is unknown.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LearningError> {
        if bytes.len() < Self::SIZE {
            return Err(LearningError::InvalidBlob(format!(
                "Header too small: expected {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if &magic != QTABLE_MAGIC {
            return Err(LearningError::InvalidBlob(format!(
                "Invalid magic header: expected {:?}, got {:?}",
                QTABLE_MAGIC, magic
            )));
        }

        let version = read_u32(bytes, 4);
        if version != QTABLE_VERSION {
            return Err(LearningError::InvalidBlob(format!(
                "Incompatible blob version: expected {}, got {}",
                QTABLE_VERSION, version
            )));
        }

        Ok(Self {
            magic,
            version,
            flags: read_u32(bytes, 8),
            checksum: read_u32(bytes, 12),
            entries: read_u64(bytes, 16),
            timestamp: read_u64(bytes, 24) as i64,
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Mapping from action key to value estimate.
///
/// # Example
///
/// ```
/// use reversi_qlearn::learning::QTable;
///
/// let mut table = QTable::new();
/// assert_eq!(table.get("missing"), 0.0);
/// assert!(table.is_empty());
///
/// table.set("k", 1.5);
/// assert_eq!(table.get("k"), 1.5);
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QTable {
    entries: HashMap<String, f64>,
}

impl QTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, `0.0` when absent. Never inserts.
    #[inline]
    pub fn get(&self, key: &str) -> f64 {
        self.entries.get(key).copied().unwrap_or(0.0)
    }

    /// Whether `key` has a stored value.
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite the value for `key`.
    #[inline]
    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.entries.insert(key.into(), value);
    }

    /// Number of stored entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Entries sorted by key.
    fn sorted_entries(&self) -> Vec<(String, f64)> {
        let mut entries: Vec<(String, f64)> =
            self.iter().map(|(k, v)| (k.to_string(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Encode the table into a complete blob (header + payload).
    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>, LearningError> {
        let entries = self.sorted_entries();
        let encoded = bincode::encode_to_vec(&entries, bincode::config::standard())
            .map_err(|e| LearningError::InvalidBlob(format!("Encode failed: {}", e)))?;

        let payload = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&encoded)?;
            encoder.finish()?
        } else {
            encoded
        };

        let mut hasher = Crc32Hasher::new();
        hasher.update(&payload);

        let mut header = QTableHeader::new(entries.len() as u64, compress);
        header.checksum = hasher.finalize();

        let mut bytes = Vec::with_capacity(QTableHeader::SIZE + payload.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode a blob produced by [`QTable::to_bytes`].
    ///
    /// # Errors
    ///
    /// `LearningError::InvalidBlob` on header, checksum, decompression or
    /// decode failure, or when the entry count disagrees with the header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LearningError> {
        let header = QTableHeader::from_bytes(bytes)?;
        let payload = &bytes[QTableHeader::SIZE..];

        let mut hasher = Crc32Hasher::new();
        hasher.update(payload);
        let actual = hasher.finalize();
        if actual != header.checksum {
            return Err(LearningError::InvalidBlob(format!(
                "Checksum mismatch: expected {:#010x}, got {:#010x}",
                header.checksum, actual
            )));
        }

        let decoded_storage;
        let encoded: &[u8] = if header.is_compressed() {
            let mut decoder = GzDecoder::new(payload);
            let mut buf = Vec::new();
            decoder
                .read_to_end(&mut buf)
                .map_err(|e| LearningError::InvalidBlob(format!("Decompression failed: {}", e)))?;
            decoded_storage = buf;
            &decoded_storage
        } else {
            payload
        };

        let (entries, _): (Vec<(String, f64)>, usize) =
            bincode::decode_from_slice(encoded, bincode::config::standard())
                .map_err(|e| LearningError::InvalidBlob(format!("Decode failed: {}", e)))?;

        if entries.len() as u64 != header.entries {
            return Err(LearningError::InvalidBlob(format!(
                "Entry count mismatch: header says {}, payload has {}",
                header.entries,
                entries.len()
            )));
        }

        Ok(Self {
            entries: entries.into_iter().collect(),
        })
    }

    /// Save to `path` with a compressed payload.
    ///
    /// Returns the number of bytes written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<u64, LearningError> {
        self.save_with(path, true)
    }

    /// Save to `path`, replacing any existing file atomically.
    pub fn save_with<P: AsRef<Path>>(&self, path: P, compress: bool) -> Result<u64, LearningError> {
        let path = path.as_ref();
        let start_time = Instant::now();

        let bytes = self.to_bytes(compress)?;
        persist::write_atomic(path, &bytes)?;

        log::info!(
            "Q-table saved: {} ({} entries, {} bytes, {:.3}s, compression: {})",
            path.display(),
            self.len(),
            bytes.len(),
            start_time.elapsed().as_secs_f64(),
            compress
        );

        Ok(bytes.len() as u64)
    }

    /// Load from `path`.
    ///
    /// # Errors
    ///
    /// `LearningError::Io` when the file can't be read, `InvalidBlob` when it
    /// isn't a valid blob.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LearningError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let table = Self::from_bytes(&bytes)?;
        log::info!(
            "Q-table loaded: {} ({} entries)",
            path.display(),
            table.len()
        );
        Ok(table)
    }

    /// Load from `path`, falling back to an empty table on any failure.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(table) => table,
            Err(LearningError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No Q-table at {}, starting empty", path.display());
                Self::new()
            }
            Err(e) => {
                log::warn!(
                    "Failed to load Q-table from {}: {}; starting empty",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_table() -> QTable {
        let mut table = QTable::new();
        table.set("a_0_0", 1.25);
        table.set("b_3_4", -7.5);
        table.set("c_7_7", 0.0);
        table
    }

    #[test]
    fn test_get_does_not_insert() {
        let table = QTable::new();
        assert_eq!(table.get("nothing"), 0.0);
        assert!(!table.contains_key("nothing"));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_header_is_32_bytes() {
        let header = QTableHeader::new(3, true);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), QTableHeader::SIZE);
        assert_eq!(&bytes[0..4], QTABLE_MAGIC);

        let parsed = QTableHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.is_compressed());
    }

    #[test]
    fn test_bytes_roundtrip_both_encodings() {
        let table = sample_table();
        for compress in [true, false] {
            let bytes = table.to_bytes(compress).unwrap();
            assert_eq!(QTable::from_bytes(&bytes).unwrap(), table);
        }
    }

    #[test]
    fn test_equal_tables_encode_identically() {
        let a = sample_table();
        let mut b = QTable::new();
        b.set("c_7_7", 0.0);
        b.set("a_0_0", 1.25);
        b.set("b_3_4", -7.5);

        // payloads match; headers differ only by timestamp
        let bytes_a = a.to_bytes(false).unwrap();
        let bytes_b = b.to_bytes(false).unwrap();
        assert_eq!(bytes_a[QTableHeader::SIZE..], bytes_b[QTableHeader::SIZE..]);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = sample_table().to_bytes(true).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            QTable::from_bytes(&bytes),
            Err(LearningError::InvalidBlob(_))
        ));
    }

    #[test]
    fn test_corruption_detected_by_checksum() {
        let mut bytes = sample_table().to_bytes(false).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = QTable::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("Checksum"));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let bytes = sample_table().to_bytes(true).unwrap();
        assert!(QTable::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("qtable.blob");

        let table = sample_table();
        let written = table.save(&path).unwrap();
        assert_eq!(written, fs::metadata(&path).unwrap().len());

        let loaded = QTable::load(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_load_or_empty_on_missing_and_corrupt() {
        let dir = tempdir().unwrap();

        let missing = QTable::load_or_empty(dir.path().join("missing.blob"));
        assert!(missing.is_empty());

        let corrupt_path = dir.path().join("corrupt.blob");
        fs::write(&corrupt_path, b"definitely not a blob").unwrap();
        let corrupt = QTable::load_or_empty(&corrupt_path);
        assert!(corrupt.is_empty());
    }
}
