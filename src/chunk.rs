//! Chunk
//!
//! A bounded run of strictly ascending, duplicate-free `u32` items.
//! Chunks are the unit of storage: the engine loads, mutates, and
//! flushes them as whole blobs.
//!
//! ## Blob Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (10 bytes)                                       │
//! │   Magic: "CSCK" (4) | Version: u16 (2) | Len: u32 (4)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Item Stream (Len bytes)                                 │
//! │   delta + varint compressed (see codec)                 │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                        │
//! │   StreamCRC: u32 (4)                                    │
//! └─────────────────────────────────────────────────────────┘
//! ```

use crate::codec;
use crate::error::{ChunkSetError, Result};

/// Magic bytes identifying a serialized chunk
const MAGIC: &[u8; 4] = b"CSCK";

/// Current chunk blob format version
const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + StreamLen (4) = 10 bytes
const HEADER_SIZE: usize = 10;

/// Footer size: StreamCRC (4) = 4 bytes
const FOOTER_SIZE: usize = 4;

/// An ascending, duplicate-free run of `u32` items
///
/// A chunk has no intrinsic identity; its id lives in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    items: Vec<u32>,
}

impl Chunk {
    /// Create a chunk from arbitrary items (sorted and deduplicated)
    pub fn new(mut items: Vec<u32>) -> Self {
        items.sort_unstable();
        items.dedup();
        Self { items }
    }

    /// Merge new items into the chunk, keeping it sorted and unique
    ///
    /// Returns the number of items not previously present. Input need
    /// not be sorted; duplicates within the input are deduplicated
    /// against the chunk and against each other as insertion proceeds.
    /// Performs a single bulk allocation sized for the incoming items.
    pub fn add(&mut self, items: &[u32]) -> usize {
        if items.is_empty() {
            return 0;
        }

        // Count items not already present so one allocation suffices
        let fresh = items.iter().filter(|&&item| !self.contains(item)).count();
        if fresh == 0 {
            return 0;
        }

        let mut merged = Vec::with_capacity(self.items.len() + fresh);
        merged.extend_from_slice(&self.items);

        let mut added = 0;
        for &item in items {
            // Binary search over the live run catches duplicates within
            // the input as well as against the original items
            match merged.binary_search(&item) {
                Ok(_) => {}
                Err(pos) => {
                    merged.insert(pos, item);
                    added += 1;
                }
            }
        }

        self.items = merged;
        added
    }

    /// Remove items in place; absent items are a no-op
    ///
    /// Returns the number of items actually removed.
    pub fn remove(&mut self, items: &[u32]) -> usize {
        let mut removed = 0;
        for &item in items {
            if let Ok(pos) = self.items.binary_search(&item) {
                self.items.remove(pos);
                removed += 1;
            }
        }
        removed
    }

    /// Check membership via binary search
    pub fn contains(&self, item: u32) -> bool {
        self.items.binary_search(&item).is_ok()
    }

    /// Items `x` with `from <= x <= to`, in order
    ///
    /// Panics if `from > to`: an inverted range is a bug in the caller,
    /// not recoverable input.
    pub fn get_in_range(&self, from: u32, to: u32) -> &[u32] {
        assert!(from <= to, "inverted range: from {} > to {}", from, to);
        let lo = self.items.partition_point(|&x| x < from);
        let hi = self.items.partition_point(|&x| x <= to);
        &self.items[lo..hi]
    }

    /// Split off the upper half starting at `at`, leaving the lower half
    pub fn split_off(&mut self, at: usize) -> Chunk {
        Chunk {
            items: self.items.split_off(at),
        }
    }

    /// All items, ascending
    pub fn items(&self) -> &[u32] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize to a self-contained blob
    pub fn serialize(&self) -> Vec<u8> {
        let stream = codec::encode(&self.items);

        let mut out = Vec::with_capacity(HEADER_SIZE + stream.len() + FOOTER_SIZE);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(stream.len() as u32).to_le_bytes());
        out.extend_from_slice(&stream);
        out.extend_from_slice(&crc32fast::hash(&stream).to_le_bytes());
        out
    }

    /// Deserialize a blob produced by [`Chunk::serialize`]
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(ChunkSetError::Serialization(format!(
                "Chunk blob too short: {} bytes",
                bytes.len()
            )));
        }

        if &bytes[0..4] != MAGIC {
            return Err(ChunkSetError::Serialization(format!(
                "Invalid chunk magic: expected CSCK, got {:?}",
                &bytes[0..4]
            )));
        }

        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(ChunkSetError::Serialization(format!(
                "Unsupported chunk version: {}",
                version
            )));
        }

        let stream_len = u32::from_le_bytes(bytes[6..10].try_into().unwrap()) as usize;
        let stream_end = HEADER_SIZE + stream_len;
        if bytes.len() != stream_end + FOOTER_SIZE {
            return Err(ChunkSetError::Serialization(format!(
                "Chunk blob length mismatch: header says {}, got {}",
                stream_end + FOOTER_SIZE,
                bytes.len()
            )));
        }

        let stream = &bytes[HEADER_SIZE..stream_end];
        let crc = u32::from_le_bytes(bytes[stream_end..].try_into().unwrap());
        if crc32fast::hash(stream) != crc {
            return Err(ChunkSetError::Serialization(
                "Chunk CRC mismatch".to_string(),
            ));
        }

        let items = codec::decode(stream)?;
        if items.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ChunkSetError::Serialization(
                "Chunk items not strictly ascending".to_string(),
            ));
        }

        Ok(Self { items })
    }
}
