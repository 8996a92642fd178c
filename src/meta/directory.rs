//! Directory implementation
//!
//! An ordered, non-overlapping list of chunk descriptors plus the id
//! allocator. All lookups are binary searches over the `min`-sorted
//! entries.

use std::cmp::Ordering;

use crate::codec;
use crate::error::{ChunkSetError, Result};

use super::{ChunkMeta, FOOTER_SIZE, HEADER_SIZE, MAGIC, STREAM_COUNT, VERSION};

/// The chunk directory
///
/// Invariants, upheld by every mutation:
/// - entries sorted by `min` ascending
/// - entry ranges strictly disjoint (`a.max < b.min` for `a` before `b`)
/// - ids unique, `next_id` greater than every present id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    next_id: u32,
    entries: Vec<ChunkMeta>,
}

impl Default for Meta {
    fn default() -> Self {
        Self::new()
    }
}

impl Meta {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Return the next available id and advance the allocator
    ///
    /// Ids start from 0 and are never recycled.
    pub fn take_next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Reset the allocator to `max(id) + 1` across all entries (0 if empty)
    ///
    /// Called after loading from storage: back-ends need not persist the
    /// allocator separately for correctness.
    pub fn recompute_next_id(&mut self) {
        self.next_id = self
            .entries
            .iter()
            .map(|cm| cm.id + 1)
            .max()
            .unwrap_or(0);
    }

    /// Current allocator value (diagnostics)
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Insert descriptors, preserving order and disjointness
    ///
    /// Panics if a candidate overlaps an existing entry or has
    /// `min > max`: both indicate a bug in the engine.
    pub fn add(&mut self, metas: &[ChunkMeta]) {
        self.entries.reserve(metas.len());

        for &meta in metas {
            assert!(
                meta.min <= meta.max,
                "invalid chunk meta: {:?}",
                meta
            );

            let pos = match self.find_pos_for_meta(meta.min) {
                Ok(pos) => panic!(
                    "new chunk meta {:?} intersects existing {:?}",
                    meta, self.entries[pos]
                ),
                Err(pos) => pos,
            };

            // An insertion point alone does not prove disjointness:
            // check the entry at the position and its predecessor
            if pos < self.entries.len() {
                assert!(
                    !self.entries[pos].intersects(&meta),
                    "new chunk meta {:?} intersects existing {:?}",
                    meta,
                    self.entries[pos]
                );
            }
            if pos > 0 {
                assert!(
                    !self.entries[pos - 1].intersects(&meta),
                    "new chunk meta {:?} intersects existing {:?}",
                    meta,
                    self.entries[pos - 1]
                );
            }

            self.entries.insert(pos, meta);
        }
    }

    /// Remove the entry with the same `min`; no-op if absent
    pub fn remove(&mut self, meta: &ChunkMeta) {
        if let Ok(pos) = self.find_pos_for_meta(meta.min) {
            self.entries.remove(pos);
        }
    }

    /// The unique entry whose range contains `item`, if any
    pub fn find_relevant_for_read(&self, item: u32) -> Option<&ChunkMeta> {
        match self.find_pos_for_item(item) {
            Ok(pos) => Some(&self.entries[pos]),
            Err(_) => None,
        }
    }

    /// Entries whose ranges intersect `[min, max]`, in directory order
    pub fn find_relevant_for_read_range(&self, min: u32, max: u32) -> &[ChunkMeta] {
        let start = self.entries.partition_point(|cm| cm.max < min);
        let end = self.entries.partition_point(|cm| cm.min <= max);
        &self.entries[start..end]
    }

    /// Candidate entries for inserting `item`: 0, 1, or 2
    ///
    /// One candidate when the item lies within an entry's range or
    /// outside the directory's span (the nearest boundary entry); two
    /// when it falls strictly between adjacent entries, left first.
    pub fn find_relevant_for_insert(&self, item: u32) -> Vec<&ChunkMeta> {
        match self.find_pos_for_item(item) {
            Ok(pos) => vec![&self.entries[pos]],
            Err(pos) => {
                let mut out = Vec::with_capacity(2);
                if pos > 0 {
                    out.push(&self.entries[pos - 1]);
                }
                if pos < self.entries.len() {
                    out.push(&self.entries[pos]);
                }
                out
            }
        }
    }

    /// Mutable handle to the entry with the given id
    ///
    /// Linear scan: the engine only asks for ids it was just handed by
    /// planning, so the cost stays bounded by the batch size.
    pub fn get_chunk_by_id(&mut self, id: u32) -> Option<&mut ChunkMeta> {
        self.entries.iter_mut().find(|cm| cm.id == id)
    }

    /// All entries in directory order
    pub fn entries(&self) -> &[ChunkMeta] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // =========================================================================
    // Lookup Internals
    // =========================================================================

    /// Position where an entry with this `min` is or would be
    fn find_pos_for_meta(&self, min: u32) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by(|cm| cm.min.cmp(&min))
    }

    /// Position of the entry containing `item`, or its insertion point
    fn find_pos_for_item(&self, item: u32) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by(|cm| {
            if cm.contains(item) {
                Ordering::Equal
            } else if cm.max < item {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        })
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize as five independently compressed streams
    ///
    /// The four descriptor columns are compressed in parallel on the
    /// rayon pool; a sequential encode would be byte-identical.
    pub fn serialize(&self) -> Vec<u8> {
        let ids: Vec<u32> = self.entries.iter().map(|cm| cm.id).collect();
        let mins: Vec<u32> = self.entries.iter().map(|cm| cm.min).collect();
        let maxs: Vec<u32> = self.entries.iter().map(|cm| cm.max).collect();
        let sizes: Vec<u32> = self.entries.iter().map(|cm| cm.size).collect();

        let next_id_stream = codec::encode(&[self.next_id]);
        let ((ids_stream, mins_stream), (maxs_stream, sizes_stream)) = rayon::join(
            || rayon::join(|| codec::encode(&ids), || codec::encode(&mins)),
            || rayon::join(|| codec::encode(&maxs), || codec::encode(&sizes)),
        );

        let streams = [
            &next_id_stream,
            &ids_stream,
            &mins_stream,
            &maxs_stream,
            &sizes_stream,
        ];

        let body_len: usize = streams.iter().map(|s| 4 + s.len()).sum();
        let mut body = Vec::with_capacity(body_len);
        for stream in streams {
            body.extend_from_slice(&(stream.len() as u32).to_le_bytes());
            body.extend_from_slice(stream);
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len() + FOOTER_SIZE);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        out
    }

    /// Deserialize a blob produced by [`Meta::serialize`]
    ///
    /// Validates framing, CRC, and the directory invariants; a blob
    /// that decodes to an unsorted or overlapping directory is treated
    /// as corrupt, not as a programmer error.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(ChunkSetError::Serialization(format!(
                "Directory blob too short: {} bytes",
                bytes.len()
            )));
        }

        if &bytes[0..4] != MAGIC {
            return Err(ChunkSetError::Serialization(format!(
                "Invalid directory magic: expected CSMT, got {:?}",
                &bytes[0..4]
            )));
        }

        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(ChunkSetError::Serialization(format!(
                "Unsupported directory version: {}",
                version
            )));
        }

        let body = &bytes[HEADER_SIZE..bytes.len() - FOOTER_SIZE];
        let crc = u32::from_le_bytes(bytes[bytes.len() - FOOTER_SIZE..].try_into().unwrap());
        if crc32fast::hash(body) != crc {
            return Err(ChunkSetError::Serialization(
                "Directory CRC mismatch".to_string(),
            ));
        }

        // Slice out the five length-prefixed streams
        let mut streams: Vec<&[u8]> = Vec::with_capacity(STREAM_COUNT);
        let mut pos = 0;
        for _ in 0..STREAM_COUNT {
            if pos + 4 > body.len() {
                return Err(ChunkSetError::Serialization(
                    "Truncated directory stream header".to_string(),
                ));
            }
            let len = u32::from_le_bytes(body[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + len > body.len() {
                return Err(ChunkSetError::Serialization(
                    "Truncated directory stream".to_string(),
                ));
            }
            streams.push(&body[pos..pos + len]);
            pos += len;
        }
        if pos != body.len() {
            return Err(ChunkSetError::Serialization(format!(
                "{} trailing bytes after directory streams",
                body.len() - pos
            )));
        }

        let next_id_stream = codec::decode(streams[0])?;
        let ((ids, mins), (maxs, sizes)) = rayon::join(
            || rayon::join(|| codec::decode(streams[1]), || codec::decode(streams[2])),
            || rayon::join(|| codec::decode(streams[3]), || codec::decode(streams[4])),
        );
        let (ids, mins, maxs, sizes) = (ids?, mins?, maxs?, sizes?);

        if next_id_stream.len() != 1 {
            return Err(ChunkSetError::Serialization(format!(
                "Expected single-element next_id stream, got {} elements",
                next_id_stream.len()
            )));
        }
        if ids.len() != mins.len() || ids.len() != maxs.len() || ids.len() != sizes.len() {
            return Err(ChunkSetError::Serialization(format!(
                "Directory stream length mismatch: id={} min={} max={} size={}",
                ids.len(),
                mins.len(),
                maxs.len(),
                sizes.len()
            )));
        }

        let entries: Vec<ChunkMeta> = (0..ids.len())
            .map(|i| ChunkMeta::new(ids[i], mins[i], maxs[i], sizes[i]))
            .collect();

        for pair in entries.windows(2) {
            if pair[0].max >= pair[1].min {
                return Err(ChunkSetError::Serialization(format!(
                    "Directory entries out of order or overlapping: {:?} / {:?}",
                    pair[0], pair[1]
                )));
            }
        }
        for entry in &entries {
            if entry.min > entry.max {
                return Err(ChunkSetError::Serialization(format!(
                    "Directory entry with inverted range: {:?}",
                    entry
                )));
            }
        }

        Ok(Self {
            next_id: next_id_stream[0],
            entries,
        })
    }
}
