//! Chunk Directory
//!
//! The ordered index of chunk descriptors, one per live chunk. The
//! engine consults it to route items to chunks before loading anything
//! from storage.
//!
//! ## Blob Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                        │
//! │   Magic: "CSMT" (4) | Version: u16 (2)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Streams (5 × variable)                                  │
//! │   [Len: u32][Stream]  for each of:                      │
//! │     next_id (single element)                            │
//! │     id[] | min[] | max[] | size[]                       │
//! │   each delta + varint compressed independently          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                        │
//! │   StreamsCRC: u32 (4)                                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! `min` and `max` are monotonic across the directory and `id` usually
//! is, so the four descriptor streams compress well as columns.

mod chunk_meta;
mod directory;

pub use chunk_meta::ChunkMeta;
pub use directory::Meta;

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a serialized directory
pub(crate) const MAGIC: &[u8; 4] = b"CSMT";

/// Current directory blob format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) = 6 bytes
pub(crate) const HEADER_SIZE: usize = 6;

/// Footer size: StreamsCRC (4) = 4 bytes
pub(crate) const FOOTER_SIZE: usize = 4;

/// Streams per envelope: next_id + the four descriptor columns
pub(crate) const STREAM_COUNT: usize = 5;
