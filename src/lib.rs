//! # chunkset
//!
//! A chunked sorted-integer index:
//! - Bulk insertion and deletion over sets of `u32` items
//! - Bounded chunks kept ascending and duplicate-free, split and
//!   merged as they grow and shrink
//! - Compressed chunk directory for routing without loading payloads
//! - Streaming range queries with lazy chunk loading
//! - Pluggable storage back-ends (in-memory, transactional SQLite)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SortedArray                             │
//! │        (planning, dirty tracking, split / merge)             │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//! ┌──────────▼──────────┐        ┌──────────▼──────────┐
//! │        Meta         │        │     Chunk Cache     │
//! │  (chunk directory)  │        │   (Mutex, by id)    │
//! └──────────┬──────────┘        └──────────┬──────────┘
//!            │                              │
//! ┌──────────▼──────────────────────────────▼───────────────────┐
//! │                       ChunkStorage                           │
//! │            (InMemory  |  SQLite, one table)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod chunk;
mod codec;
pub mod meta;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ChunkSetError, Result};
pub use config::Config;
pub use chunk::Chunk;
pub use meta::{ChunkMeta, Meta};
pub use storage::{ChunkStorage, InMemoryChunkStorage, SqliteChunkStorage};
pub use engine::{RangeScan, SortedArray};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of chunkset
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
