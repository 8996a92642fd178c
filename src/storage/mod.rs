//! Storage Module
//!
//! Pluggable persistence for chunk blobs and the directory blob.
//!
//! ## Responsibilities
//! - Batched CRUD over chunk payloads keyed by id
//! - Round-trip of the directory blob
//! - Serialization (and compression) of payloads where the medium
//!   requires it; the in-memory store keeps live values instead
//!
//! The engine talks to back-ends only through [`ChunkStorage`], so a
//! transactional store can be plugged in without engine changes.

mod memory;
mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::meta::Meta;

pub use memory::InMemoryChunkStorage;
pub use sqlite::SqliteChunkStorage;

/// CRUD contract between the engine and a back-end
pub trait ChunkStorage {
    /// Fetch chunks by id
    ///
    /// On success the map holds one entry per requested id: the chunk
    /// if present, `None` if the back-end has no blob for it. Never a
    /// partial map.
    fn read(&self, ids: &[u32]) -> Result<HashMap<u32, Option<Chunk>>>;

    /// Upsert all entries, atomically at the back-end's granularity
    fn save(&self, chunks: HashMap<u32, Chunk>) -> Result<()>;

    /// Delete chunks; missing ids are a no-op
    fn remove(&self, ids: &[u32]) -> Result<()>;

    /// Load the directory; an empty directory (not an error) if none
    /// is persisted
    fn read_meta(&self) -> Result<Meta>;

    /// Upsert the directory blob
    fn save_meta(&self, meta: &Meta) -> Result<()>;
}

// Shared back-ends: lets tests keep a handle to the store an engine owns
impl<S: ChunkStorage + ?Sized> ChunkStorage for Arc<S> {
    fn read(&self, ids: &[u32]) -> Result<HashMap<u32, Option<Chunk>>> {
        (**self).read(ids)
    }

    fn save(&self, chunks: HashMap<u32, Chunk>) -> Result<()> {
        (**self).save(chunks)
    }

    fn remove(&self, ids: &[u32]) -> Result<()> {
        (**self).remove(ids)
    }

    fn read_meta(&self) -> Result<Meta> {
        (**self).read_meta()
    }

    fn save_meta(&self, meta: &Meta) -> Result<()> {
        (**self).save_meta(meta)
    }
}
