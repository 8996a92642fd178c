//! In-memory back-end
//!
//! Backing maps only; every operation is infallible. Stores live
//! values rather than serialized blobs, so it doubles as the reference
//! implementation for the storage contract in tests.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::meta::Meta;

use super::ChunkStorage;

/// Back-end holding chunks and the directory in process memory
pub struct InMemoryChunkStorage {
    chunks: RwLock<HashMap<u32, Chunk>>,
    meta: RwLock<Option<Meta>>,
}

impl InMemoryChunkStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            meta: RwLock::new(None),
        }
    }

    /// Number of chunks currently stored (diagnostics)
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }
}

impl Default for InMemoryChunkStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStorage for InMemoryChunkStorage {
    fn read(&self, ids: &[u32]) -> Result<HashMap<u32, Option<Chunk>>> {
        let chunks = self.chunks.read();
        Ok(ids
            .iter()
            .map(|&id| (id, chunks.get(&id).cloned()))
            .collect())
    }

    fn save(&self, chunks: HashMap<u32, Chunk>) -> Result<()> {
        self.chunks.write().extend(chunks);
        Ok(())
    }

    fn remove(&self, ids: &[u32]) -> Result<()> {
        let mut chunks = self.chunks.write();
        for id in ids {
            chunks.remove(id);
        }
        Ok(())
    }

    fn read_meta(&self) -> Result<Meta> {
        Ok(self.meta.read().clone().unwrap_or_default())
    }

    fn save_meta(&self, meta: &Meta) -> Result<()> {
        *self.meta.write() = Some(meta.clone());
        Ok(())
    }
}
