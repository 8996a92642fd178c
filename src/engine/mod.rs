//! Engine Module
//!
//! The `SortedArray` façade that coordinates all components.
//!
//! ## Responsibilities
//! - Route batches of items to chunks via the directory
//! - Load chunks on demand, track dirty state, flush on request
//! - Rebalance: split oversize chunks after insertions, merge
//!   underfull neighbours after deletions
//!
//! ## Concurrency
//! - One logical writer per instance: mutating operations take
//!   `&mut self`
//! - Range scans take `&self` and may run concurrently; the chunk
//!   cache sits behind a mutex held briefly per chunk
//! - Only back-end calls block; everything in memory is lock-and-go

mod range_scan;

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::debug;

use crate::chunk::Chunk;
use crate::config::Config;
use crate::error::{ChunkSetError, Result};
use crate::meta::{ChunkMeta, Meta};
use crate::storage::ChunkStorage;

pub use range_scan::RangeScan;

/// A chunked sorted set of `u32` items over a storage back-end
///
/// Items live in bounded ascending chunks; a compressed directory maps
/// item ranges to chunk ids so only the chunks a batch touches are
/// ever loaded.
///
/// If a mutating operation surfaces a back-end error, the in-memory
/// state may be partially updated; treat the instance as tainted and
/// rebuild it over the same storage.
pub struct SortedArray<S: ChunkStorage> {
    /// Chunk size cap enforced at operation boundaries
    max_chunk_size: u32,

    /// Directory, loaded lazily on first operation
    meta: Mutex<Option<Meta>>,

    /// Chunk cache; the single mutex guarding loaded payloads
    loaded: Mutex<HashMap<u32, Chunk>>,

    /// Ids of loaded chunks pending flush
    dirty_chunks: HashSet<u32>,

    /// Directory is pending flush
    dirty_meta: bool,

    storage: S,
}

impl<S: ChunkStorage> SortedArray<S> {
    /// Create an engine over a back-end
    pub fn new(storage: S, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_chunk_size: config.max_chunk_size,
            meta: Mutex::new(None),
            loaded: Mutex::new(HashMap::new()),
            dirty_chunks: HashSet::new(),
            dirty_meta: false,
            storage,
        })
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Bulk-insert items; duplicates are absorbed silently
    ///
    /// Returns the number of items actually inserted.
    pub fn add(&mut self, items: &[u32]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut rest = items;
        let mut total = 0;

        // Seed an empty directory with a one-item chunk; afterwards
        // only split creates chunks
        if self.meta_mut()?.is_empty() {
            if let Some((&first, tail)) = rest.split_first() {
                self.create_chunk(Chunk::new(vec![first]));
                total += 1;
                rest = tail;
            }
            if rest.is_empty() {
                return Ok(total);
            }
        }

        // Plan: bucket each item under its target chunk id
        let mut plan: HashMap<u32, Vec<u32>> = HashMap::new();
        {
            let meta = self.meta_loaded_mut();
            for &item in rest {
                let id = Self::select_chunk_for_insertion(meta, item)?;
                plan.entry(id).or_default().push(item);
            }
        }

        let ids: Vec<u32> = plan.keys().copied().collect();
        self.load_missing(&ids)?;

        // Apply per chunk; untouched chunks stay clean
        for (&id, batch) in &plan {
            let grown = {
                let mut cache = self.loaded.lock();
                let chunk = match cache.get_mut(&id) {
                    Some(chunk) => chunk,
                    None => return Err(ChunkSetError::ChunkMissing(id)),
                };
                let added = chunk.add(batch);
                if added == 0 {
                    None
                } else {
                    let items = chunk.items();
                    Some((added, items[0], items[items.len() - 1]))
                }
            };

            if let Some((added, first, last)) = grown {
                total += added;
                self.dirty_chunks.insert(id);
                let cm = self
                    .meta_loaded_mut()
                    .get_chunk_by_id(id)
                    .expect("planned chunk has a directory entry");
                cm.size += added as u32;
                cm.min = cm.min.min(first);
                cm.max = cm.max.max(last);
                self.dirty_meta = true;
            }
        }

        self.split_oversize()?;
        Ok(total)
    }

    /// Bulk-delete items; absent items are a no-op
    ///
    /// Returns the number of items actually removed.
    pub fn delete(&mut self, items: &[u32]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        // Deleting from an empty index is a no-op, not an error
        if self.meta_mut()?.is_empty() {
            return Ok(0);
        }

        // Plan: items outside every range still route to the nearest
        // chunk, where remove quietly finds nothing
        let mut plan: HashMap<u32, Vec<u32>> = HashMap::new();
        {
            let meta = self.meta_loaded_mut();
            for &item in items {
                let id = Self::select_chunk_for_insertion(meta, item)?;
                plan.entry(id).or_default().push(item);
            }
        }

        let ids: Vec<u32> = plan.keys().copied().collect();
        self.load_missing(&ids)?;

        let mut total = 0;
        let mut empties: Vec<u32> = Vec::new();
        for (&id, batch) in &plan {
            let shrunk = {
                let mut cache = self.loaded.lock();
                let chunk = match cache.get_mut(&id) {
                    Some(chunk) => chunk,
                    None => return Err(ChunkSetError::ChunkMissing(id)),
                };
                let removed = chunk.remove(batch);
                if removed == 0 {
                    None
                } else if chunk.is_empty() {
                    Some((removed, None))
                } else {
                    let items = chunk.items();
                    Some((removed, Some((items[0], items[items.len() - 1]))))
                }
            };

            match shrunk {
                None => {}
                Some((removed, None)) => {
                    // Ran empty: destroyed below, meta left as-is
                    total += removed;
                    empties.push(id);
                }
                Some((removed, Some((first, last)))) => {
                    total += removed;
                    self.dirty_chunks.insert(id);
                    let cm = self
                        .meta_loaded_mut()
                        .get_chunk_by_id(id)
                        .expect("planned chunk has a directory entry");
                    cm.size -= removed as u32;
                    cm.min = first;
                    cm.max = last;
                    self.dirty_meta = true;
                }
            }
        }

        if !empties.is_empty() {
            self.storage.remove(&empties)?;
            {
                let mut cache = self.loaded.lock();
                for id in &empties {
                    cache.remove(id);
                    self.dirty_chunks.remove(id);
                }
            }
            let meta = self.meta_loaded_mut();
            for &id in &empties {
                if let Some(cm) = meta.get_chunk_by_id(id) {
                    let cm = *cm;
                    meta.remove(&cm);
                }
            }
            self.dirty_meta = true;
            debug!(count = empties.len(), "destroyed empty chunks");
        }

        self.merge_adjacent()?;
        Ok(total)
    }

    /// Point membership test
    pub fn contains(&self, item: u32) -> Result<bool> {
        let id = self.with_meta(|meta| meta.find_relevant_for_read(item).map(|cm| cm.id))?;
        let id = match id {
            Some(id) => id,
            None => return Ok(false),
        };

        {
            let cache = self.loaded.lock();
            if let Some(chunk) = cache.get(&id) {
                return Ok(chunk.contains(item));
            }
        }

        let mut read = self.storage.read(&[id])?;
        match read.remove(&id).flatten() {
            Some(chunk) => Ok(chunk.contains(item)),
            None => Err(ChunkSetError::ChunkMissing(id)),
        }
    }

    /// Stream items `x` with `min <= x <= max` in ascending order
    ///
    /// Chunks are loaded lazily as the scan advances and released once
    /// their items have been yielded, unless they are dirty. Dropping
    /// the iterator cancels the scan; no further loads are issued.
    ///
    /// Panics if `min > max`.
    pub fn get_in_range(&self, min: u32, max: u32) -> Result<RangeScan<'_, S>> {
        assert!(min <= max, "inverted range: min {} > max {}", min, max);
        let ids: Vec<u32> = self.with_meta(|meta| {
            meta.find_relevant_for_read_range(min, max)
                .iter()
                .map(|cm| cm.id)
                .collect()
        })?;
        Ok(RangeScan::new(self, ids, min, max))
    }

    /// Dump the whole index into one ordered vector (debugging/tests)
    pub fn to_vec(&self) -> Result<Vec<u32>> {
        self.get_in_range(0, u32::MAX)?.collect()
    }

    /// Total number of items, from directory sizes alone
    pub fn len(&self) -> Result<u64> {
        self.with_meta(|meta| meta.entries().iter().map(|cm| cm.size as u64).sum())
    }

    /// Check if the index holds no items
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of chunks in the directory
    pub fn chunk_count(&self) -> Result<usize> {
        self.with_meta(|meta| meta.len())
    }

    /// Snapshot of the chunk directory (diagnostics)
    pub fn metas(&self) -> Result<Vec<ChunkMeta>> {
        self.with_meta(|meta| meta.entries().to_vec())
    }

    /// Write all dirty state back to storage
    ///
    /// The directory goes first, then every dirty chunk in one batched
    /// save. Chunks leave the cache only after the save succeeds; on
    /// error the dirty bookkeeping is untouched and flush can be
    /// retried.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty_meta {
            let Self { meta, storage, .. } = self;
            if let Some(meta) = meta.get_mut().as_ref() {
                storage.save_meta(meta)?;
            }
            self.dirty_meta = false;
        }

        if self.dirty_chunks.is_empty() {
            return Ok(());
        }

        let batch: HashMap<u32, Chunk> = {
            let cache = self.loaded.lock();
            self.dirty_chunks
                .iter()
                .map(|&id| match cache.get(&id) {
                    Some(chunk) => Ok((id, chunk.clone())),
                    None => Err(ChunkSetError::ChunkMissing(id)),
                })
                .collect::<Result<_>>()?
        };
        let flushed = batch.len();
        self.storage.save(batch)?;

        // Evict on successful save only
        let mut cache = self.loaded.lock();
        for id in self.dirty_chunks.drain() {
            cache.remove(&id);
        }
        debug!(chunks = flushed, "flushed dirty state");
        Ok(())
    }

    // =========================================================================
    // Planning
    // =========================================================================

    /// Pick the chunk an item should be inserted into
    ///
    /// Two-candidate case (item strictly between adjacent chunks):
    /// prefer the smaller side to balance occupancy and defer splits;
    /// ties go to the right neighbour.
    fn select_chunk_for_insertion(meta: &Meta, item: u32) -> Result<u32> {
        let candidates = meta.find_relevant_for_insert(item);
        match candidates.as_slice() {
            [] => Err(ChunkSetError::NoChunkFound),
            [only] => Ok(only.id),
            [left, right] => {
                if left.size < right.size {
                    Ok(left.id)
                } else {
                    Ok(right.id)
                }
            }
            _ => unreachable!("find_relevant_for_insert returns at most two entries"),
        }
    }

    // =========================================================================
    // Rebalancing
    // =========================================================================

    /// Split chunks above the cap until none remain
    ///
    /// Splitting a chunk of length L yields halves of ceil(L/2) and
    /// floor(L/2), both shorter than L, so this terminates.
    fn split_oversize(&mut self) -> Result<()> {
        loop {
            let max = self.max_chunk_size;
            let oversize = self
                .meta_loaded_mut()
                .entries()
                .iter()
                .find(|cm| cm.size > max)
                .copied();
            let cm = match oversize {
                Some(cm) => cm,
                None => return Ok(()),
            };

            self.load_missing(&[cm.id])?;

            let (upper, left_last, left_len) = {
                let mut cache = self.loaded.lock();
                let chunk = match cache.get_mut(&cm.id) {
                    Some(chunk) => chunk,
                    None => return Err(ChunkSetError::ChunkMissing(cm.id)),
                };
                let half = (chunk.len() + 1) / 2;
                let upper = chunk.split_off(half);
                let items = chunk.items();
                (upper, items[items.len() - 1], chunk.len())
            };

            self.dirty_chunks.insert(cm.id);
            {
                // Shrink the left entry before inserting the right one
                // so the directory never sees an overlap
                let left = self
                    .meta_loaded_mut()
                    .get_chunk_by_id(cm.id)
                    .expect("split candidate has a directory entry");
                left.size = left_len as u32;
                left.max = left_last;
            }
            self.dirty_meta = true;

            let new_id = self.create_chunk(upper);
            debug!(chunk = cm.id, new_chunk = new_id, "split oversize chunk");
        }
    }

    /// Merge adjacent chunk pairs whose combined size fits the cap
    ///
    /// One pass over the directory; after a pair is marked the next
    /// index is skipped, so no three-way merges happen in a single
    /// pass. The next delete runs another pass if more is possible.
    fn merge_adjacent(&mut self) -> Result<()> {
        let pairs: Vec<(ChunkMeta, ChunkMeta)> = {
            let max = self.max_chunk_size;
            let entries = self.meta_loaded_mut().entries();
            let mut pairs = Vec::new();
            let mut i = 1;
            while i < entries.len() {
                if entries[i - 1].size + entries[i].size <= max {
                    pairs.push((entries[i - 1], entries[i]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            pairs
        };
        if pairs.is_empty() {
            return Ok(());
        }

        let ids: Vec<u32> = pairs.iter().flat_map(|&(a, b)| [a.id, b.id]).collect();
        self.load_missing(&ids)?;

        for (a, b) in pairs {
            {
                let mut cache = self.loaded.lock();
                let consumed = match cache.remove(&b.id) {
                    Some(chunk) => chunk,
                    None => return Err(ChunkSetError::ChunkMissing(b.id)),
                };
                let target = match cache.get_mut(&a.id) {
                    Some(chunk) => chunk,
                    None => return Err(ChunkSetError::ChunkMissing(a.id)),
                };
                target.add(consumed.items());
            }

            self.dirty_chunks.insert(a.id);
            self.dirty_chunks.remove(&b.id);
            {
                let meta = self.meta_loaded_mut();
                if let Some(cm) = meta.get_chunk_by_id(a.id) {
                    cm.size += b.size;
                    cm.max = b.max;
                }
                meta.remove(&b);
            }
            self.dirty_meta = true;
            self.storage.remove(&[b.id])?;
            debug!(into = a.id, consumed = b.id, "merged adjacent chunks");
        }
        Ok(())
    }

    // =========================================================================
    // Chunk & Directory Plumbing
    // =========================================================================

    /// Register a freshly built chunk: allocate an id, insert the
    /// directory entry, mark everything dirty
    fn create_chunk(&mut self, chunk: Chunk) -> u32 {
        assert!(!chunk.is_empty(), "cannot register an empty chunk");
        let items = chunk.items();
        let (min, max, size) = (items[0], items[items.len() - 1], chunk.len() as u32);

        let meta = self.meta_loaded_mut();
        let id = meta.take_next_id();
        meta.add(&[ChunkMeta::new(id, min, max, size)]);
        self.dirty_meta = true;

        self.loaded.lock().insert(id, chunk);
        self.dirty_chunks.insert(id);
        id
    }

    /// Fetch any of `ids` not already cached from the back-end
    fn load_missing(&mut self, ids: &[u32]) -> Result<()> {
        let missing: Vec<u32> = {
            let cache = self.loaded.lock();
            ids.iter()
                .copied()
                .filter(|id| !cache.contains_key(id))
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }

        let mut read = self.storage.read(&missing)?;
        let mut cache = self.loaded.lock();
        for &id in &missing {
            match read.remove(&id).flatten() {
                Some(chunk) => {
                    cache.insert(id, chunk);
                }
                None => return Err(ChunkSetError::ChunkMissing(id)),
            }
        }
        Ok(())
    }

    /// Load one chunk for a scan, copy its in-range items, and release
    /// it again unless it is dirty
    fn scan_chunk(&self, id: u32, min: u32, max: u32) -> Result<Vec<u32>> {
        {
            let mut cache = self.loaded.lock();
            if let Some(chunk) = cache.get(&id) {
                let items = chunk.get_in_range(min, max).to_vec();
                if !self.dirty_chunks.contains(&id) {
                    cache.remove(&id);
                }
                return Ok(items);
            }
        }

        // Not cached: fetch outside the lock and drop the payload after
        // copying, so scans never grow the cache
        let mut read = self.storage.read(&[id])?;
        match read.remove(&id).flatten() {
            Some(chunk) => Ok(chunk.get_in_range(min, max).to_vec()),
            None => Err(ChunkSetError::ChunkMissing(id)),
        }
    }

    // =========================================================================
    // Directory Access
    // =========================================================================

    /// Initialize the directory if needed and return mutable access
    ///
    /// The persisted allocator value is ignored: `next_id` is recomputed
    /// from the loaded entries.
    fn meta_mut(&mut self) -> Result<&mut Meta> {
        let Self { meta, storage, .. } = self;
        let slot = meta.get_mut();
        if slot.is_none() {
            let mut meta = storage.read_meta()?;
            meta.recompute_next_id();
            *slot = Some(meta);
        }
        Ok(slot.as_mut().expect("directory just initialized"))
    }

    /// Directory access on paths that already ran the operation prologue
    fn meta_loaded_mut(&mut self) -> &mut Meta {
        self.meta
            .get_mut()
            .as_mut()
            .expect("directory initialized at operation start")
    }

    /// Run `f` over the directory from a shared borrow, initializing it
    /// on first touch
    fn with_meta<T>(&self, f: impl FnOnce(&Meta) -> T) -> Result<T> {
        let mut slot = self.meta.lock();
        if slot.is_none() {
            let mut meta = self.storage.read_meta()?;
            meta.recompute_next_id();
            *slot = Some(meta);
        }
        Ok(f(slot.as_ref().expect("directory just initialized")))
    }
}
