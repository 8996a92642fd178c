//! Range Scan
//!
//! Lazy, finite, forward-only stream over `[min, max]`.

use crate::error::Result;
use crate::storage::ChunkStorage;

use super::SortedArray;

/// Iterator over all items within a range, in ascending order
///
/// Chunks are pulled from the cache or the back-end one at a time as
/// the consumer advances; dropping the iterator stops further loads.
/// A storage error ends the stream after being yielded once.
pub struct RangeScan<'a, S: ChunkStorage> {
    array: &'a SortedArray<S>,
    /// Chunk ids still to visit, in directory order
    ids: std::vec::IntoIter<u32>,
    min: u32,
    max: u32,
    /// In-range items of the chunk currently being drained
    current: std::vec::IntoIter<u32>,
    done: bool,
}

impl<'a, S: ChunkStorage> RangeScan<'a, S> {
    pub(super) fn new(array: &'a SortedArray<S>, ids: Vec<u32>, min: u32, max: u32) -> Self {
        Self {
            array,
            ids: ids.into_iter(),
            min,
            max,
            current: Vec::new().into_iter(),
            done: false,
        }
    }
}

impl<'a, S: ChunkStorage> Iterator for RangeScan<'a, S> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(item) = self.current.next() {
                return Some(Ok(item));
            }

            // Current chunk drained; move to the next relevant one
            let id = match self.ids.next() {
                Some(id) => id,
                None => {
                    self.done = true;
                    return None;
                }
            };

            match self.array.scan_chunk(id, self.min, self.max) {
                Ok(items) => self.current = items.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
