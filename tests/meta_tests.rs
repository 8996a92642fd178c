//! Tests for the chunk directory
//!
//! These tests verify:
//! - Id allocation and recomputation after load
//! - Ordered bulk insertion with overlap protection
//! - Binary-searched lookups for reads, range reads, and insertion
//! - Five-stream compressed round-trip and corruption detection

use chunkset::{ChunkMeta, Meta};

// =============================================================================
// Helper Functions
// =============================================================================

/// Directory with two entries: [10, 15] and [20, 25]
fn two_entry_meta() -> (Meta, ChunkMeta, ChunkMeta) {
    let mut meta = Meta::new();
    let c1 = ChunkMeta::new(meta.take_next_id(), 10, 15, 2);
    let c2 = ChunkMeta::new(meta.take_next_id(), 20, 25, 2);
    meta.add(&[c1]);
    meta.add(&[c2]);
    (meta, c1, c2)
}

// =============================================================================
// Id Allocation
// =============================================================================

#[test]
fn test_take_next_id_sequence() {
    let mut meta = Meta::new();
    assert_eq!(meta.take_next_id(), 0);
    assert_eq!(meta.take_next_id(), 1);
    assert_eq!(meta.take_next_id(), 2);
}

#[test]
fn test_recompute_next_id() {
    let mut meta = Meta::new();
    meta.add(&[
        ChunkMeta::new(3, 0, 5, 2),
        ChunkMeta::new(7, 10, 15, 2),
        ChunkMeta::new(5, 20, 25, 2),
    ]);

    meta.recompute_next_id();
    assert_eq!(meta.next_id(), 8);
}

#[test]
fn test_recompute_next_id_empty() {
    let mut meta = Meta::new();
    meta.recompute_next_id();
    assert_eq!(meta.next_id(), 0);
}

// =============================================================================
// Add & Remove
// =============================================================================

#[test]
fn test_add_and_remove_basic() {
    let mut meta = Meta::new();
    let id = meta.take_next_id();
    let c1 = ChunkMeta::new(id, 0, 1, 1);
    let c2 = ChunkMeta::new(id, 999, 1111, 1);

    meta.add(&[c1]);
    assert_eq!(meta.len(), 1);

    meta.remove(&c1);
    meta.remove(&c2); // non-existent, a no-op
    assert!(meta.is_empty());
}

#[test]
fn test_add_bulk_keeps_order() {
    let mut meta = Meta::new();
    let c1 = ChunkMeta::new(0, 10, 15, 1);
    let c2 = ChunkMeta::new(1, 20, 25, 1);
    meta.add(&[c1, c2]);

    // Before, in the middle, and after existing entries
    let c3 = ChunkMeta::new(2, 0, 1, 1);
    let c4 = ChunkMeta::new(3, 16, 17, 1);
    let c5 = ChunkMeta::new(4, 30, 31, 1);
    meta.add(&[c3, c4, c5]);

    assert_eq!(meta.entries(), &[c3, c1, c4, c2, c5]);
}

// =============================================================================
// Overlap Protection
// =============================================================================

#[test]
#[should_panic(expected = "intersects")]
fn test_add_rejects_exact_match() {
    let mut meta = Meta::new();
    meta.add(&[ChunkMeta::new(0, 2, 4, 2)]);
    meta.add(&[ChunkMeta::new(1, 2, 4, 2)]);
}

#[test]
#[should_panic(expected = "intersects")]
fn test_add_rejects_left_overlap() {
    let mut meta = Meta::new();
    meta.add(&[ChunkMeta::new(0, 2, 4, 2)]);
    meta.add(&[ChunkMeta::new(1, 1, 2, 2)]);
}

#[test]
#[should_panic(expected = "intersects")]
fn test_add_rejects_inner_overlap() {
    let mut meta = Meta::new();
    meta.add(&[ChunkMeta::new(0, 2, 4, 2)]);
    meta.add(&[ChunkMeta::new(1, 3, 3, 2)]);
}

#[test]
#[should_panic(expected = "intersects")]
fn test_add_rejects_right_overlap() {
    let mut meta = Meta::new();
    meta.add(&[ChunkMeta::new(0, 2, 4, 2)]);
    meta.add(&[ChunkMeta::new(1, 4, 6, 2)]);
}

#[test]
#[should_panic(expected = "invalid chunk meta")]
fn test_add_rejects_inverted_range() {
    let mut meta = Meta::new();
    meta.add(&[ChunkMeta::new(0, 9, 0, 1)]);
}

#[test]
fn test_add_allows_touching_neighbours() {
    // Adjacent but disjoint: max 4 next to min 5
    let mut meta = Meta::new();
    meta.add(&[ChunkMeta::new(0, 2, 4, 2)]);
    meta.add(&[ChunkMeta::new(1, 5, 6, 2)]);
    assert_eq!(meta.len(), 2);
}

// =============================================================================
// Predicates
// =============================================================================

#[test]
fn test_chunk_meta_intersects() {
    let a = ChunkMeta::new(0, 10, 20, 5);
    assert!(a.intersects(&ChunkMeta::new(1, 20, 30, 5))); // boundary touch
    assert!(a.intersects(&ChunkMeta::new(1, 5, 10, 5)));
    assert!(a.intersects(&ChunkMeta::new(1, 12, 15, 5)));
    assert!(!a.intersects(&ChunkMeta::new(1, 21, 30, 5)));
    assert!(!a.intersects(&ChunkMeta::new(1, 0, 9, 5)));
}

#[test]
fn test_chunk_meta_contains() {
    let cm = ChunkMeta::new(0, 10, 20, 5);
    assert!(cm.contains(10));
    assert!(cm.contains(15));
    assert!(cm.contains(20));
    assert!(!cm.contains(9));
    assert!(!cm.contains(21));
}

// =============================================================================
// Lookups
// =============================================================================

#[test]
fn test_find_relevant_for_read() {
    let (meta, _, c2) = two_entry_meta();

    assert!(meta.find_relevant_for_read(1).is_none());
    assert!(meta.find_relevant_for_read(17).is_none());
    assert!(meta.find_relevant_for_read(30).is_none());

    assert_eq!(meta.find_relevant_for_read(24), Some(&c2));
}

#[test]
fn test_find_relevant_for_read_range() {
    let (meta, c1, c2) = two_entry_meta();

    assert!(meta.find_relevant_for_read_range(0, 5).is_empty());
    assert!(meta.find_relevant_for_read_range(16, 19).is_empty());
    assert_eq!(meta.find_relevant_for_read_range(0, 12), &[c1]);
    assert_eq!(meta.find_relevant_for_read_range(12, 22), &[c1, c2]);
    assert_eq!(meta.find_relevant_for_read_range(22, 99), &[c2]);
    assert_eq!(meta.find_relevant_for_read_range(0, u32::MAX), &[c1, c2]);
}

#[test]
fn test_find_relevant_for_insert_empty() {
    let meta = Meta::new();
    assert!(meta.find_relevant_for_insert(1).is_empty());
}

#[test]
fn test_find_relevant_for_insert() {
    let (meta, c1, c2) = two_entry_meta();

    // Within one entry
    assert_eq!(meta.find_relevant_for_insert(13), vec![&c1]);
    // Before every entry: the first
    assert_eq!(meta.find_relevant_for_insert(1), vec![&c1]);
    // Strictly between two entries: both, left first
    assert_eq!(meta.find_relevant_for_insert(17), vec![&c1, &c2]);
    // After every entry: the last
    assert_eq!(meta.find_relevant_for_insert(30), vec![&c2]);
}

#[test]
fn test_get_chunk_by_id() {
    let (mut meta, _, c2) = two_entry_meta();

    assert!(meta.get_chunk_by_id(99).is_none());

    let entry = meta.get_chunk_by_id(c2.id).unwrap();
    entry.size = 42;
    assert_eq!(meta.entries()[1].size, 42);
}

// =============================================================================
// Serialization
// =============================================================================

#[test]
fn test_serialize_roundtrip_sizes() {
    for n in [1usize, 2, 10, 100, 10_000] {
        let mut meta = Meta::new();
        let entries: Vec<ChunkMeta> = (0..n)
            .map(|i| {
                ChunkMeta::new(meta.take_next_id(), (i * 10) as u32, (i * 10 + 5) as u32, 5)
            })
            .collect();
        meta.add(&entries);

        let blob = meta.serialize();
        let restored = Meta::deserialize(&blob).unwrap();
        assert_eq!(restored, meta, "round-trip failed for n={}", n);
    }
}

#[test]
fn test_serialize_roundtrip_empty() {
    let mut meta = Meta::new();
    meta.take_next_id();
    meta.take_next_id();

    let restored = Meta::deserialize(&meta.serialize()).unwrap();
    assert_eq!(restored, meta);
    assert_eq!(restored.next_id(), 2);
}

#[test]
fn test_serialize_roundtrip_nonmonotonic_sizes() {
    let mut meta = Meta::new();
    let sizes = [900, 3, 512, 1, 77];
    let entries: Vec<ChunkMeta> = sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            ChunkMeta::new(meta.take_next_id(), (i * 1000) as u32, (i * 1000 + 900) as u32, size)
        })
        .collect();
    meta.add(&entries);

    let restored = Meta::deserialize(&meta.serialize()).unwrap();
    assert_eq!(restored, meta);
}

#[test]
fn test_deserialize_garbage() {
    assert!(Meta::deserialize(b"definitely not a directory").is_err());
}

#[test]
fn test_deserialize_corrupt_payload() {
    let mut meta = Meta::new();
    let next_id = meta.take_next_id();
    meta.add(&[ChunkMeta::new(next_id, 5, 10, 3)]);

    let mut blob = meta.serialize();
    let mid = blob.len() / 2;
    blob[mid] ^= 0xFF;
    assert!(Meta::deserialize(&blob).is_err());
}
