//! Error types for chunkset
//!
//! Provides a unified error type for all operations.
//!
//! Programmer errors (inverted ranges, directory invariant violations)
//! are not represented here: they panic, since they indicate a bug in
//! the engine rather than bad input or a failing back-end.

use thiserror::Error;

/// Result type alias using ChunkSetError
pub type Result<T> = std::result::Result<T, ChunkSetError>;

/// Unified error type for chunkset operations
#[derive(Debug, Error)]
pub enum ChunkSetError {
    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The directory references a chunk the back-end no longer has.
    #[error("Chunk {0} missing from storage")]
    ChunkMissing(u32),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Planning Errors
    // -------------------------------------------------------------------------
    /// Internal to insertion planning; only reachable when the directory
    /// is empty, which `add` handles by seeding first.
    #[error("No relevant chunk found")]
    NoChunkFound,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
