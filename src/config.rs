//! Configuration for chunkset
//!
//! Centralized configuration with sensible defaults.

use crate::error::{ChunkSetError, Result};

/// Main configuration for a SortedArray instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Chunking Configuration
    // -------------------------------------------------------------------------
    /// Max number of items a chunk may hold at an operation boundary.
    /// Chunks above this size are split; adjacent chunks whose combined
    /// size fits are merged after deletions.
    pub max_chunk_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_chunk_size: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(ChunkSetError::Config(
                "max_chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the max chunk size
    pub fn max_chunk_size(mut self, size: u32) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
