//! Configuration for segments and the search executor.
//!
//! Configuration values are passed explicitly at construction time, so
//! segments in the same process may use independent settings.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegcoreError};

/// Default number of rows held by one growing-segment chunk.
pub const DEFAULT_SIZE_PER_CHUNK: usize = 32 * 1024;

/// Default maximum number of rows a growing segment may reserve.
pub const DEFAULT_MAX_ROW_COUNT: usize = 16 * 1024 * 1024;

/// Configuration shared by every chunk store of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Number of rows stored in each chunk.
    pub size_per_chunk: usize,

    /// Capacity of a growing segment, in rows.
    pub max_row_count: usize,

    /// Minimum number of scanned rows before a brute-force scan is split
    /// into blocks of at most this many rows and run in parallel.
    pub parallel_threshold: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            size_per_chunk: DEFAULT_SIZE_PER_CHUNK,
            max_row_count: DEFAULT_MAX_ROW_COUNT,
            parallel_threshold: 4096,
        }
    }
}

impl SegmentConfig {
    /// Set the chunk size in rows.
    pub fn with_size_per_chunk(mut self, size_per_chunk: usize) -> Self {
        self.size_per_chunk = size_per_chunk;
        self
    }

    /// Set the growing-segment capacity in rows.
    pub fn with_max_row_count(mut self, max_row_count: usize) -> Self {
        self.max_row_count = max_row_count;
        self
    }

    /// Set the row count at which brute-force scans go parallel.
    pub fn with_parallel_threshold(mut self, parallel_threshold: usize) -> Self {
        self.parallel_threshold = parallel_threshold;
        self
    }

    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SegmentConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.size_per_chunk == 0 {
            return Err(SegcoreError::invalid_config("size_per_chunk must be > 0"));
        }
        if self.max_row_count == 0 {
            return Err(SegcoreError::invalid_config("max_row_count must be > 0"));
        }
        Ok(())
    }

    /// Number of chunks needed to hold `max_row_count` rows.
    pub fn max_chunks(&self) -> usize {
        self.max_row_count.div_ceil(self.size_per_chunk)
    }
}

/// Configuration for the batched search executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Thread pool size for parallel request execution.
    pub num_threads: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
        }
    }
}
