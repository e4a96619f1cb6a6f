//! Error types for segcore.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`SegcoreError`] enum. Errors are reported synchronously to the caller of
//! the operation that detected them; nothing inside the crate retries.
//!
//! # Examples
//!
//! ```
//! use segcore::error::{Result, SegcoreError};
//!
//! fn reserve(n: usize, capacity: usize) -> Result<usize> {
//!     if n > capacity {
//!         return Err(SegcoreError::capacity(format!("{n} rows exceed {capacity}")));
//!     }
//!     Ok(0)
//! }
//!
//! assert!(reserve(10, 5).is_err());
//! ```

use thiserror::Error;

/// The main error type for segment operations.
#[derive(Error, Debug)]
pub enum SegcoreError {
    /// Index dimension or metric does not match the field it is attached to.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A reservation exceeds the configured segment capacity.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Insert into an invalid or overlapping offset, or out-of-range chunk access.
    #[error("Range error: {0}")]
    Range(String),

    /// Typed accessor does not match the stored element type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Type stored by the column or required by the operation.
        expected: String,
        /// Type requested by the caller.
        actual: String,
    },

    /// Field data or index referenced by an operation is not present.
    #[error("Not loaded: {0}")]
    NotLoaded(String),

    /// Malformed placeholder group or raw blob.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration or call arguments.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by a vector index implementation.
    #[error("Index error: {0}")]
    Index(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error raised by an external index adapter.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with SegcoreError.
pub type Result<T> = std::result::Result<T, SegcoreError>;

impl SegcoreError {
    /// Create a new schema mismatch error.
    pub fn schema_mismatch<S: Into<String>>(msg: S) -> Self {
        SegcoreError::SchemaMismatch(msg.into())
    }

    /// Create a new capacity error.
    pub fn capacity<S: Into<String>>(msg: S) -> Self {
        SegcoreError::Capacity(msg.into())
    }

    /// Create a new range error.
    pub fn range<S: Into<String>>(msg: S) -> Self {
        SegcoreError::Range(msg.into())
    }

    /// Create a new type mismatch error.
    pub fn type_mismatch<E: Into<String>, A: Into<String>>(expected: E, actual: A) -> Self {
        SegcoreError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new not-loaded error.
    pub fn not_loaded<S: Into<String>>(msg: S) -> Self {
        SegcoreError::NotLoaded(msg.into())
    }

    /// Create a new parse error.
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        SegcoreError::Parse(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SegcoreError::InvalidArgument(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        SegcoreError::InvalidArgument(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        SegcoreError::Index(msg.into())
    }

    /// Whether this error is one of the typed-accessor failures (range or type).
    pub fn is_type_or_range(&self) -> bool {
        matches!(
            self,
            SegcoreError::Range(_) | SegcoreError::TypeMismatch { .. }
        )
    }
}
