//! Chunked columnar storage for segment fields.
//!
//! Every field of a segment is held in a [`ColumnData`], a typed wrapper over
//! a [`ChunkedVec`]: fixed-capacity chunks that are allocated on demand and
//! never moved once allocated, so a [`ChunkSpan`] handed out earlier stays
//! valid while later rows are appended.

pub mod chunked;
pub mod column;
pub mod field_data;
pub mod scalar;

// Re-export commonly used types
pub use chunked::{ChunkSpan, ChunkedVec};
pub use column::{ColumnData, ColumnElement};
pub use field_data::{FieldData, RowBlob};
pub use scalar::ScalarValue;
