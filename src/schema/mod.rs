//! Schema module for segcore.
//!
//! This module provides the immutable field catalog shared by every segment
//! built from it, and the per-segment mapping between stable field ids and
//! physical field offsets.

pub mod field;
pub mod field_map;
#[allow(clippy::module_inception)]
pub mod schema;

// Re-export commonly used types
pub use field::{
    DataType, FieldId, FieldMeta, FieldOffset, ROW_ID_FIELD_ID, START_USER_FIELD_ID,
    TIMESTAMP_FIELD_ID,
};
pub use field_map::FieldMap;
pub use schema::Schema;
