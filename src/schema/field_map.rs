//! Bidirectional mapping between field ids and physical offsets.

use ahash::AHashMap;

use crate::error::{Result, SegcoreError};
use crate::schema::field::{FieldId, FieldOffset};
use crate::schema::schema::Schema;

/// Field id <-> offset bijection, built once per segment.
#[derive(Debug, Clone)]
pub struct FieldMap {
    id_to_offset: AHashMap<FieldId, FieldOffset>,
    offset_to_id: Vec<FieldId>,
}

impl FieldMap {
    /// Build the map from the schema's field order.
    pub fn from_schema(schema: &Schema) -> Self {
        let offset_to_id: Vec<FieldId> = schema.fields().iter().map(|f| f.id()).collect();
        let id_to_offset = offset_to_id
            .iter()
            .enumerate()
            .map(|(offset, id)| (*id, FieldOffset(offset)))
            .collect();

        FieldMap {
            id_to_offset,
            offset_to_id,
        }
    }

    /// Look up the offset of a field id.
    pub fn offset_of(&self, id: FieldId) -> Option<FieldOffset> {
        self.id_to_offset.get(&id).copied()
    }

    /// Look up the id at an offset.
    pub fn id_of(&self, offset: FieldOffset) -> Option<FieldId> {
        self.offset_to_id.get(offset.0).copied()
    }

    /// Offset of a field id, failing when the id is not part of the schema.
    pub fn require_offset(&self, id: FieldId) -> Result<FieldOffset> {
        self.offset_of(id)
            .ok_or_else(|| SegcoreError::schema_mismatch(format!("Unknown field id {id}")))
    }

    pub fn len(&self) -> usize {
        self.offset_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offset_to_id.is_empty()
    }
}
