//! Ordered field catalog shared by segments.

use serde::{Deserialize, Serialize};

use crate::distance::MetricType;
use crate::error::{Result, SegcoreError};
use crate::schema::field::{DataType, FieldId, FieldMeta, FieldOffset, START_USER_FIELD_ID};

/// A schema is an ordered sequence of user field descriptors.
///
/// The row identifier and insertion timestamp are implicit system fields and
/// are not listed here. Field order fixes the physical offset of each field
/// in every segment built from the schema. Once wrapped in an `Arc` and
/// handed to a segment the schema is never mutated again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldMeta>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Schema { fields: Vec::new() }
    }

    /// Add a field descriptor.
    pub fn add_field(&mut self, meta: FieldMeta) -> Result<FieldOffset> {
        if meta.id().is_system() {
            return Err(SegcoreError::schema_mismatch(format!(
                "Field id {} is reserved for system fields",
                meta.id()
            )));
        }
        if meta.name().is_empty() {
            return Err(SegcoreError::schema_mismatch("Field name cannot be empty"));
        }
        if self.fields.iter().any(|f| f.id() == meta.id()) {
            return Err(SegcoreError::schema_mismatch(format!(
                "Field id {} already exists",
                meta.id()
            )));
        }
        if self.fields.iter().any(|f| f.name() == meta.name()) {
            return Err(SegcoreError::schema_mismatch(format!(
                "Field '{}' already exists",
                meta.name()
            )));
        }

        self.fields.push(meta);
        Ok(FieldOffset(self.fields.len() - 1))
    }

    /// Add a scalar field with the next free user id.
    pub fn add_debug_field<S: Into<String>>(
        &mut self,
        name: S,
        data_type: DataType,
    ) -> Result<FieldId> {
        let id = self.next_field_id()?;
        self.add_field(FieldMeta::scalar(id, name, data_type)?)?;
        Ok(id)
    }

    /// Add a float vector field with the next free user id.
    pub fn add_debug_vector_field<S: Into<String>>(
        &mut self,
        name: S,
        dim: usize,
        metric_type: MetricType,
    ) -> Result<FieldId> {
        let id = self.next_field_id()?;
        self.add_field(FieldMeta::vector(id, name, dim, metric_type)?)?;
        Ok(id)
    }

    fn next_field_id(&self) -> Result<FieldId> {
        let mut next = START_USER_FIELD_ID;
        for field in &self.fields {
            let after = field.id().get().checked_add(1).ok_or_else(|| {
                SegcoreError::schema_mismatch(format!(
                    "No field id left after {}",
                    field.id()
                ))
            })?;
            next = next.max(after);
        }
        Ok(FieldId(next))
    }

    /// Get the field descriptors in physical order.
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// Get the descriptor at a physical offset.
    pub fn field(&self, offset: FieldOffset) -> Option<&FieldMeta> {
        self.fields.get(offset.0)
    }

    /// Find a field by id.
    pub fn field_by_id(&self, id: FieldId) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.id() == id)
    }

    /// Find a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Number of user fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Size in bytes of one packed row across all user fields.
    pub fn size_of_row(&self) -> usize {
        self.fields.iter().map(|f| f.size_of_row()).sum()
    }
}
