//! Field descriptors for schema definition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::distance::MetricType;
use crate::error::{Result, SegcoreError};

/// Field id of the implicit row identifier column.
pub const ROW_ID_FIELD_ID: FieldId = FieldId(0);

/// Field id of the implicit insertion timestamp column.
pub const TIMESTAMP_FIELD_ID: FieldId = FieldId(1);

/// First id handed out to user fields.
pub const START_USER_FIELD_ID: i64 = 100;

/// Externally stable identifier of a field, used in requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub i64);

impl FieldId {
    /// Get the raw id value.
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Whether this id names one of the implicit system fields.
    pub fn is_system(&self) -> bool {
        *self == ROW_ID_FIELD_ID || *self == TIMESTAMP_FIELD_ID
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Positional index of a user field in a segment's physical layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldOffset(pub usize);

impl FieldOffset {
    /// Get the raw offset value.
    pub fn get(&self) -> usize {
        self.0
    }
}

impl fmt::Display for FieldOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Element type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean scalar.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Dense vector of 32-bit floats.
    FloatVector,
}

impl DataType {
    /// Get the type name.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "i8",
            DataType::Int16 => "i16",
            DataType::Int32 => "i32",
            DataType::Int64 => "i64",
            DataType::Float => "f32",
            DataType::Double => "f64",
            DataType::FloatVector => "float_vector",
        }
    }

    /// Whether this is a vector type.
    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::FloatVector)
    }

    /// Whether this is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    /// Size in bytes of one element.
    pub fn element_size(&self) -> usize {
        match self {
            DataType::Bool | DataType::Int8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 | DataType::Float | DataType::FloatVector => 4,
            DataType::Int64 | DataType::Double => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable descriptor of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    id: FieldId,
    name: String,
    data_type: DataType,
    dim: Option<usize>,
    metric_type: Option<MetricType>,
}

impl FieldMeta {
    /// Create a scalar field descriptor.
    pub fn scalar<S: Into<String>>(id: FieldId, name: S, data_type: DataType) -> Result<Self> {
        if data_type.is_vector() {
            return Err(SegcoreError::invalid_argument(format!(
                "{data_type} requires a dimension and metric"
            )));
        }
        Ok(FieldMeta {
            id,
            name: name.into(),
            data_type,
            dim: None,
            metric_type: None,
        })
    }

    /// Create a float vector field descriptor.
    pub fn vector<S: Into<String>>(
        id: FieldId,
        name: S,
        dim: usize,
        metric_type: MetricType,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(SegcoreError::invalid_argument(
                "Vector dimension must be > 0",
            ));
        }
        Ok(FieldMeta {
            id,
            name: name.into(),
            data_type: DataType::FloatVector,
            dim: Some(dim),
            metric_type: Some(metric_type),
        })
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_vector(&self) -> bool {
        self.data_type.is_vector()
    }

    /// Vector dimension; scalar fields report 1.
    pub fn dim(&self) -> usize {
        self.dim.unwrap_or(1)
    }

    /// Declared metric of a vector field.
    pub fn metric_type(&self) -> Option<MetricType> {
        self.metric_type
    }

    /// Size in bytes of one row of this field.
    pub fn size_of_row(&self) -> usize {
        self.data_type.element_size() * self.dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_field_meta() {
        let meta = FieldMeta::vector(FieldId(100), "fakevec", 16, MetricType::L2).unwrap();
        assert!(meta.is_vector());
        assert_eq!(meta.dim(), 16);
        assert_eq!(meta.size_of_row(), 64);
        assert_eq!(meta.metric_type(), Some(MetricType::L2));
    }

    #[test]
    fn test_scalar_rejects_vector_type() {
        assert!(FieldMeta::scalar(FieldId(100), "v", DataType::FloatVector).is_err());
        assert!(FieldMeta::vector(FieldId(100), "v", 0, MetricType::IP).is_err());
    }

    #[test]
    fn test_system_ids() {
        assert!(ROW_ID_FIELD_ID.is_system());
        assert!(TIMESTAMP_FIELD_ID.is_system());
        assert!(!FieldId(START_USER_FIELD_ID).is_system());
    }
}
