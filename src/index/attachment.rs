//! Validation and publication of an index bound to one vector field.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::distance::MetricType;
use crate::error::{Result, SegcoreError};
use crate::index::VectorIndex;
use crate::schema::{FieldId, FieldMap, FieldOffset, Schema};

/// Parameter key carrying the metric an index was trained with.
pub const METRIC_TYPE_PARAM: &str = "metric_type";

/// Parameter key carrying the dimension an index was trained with.
pub const DIM_PARAM: &str = "dim";

/// Caller-supplied description of an index to attach.
#[derive(Clone)]
pub struct LoadIndexInfo {
    pub field_id: FieldId,
    pub field_name: String,
    pub index: Arc<dyn VectorIndex>,
    /// Declared training parameters, e.g. `metric_type`, `nlist`, `nprobe`.
    pub index_params: HashMap<String, String>,
}

impl LoadIndexInfo {
    pub fn new<S: Into<String>>(field_id: FieldId, field_name: S, index: Arc<dyn VectorIndex>) -> Self {
        LoadIndexInfo {
            field_id,
            field_name: field_name.into(),
            index,
            index_params: HashMap::new(),
        }
    }

    /// Add a declared parameter.
    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.index_params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for LoadIndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadIndexInfo")
            .field("field_id", &self.field_id)
            .field("field_name", &self.field_name)
            .field("index_type", &self.index.index_type())
            .field("index_params", &self.index_params)
            .finish()
    }
}

/// An index that passed validation against its field.
///
/// Instances are immutable; segments publish them behind an `Arc` so that a
/// search observes either no index or a fully constructed one.
#[derive(Debug)]
pub struct IndexAttachment {
    field_id: FieldId,
    field_offset: FieldOffset,
    metric_type: MetricType,
    dim: usize,
    index: Arc<dyn VectorIndex>,
    params: HashMap<String, String>,
}

impl IndexAttachment {
    /// Check `info` against the schema and build the attachment.
    ///
    /// Fails with `SchemaMismatch` when the field is unknown or not a vector
    /// field, when the name disagrees with the id, or when the index
    /// dimension or metric (reported or declared) differs from the field's.
    pub fn validate(info: LoadIndexInfo, schema: &Schema, field_map: &FieldMap) -> Result<Self> {
        let field_offset = field_map.require_offset(info.field_id)?;
        let meta = schema.field(field_offset).ok_or_else(|| {
            SegcoreError::schema_mismatch(format!("Unknown field id {}", info.field_id))
        })?;

        if !info.field_name.is_empty() && info.field_name != meta.name() {
            return Err(SegcoreError::schema_mismatch(format!(
                "Field id {} is named '{}', not '{}'",
                info.field_id,
                meta.name(),
                info.field_name
            )));
        }
        let field_metric = meta.metric_type().ok_or_else(|| {
            SegcoreError::schema_mismatch(format!(
                "Field '{}' is not a vector field",
                meta.name()
            ))
        })?;

        let index = &info.index;
        if index.dim() != meta.dim() {
            return Err(SegcoreError::schema_mismatch(format!(
                "Index dimension {} does not match field '{}' dimension {}",
                index.dim(),
                meta.name(),
                meta.dim()
            )));
        }
        if let Some(dim) = info.index_params.get(DIM_PARAM) {
            let declared: usize = dim.parse().map_err(|_| {
                SegcoreError::schema_mismatch(format!("Invalid declared dim '{dim}'"))
            })?;
            if declared != meta.dim() {
                return Err(SegcoreError::schema_mismatch(format!(
                    "Declared dim {declared} does not match field '{}' dimension {}",
                    meta.name(),
                    meta.dim()
                )));
            }
        }

        if index.metric_type() != field_metric {
            return Err(SegcoreError::schema_mismatch(format!(
                "Index metric {} does not match field '{}' metric {field_metric}",
                index.metric_type(),
                meta.name()
            )));
        }
        if let Some(declared) = info.index_params.get(METRIC_TYPE_PARAM) {
            let declared = MetricType::parse_str(declared)
                .map_err(|e| SegcoreError::schema_mismatch(e.to_string()))?;
            if declared != field_metric {
                return Err(SegcoreError::schema_mismatch(format!(
                    "Declared metric {declared} does not match field '{}' metric {field_metric}",
                    meta.name()
                )));
            }
        }

        Ok(IndexAttachment {
            field_id: info.field_id,
            field_offset,
            metric_type: field_metric,
            dim: meta.dim(),
            index: info.index,
            params: info.index_params,
        })
    }

    pub fn field_id(&self) -> FieldId {
        self.field_id
    }

    pub fn field_offset(&self) -> FieldOffset {
        self.field_offset
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Number of leading rows covered by the index.
    pub fn indexed_rows(&self) -> usize {
        self.index.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;
    use crate::schema::DataType;

    fn schema() -> (Schema, FieldMap, FieldId, FieldId) {
        let mut schema = Schema::new();
        let vec_id = schema
            .add_debug_vector_field("fakevec", 4, MetricType::L2)
            .unwrap();
        let counter = schema.add_debug_field("counter", DataType::Int64).unwrap();
        let map = FieldMap::from_schema(&schema);
        (schema, map, vec_id, counter)
    }

    fn flat(dim: usize, metric: MetricType) -> Arc<dyn VectorIndex> {
        Arc::new(FlatIndex::new(dim, metric).unwrap())
    }

    #[test]
    fn test_valid_attachment() {
        let (schema, map, vec_id, _) = schema();
        let info = LoadIndexInfo::new(vec_id, "fakevec", flat(4, MetricType::L2))
            .with_param(METRIC_TYPE_PARAM, "L2")
            .with_param("nlist", "100");
        let attachment = IndexAttachment::validate(info, &schema, &map).unwrap();
        assert_eq!(attachment.field_offset(), FieldOffset(0));
        assert_eq!(attachment.dim(), 4);
        assert_eq!(attachment.indexed_rows(), 0);
    }

    #[test]
    fn test_mismatches_rejected() {
        let (schema, map, vec_id, counter) = schema();
        let cases = vec![
            LoadIndexInfo::new(vec_id, "fakevec", flat(4, MetricType::IP)),
            LoadIndexInfo::new(vec_id, "fakevec", flat(8, MetricType::L2)),
            LoadIndexInfo::new(vec_id, "fakevec", flat(4, MetricType::L2))
                .with_param(METRIC_TYPE_PARAM, "IP"),
            LoadIndexInfo::new(vec_id, "other", flat(4, MetricType::L2)),
            LoadIndexInfo::new(counter, "counter", flat(1, MetricType::L2)),
            LoadIndexInfo::new(FieldId(999), "", flat(4, MetricType::L2)),
        ];
        for info in cases {
            let result = IndexAttachment::validate(info, &schema, &map);
            assert!(matches!(result, Err(SegcoreError::SchemaMismatch(_))));
        }
    }
}
