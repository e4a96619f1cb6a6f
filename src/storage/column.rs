//! Typed column storage for one field.

use crate::error::{Result, SegcoreError};
use crate::schema::{DataType, FieldMeta};
use crate::storage::chunked::{ChunkSpan, ChunkedVec};
use crate::storage::field_data::FieldData;
use crate::storage::scalar::ScalarValue;

/// Column of one user field, backed by a [`ChunkedVec`] of the field's
/// element type.
#[derive(Debug)]
pub enum ColumnData {
    Bool(ChunkedVec<bool>),
    Int8(ChunkedVec<i8>),
    Int16(ChunkedVec<i16>),
    Int32(ChunkedVec<i32>),
    Int64(ChunkedVec<i64>),
    Float(ChunkedVec<f32>),
    Double(ChunkedVec<f64>),
    FloatVector { dim: usize, data: ChunkedVec<f32> },
}

/// Element types that can be read out of a [`ColumnData`] with a typed view.
pub trait ColumnElement: Copy + Default + Send + Sync + 'static {
    /// Name reported in type mismatch errors.
    const TYPE_NAME: &'static str;

    /// Borrow the chunk store if the column holds elements of this type.
    fn chunked(column: &ColumnData) -> Option<&ChunkedVec<Self>>;

    /// Widen the element to a scalar value.
    fn to_scalar(self) -> ScalarValue;
}

macro_rules! impl_column_element {
    ($ty:ty, $name:literal, $variant:ident, $scalar:expr) => {
        impl ColumnElement for $ty {
            const TYPE_NAME: &'static str = $name;

            fn chunked(column: &ColumnData) -> Option<&ChunkedVec<Self>> {
                match column {
                    ColumnData::$variant(data) => Some(data),
                    _ => None,
                }
            }

            fn to_scalar(self) -> ScalarValue {
                let widen: fn($ty) -> ScalarValue = $scalar;
                widen(self)
            }
        }
    };
}

impl_column_element!(bool, "bool", Bool, ScalarValue::Bool);
impl_column_element!(i8, "i8", Int8, |v| ScalarValue::Int(v as i64));
impl_column_element!(i16, "i16", Int16, |v| ScalarValue::Int(v as i64));
impl_column_element!(i32, "i32", Int32, |v| ScalarValue::Int(v as i64));
impl_column_element!(i64, "i64", Int64, ScalarValue::Int);
impl_column_element!(f64, "f64", Double, ScalarValue::Float);

// f32 backs both scalar float columns and vector columns.
impl ColumnElement for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn chunked(column: &ColumnData) -> Option<&ChunkedVec<Self>> {
        match column {
            ColumnData::Float(data) | ColumnData::FloatVector { data, .. } => Some(data),
            _ => None,
        }
    }

    fn to_scalar(self) -> ScalarValue {
        ScalarValue::Float(self as f64)
    }
}

impl ColumnData {
    /// Create an empty growable column for `meta`.
    pub fn new(meta: &FieldMeta, rows_per_chunk: usize, max_rows: usize) -> Result<Self> {
        let column = match meta.data_type() {
            DataType::Bool => ColumnData::Bool(ChunkedVec::new(1, rows_per_chunk, max_rows)?),
            DataType::Int8 => ColumnData::Int8(ChunkedVec::new(1, rows_per_chunk, max_rows)?),
            DataType::Int16 => ColumnData::Int16(ChunkedVec::new(1, rows_per_chunk, max_rows)?),
            DataType::Int32 => ColumnData::Int32(ChunkedVec::new(1, rows_per_chunk, max_rows)?),
            DataType::Int64 => ColumnData::Int64(ChunkedVec::new(1, rows_per_chunk, max_rows)?),
            DataType::Float => ColumnData::Float(ChunkedVec::new(1, rows_per_chunk, max_rows)?),
            DataType::Double => ColumnData::Double(ChunkedVec::new(1, rows_per_chunk, max_rows)?),
            DataType::FloatVector => ColumnData::FloatVector {
                dim: meta.dim(),
                data: ChunkedVec::new(meta.dim(), rows_per_chunk, max_rows)?,
            },
        };
        Ok(column)
    }

    /// Install a complete column as a single chunk, taking ownership of the
    /// values without copying.
    pub fn from_field_data(meta: &FieldMeta, data: FieldData) -> Result<Self> {
        let rows = data.row_count();
        data.check_matches(meta, rows)?;

        let column = match data {
            FieldData::Bool(v) => ColumnData::Bool(ChunkedVec::from_vec(1, v)?),
            FieldData::Int8(v) => ColumnData::Int8(ChunkedVec::from_vec(1, v)?),
            FieldData::Int16(v) => ColumnData::Int16(ChunkedVec::from_vec(1, v)?),
            FieldData::Int32(v) => ColumnData::Int32(ChunkedVec::from_vec(1, v)?),
            FieldData::Int64(v) => ColumnData::Int64(ChunkedVec::from_vec(1, v)?),
            FieldData::Float(v) => ColumnData::Float(ChunkedVec::from_vec(1, v)?),
            FieldData::Double(v) => ColumnData::Double(ChunkedVec::from_vec(1, v)?),
            FieldData::FloatVector { dim, data } => ColumnData::FloatVector {
                dim,
                data: ChunkedVec::from_vec(dim, data)?,
            },
            FieldData::Timestamp(_) => {
                return Err(SegcoreError::type_mismatch(
                    meta.data_type().name(),
                    "timestamp",
                ));
            }
        };
        Ok(column)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Bool(_) => DataType::Bool,
            ColumnData::Int8(_) => DataType::Int8,
            ColumnData::Int16(_) => DataType::Int16,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::Float(_) => DataType::Float,
            ColumnData::Double(_) => DataType::Double,
            ColumnData::FloatVector { .. } => DataType::FloatVector,
        }
    }

    /// Elements per row.
    pub fn dim(&self) -> usize {
        match self {
            ColumnData::FloatVector { dim, .. } => *dim,
            _ => 1,
        }
    }

    fn rows_per_chunk(&self) -> usize {
        match self {
            ColumnData::Bool(v) => v.rows_per_chunk(),
            ColumnData::Int8(v) => v.rows_per_chunk(),
            ColumnData::Int16(v) => v.rows_per_chunk(),
            ColumnData::Int32(v) => v.rows_per_chunk(),
            ColumnData::Int64(v) => v.rows_per_chunk(),
            ColumnData::Float(v) => v.rows_per_chunk(),
            ColumnData::Double(v) => v.rows_per_chunk(),
            ColumnData::FloatVector { data, .. } => data.rows_per_chunk(),
        }
    }

    /// Number of chunks covering the first `valid_rows` rows.
    pub fn chunk_count(&self, valid_rows: usize) -> usize {
        valid_rows.div_ceil(self.rows_per_chunk())
    }

    /// Borrow the underlying chunk store as element type `T`.
    pub fn typed<T: ColumnElement>(&self) -> Result<&ChunkedVec<T>> {
        T::chunked(self)
            .ok_or_else(|| SegcoreError::type_mismatch(self.data_type().name(), T::TYPE_NAME))
    }

    /// Zero-copy typed view over one chunk.
    pub fn chunk_span<T: ColumnElement>(
        &self,
        chunk_index: usize,
        valid_rows: usize,
    ) -> Result<ChunkSpan<'_, T>> {
        self.typed::<T>()?.chunk_span(chunk_index, valid_rows)
    }

    /// Raw vector storage of a vector column.
    pub fn vectors(&self) -> Option<&ChunkedVec<f32>> {
        match self {
            ColumnData::FloatVector { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Write a batch of values starting at `row_offset`.
    pub fn write(&self, row_offset: usize, values: &FieldData) -> Result<()> {
        match (self, values) {
            (ColumnData::Bool(c), FieldData::Bool(v)) => c.write_rows(row_offset, v),
            (ColumnData::Int8(c), FieldData::Int8(v)) => c.write_rows(row_offset, v),
            (ColumnData::Int16(c), FieldData::Int16(v)) => c.write_rows(row_offset, v),
            (ColumnData::Int32(c), FieldData::Int32(v)) => c.write_rows(row_offset, v),
            (ColumnData::Int64(c), FieldData::Int64(v)) => c.write_rows(row_offset, v),
            (ColumnData::Float(c), FieldData::Float(v)) => c.write_rows(row_offset, v),
            (ColumnData::Double(c), FieldData::Double(v)) => c.write_rows(row_offset, v),
            (ColumnData::FloatVector { dim, data }, FieldData::FloatVector { dim: d, data: v })
                if dim == d =>
            {
                data.write_rows(row_offset, v)
            }
            _ => Err(SegcoreError::type_mismatch(
                self.data_type().name(),
                values.type_name(),
            )),
        }
    }

    /// Visit the first `valid_rows` values of a scalar column, widened to
    /// [`ScalarValue`], together with their row offset.
    pub fn for_each_scalar<F>(&self, valid_rows: usize, f: F) -> Result<()>
    where
        F: FnMut(usize, ScalarValue),
    {
        match self {
            ColumnData::Bool(c) => visit_scalars(c, valid_rows, f),
            ColumnData::Int8(c) => visit_scalars(c, valid_rows, f),
            ColumnData::Int16(c) => visit_scalars(c, valid_rows, f),
            ColumnData::Int32(c) => visit_scalars(c, valid_rows, f),
            ColumnData::Int64(c) => visit_scalars(c, valid_rows, f),
            ColumnData::Float(c) => visit_scalars(c, valid_rows, f),
            ColumnData::Double(c) => visit_scalars(c, valid_rows, f),
            ColumnData::FloatVector { dim, .. } => Err(SegcoreError::type_mismatch(
                "scalar",
                format!("float_vector(dim={dim})"),
            )),
        }
    }
}

fn visit_scalars<T, F>(column: &ChunkedVec<T>, valid_rows: usize, mut f: F) -> Result<()>
where
    T: ColumnElement,
    F: FnMut(usize, ScalarValue),
{
    column.for_each_span(valid_rows, |first_row, span| {
        for (i, value) in span.iter().enumerate() {
            f(first_row + i, value.to_scalar());
        }
    })
}
