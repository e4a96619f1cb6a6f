//! Owned column payloads used by insert and bulk load.
//!
//! [`FieldData`] carries one field's values for a batch of rows. [`RowBlob`]
//! is the packed row-major layout (fields in schema order, little-endian)
//! that upstream writers produce; it converts to and from per-field columns.

use byteorder::{ByteOrder, LittleEndian};

use crate::Timestamp;
use crate::error::{Result, SegcoreError};
use crate::schema::{DataType, FieldMeta, Schema};

/// One field's values for a contiguous batch of rows.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    /// Row-major vectors, `dim` floats per row.
    FloatVector { dim: usize, data: Vec<f32> },
    /// Insertion timestamps; only valid for the timestamp system field.
    Timestamp(Vec<Timestamp>),
}

impl FieldData {
    /// Get the type name of the payload.
    pub fn type_name(&self) -> String {
        match self {
            FieldData::Bool(_) => "bool".to_string(),
            FieldData::Int8(_) => "i8".to_string(),
            FieldData::Int16(_) => "i16".to_string(),
            FieldData::Int32(_) => "i32".to_string(),
            FieldData::Int64(_) => "i64".to_string(),
            FieldData::Float(_) => "f32".to_string(),
            FieldData::Double(_) => "f64".to_string(),
            FieldData::FloatVector { dim, .. } => format!("float_vector(dim={dim})"),
            FieldData::Timestamp(_) => "timestamp".to_string(),
        }
    }

    /// Number of rows carried by the payload.
    pub fn row_count(&self) -> usize {
        match self {
            FieldData::Bool(v) => v.len(),
            FieldData::Int8(v) => v.len(),
            FieldData::Int16(v) => v.len(),
            FieldData::Int32(v) => v.len(),
            FieldData::Int64(v) => v.len(),
            FieldData::Float(v) => v.len(),
            FieldData::Double(v) => v.len(),
            FieldData::FloatVector { dim, data } => {
                if *dim == 0 {
                    0
                } else {
                    data.len() / dim
                }
            }
            FieldData::Timestamp(v) => v.len(),
        }
    }

    /// Check that the payload has the type (and dimension) declared by `meta`
    /// and carries exactly `rows` rows.
    pub fn check_matches(&self, meta: &FieldMeta, rows: usize) -> Result<()> {
        let type_ok = match (self, meta.data_type()) {
            (FieldData::Bool(_), DataType::Bool)
            | (FieldData::Int8(_), DataType::Int8)
            | (FieldData::Int16(_), DataType::Int16)
            | (FieldData::Int32(_), DataType::Int32)
            | (FieldData::Int64(_), DataType::Int64)
            | (FieldData::Float(_), DataType::Float)
            | (FieldData::Double(_), DataType::Double) => true,
            (FieldData::FloatVector { dim, .. }, DataType::FloatVector) => *dim == meta.dim(),
            _ => false,
        };
        if !type_ok {
            let expected = if meta.is_vector() {
                format!("float_vector(dim={})", meta.dim())
            } else {
                meta.data_type().name().to_string()
            };
            return Err(SegcoreError::type_mismatch(expected, self.type_name()));
        }

        if let FieldData::FloatVector { dim, data } = self
            && data.len() % dim != 0
        {
            return Err(SegcoreError::range(format!(
                "Field '{}' carries {} floats, not a multiple of dim {dim}",
                meta.name(),
                data.len()
            )));
        }

        if self.row_count() != rows {
            return Err(SegcoreError::range(format!(
                "Field '{}' carries {} rows, expected {rows}",
                meta.name(),
                self.row_count()
            )));
        }
        Ok(())
    }
}

/// Packed row-major raw data for a batch of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBlob {
    pub data: Vec<u8>,
    pub size_per_row: usize,
    pub count: usize,
}

impl RowBlob {
    /// Pack per-field columns (in schema order) into rows.
    pub fn from_columns(schema: &Schema, columns: &[FieldData]) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(SegcoreError::range(format!(
                "Expected {} columns, got {}",
                schema.len(),
                columns.len()
            )));
        }
        let count = columns.first().map(|c| c.row_count()).unwrap_or(0);
        for (meta, column) in schema.fields().iter().zip(columns) {
            column.check_matches(meta, count)?;
        }

        let size_per_row = schema.size_of_row();
        let mut data = vec![0u8; size_per_row * count];
        let mut field_pos = 0;
        for (meta, column) in schema.fields().iter().zip(columns) {
            let width = meta.size_of_row();
            for row in 0..count {
                let start = row * size_per_row + field_pos;
                encode_row(column, meta.dim(), row, &mut data[start..start + width]);
            }
            field_pos += width;
        }

        Ok(RowBlob {
            data,
            size_per_row,
            count,
        })
    }

    /// Split the packed rows into per-field columns in schema order.
    pub fn to_columns(&self, schema: &Schema) -> Result<Vec<FieldData>> {
        if self.size_per_row != schema.size_of_row() {
            return Err(SegcoreError::parse(format!(
                "Row size {} does not match schema row size {}",
                self.size_per_row,
                schema.size_of_row()
            )));
        }
        if self.data.len() != self.size_per_row * self.count {
            return Err(SegcoreError::parse(format!(
                "Blob holds {} bytes, expected {} rows of {} bytes",
                self.data.len(),
                self.count,
                self.size_per_row
            )));
        }

        let mut columns = Vec::with_capacity(schema.len());
        let mut field_pos = 0;
        for meta in schema.fields() {
            let width = meta.size_of_row();
            let rows = (0..self.count).map(|row| {
                let start = row * self.size_per_row + field_pos;
                &self.data[start..start + width]
            });
            columns.push(decode_column(meta, rows, self.count));
            field_pos += width;
        }
        Ok(columns)
    }
}

fn encode_row(column: &FieldData, dim: usize, row: usize, out: &mut [u8]) {
    match column {
        FieldData::Bool(v) => out[0] = u8::from(v[row]),
        FieldData::Int8(v) => out[0] = v[row] as u8,
        FieldData::Int16(v) => LittleEndian::write_i16(out, v[row]),
        FieldData::Int32(v) => LittleEndian::write_i32(out, v[row]),
        FieldData::Int64(v) => LittleEndian::write_i64(out, v[row]),
        FieldData::Float(v) => LittleEndian::write_f32(out, v[row]),
        FieldData::Double(v) => LittleEndian::write_f64(out, v[row]),
        FieldData::FloatVector { data, .. } => {
            LittleEndian::write_f32_into(&data[row * dim..(row + 1) * dim], out)
        }
        FieldData::Timestamp(v) => LittleEndian::write_u64(out, v[row]),
    }
}

fn decode_column<'a>(
    meta: &FieldMeta,
    rows: impl Iterator<Item = &'a [u8]>,
    count: usize,
) -> FieldData {
    match meta.data_type() {
        DataType::Bool => FieldData::Bool(rows.map(|r| r[0] != 0).collect()),
        DataType::Int8 => FieldData::Int8(rows.map(|r| r[0] as i8).collect()),
        DataType::Int16 => FieldData::Int16(rows.map(LittleEndian::read_i16).collect()),
        DataType::Int32 => FieldData::Int32(rows.map(LittleEndian::read_i32).collect()),
        DataType::Int64 => FieldData::Int64(rows.map(LittleEndian::read_i64).collect()),
        DataType::Float => FieldData::Float(rows.map(LittleEndian::read_f32).collect()),
        DataType::Double => FieldData::Double(rows.map(LittleEndian::read_f64).collect()),
        DataType::FloatVector => {
            let dim = meta.dim();
            let mut data = vec![0.0f32; count * dim];
            for (row, bytes) in rows.enumerate() {
                LittleEndian::read_f32_into(bytes, &mut data[row * dim..(row + 1) * dim]);
            }
            FieldData::FloatVector { dim, data }
        }
    }
}
