//! Immutable segment populated by one-shot bulk loads.

use std::sync::{Arc, OnceLock};

use bit_vec::BitVec;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SegmentConfig;
use crate::error::{Result, SegcoreError};
use crate::index::{IndexAttachment, LoadIndexInfo};
use crate::query::executor::{SearchRequest, execute_search};
use crate::query::plan::Plan;
use crate::query::result::QueryResult;
use crate::schema::{FieldId, FieldMap, FieldOffset, ROW_ID_FIELD_ID, Schema, TIMESTAMP_FIELD_ID};
use crate::segment::{SegmentReader, VisibleRows};
use crate::storage::{ChunkSpan, ChunkedVec, ColumnData, ColumnElement, FieldData};
use crate::{RowId, Timestamp};

/// One field's complete column, as handed over by the persistence layer.
#[derive(Debug, Clone)]
pub struct LoadFieldDataInfo {
    pub field_id: FieldId,
    pub blob: FieldData,
    pub row_count: usize,
}

impl LoadFieldDataInfo {
    pub fn new(field_id: FieldId, blob: FieldData) -> Self {
        let row_count = blob.row_count();
        LoadFieldDataInfo {
            field_id,
            blob,
            row_count,
        }
    }
}

#[derive(Debug)]
struct TimestampColumn {
    values: ChunkedVec<Timestamp>,
    max: Timestamp,
}

/// Bulk-loaded, read-only segment.
///
/// Every field (including the row id and timestamp system fields) is loaded
/// at most once. A vector field may be served by an attached index alone,
/// without its raw column.
#[derive(Debug)]
pub struct SealedSegment {
    id: Uuid,
    schema: Arc<Schema>,
    field_map: FieldMap,
    config: SegmentConfig,
    row_count: OnceLock<usize>,
    columns: Vec<OnceLock<ColumnData>>,
    row_ids: OnceLock<ChunkedVec<RowId>>,
    timestamps: OnceLock<TimestampColumn>,
    indexes: Vec<OnceLock<Arc<IndexAttachment>>>,
    load_lock: Mutex<()>,
}

impl SealedSegment {
    pub fn new(schema: Arc<Schema>, config: SegmentConfig) -> Result<Self> {
        config.validate()?;
        let fields = schema.len();
        Ok(SealedSegment {
            id: Uuid::new_v4(),
            field_map: FieldMap::from_schema(&schema),
            schema,
            config,
            row_count: OnceLock::new(),
            columns: (0..fields).map(|_| OnceLock::new()).collect(),
            row_ids: OnceLock::new(),
            timestamps: OnceLock::new(),
            indexes: (0..fields).map(|_| OnceLock::new()).collect(),
            load_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Row count fixed by the first load; zero before any load.
    pub fn row_count(&self) -> usize {
        self.row_count.get().copied().unwrap_or(0)
    }

    fn check_row_count(&self, rows: usize) -> Result<()> {
        match self.row_count.get() {
            Some(existing) if *existing != rows => Err(SegcoreError::range(format!(
                "Load of {rows} rows does not match segment row count {existing}"
            ))),
            _ => Ok(()),
        }
    }

    fn already_loaded(what: impl std::fmt::Display) -> SegcoreError {
        SegcoreError::not_loaded(format!("{what} is already loaded"))
    }

    /// Install the full column of one field.
    pub fn load_field_data(&self, info: LoadFieldDataInfo) -> Result<()> {
        let _guard = self.load_lock.lock();
        let LoadFieldDataInfo {
            field_id,
            blob,
            row_count,
        } = info;

        if blob.row_count() != row_count {
            return Err(SegcoreError::range(format!(
                "Field {field_id} blob holds {} rows, expected {row_count}",
                blob.row_count()
            )));
        }
        self.check_row_count(row_count)?;

        match field_id {
            ROW_ID_FIELD_ID => {
                let values = match blob {
                    FieldData::Int64(values) => values,
                    other => return Err(SegcoreError::type_mismatch("i64", other.type_name())),
                };
                if self.row_ids.get().is_some() {
                    return Err(Self::already_loaded("Row id field"));
                }
                let _ = self.row_ids.set(ChunkedVec::from_vec(1, values)?);
            }
            TIMESTAMP_FIELD_ID => {
                let values = match blob {
                    FieldData::Timestamp(values) => values,
                    other => {
                        return Err(SegcoreError::type_mismatch("timestamp", other.type_name()));
                    }
                };
                if self.timestamps.get().is_some() {
                    return Err(Self::already_loaded("Timestamp field"));
                }
                let max = values.iter().copied().max().unwrap_or(0);
                let column = TimestampColumn {
                    values: ChunkedVec::from_vec(1, values)?,
                    max,
                };
                let _ = self.timestamps.set(column);
            }
            _ => {
                let offset = self.field_map.require_offset(field_id)?;
                let slot = &self.columns[offset.get()];
                if slot.get().is_some() {
                    return Err(Self::already_loaded(format!("Field {field_id}")));
                }
                let meta = &self.schema.fields()[offset.get()];
                let _ = slot.set(ColumnData::from_field_data(meta, blob)?);
            }
        }

        let _ = self.row_count.set(row_count);
        info!(segment = %self.id, field = %field_id, rows = row_count, "loaded field data");
        Ok(())
    }

    /// Attach a trained index covering every row of the segment.
    pub fn load_index(&self, info: LoadIndexInfo) -> Result<()> {
        let _guard = self.load_lock.lock();
        let field_id = info.field_id;
        let attachment = match IndexAttachment::validate(info, &self.schema, &self.field_map) {
            Ok(attachment) => attachment,
            Err(e) => {
                warn!(segment = %self.id, field = %field_id, error = %e, "rejected index");
                return Err(e);
            }
        };

        let slot = &self.indexes[attachment.field_offset().get()];
        if slot.get().is_some() {
            return Err(Self::already_loaded(format!("Index for field {field_id}")));
        }
        let indexed_rows = attachment.indexed_rows();
        self.check_row_count(indexed_rows)?;

        let index_type = attachment.index().index_type();
        let _ = slot.set(Arc::new(attachment));
        let _ = self.row_count.set(indexed_rows);

        info!(
            segment = %self.id,
            field = %field_id,
            index_type,
            indexed_rows,
            "attached index"
        );
        Ok(())
    }

    /// Whether the raw column of a user field has been loaded.
    pub fn has_field_data(&self, field_offset: FieldOffset) -> bool {
        self.columns
            .get(field_offset.get())
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Bulk columns are installed whole, so a loaded segment has one chunk.
    pub fn num_chunk_data(&self) -> usize {
        usize::from(self.row_count() > 0)
    }

    fn loaded_column(&self, field_offset: FieldOffset) -> Result<&ColumnData> {
        let slot = self.columns.get(field_offset.get()).ok_or_else(|| {
            SegcoreError::range(format!("Field offset {field_offset} out of range"))
        })?;
        slot.get().ok_or_else(|| {
            SegcoreError::not_loaded(format!("Field at offset {field_offset} is not loaded"))
        })
    }

    pub fn chunk_count(&self, field_offset: FieldOffset) -> Result<usize> {
        Ok(self
            .loaded_column(field_offset)?
            .chunk_count(self.row_count()))
    }

    /// Zero-copy typed view over one chunk of a loaded user field.
    pub fn chunk_span<T: ColumnElement>(
        &self,
        field_offset: FieldOffset,
        chunk_index: usize,
    ) -> Result<ChunkSpan<'_, T>> {
        self.loaded_column(field_offset)?
            .chunk_span(chunk_index, self.row_count())
    }

    /// Zero-copy view over the loaded row id column.
    pub fn row_id_span(&self, chunk_index: usize) -> Result<ChunkSpan<'_, RowId>> {
        self.row_ids
            .get()
            .ok_or_else(|| SegcoreError::not_loaded("Row id field is not loaded"))?
            .chunk_span(chunk_index, self.row_count())
    }

    pub fn search(&self, plan: &Plan, requests: &[SearchRequest<'_>]) -> Result<Vec<QueryResult>> {
        execute_search(self, plan, requests)
    }
}

impl SegmentReader for SealedSegment {
    fn id(&self) -> Uuid {
        self.id
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    fn config(&self) -> &SegmentConfig {
        &self.config
    }

    fn visible_rows(&self, timestamp: Timestamp) -> Result<VisibleRows> {
        let rows = self.row_count();
        let Some(column) = self.timestamps.get() else {
            return Ok(VisibleRows::prefix(rows));
        };
        if timestamp >= column.max {
            return Ok(VisibleRows::prefix(rows));
        }

        // Loaded rows are not time ordered, so filter row by row.
        let mut mask = BitVec::from_elem(rows, false);
        column.values.for_each_span(rows, |first_row, span| {
            for (i, ts) in span.iter().enumerate() {
                if *ts <= timestamp {
                    mask.set(first_row + i, true);
                }
            }
        })?;
        Ok(VisibleRows {
            scan_len: rows,
            mask: Some(mask),
        })
    }

    fn column(&self, offset: FieldOffset) -> Option<&ColumnData> {
        self.columns.get(offset.get()).and_then(|slot| slot.get())
    }

    fn vector_index(&self, offset: FieldOffset) -> Option<Arc<IndexAttachment>> {
        self.indexes.get(offset.get()).and_then(|slot| slot.get().cloned())
    }
}
