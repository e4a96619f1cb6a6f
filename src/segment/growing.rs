//! Append-only segment with two-phase concurrent inserts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::SegmentConfig;
use crate::error::{Result, SegcoreError};
use crate::index::{IndexAttachment, LoadIndexInfo};
use crate::query::executor::{SearchRequest, execute_search};
use crate::query::plan::Plan;
use crate::query::result::QueryResult;
use crate::schema::{FieldMap, FieldOffset, Schema};
use crate::segment::ack::AckResponder;
use crate::segment::{SegmentReader, VisibleRows};
use crate::storage::{ChunkSpan, ChunkedVec, ColumnData, ColumnElement, FieldData, RowBlob};
use crate::{RowId, Timestamp};

/// Mutable segment accepting concurrent inserts.
///
/// Writers first call [`GrowingSegment::pre_insert`] to reserve a disjoint
/// row range, then fill it with [`GrowingSegment::insert`]. Rows become
/// visible once every range before them has been filled, and then only to
/// reads whose snapshot timestamp is at least the row's timestamp.
#[derive(Debug)]
pub struct GrowingSegment {
    id: Uuid,
    schema: Arc<Schema>,
    field_map: FieldMap,
    config: SegmentConfig,
    columns: Vec<ColumnData>,
    row_ids: ChunkedVec<RowId>,
    timestamps: ChunkedVec<Timestamp>,
    reserved: AtomicUsize,
    ack: AckResponder,
    indexes: Vec<OnceLock<Arc<IndexAttachment>>>,
}

impl GrowingSegment {
    pub fn new(schema: Arc<Schema>, config: SegmentConfig) -> Result<Self> {
        config.validate()?;
        let rows_per_chunk = config.size_per_chunk;
        let max_rows = config.max_row_count;

        let columns = schema
            .fields()
            .iter()
            .map(|meta| ColumnData::new(meta, rows_per_chunk, max_rows))
            .collect::<Result<Vec<_>>>()?;
        let indexes = (0..schema.len()).map(|_| OnceLock::new()).collect();

        let segment = GrowingSegment {
            id: Uuid::new_v4(),
            field_map: FieldMap::from_schema(&schema),
            row_ids: ChunkedVec::new(1, rows_per_chunk, max_rows)?,
            timestamps: ChunkedVec::new(1, rows_per_chunk, max_rows)?,
            reserved: AtomicUsize::new(0),
            ack: AckResponder::new(),
            columns,
            indexes,
            schema,
            config,
        };
        debug!(
            segment = %segment.id,
            fields = segment.schema.len(),
            size_per_chunk = rows_per_chunk,
            max_row_count = max_rows,
            "created growing segment"
        );
        Ok(segment)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Number of fully written leading rows.
    pub fn row_count(&self) -> usize {
        self.ack.acked()
    }

    /// Number of rows handed out by [`GrowingSegment::pre_insert`].
    pub fn reserved_count(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Reserve `n` rows at the tail and return the first reserved offset.
    pub fn pre_insert(&self, n: usize) -> Result<usize> {
        let max = self.config.max_row_count;
        let offset = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tail| {
                tail.checked_add(n).filter(|end| *end <= max)
            })
            .map_err(|tail| {
                SegcoreError::capacity(format!(
                    "Reserving {n} rows at {tail} exceeds capacity {max}"
                ))
            })?;
        trace!(segment = %self.id, offset, n, "reserved rows");
        Ok(offset)
    }

    /// Fill the reserved rows `[offset, offset + n)`.
    ///
    /// `columns` holds one entry per schema field, in schema order. Every
    /// argument is validated before anything is written; on error the
    /// segment is unchanged and the range may be retried.
    pub fn insert(
        &self,
        offset: usize,
        n: usize,
        row_ids: &[RowId],
        timestamps: &[Timestamp],
        columns: &[FieldData],
    ) -> Result<()> {
        self.validate_insert(n, row_ids, timestamps, columns)?;
        if n == 0 {
            return Ok(());
        }

        self.ack.claim(offset, n, self.reserved_count())?;
        if let Err(e) = self.write_rows(offset, row_ids, timestamps, columns) {
            self.ack.release(offset);
            return Err(e);
        }
        self.ack.complete(offset);

        debug!(
            segment = %self.id,
            offset,
            n,
            acked = self.ack.acked(),
            "inserted rows"
        );
        Ok(())
    }

    /// Fill reserved rows from a packed row blob.
    pub fn insert_rows(
        &self,
        offset: usize,
        n: usize,
        row_ids: &[RowId],
        timestamps: &[Timestamp],
        blob: &RowBlob,
    ) -> Result<()> {
        if blob.count != n {
            return Err(SegcoreError::range(format!(
                "Row blob holds {} rows, expected {n}",
                blob.count
            )));
        }
        let columns = blob.to_columns(&self.schema)?;
        self.insert(offset, n, row_ids, timestamps, &columns)
    }

    fn validate_insert(
        &self,
        n: usize,
        row_ids: &[RowId],
        timestamps: &[Timestamp],
        columns: &[FieldData],
    ) -> Result<()> {
        if row_ids.len() != n || timestamps.len() != n {
            return Err(SegcoreError::range(format!(
                "Insert of {n} rows carries {} row ids and {} timestamps",
                row_ids.len(),
                timestamps.len()
            )));
        }
        if columns.len() != self.schema.len() {
            return Err(SegcoreError::range(format!(
                "Insert carries {} columns, schema has {} fields",
                columns.len(),
                self.schema.len()
            )));
        }
        for (meta, column) in self.schema.fields().iter().zip(columns) {
            column.check_matches(meta, n)?;
        }
        if timestamps.windows(2).any(|w| w[0] > w[1]) {
            return Err(SegcoreError::range(
                "Insert timestamps must be non-decreasing",
            ));
        }
        Ok(())
    }

    fn write_rows(
        &self,
        offset: usize,
        row_ids: &[RowId],
        timestamps: &[Timestamp],
        columns: &[FieldData],
    ) -> Result<()> {
        for (column, values) in self.columns.iter().zip(columns) {
            column.write(offset, values)?;
        }
        self.row_ids.write_rows(offset, row_ids)?;
        self.timestamps.write_rows(offset, timestamps)
    }

    /// Attach a trained index to a vector field.
    ///
    /// Takes effect for searches dispatched afterwards. Rows inserted after
    /// the index was built are still searched exactly.
    pub fn load_indexing(&self, info: LoadIndexInfo) -> Result<()> {
        let field_id = info.field_id;
        let attachment = match IndexAttachment::validate(info, &self.schema, &self.field_map) {
            Ok(attachment) => attachment,
            Err(e) => {
                warn!(segment = %self.id, field = %field_id, error = %e, "rejected index");
                return Err(e);
            }
        };

        let offset = attachment.field_offset();
        let index_type = attachment.index().index_type();
        let indexed_rows = attachment.indexed_rows();
        self.indexes[offset.get()]
            .set(Arc::new(attachment))
            .map_err(|_| {
                SegcoreError::not_loaded(format!("Index for field {field_id} is already loaded"))
            })?;

        info!(
            segment = %self.id,
            field = %field_id,
            index_type,
            indexed_rows,
            "attached index"
        );
        Ok(())
    }

    /// Number of chunks covering the written rows of each field.
    pub fn num_chunk_data(&self) -> usize {
        self.row_count().div_ceil(self.config.size_per_chunk)
    }

    pub fn chunk_count(&self, field_offset: FieldOffset) -> Result<usize> {
        Ok(self.field_column(field_offset)?.chunk_count(self.row_count()))
    }

    /// Zero-copy typed view over one chunk of a user field.
    pub fn chunk_span<T: ColumnElement>(
        &self,
        field_offset: FieldOffset,
        chunk_index: usize,
    ) -> Result<ChunkSpan<'_, T>> {
        self.field_column(field_offset)?
            .chunk_span(chunk_index, self.row_count())
    }

    /// Zero-copy view over one chunk of the row id column.
    pub fn row_id_span(&self, chunk_index: usize) -> Result<ChunkSpan<'_, RowId>> {
        self.row_ids.chunk_span(chunk_index, self.row_count())
    }

    /// Zero-copy view over one chunk of the timestamp column.
    pub fn timestamp_span(&self, chunk_index: usize) -> Result<ChunkSpan<'_, Timestamp>> {
        self.timestamps.chunk_span(chunk_index, self.row_count())
    }

    fn field_column(&self, field_offset: FieldOffset) -> Result<&ColumnData> {
        self.columns.get(field_offset.get()).ok_or_else(|| {
            SegcoreError::range(format!("Field offset {field_offset} out of range"))
        })
    }

    pub fn search(&self, plan: &Plan, requests: &[SearchRequest<'_>]) -> Result<Vec<QueryResult>> {
        execute_search(self, plan, requests)
    }
}

impl SegmentReader for GrowingSegment {
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
        let acked = self.ack.acked();
        let scan_len = self.timestamps.partition_point(acked, |t| *t <= timestamp)?;
        Ok(VisibleRows::prefix(scan_len))
    }

    fn column(&self, offset: FieldOffset) -> Option<&ColumnData> {
        self.columns.get(offset.get())
    }

    fn vector_index(&self, offset: FieldOffset) -> Option<Arc<IndexAttachment>> {
        self.indexes.get(offset.get()).and_then(|slot| slot.get().cloned())
    }
}
