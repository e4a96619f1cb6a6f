//! Growing and sealed segments behind one read contract.
//!
//! A [`GrowingSegment`] accepts concurrent reserve-then-fill inserts; a
//! [`SealedSegment`] is bulk loaded once and then only read. Both expose the
//! same [`SegmentReader`] view used by the query executor, and the
//! [`Segment`] enum is the single dispatch point between the two.

pub mod ack;
pub mod growing;
pub mod sealed;

use std::sync::Arc;

use bit_vec::BitVec;
use uuid::Uuid;

use crate::Timestamp;
use crate::config::SegmentConfig;
use crate::error::Result;
use crate::index::{IndexAttachment, LoadIndexInfo};
use crate::query::executor::{SearchRequest, execute_search};
use crate::query::plan::Plan;
use crate::query::result::QueryResult;
use crate::schema::{FieldMap, FieldOffset, Schema};
use crate::storage::{ChunkSpan, ColumnData, ColumnElement};

pub use ack::AckResponder;
pub use growing::GrowingSegment;
pub use sealed::{LoadFieldDataInfo, SealedSegment};

/// Rows a read at some snapshot timestamp may observe.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleRows {
    /// Reads scan rows `[0, scan_len)`.
    pub scan_len: usize,
    /// When present, only rows whose bit is set are visible.
    pub mask: Option<BitVec>,
}

impl VisibleRows {
    /// Every row of the prefix is visible.
    pub fn prefix(scan_len: usize) -> Self {
        VisibleRows {
            scan_len,
            mask: None,
        }
    }

    pub fn contains(&self, row: usize) -> bool {
        row < self.scan_len
            && self
                .mask
                .as_ref()
                .is_none_or(|mask| mask.get(row).unwrap_or(false))
    }

    /// Number of visible rows.
    pub fn count(&self) -> usize {
        match &self.mask {
            Some(mask) => mask.iter().take(self.scan_len).filter(|b| *b).count(),
            None => self.scan_len,
        }
    }
}

/// Read-side view of a segment used by predicate evaluation and search.
pub trait SegmentReader: Send + Sync {
    fn id(&self) -> Uuid;

    fn schema(&self) -> &Schema;

    fn field_map(&self) -> &FieldMap;

    fn config(&self) -> &SegmentConfig;

    /// Rows visible to a read at snapshot timestamp `timestamp`.
    fn visible_rows(&self, timestamp: Timestamp) -> Result<VisibleRows>;

    /// Raw column of a user field, if present.
    fn column(&self, offset: FieldOffset) -> Option<&ColumnData>;

    /// Index attached to a vector field, if any.
    fn vector_index(&self, offset: FieldOffset) -> Option<Arc<IndexAttachment>>;
}

/// A segment of either kind.
#[derive(Debug)]
pub enum Segment {
    Growing(GrowingSegment),
    Sealed(SealedSegment),
}

impl Segment {
    pub fn id(&self) -> Uuid {
        match self {
            Segment::Growing(s) => s.id(),
            Segment::Sealed(s) => s.id(),
        }
    }

    pub fn schema(&self) -> &Schema {
        match self {
            Segment::Growing(s) => s.schema(),
            Segment::Sealed(s) => s.schema(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, Segment::Sealed(_))
    }

    /// Number of rows readable from the segment.
    pub fn row_count(&self) -> usize {
        match self {
            Segment::Growing(s) => s.row_count(),
            Segment::Sealed(s) => s.row_count(),
        }
    }

    /// Number of chunks per field.
    pub fn num_chunk_data(&self) -> usize {
        match self {
            Segment::Growing(s) => s.num_chunk_data(),
            Segment::Sealed(s) => s.num_chunk_data(),
        }
    }

    pub fn chunk_count(&self, field_offset: FieldOffset) -> Result<usize> {
        match self {
            Segment::Growing(s) => s.chunk_count(field_offset),
            Segment::Sealed(s) => s.chunk_count(field_offset),
        }
    }

    /// Zero-copy typed view over one chunk of a field.
    pub fn chunk_span<T: ColumnElement>(
        &self,
        field_offset: FieldOffset,
        chunk_index: usize,
    ) -> Result<ChunkSpan<'_, T>> {
        match self {
            Segment::Growing(s) => s.chunk_span(field_offset, chunk_index),
            Segment::Sealed(s) => s.chunk_span(field_offset, chunk_index),
        }
    }

    /// Attach an index to a vector field.
    pub fn load_index(&self, info: LoadIndexInfo) -> Result<()> {
        match self {
            Segment::Growing(s) => s.load_indexing(info),
            Segment::Sealed(s) => s.load_index(info),
        }
    }

    /// Run a batch of search requests against this segment.
    pub fn search(&self, plan: &Plan, requests: &[SearchRequest<'_>]) -> Result<Vec<QueryResult>> {
        match self {
            Segment::Growing(s) => execute_search(s, plan, requests),
            Segment::Sealed(s) => execute_search(s, plan, requests),
        }
    }
}

impl From<GrowingSegment> for Segment {
    fn from(segment: GrowingSegment) -> Self {
        Segment::Growing(segment)
    }
}

impl From<SealedSegment> for Segment {
    fn from(segment: SealedSegment) -> Self {
        Segment::Sealed(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_rows_mask() {
        let mut mask = BitVec::from_elem(5, true);
        mask.set(1, false);
        let rows = VisibleRows {
            scan_len: 4,
            mask: Some(mask),
        };
        assert!(rows.contains(0));
        assert!(!rows.contains(1));
        assert!(!rows.contains(4));
        assert_eq!(rows.count(), 3);
        assert_eq!(VisibleRows::prefix(7).count(), 7);
    }
}
