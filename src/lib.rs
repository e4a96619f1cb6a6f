//! # segcore
//!
//! Segment storage and hybrid search core for a columnar vector database.
//!
//! ## Features
//!
//! - Growing segments with lock-minimal reserve-then-fill concurrent inserts
//! - Sealed segments bulk loaded from whole columns or served by an index alone
//! - Chunked columnar storage with typed zero-copy chunk views
//! - Snapshot-timestamp visibility for every read
//! - Scalar predicates combined with exact or index-accelerated vector search
//! - Pluggable vector indexes, with bundled flat and IVF-Flat implementations
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use segcore::config::SegmentConfig;
//! use segcore::distance::MetricType;
//! use segcore::query::{PlaceholderGroup, PlanBuilder, SearchRequest};
//! use segcore::schema::{DataType, Schema};
//! use segcore::segment::{GrowingSegment, Segment};
//! use segcore::storage::FieldData;
//!
//! let mut schema = Schema::new();
//! let vec_id = schema.add_debug_vector_field("fakevec", 2, MetricType::L2).unwrap();
//! schema.add_debug_field("counter", DataType::Int64).unwrap();
//!
//! let growing = GrowingSegment::new(Arc::new(schema), SegmentConfig::default()).unwrap();
//! let offset = growing.pre_insert(2).unwrap();
//! growing
//!     .insert(
//!         offset,
//!         2,
//!         &[10, 11],
//!         &[1, 1],
//!         &[
//!             FieldData::FloatVector { dim: 2, data: vec![0.0, 0.0, 1.0, 1.0] },
//!             FieldData::Int64(vec![0, 1]),
//!         ],
//!     )
//!     .unwrap();
//! let segment = Segment::from(growing);
//!
//! let plan = PlanBuilder::new(vec_id, 1).build().unwrap();
//! let blob = PlaceholderGroup::from_vectors("$0", 2, vec![0.9, 0.9]).unwrap().serialize();
//! let results = segment.search(&plan, &[SearchRequest::new(&blob, 1)]).unwrap();
//! assert_eq!(results[0].seg_offsets().unwrap(), vec![1]);
//! ```

pub mod config;
pub mod distance;
pub mod error;
pub mod index;
pub mod query;
pub mod schema;
pub mod segment;
pub mod storage;
pub mod util;

/// Insertion timestamp of a row; reads observe rows with timestamp <= their snapshot.
pub type Timestamp = u64;

/// Externally assigned row identifier.
pub type RowId = i64;

pub mod prelude {
    pub use crate::config::{ExecutorConfig, SegmentConfig};
    pub use crate::distance::MetricType;
    pub use crate::error::{Result, SegcoreError};
    pub use crate::index::{FlatIndex, IvfFlatIndex, IvfParams, LoadIndexInfo, VectorIndex};
    pub use crate::query::{
        Expr, PlaceholderGroup, Plan, PlanBuilder, QueryResult, SearchExecutor, SearchRequest,
    };
    pub use crate::schema::{DataType, FieldId, FieldOffset, Schema};
    pub use crate::segment::{GrowingSegment, LoadFieldDataInfo, SealedSegment, Segment};
    pub use crate::storage::FieldData;
    pub use crate::{RowId, Timestamp};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
