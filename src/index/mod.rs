//! Vector index capability and the bundled implementations.
//!
//! Segments never depend on a concrete ANN algorithm. An index is any type
//! implementing [`VectorIndex`]: it is trained and populated by the caller,
//! then handed to a segment through [`LoadIndexInfo`], where it is validated
//! against the target field and published as an [`IndexAttachment`].

pub mod attachment;
pub mod flat;
pub mod ivf;

use std::fmt;

use bit_vec::BitVec;
use serde::{Deserialize, Serialize};

use crate::distance::MetricType;
use crate::error::{Result, SegcoreError};
use crate::util::topk::SearchHit;

pub use attachment::{IndexAttachment, LoadIndexInfo};
pub use flat::FlatIndex;
pub use ivf::{IvfFlatIndex, IvfParams};

/// A borrowed, row-major batch of vectors.
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    rows: usize,
    dim: usize,
    data: &'a [f32],
}

impl<'a> Dataset<'a> {
    /// Wrap `data` as rows of `dim` floats.
    pub fn new(dim: usize, data: &'a [f32]) -> Result<Self> {
        if dim == 0 {
            return Err(SegcoreError::invalid_argument(
                "Dataset dimension must be > 0",
            ));
        }
        if data.len() % dim != 0 {
            return Err(SegcoreError::invalid_argument(format!(
                "Dataset of {} floats is not a multiple of dim {dim}",
                data.len()
            )));
        }
        Ok(Dataset {
            rows: data.len() / dim,
            dim,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn data(&self) -> &'a [f32] {
        self.data
    }

    /// Vector of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &'a [f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }
}

/// Per-call search parameters forwarded to the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Number of inverted lists to probe; ignored by exhaustive indexes.
    pub nprobe: Option<usize>,
}

impl SearchParams {
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = Some(nprobe);
        self
    }
}

/// Raw index answer: `num_queries * topk` ids and distances, query-major,
/// padded with id `-1` and distance `f32::MAX` when fewer hits exist.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSearchResult {
    pub num_queries: usize,
    pub topk: usize,
    pub ids: Vec<i64>,
    pub distances: Vec<f32>,
}

impl IndexSearchResult {
    /// Build a padded result from per-query sorted hit lists.
    pub fn from_hits(topk: usize, per_query: Vec<Vec<SearchHit>>) -> Result<Self> {
        let num_queries = per_query.len();
        let len = padded_len(num_queries, topk)?;
        let mut ids = Vec::new();
        let mut distances = Vec::new();
        ids.try_reserve_exact(len).map_err(|e| SegcoreError::invalid_argument(e.to_string()))?;
        distances
            .try_reserve_exact(len)
            .map_err(|e| SegcoreError::invalid_argument(e.to_string()))?;
        for hits in per_query {
            let n = hits.len().min(topk);
            for hit in &hits[..n] {
                ids.push(hit.offset);
                distances.push(hit.distance);
            }
            ids.extend(std::iter::repeat_n(-1, topk - n));
            distances.extend(std::iter::repeat_n(f32::MAX, topk - n));
        }
        Ok(IndexSearchResult {
            num_queries,
            topk,
            ids,
            distances,
        })
    }

    /// Non-padded hits of query `q`.
    pub fn hits(&self, q: usize) -> impl Iterator<Item = SearchHit> + '_ {
        let range = q * self.topk..(q + 1) * self.topk;
        self.ids[range.clone()]
            .iter()
            .zip(&self.distances[range])
            .filter(|(id, _)| **id >= 0)
            .map(|(id, distance)| SearchHit::new(*id, *distance))
    }
}

/// Length of a query-major layout of `num_queries * topk` slots.
pub(crate) fn padded_len(num_queries: usize, topk: usize) -> Result<usize> {
    num_queries.checked_mul(topk).ok_or_else(|| {
        SegcoreError::invalid_argument(format!(
            "{num_queries} queries x topk {topk} overflows the result layout"
        ))
    })
}

/// Capability interface of a trained approximate (or exact) vector index.
///
/// Ids returned by [`VectorIndex::query`] are the positions of the vectors in
/// insertion order across all `add` calls, which a segment interprets as row
/// offsets.
pub trait VectorIndex: Send + Sync + fmt::Debug {
    /// Short name of the algorithm, e.g. `"FLAT"` or `"IVF_FLAT"`.
    fn index_type(&self) -> &'static str;

    fn metric_type(&self) -> MetricType;

    fn dim(&self) -> usize;

    /// Number of vectors added so far.
    fn count(&self) -> usize;

    fn is_trained(&self) -> bool;

    /// Learn the index structure from a training sample.
    fn train(&mut self, data: Dataset<'_>) -> Result<()>;

    /// Append vectors; they receive ids `count()..count() + data.rows()`.
    fn add(&mut self, data: Dataset<'_>) -> Result<()>;

    /// Return up to `topk` nearest ids per query, best first. When `allow` is
    /// given, ids whose bit is unset (or beyond its length) are skipped.
    fn query(
        &self,
        queries: Dataset<'_>,
        topk: usize,
        params: &SearchParams,
        allow: Option<&BitVec>,
    ) -> Result<IndexSearchResult>;

    /// Train on `data` and then add it.
    fn build(&mut self, data: Dataset<'_>) -> Result<()> {
        self.train(data)?;
        self.add(data)
    }
}

/// Reject a dataset whose dimension differs from the index dimension.
pub(crate) fn ensure_dim(expected: usize, data: &Dataset<'_>) -> Result<()> {
    if data.dim() != expected {
        return Err(SegcoreError::index(format!(
            "Vector dimension {} does not match index dimension {expected}",
            data.dim()
        )));
    }
    Ok(())
}

#[inline]
pub(crate) fn is_allowed(allow: Option<&BitVec>, id: usize) -> bool {
    allow.is_none_or(|bits| bits.get(id).unwrap_or(false))
}
