//! Exhaustive index: every query is compared against every stored vector.

use bit_vec::BitVec;
use rayon::prelude::*;

use crate::distance::MetricType;
use crate::error::{Result, SegcoreError};
use crate::index::{Dataset, IndexSearchResult, SearchParams, VectorIndex, ensure_dim, is_allowed};
use crate::util::topk::TopK;

/// Flat index storing raw vectors contiguously.
///
/// Its answers are exact, so a segment searched through a `FlatIndex`
/// returns the same hits as a brute-force scan over the same rows.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    metric: MetricType,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: MetricType) -> Result<Self> {
        if dim == 0 {
            return Err(SegcoreError::invalid_argument(
                "Index dimension must be > 0",
            ));
        }
        Ok(FlatIndex {
            dim,
            metric,
            data: Vec::new(),
        })
    }

    /// Stored vector of id `id`.
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        self.data.get(id * self.dim..(id + 1) * self.dim)
    }
}

impl VectorIndex for FlatIndex {
    fn index_type(&self) -> &'static str {
        "FLAT"
    }

    fn metric_type(&self) -> MetricType {
        self.metric
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn count(&self) -> usize {
        self.data.len() / self.dim
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn train(&mut self, data: Dataset<'_>) -> Result<()> {
        ensure_dim(self.dim, &data)
    }

    fn add(&mut self, data: Dataset<'_>) -> Result<()> {
        ensure_dim(self.dim, &data)?;
        self.data.extend_from_slice(data.data());
        Ok(())
    }

    fn query(
        &self,
        queries: Dataset<'_>,
        topk: usize,
        _params: &SearchParams,
        allow: Option<&BitVec>,
    ) -> Result<IndexSearchResult> {
        ensure_dim(self.dim, &queries)?;

        let per_query: Vec<_> = (0..queries.rows())
            .into_par_iter()
            .map(|q| {
                let query = queries.row(q);
                let mut heap = TopK::new(topk);
                for (id, vector) in self.data.chunks_exact(self.dim).enumerate() {
                    if is_allowed(allow, id) {
                        heap.push(id as i64, self.metric.distance(query, vector));
                    }
                }
                heap.into_sorted_vec()
            })
            .collect();

        IndexSearchResult::from_hits(topk, per_query)
    }
}
