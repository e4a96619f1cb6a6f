//! Per-request search results.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegcoreError};
use crate::index::padded_len;
use crate::util::topk::SearchHit;

/// Ranked hits of every query vector of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub num_queries: usize,
    pub topk: usize,
    /// One list per query vector, best first, at most `topk` long.
    pub hits: Vec<Vec<SearchHit>>,
}

impl QueryResult {
    pub fn new(topk: usize, hits: Vec<Vec<SearchHit>>) -> Self {
        QueryResult {
            num_queries: hits.len(),
            topk,
            hits,
        }
    }

    /// Hits of query `q`.
    pub fn query_hits(&self, q: usize) -> &[SearchHit] {
        self.hits.get(q).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row offsets, `num_queries * topk` entries, padded with `-1`.
    pub fn seg_offsets(&self) -> Result<Vec<i64>> {
        self.flatten(|hit| hit.offset, -1)
    }

    /// Distances, `num_queries * topk` entries, padded with `f32::MAX`.
    pub fn distances(&self) -> Result<Vec<f32>> {
        self.flatten(|hit| hit.distance, f32::MAX)
    }

    fn flatten<T: Copy>(&self, field: impl Fn(&SearchHit) -> T, pad: T) -> Result<Vec<T>> {
        let len = padded_len(self.num_queries, self.topk)?;
        let mut out = Vec::new();
        out.try_reserve_exact(len)
            .map_err(|e| SegcoreError::invalid_argument(e.to_string()))?;
        for hits in &self.hits {
            out.extend(hits.iter().take(self.topk).map(&field));
            out.extend(std::iter::repeat_n(pad, self.topk.saturating_sub(hits.len())));
        }
        Ok(out)
    }

    /// JSON form used to compare results structurally.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattened_layout() {
        let result = QueryResult::new(
            2,
            vec![
                vec![SearchHit::new(3, 0.0), SearchHit::new(9, 1.5)],
                vec![SearchHit::new(4, 2.0)],
            ],
        );
        assert_eq!(result.seg_offsets().unwrap(), vec![3, 9, 4, -1]);
        assert_eq!(result.distances().unwrap(), vec![0.0, 1.5, 2.0, f32::MAX]);
        assert_eq!(result.query_hits(1).len(), 1);
        assert!(result.query_hits(5).is_empty());
    }

    #[test]
    fn test_oversized_layout_is_an_error() {
        let result = QueryResult::new(usize::MAX / 2, vec![vec![SearchHit::new(1, 0.0)]; 3]);
        assert!(matches!(result.seg_offsets(), Err(SegcoreError::InvalidArgument(_))));
        assert_eq!(result.query_hits(2).len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let result = QueryResult::new(1, vec![vec![SearchHit::new(7, 0.25)]]);
        let json = result.to_json().unwrap();
        assert_eq!(json["hits"][0][0]["offset"], 7);
        assert_eq!(json["topk"], 1);
    }
}
