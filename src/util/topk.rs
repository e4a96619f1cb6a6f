//! Bounded top-k selection over (offset, distance) pairs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

/// One ranked search hit: a segment row offset and its distance to the query.
///
/// Hits order by ascending distance, then by ascending offset, so sorting a
/// list of hits yields the canonical result order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub offset: i64,
    pub distance: f32,
}

impl SearchHit {
    pub fn new(offset: i64, distance: f32) -> Self {
        SearchHit { offset, distance }
    }
}

impl Eq for SearchHit {}

impl PartialOrd for SearchHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.offset.cmp(&other.offset))
    }
}

/// Keeps the `k` best hits seen so far.
///
/// Backed by a max-heap whose top is the worst retained hit.
#[derive(Debug, Clone)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<SearchHit>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        TopK {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer a candidate.
    #[inline]
    pub fn push(&mut self, offset: i64, distance: f32) {
        let hit = SearchHit::new(offset, distance);
        if self.heap.len() < self.k {
            self.heap.push(hit);
        } else if let Some(worst) = self.heap.peek()
            && hit < *worst
        {
            self.heap.pop();
            self.heap.push(hit);
        }
    }

    /// Fold another partial result into this one.
    pub fn merge(&mut self, other: TopK) {
        for hit in other.heap {
            self.push(hit.offset, hit.distance);
        }
    }

    /// Drain into hits sorted best first.
    pub fn into_sorted_vec(self) -> Vec<SearchHit> {
        self.heap.into_sorted_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_best_k() {
        let mut topk = TopK::new(3);
        for (offset, distance) in [(0, 5.0), (1, 1.0), (2, 3.0), (3, 0.5), (4, 9.0)] {
            topk.push(offset, distance);
        }
        let hits = topk.into_sorted_vec();
        let offsets: Vec<i64> = hits.iter().map(|h| h.offset).collect();
        assert_eq!(offsets, vec![3, 1, 2]);
    }

    #[test]
    fn test_ties_prefer_lower_offset() {
        let mut topk = TopK::new(2);
        topk.push(7, 1.0);
        topk.push(3, 1.0);
        topk.push(5, 1.0);
        let hits = topk.into_sorted_vec();
        assert_eq!(hits, vec![SearchHit::new(3, 1.0), SearchHit::new(5, 1.0)]);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let mut left = TopK::new(4);
        let mut right = TopK::new(4);
        let mut all = TopK::new(4);
        for i in 0..20i64 {
            let d = ((i * 7) % 11) as f32;
            all.push(i, d);
            if i % 2 == 0 {
                left.push(i, d);
            } else {
                right.push(i, d);
            }
        }
        left.merge(right);
        assert_eq!(left.into_sorted_vec(), all.into_sorted_vec());
    }

    #[test]
    fn test_zero_k() {
        let mut topk = TopK::new(0);
        topk.push(1, 1.0);
        assert!(topk.is_empty());
    }
}
