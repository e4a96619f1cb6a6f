//! IVF-Flat index: k-means coarse quantizer over inverted lists of raw vectors.

use bit_vec::BitVec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::MetricType;
use crate::error::{Result, SegcoreError};
use crate::index::{Dataset, IndexSearchResult, SearchParams, VectorIndex, ensure_dim, is_allowed};
use crate::util::simd::l2_squared_simd;
use crate::util::topk::TopK;

/// Training and search parameters of an [`IvfFlatIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IvfParams {
    /// Number of inverted lists (k-means clusters).
    pub nlist: usize,
    /// Lists probed per query unless overridden by [`SearchParams::nprobe`].
    pub nprobe: usize,
    /// Upper bound on Lloyd iterations.
    pub max_iterations: usize,
    /// Training sample is capped at `nlist * max_points_per_centroid` rows.
    pub max_points_per_centroid: usize,
    /// Seed for sampling and k-means++ initialization.
    pub seed: u64,
}

impl Default for IvfParams {
    fn default() -> Self {
        IvfParams {
            nlist: 100,
            nprobe: 10,
            max_iterations: 25,
            max_points_per_centroid: 256,
            seed: 42,
        }
    }
}

impl IvfParams {
    pub fn with_nlist(mut self, nlist: usize) -> Self {
        self.nlist = nlist;
        self
    }

    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Inverted-file index with flat (uncompressed) lists.
///
/// Centroids are learned with squared-L2 k-means regardless of the ranking
/// metric; candidate vectors inside the probed lists are ranked with the
/// index metric.
#[derive(Debug, Clone)]
pub struct IvfFlatIndex {
    dim: usize,
    metric: MetricType,
    params: IvfParams,
    centroids: Vec<f32>,
    lists: Vec<Vec<u32>>,
    data: Vec<f32>,
}

impl IvfFlatIndex {
    pub fn new(dim: usize, metric: MetricType, params: IvfParams) -> Result<Self> {
        if dim == 0 {
            return Err(SegcoreError::invalid_argument(
                "Index dimension must be > 0",
            ));
        }
        if params.nlist == 0 || params.nprobe == 0 {
            return Err(SegcoreError::invalid_argument(
                "nlist and nprobe must be > 0",
            ));
        }
        Ok(IvfFlatIndex {
            dim,
            metric,
            params,
            centroids: Vec::new(),
            lists: Vec::new(),
            data: Vec::new(),
        })
    }

    pub fn params(&self) -> &IvfParams {
        &self.params
    }

    pub fn nlist(&self) -> usize {
        self.params.nlist
    }

    /// Sizes of the inverted lists.
    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(|l| l.len()).collect()
    }

    fn centroid(&self, c: usize) -> &[f32] {
        &self.centroids[c * self.dim..(c + 1) * self.dim]
    }

    fn nearest_centroid(&self, vector: &[f32]) -> usize {
        nearest(&self.centroids, self.dim, vector)
    }

    /// The `nprobe` closest lists to `query`, closest first.
    fn probe_order(&self, query: &[f32], nprobe: usize) -> Vec<usize> {
        let mut order: Vec<(f32, usize)> = (0..self.params.nlist)
            .map(|c| (l2_squared_simd(query, self.centroid(c)), c))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        order.into_iter().take(nprobe).map(|(_, c)| c).collect()
    }
}

fn nearest(centroids: &[f32], dim: usize, vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (c, centroid) in centroids.chunks_exact(dim).enumerate() {
        let distance = l2_squared_simd(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = c;
        }
    }
    best
}

/// k-means++ seeding over the training sample.
fn init_kmeans_plus_plus(sample: &[f32], dim: usize, k: usize, rng: &mut StdRng) -> Vec<f32> {
    let rows = sample.len() / dim;
    let mut centroids = Vec::with_capacity(k * dim);
    let first = rng.random_range(0..rows);
    centroids.extend_from_slice(&sample[first * dim..(first + 1) * dim]);

    let mut min_dist: Vec<f32> = sample
        .chunks_exact(dim)
        .map(|v| l2_squared_simd(v, &centroids[..dim]))
        .collect();

    for _ in 1..k {
        let total: f64 = min_dist.iter().map(|d| *d as f64).sum();
        let next = if total <= 0.0 {
            rng.random_range(0..rows)
        } else {
            let target = rng.random::<f64>() * total;
            let mut cumsum = 0.0;
            let mut chosen = rows - 1;
            for (i, d) in min_dist.iter().enumerate() {
                cumsum += *d as f64;
                if cumsum >= target {
                    chosen = i;
                    break;
                }
            }
            chosen
        };

        let start = centroids.len();
        centroids.extend_from_slice(&sample[next * dim..(next + 1) * dim]);
        let added = &centroids[start..start + dim];
        min_dist
            .par_iter_mut()
            .zip(sample.par_chunks_exact(dim))
            .for_each(|(d, v)| *d = d.min(l2_squared_simd(v, added)));
    }

    centroids
}

impl VectorIndex for IvfFlatIndex {
    fn index_type(&self) -> &'static str {
        "IVF_FLAT"
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
        !self.centroids.is_empty()
    }

    fn train(&mut self, data: Dataset<'_>) -> Result<()> {
        ensure_dim(self.dim, &data)?;
        let nlist = self.params.nlist;
        if data.rows() < nlist {
            return Err(SegcoreError::index(format!(
                "Cannot train {nlist} lists from {} vectors",
                data.rows()
            )));
        }

        let dim = self.dim;
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let sample_size = data
            .rows()
            .min(nlist.saturating_mul(self.params.max_points_per_centroid));
        let sample: Vec<f32> = if sample_size == data.rows() {
            data.data().to_vec()
        } else {
            let mut picked = rand::seq::index::sample(&mut rng, data.rows(), sample_size).into_vec();
            picked.sort_unstable();
            picked
                .iter()
                .flat_map(|i| data.row(*i).iter().copied())
                .collect()
        };

        let mut centroids = init_kmeans_plus_plus(&sample, dim, nlist, &mut rng);

        for iteration in 0..self.params.max_iterations {
            let assignments: Vec<usize> = sample
                .par_chunks_exact(dim)
                .map(|v| nearest(&centroids, dim, v))
                .collect();

            let mut sums = vec![0.0f64; nlist * dim];
            let mut counts = vec![0usize; nlist];
            for (vector, c) in sample.chunks_exact(dim).zip(&assignments) {
                counts[*c] += 1;
                for (s, x) in sums[c * dim..(c + 1) * dim].iter_mut().zip(vector) {
                    *s += *x as f64;
                }
            }

            let mut movement = 0.0f32;
            for c in 0..nlist {
                // Empty clusters keep their previous centroid.
                if counts[c] == 0 {
                    continue;
                }
                let updated: Vec<f32> = sums[c * dim..(c + 1) * dim]
                    .iter()
                    .map(|s| (*s / counts[c] as f64) as f32)
                    .collect();
                let current = &mut centroids[c * dim..(c + 1) * dim];
                movement += l2_squared_simd(current, &updated);
                current.copy_from_slice(&updated);
            }

            if movement / (nlist as f32) < 1e-6 {
                debug!(iteration, "k-means converged");
                break;
            }
        }

        self.centroids = centroids;
        self.lists = vec![Vec::new(); nlist];
        self.data.clear();
        Ok(())
    }

    fn add(&mut self, data: Dataset<'_>) -> Result<()> {
        ensure_dim(self.dim, &data)?;
        if !self.is_trained() {
            return Err(SegcoreError::index("IVF index must be trained before add"));
        }
        let base = self.count();
        if base + data.rows() > u32::MAX as usize {
            return Err(SegcoreError::index("IVF index id space exhausted"));
        }

        let assignments: Vec<usize> = (0..data.rows())
            .into_par_iter()
            .map(|i| self.nearest_centroid(data.row(i)))
            .collect();
        for (i, c) in assignments.into_iter().enumerate() {
            self.lists[c].push((base + i) as u32);
        }
        self.data.extend_from_slice(data.data());
        Ok(())
    }

    fn query(
        &self,
        queries: Dataset<'_>,
        topk: usize,
        params: &SearchParams,
        allow: Option<&BitVec>,
    ) -> Result<IndexSearchResult> {
        ensure_dim(self.dim, &queries)?;
        if !self.is_trained() {
            return Err(SegcoreError::index("IVF index is not trained"));
        }
        let nprobe = params
            .nprobe
            .unwrap_or(self.params.nprobe)
            .clamp(1, self.params.nlist);

        let per_query: Vec<_> = (0..queries.rows())
            .into_par_iter()
            .map(|q| {
                let query = queries.row(q);
                let mut heap = TopK::new(topk);
                for list in self.probe_order(query, nprobe) {
                    for id in &self.lists[list] {
                        let id = *id as usize;
                        if is_allowed(allow, id) {
                            let vector = &self.data[id * self.dim..(id + 1) * self.dim];
                            heap.push(id as i64, self.metric.distance(query, vector));
                        }
                    }
                }
                heap.into_sorted_vec()
            })
            .collect();

        IndexSearchResult::from_hits(topk, per_query)
    }
}
