//! Hybrid search execution: visibility, predicate filtering and vector ranking.

use std::ops::Range;
use std::time::Instant;

use bit_vec::BitVec;
use parking_lot::Mutex;
use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::debug;

use crate::Timestamp;
use crate::config::ExecutorConfig;
use crate::distance::MetricType;
use crate::error::{Result, SegcoreError};
use crate::index::{Dataset, IndexAttachment, SearchParams};
use crate::query::placeholder::PlaceholderGroup;
use crate::query::plan::Plan;
use crate::query::predicate::{check_predicate, evaluate};
use crate::query::result::QueryResult;
use crate::schema::FieldOffset;
use crate::segment::{Segment, SegmentReader};
use crate::storage::{ChunkedVec, ColumnData};
use crate::util::topk::TopK;

/// One request of a search batch: serialized query vectors plus the
/// snapshot timestamp bounding which rows the request may observe.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub placeholder_group: &'a [u8],
    pub timestamp: Timestamp,
}

impl<'a> SearchRequest<'a> {
    pub fn new(placeholder_group: &'a [u8], timestamp: Timestamp) -> Self {
        SearchRequest {
            placeholder_group,
            timestamp,
        }
    }
}

/// Vector-search leaf resolved against a segment's schema.
#[derive(Debug)]
struct SearchTarget {
    field_offset: FieldOffset,
    metric: MetricType,
    topk: usize,
    params: SearchParams,
}

fn resolve_target<S: SegmentReader + ?Sized>(segment: &S, plan: &Plan) -> Result<SearchTarget> {
    let leaf = &plan.vector_search;
    let field_offset = segment.field_map().require_offset(leaf.field_id)?;
    let meta = segment
        .schema()
        .field(field_offset)
        .ok_or_else(|| SegcoreError::schema_mismatch(format!("Unknown field id {}", leaf.field_id)))?;
    let metric = meta.metric_type().ok_or_else(|| {
        SegcoreError::schema_mismatch(format!("Field '{}' is not a vector field", meta.name()))
    })?;
    if let Some(requested) = leaf.metric_type
        && requested != metric
    {
        return Err(SegcoreError::schema_mismatch(format!(
            "Plan metric {requested} does not match field '{}' metric {metric}",
            meta.name()
        )));
    }

    Ok(SearchTarget {
        field_offset,
        metric,
        topk: leaf.topk,
        params: leaf.params.clone(),
    })
}

/// Run a batch of requests against one segment.
///
/// The plan, every placeholder group and the availability of every field
/// the plan needs are checked before any row is read, so a structurally
/// invalid batch fails as a whole. Requests then run in parallel and their
/// results keep request order.
pub fn execute_search<S: SegmentReader + ?Sized>(
    segment: &S,
    plan: &Plan,
    requests: &[SearchRequest<'_>],
) -> Result<Vec<QueryResult>> {
    let start = Instant::now();
    plan.validate()?;
    let target = resolve_target(segment, plan)?;

    let groups = requests
        .iter()
        .map(|request| PlaceholderGroup::parse(plan, segment.schema(), request.placeholder_group))
        .collect::<Result<Vec<_>>>()?;

    if let Some(predicate) = &plan.predicate {
        check_predicate(predicate, segment)?;
    }
    let index = segment.vector_index(target.field_offset);
    let column = segment.column(target.field_offset);
    if index.is_none() && column.is_none() {
        return Err(SegcoreError::not_loaded(format!(
            "Field {} has neither raw data nor an index",
            plan.vector_search.field_id
        )));
    }

    let results = requests
        .par_iter()
        .zip(groups.par_iter())
        .map(|(request, group)| {
            search_request(
                segment,
                plan,
                &target,
                index.as_deref(),
                column,
                group,
                request.timestamp,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        segment = %segment.id(),
        requests = requests.len(),
        indexed = index.is_some(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "search batch finished"
    );
    Ok(results)
}

fn search_request<S: SegmentReader + ?Sized>(
    segment: &S,
    plan: &Plan,
    target: &SearchTarget,
    index: Option<&IndexAttachment>,
    column: Option<&ColumnData>,
    group: &PlaceholderGroup,
    timestamp: Timestamp,
) -> Result<QueryResult> {
    let visible = segment.visible_rows(timestamp)?;
    let scan_len = visible.scan_len;

    let filter = match &plan.predicate {
        None => visible.mask,
        Some(expr) => {
            let mut bits = evaluate(expr, segment, scan_len)?;
            if let Some(mask) = &visible.mask {
                bits.and(mask);
            }
            Some(bits)
        }
    };

    let queries = group.dataset()?;
    let threshold = segment.config().parallel_threshold;

    let heaps = match index {
        Some(attachment) => {
            let indexed = attachment.indexed_rows().min(scan_len);
            let allow = allow_list(filter.as_ref(), indexed);
            let mut heaps: Vec<TopK> = (0..queries.rows())
                .map(|_| TopK::new(target.topk))
                .collect();

            // The index cannot return more than the rows it covers.
            let index_topk = target.topk.min(indexed);
            if index_topk > 0 {
                let raw = attachment.index().query(
                    queries,
                    index_topk,
                    &target.params,
                    Some(&allow),
                )?;
                for (q, heap) in heaps.iter_mut().enumerate() {
                    for hit in raw.hits(q) {
                        let row = hit.offset as usize;
                        if row < indexed && allow.get(row).unwrap_or(false) {
                            heap.push(hit.offset, hit.distance);
                        }
                    }
                }
            }

            // Rows appended after the index was built are ranked exactly.
            if indexed < scan_len {
                let vectors = column.and_then(ColumnData::vectors).ok_or_else(|| {
                    SegcoreError::not_loaded(format!(
                        "Rows [{indexed}, {scan_len}) are not covered by the index and have no raw data"
                    ))
                })?;
                let residual = brute_force(
                    vectors,
                    queries,
                    target.metric,
                    indexed..scan_len,
                    filter.as_ref(),
                    target.topk,
                    threshold,
                )?;
                for (heap, extra) in heaps.iter_mut().zip(residual) {
                    heap.merge(extra);
                }
            }
            heaps
        }
        None => {
            let vectors = column.and_then(ColumnData::vectors).ok_or_else(|| {
                SegcoreError::not_loaded("Vector field has no raw data")
            })?;
            brute_force(
                vectors,
                queries,
                target.metric,
                0..scan_len,
                filter.as_ref(),
                target.topk,
                threshold,
            )?
        }
    };

    Ok(QueryResult::new(
        target.topk,
        heaps.into_iter().map(TopK::into_sorted_vec).collect(),
    ))
}

/// Restrict `filter` (or "everything") to the first `len` rows.
fn allow_list(filter: Option<&BitVec>, len: usize) -> BitVec {
    match filter {
        Some(bits) => bits
            .iter()
            .chain(std::iter::repeat(false))
            .take(len)
            .collect(),
        None => BitVec::from_elem(len, true),
    }
}

/// Exact top-k over `rows` of a vector column.
///
/// The row range is cut into blocks that never straddle a chunk; when the
/// range holds at least `parallel_threshold` rows the blocks are scanned in
/// parallel and the partial results merged.
fn brute_force(
    vectors: &ChunkedVec<f32>,
    queries: Dataset<'_>,
    metric: MetricType,
    rows: Range<usize>,
    filter: Option<&BitVec>,
    topk: usize,
    parallel_threshold: usize,
) -> Result<Vec<TopK>> {
    let empty = || (0..queries.rows()).map(|_| TopK::new(topk)).collect::<Vec<_>>();
    if rows.is_empty() {
        return Ok(empty());
    }

    let rows_per_chunk = vectors.rows_per_chunk();
    let block = parallel_threshold.max(1);
    let mut blocks = Vec::new();
    let mut row = rows.start;
    while row < rows.end {
        let chunk_end = (row / rows_per_chunk + 1) * rows_per_chunk;
        let end = rows.end.min(chunk_end).min(row.saturating_add(block));
        blocks.push(row..end);
        row = end;
    }

    let dim = vectors.elems_per_row();
    let scan_block = |range: &Range<usize>| -> Result<Vec<TopK>> {
        let chunk_index = range.start / rows_per_chunk;
        let base = chunk_index * rows_per_chunk;
        let span = vectors.chunk_span(chunk_index, rows.end)?;
        let mut heaps = empty();
        for row in range.clone() {
            if !filter.is_none_or(|bits| bits.get(row).unwrap_or(false)) {
                continue;
            }
            let local = row - base;
            let vector = &span[local * dim..(local + 1) * dim];
            for (q, heap) in heaps.iter_mut().enumerate() {
                heap.push(row as i64, metric.distance(queries.row(q), vector));
            }
        }
        Ok(heaps)
    };

    let partials: Vec<Vec<TopK>> = if rows.len() >= parallel_threshold && blocks.len() > 1 {
        blocks.par_iter().map(scan_block).collect::<Result<_>>()?
    } else {
        blocks.iter().map(scan_block).collect::<Result<_>>()?
    };

    let mut merged = empty();
    for partial in partials {
        for (heap, other) in merged.iter_mut().zip(partial) {
            heap.merge(other);
        }
    }
    Ok(merged)
}

/// Counters maintained by a [`SearchExecutor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    pub total_batches: u64,
    pub total_requests: u64,
    pub failed_batches: u64,
    pub total_time_ms: f64,
}

impl SearchStats {
    pub fn avg_batch_time_ms(&self) -> f64 {
        if self.total_batches == 0 {
            0.0
        } else {
            self.total_time_ms / self.total_batches as f64
        }
    }
}

/// Runs search batches on a dedicated thread pool.
pub struct SearchExecutor {
    config: ExecutorConfig,
    thread_pool: ThreadPool,
    stats: Mutex<SearchStats>,
}

impl SearchExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        if config.num_threads == 0 {
            return Err(SegcoreError::invalid_config("num_threads must be > 0"));
        }
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("segcore-search-{i}"))
            .build()
            .map_err(|e| SegcoreError::invalid_config(format!("Failed to create thread pool: {e}")))?;

        Ok(SearchExecutor {
            config,
            thread_pool,
            stats: Mutex::new(SearchStats::default()),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a batch of requests against `segment` on the executor's pool.
    pub fn search(
        &self,
        segment: &Segment,
        plan: &Plan,
        requests: &[SearchRequest<'_>],
    ) -> Result<Vec<QueryResult>> {
        let start = Instant::now();
        let result = self.thread_pool.install(|| segment.search(plan, requests));

        let mut stats = self.stats.lock();
        stats.total_batches += 1;
        stats.total_requests += requests.len() as u64;
        stats.total_time_ms += start.elapsed().as_secs_f64() * 1000.0;
        if result.is_err() {
            stats.failed_batches += 1;
        }
        result
    }

    pub fn stats(&self) -> SearchStats {
        self.stats.lock().clone()
    }
}

impl std::fmt::Debug for SearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("config", &self.config)
            .field("stats", &*self.stats.lock())
            .finish()
    }
}
