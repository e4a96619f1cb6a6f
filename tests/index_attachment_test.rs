//! Integration tests for attaching vector indexes to segments.

mod common;

use std::sync::Arc;

use common::{DataGen, TestSchema, fill_growing, load_sealed, test_schema};
use segcore::config::SegmentConfig;
use segcore::distance::MetricType;
use segcore::error::SegcoreError;
use segcore::index::{Dataset, FlatIndex, IvfFlatIndex, IvfParams, LoadIndexInfo, VectorIndex};
use segcore::query::{Expr, Plan, PlanBuilder, QueryResult, SearchRequest};
use segcore::segment::{GrowingSegment, Segment};

const DIM: usize = 16;
const NLIST: usize = 16;

fn ivf_index(dim: usize, metric: MetricType, vectors: &[f32]) -> IvfFlatIndex {
    let params = IvfParams::default().with_nlist(NLIST).with_nprobe(NLIST);
    let mut index = IvfFlatIndex::new(dim, metric, params).unwrap();
    index.build(Dataset::new(dim, vectors).unwrap()).unwrap();
    index
}

fn flat_index(dim: usize, metric: MetricType, vectors: &[f32]) -> FlatIndex {
    let mut index = FlatIndex::new(dim, metric).unwrap();
    index.build(Dataset::new(dim, vectors).unwrap()).unwrap();
    index
}

fn search(segment: &Segment, plan: &Plan, blob: &[u8]) -> QueryResult {
    segment
        .search(plan, &[SearchRequest::new(blob, u64::MAX)])
        .unwrap()
        .remove(0)
}

fn exhaustive_plan(ts: &TestSchema, topk: usize) -> Plan {
    PlanBuilder::new(ts.vec_id, topk).nprobe(NLIST).build().unwrap()
}

#[test]
fn test_metric_mismatch_is_rejected() {
    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(1_000, DIM, 5);
    let segment = Segment::from(load_sealed(&ts, &data, true));

    let plan = exhaustive_plan(&ts, 5);
    let blob = data.query_blob(&[1, 2]);
    let before = search(&segment, &plan, &blob);

    let wrong = flat_index(DIM, MetricType::IP, &data.vectors);
    let err = segment
        .load_index(LoadIndexInfo::new(ts.vec_id, "fakevec", Arc::new(wrong)))
        .unwrap_err();
    assert!(matches!(err, SegcoreError::SchemaMismatch(_)));

    // The segment still answers by brute force exactly as before.
    assert_eq!(search(&segment, &plan, &blob), before);

    // A correct index can still be attached afterwards.
    let right = flat_index(DIM, MetricType::L2, &data.vectors);
    segment
        .load_index(LoadIndexInfo::new(ts.vec_id, "fakevec", Arc::new(right)))
        .unwrap();
    assert_eq!(search(&segment, &plan, &blob), before);
}

#[test]
fn test_metric_param_mismatch_is_rejected() {
    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(200, DIM, 6);
    let segment = Segment::from(load_sealed(&ts, &data, true));

    let index = flat_index(DIM, MetricType::L2, &data.vectors);
    let info = LoadIndexInfo::new(ts.vec_id, "fakevec", Arc::new(index))
        .with_param("metric_type", "IP");
    let err = segment.load_index(info).unwrap_err();
    assert!(matches!(err, SegcoreError::SchemaMismatch(_)));
}

#[test]
fn test_dimension_and_field_mismatch_are_rejected() {
    let ts = test_schema(DIM, MetricType::L2);
    let full = DataGen::new(200, DIM, 6);
    let segment = Segment::from(fill_growing(&ts, &full, SegmentConfig::default(), 200));

    let small = flat_index(8, MetricType::L2, &DataGen::new(200, 8, 6).vectors);
    let err = segment
        .load_index(LoadIndexInfo::new(ts.vec_id, "fakevec", Arc::new(small)))
        .unwrap_err();
    assert!(matches!(err, SegcoreError::SchemaMismatch(_)));

    let index = Arc::new(flat_index(DIM, MetricType::L2, &full.vectors));
    let err = segment
        .load_index(LoadIndexInfo::new(ts.counter_id, "counter", index.clone()))
        .unwrap_err();
    assert!(matches!(err, SegcoreError::SchemaMismatch(_)));

    let err = segment
        .load_index(LoadIndexInfo::new(ts.vec_id, "othervec", index.clone()))
        .unwrap_err();
    assert!(matches!(err, SegcoreError::SchemaMismatch(_)));

    segment
        .load_index(LoadIndexInfo::new(ts.vec_id, "fakevec", index.clone()))
        .unwrap();
    let err = segment
        .load_index(LoadIndexInfo::new(ts.vec_id, "fakevec", index))
        .unwrap_err();
    assert!(matches!(err, SegcoreError::NotLoaded(_)));
}

#[test]
fn test_plan_metric_must_match_field() {
    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(20, DIM, 6);
    let segment = Segment::from(load_sealed(&ts, &data, true));

    let plan = PlanBuilder::new(ts.vec_id, 3)
        .metric_type(MetricType::IP)
        .build()
        .unwrap();
    let blob = data.query_blob(&[0]);
    let err = segment
        .search(&plan, &[SearchRequest::new(&blob, 0)])
        .unwrap_err();
    assert!(matches!(err, SegcoreError::SchemaMismatch(_)));
}

#[test]
fn test_sealed_brute_force_equals_exhaustive_indexes() {
    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(6_000, DIM, 77);
    let blob = data.query_blob(&[0, 100, 2_500, 5_999]);
    let plan = exhaustive_plan(&ts, 10);

    let raw = Segment::from(load_sealed(&ts, &data, true));
    let expected = search(&raw, &plan, &blob);

    let with_flat = Segment::from(load_sealed(&ts, &data, true));
    with_flat
        .load_index(LoadIndexInfo::new(
            ts.vec_id,
            "fakevec",
            Arc::new(flat_index(DIM, MetricType::L2, &data.vectors)),
        ))
        .unwrap();
    assert_eq!(search(&with_flat, &plan, &blob), expected);

    let with_ivf = Segment::from(load_sealed(&ts, &data, false));
    with_ivf
        .load_index(LoadIndexInfo::new(
            ts.vec_id,
            "fakevec",
            Arc::new(ivf_index(DIM, MetricType::L2, &data.vectors)),
        ))
        .unwrap();
    assert_eq!(search(&with_ivf, &plan, &blob), expected);
}

#[test]
fn test_filtered_index_search_equals_brute_force() {
    let ts = test_schema(DIM, MetricType::IP);
    let data = DataGen::new(5_000, DIM, 8);
    let blob = data.query_blob(&[12, 4_000]);
    let plan = PlanBuilder::new(ts.vec_id, 7)
        .predicate(Expr::range(ts.counter_id, 1_000i64, 3_000i64))
        .nprobe(NLIST)
        .build()
        .unwrap();

    let raw = Segment::from(load_sealed(&ts, &data, true));
    let expected = search(&raw, &plan, &blob);
    assert!(
        expected
            .hits
            .iter()
            .flatten()
            .all(|h| (1_000..3_000).contains(&h.offset))
    );

    let indexed = Segment::from(load_sealed(&ts, &data, false));
    indexed
        .load_index(LoadIndexInfo::new(
            ts.vec_id,
            "fakevec",
            Arc::new(ivf_index(DIM, MetricType::IP, &data.vectors)),
        ))
        .unwrap();
    assert_eq!(search(&indexed, &plan, &blob), expected);
}

#[test]
fn test_growing_rows_beyond_index_are_searched() {
    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(4_000, DIM, 13);
    let config = SegmentConfig::default().with_size_per_chunk(1_024);

    // Index covers only the first half; the rest arrives afterwards.
    let growing = GrowingSegment::new(ts.schema.clone(), config.clone()).unwrap();
    let first = growing.pre_insert(2_000).unwrap();
    growing
        .insert(first, 2_000, &data.row_ids[..2_000], &data.timestamps[..2_000], &data.columns(0, 2_000))
        .unwrap();
    let index = ivf_index(DIM, MetricType::L2, &data.vectors[..2_000 * DIM]);
    growing
        .load_indexing(LoadIndexInfo::new(ts.vec_id, "fakevec", Arc::new(index)))
        .unwrap();
    let second = growing.pre_insert(2_000).unwrap();
    growing
        .insert(second, 2_000, &data.row_ids[2_000..], &data.timestamps[2_000..], &data.columns(2_000, 4_000))
        .unwrap();
    let growing = Segment::from(growing);

    let reference = Segment::from(fill_growing(&ts, &data, config, 4_000));
    let blob = data.query_blob(&[5, 1_999, 2_000, 3_500]);
    let plan = exhaustive_plan(&ts, 12);

    let expected = search(&reference, &plan, &blob);
    assert_eq!(search(&growing, &plan, &blob), expected);
    assert_eq!(expected.query_hits(3)[0].offset, 3_500);
}

#[test]
fn test_partial_probe_returns_valid_hits() {
    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(3_000, DIM, 3);
    let segment = Segment::from(load_sealed(&ts, &data, false));
    segment
        .load_index(LoadIndexInfo::new(
            ts.vec_id,
            "fakevec",
            Arc::new(ivf_index(DIM, MetricType::L2, &data.vectors)),
        ))
        .unwrap();

    let plan = PlanBuilder::new(ts.vec_id, 5).nprobe(1).build().unwrap();
    let blob = data.query_blob(&[250]);
    let result = search(&segment, &plan, &blob);

    // The query's own list is probed first, so its row is always found.
    assert_eq!(result.query_hits(0)[0].offset, 250);
    assert_eq!(result.query_hits(0)[0].distance, 0.0);
    assert!(result.query_hits(0).windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_topk_beyond_row_count_on_index_path() {
    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(100, DIM, 21);
    let growing = fill_growing(&ts, &data, SegmentConfig::default(), 100);
    let plan = PlanBuilder::new(ts.vec_id, usize::MAX / 2).build().unwrap();
    let blob = data.query_blob(&[9]);

    let brute = growing
        .search(&plan, &[SearchRequest::new(&blob, u64::MAX)])
        .unwrap();
    assert_eq!(brute[0].query_hits(0).len(), 100);

    growing
        .load_indexing(LoadIndexInfo::new(
            ts.vec_id,
            "fakevec",
            Arc::new(flat_index(DIM, MetricType::L2, &data.vectors)),
        ))
        .unwrap();
    let indexed = growing
        .search(&plan, &[SearchRequest::new(&blob, u64::MAX)])
        .unwrap();
    assert_eq!(indexed, brute);
    assert!(indexed[0].seg_offsets().is_err());
}

fn run_growing_predicate_with_partial_probe(rows: usize, base: usize) {
    // 1. Fill a growing segment
    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(rows, DIM, 42);
    let growing = fill_growing(&ts, &data, SegmentConfig::default(), 10_000);

    let query_rows: Vec<usize> = (base..base + 5).collect();
    let blob = data.query_blob(&query_rows);
    let plan = PlanBuilder::new(ts.vec_id, 5)
        .predicate(Expr::range(ts.counter_id, base as i64, base as i64 + 5))
        .nprobe(10)
        .build()
        .unwrap();
    let check = |result: &QueryResult| {
        for (q, row) in query_rows.iter().enumerate() {
            let hits = result.query_hits(q);
            assert_eq!(hits[0].offset, *row as i64);
            assert_eq!(hits[0].distance, 0.0);
            assert!(hits.iter().all(|h| (base..base + 5).contains(&(h.offset as usize))));
        }
    };

    // 2. Brute force under the counter range
    let before = growing
        .search(&plan, &[SearchRequest::new(&blob, u64::MAX)])
        .unwrap();
    check(&before[0]);

    // 3. Attach an IVF index probing 10 of its 100 lists
    let params = IvfParams::default().with_nlist(100).with_nprobe(10);
    let mut index = IvfFlatIndex::new(DIM, MetricType::L2, params).unwrap();
    index.build(Dataset::new(DIM, &data.vectors).unwrap()).unwrap();
    growing
        .load_indexing(LoadIndexInfo::new(ts.vec_id, "fakevec", Arc::new(index)))
        .unwrap();

    // 4. Every query still finds its own row first
    let after = growing
        .search(&plan, &[SearchRequest::new(&blob, u64::MAX)])
        .unwrap();
    check(&after[0]);
}

#[test]
fn test_growing_predicate_with_partial_probe() {
    run_growing_predicate_with_partial_probe(50_000, 42_000);
}

#[test]
#[ignore = "trains an IVF index over one million rows"]
fn test_growing_predicate_with_partial_probe_million_rows() {
    run_growing_predicate_with_partial_probe(1_000_000, 420_000);
}
