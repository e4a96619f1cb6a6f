//! Concurrent reservation, insertion and search on shared segments.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use common::{DataGen, load_sealed, test_schema};
use proptest::prelude::*;
use segcore::config::SegmentConfig;
use segcore::distance::MetricType;
use segcore::index::{Dataset, FlatIndex, LoadIndexInfo, VectorIndex};
use segcore::query::{PlanBuilder, SearchRequest};
use segcore::schema::FieldOffset;
use segcore::segment::{GrowingSegment, Segment};
use segcore::storage::ChunkSpan;

const DIM: usize = 8;

/// Assert that the ranges are pairwise disjoint and lie within `[0, cap)`.
fn assert_disjoint(mut ranges: Vec<(usize, usize)>, cap: usize) {
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlapping reservations {pair:?}");
    }
    if let Some(last) = ranges.last() {
        assert!(last.1 <= cap);
    }
}

#[test]
fn test_concurrent_reservations_are_disjoint() {
    let ts = test_schema(DIM, MetricType::L2);
    let segment = GrowingSegment::new(ts.schema.clone(), SegmentConfig::default()).unwrap();

    let ranges: Vec<(usize, usize)> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let segment = &segment;
                s.spawn(move || {
                    (0..200)
                        .map(|i| {
                            let n = 1 + (t * 7 + i) % 13;
                            let offset = segment.pre_insert(n).unwrap();
                            (offset, offset + n)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let total: usize = ranges.iter().map(|(start, end)| end - start).sum();
    assert_eq!(segment.reserved_count(), total);
    assert_disjoint(ranges, total);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_reservations_never_exceed_capacity(
        sizes in prop::collection::vec(1usize..64, 1..24),
        capacity in 1usize..512,
    ) {
        let ts = test_schema(DIM, MetricType::L2);
        let config = SegmentConfig::default()
            .with_size_per_chunk(32)
            .with_max_row_count(capacity);
        let segment = GrowingSegment::new(ts.schema.clone(), config).unwrap();

        let granted: Vec<(usize, usize)> = thread::scope(|s| {
            let handles: Vec<_> = sizes
                .iter()
                .map(|n| {
                    let segment = &segment;
                    let n = *n;
                    s.spawn(move || segment.pre_insert(n).ok().map(|offset| (offset, offset + n)))
                })
                .collect();
            handles.into_iter().filter_map(|h| h.join().unwrap()).collect()
        });

        let total: usize = granted.iter().map(|(start, end)| end - start).sum();
        prop_assert_eq!(segment.reserved_count(), total);
        prop_assert!(total <= capacity);
        assert_disjoint(granted, capacity);
    }
}

#[test]
fn test_concurrent_insert_and_search() {
    const ROWS: usize = 12_000;
    const BATCH: usize = 150;

    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(ROWS, DIM, 64);
    let config = SegmentConfig::default()
        .with_size_per_chunk(1_000)
        .with_parallel_threshold(500);
    let segment = GrowingSegment::new(ts.schema.clone(), config).unwrap();
    let plan = PlanBuilder::new(ts.vec_id, 20).build().unwrap();
    let query_rows = [0usize, 5_000, 11_999];
    let blob = data.query_blob(&query_rows);
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..ROWS / BATCH / 4 {
                    // Row ids, timestamps and counters all follow the offset.
                    let offset = segment.pre_insert(BATCH).unwrap();
                    let end = offset + BATCH;
                    segment
                        .insert(
                            offset,
                            BATCH,
                            &data.row_ids[offset..end],
                            &data.timestamps[offset..end],
                            &data.columns(offset, end),
                        )
                        .unwrap();
                }
            });
        }

        for _ in 0..2 {
            s.spawn(|| {
                let mut last_visible = 0;
                while !done.load(Ordering::Acquire) {
                    let visible = segment.row_count();
                    assert!(visible >= last_visible);
                    last_visible = visible;

                    let results = segment
                        .search(&plan, &[SearchRequest::new(&blob, u64::MAX)])
                        .unwrap();
                    for (q, row) in query_rows.iter().enumerate() {
                        for hit in results[0].query_hits(q) {
                            // A hit must come from a fully written row.
                            let offset = hit.offset as usize;
                            assert!(offset < segment.row_count());
                            let expected = MetricType::L2.distance(data.vector(*row), data.vector(offset));
                            assert_eq!(hit.distance, expected);
                        }
                    }
                }
            });
        }

        s.spawn(|| {
            while segment.row_count() < ROWS {
                thread::yield_now();
            }
            done.store(true, Ordering::Release);
        });
    });

    assert_eq!(segment.row_count(), ROWS);
    let mut counters = Vec::new();
    for chunk in 0..segment.num_chunk_data() {
        counters.extend_from_slice(&segment.chunk_span::<i64>(FieldOffset(1), chunk).unwrap());
    }
    assert_eq!(counters, data.counters);
}

#[test]
fn test_visibility_is_monotonic_while_inserting() {
    const ROWS: usize = 4_000;

    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(ROWS, DIM, 65);
    let segment = Arc::new(GrowingSegment::new(ts.schema.clone(), SegmentConfig::default()).unwrap());
    let plan = PlanBuilder::new(ts.vec_id, ROWS).build().unwrap();
    let blob = data.query_blob(&[0]);

    let writer = {
        let segment = Arc::clone(&segment);
        let data = DataGen::new(ROWS, DIM, 65);
        thread::spawn(move || {
            for start in (0..ROWS).step_by(100) {
                let offset = segment.pre_insert(100).unwrap();
                assert_eq!(offset, start);
                segment
                    .insert(
                        offset,
                        100,
                        &data.row_ids[start..start + 100],
                        &data.timestamps[start..start + 100],
                        &data.columns(start, start + 100),
                    )
                    .unwrap();
            }
        })
    };

    // A fixed snapshot timestamp never loses rows as more are inserted.
    let snapshot = 1_500u64;
    let mut seen = 0;
    while seen < 1_501 {
        let results = segment
            .search(&plan, &[SearchRequest::new(&blob, snapshot)])
            .unwrap();
        let hits = results[0].query_hits(0);
        assert!(hits.len() >= seen);
        assert!(hits.iter().all(|h| h.offset as u64 <= snapshot));
        seen = hits.len();
        thread::yield_now();
    }
    writer.join().unwrap();
    assert_eq!(segment.row_count(), ROWS);
}

#[test]
fn test_index_attach_during_search() {
    const ROWS: usize = 3_000;

    let ts = test_schema(DIM, MetricType::L2);
    let data = DataGen::new(ROWS, DIM, 66);
    let segment = Segment::from(load_sealed(&ts, &data, true));
    let plan = PlanBuilder::new(ts.vec_id, 10).build().unwrap();
    let blob = data.query_blob(&[1, 2_222]);
    let expected = segment
        .search(&plan, &[SearchRequest::new(&blob, u64::MAX)])
        .unwrap();

    let mut index = FlatIndex::new(DIM, MetricType::L2).unwrap();
    index.build(Dataset::new(DIM, &data.vectors).unwrap()).unwrap();
    let info = LoadIndexInfo::new(ts.vec_id, "fakevec", Arc::new(index));

    thread::scope(|s| {
        for _ in 0..3 {
            s.spawn(|| {
                for _ in 0..20 {
                    let results = segment
                        .search(&plan, &[SearchRequest::new(&blob, u64::MAX)])
                        .unwrap();
                    assert_eq!(results, expected);
                }
            });
        }
        s.spawn(|| segment.load_index(info).unwrap());
    });
}

#[test]
fn test_held_span_does_not_block_search_during_insert() {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let ts = test_schema(DIM, MetricType::L2);
        let data = DataGen::new(110, DIM, 67);
        let config = SegmentConfig::default().with_size_per_chunk(1_000);
        let segment = GrowingSegment::new(ts.schema.clone(), config).unwrap();
        let offset = segment.pre_insert(100).unwrap();
        segment
            .insert(
                offset,
                100,
                &data.row_ids[..100],
                &data.timestamps[..100],
                &data.columns(0, 100),
            )
            .unwrap();

        let plan = PlanBuilder::new(ts.vec_id, 5).build().unwrap();
        let blob = data.query_blob(&[42]);

        thread::scope(|s| {
            let held: ChunkSpan<'_, f32> = segment.chunk_span(FieldOffset(0), 0).unwrap();

            // The writer targets the chunk the span above is reading.
            let writer = s.spawn(|| {
                let offset = segment.pre_insert(10).unwrap();
                segment
                    .insert(
                        offset,
                        10,
                        &data.row_ids[100..110],
                        &data.timestamps[100..110],
                        &data.columns(100, 110),
                    )
                    .unwrap();
            });
            thread::sleep(Duration::from_millis(50));

            let results = segment
                .search(&plan, &[SearchRequest::new(&blob, 99)])
                .unwrap();
            assert_eq!(results[0].query_hits(0)[0].offset, 42);
            assert_eq!(&held[42 * DIM..43 * DIM], data.vector(42));
            drop(held);
            writer.join().unwrap();
        });

        assert_eq!(segment.row_count(), 110);
        tx.send(()).unwrap();
    });

    rx.recv_timeout(Duration::from_secs(30))
        .expect("search blocked behind a queued insert");
}
