//! Deterministic data generation shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use segcore::config::SegmentConfig;
use segcore::distance::MetricType;
use segcore::query::{PlaceholderGroup, SearchHit};
use segcore::schema::{DataType, FieldId, ROW_ID_FIELD_ID, Schema, TIMESTAMP_FIELD_ID};
use segcore::segment::{GrowingSegment, LoadFieldDataInfo, SealedSegment};
use segcore::storage::FieldData;
use segcore::{RowId, Timestamp};

/// Schema with one vector field, an int64 counter and a double score.
pub struct TestSchema {
    pub schema: Arc<Schema>,
    pub vec_id: FieldId,
    pub counter_id: FieldId,
    pub score_id: FieldId,
    pub dim: usize,
    pub metric: MetricType,
}

pub fn test_schema(dim: usize, metric: MetricType) -> TestSchema {
    let mut schema = Schema::new();
    let vec_id = schema.add_debug_vector_field("fakevec", dim, metric).unwrap();
    let counter_id = schema.add_debug_field("counter", DataType::Int64).unwrap();
    let score_id = schema.add_debug_field("score", DataType::Double).unwrap();
    TestSchema {
        schema: Arc::new(schema),
        vec_id,
        counter_id,
        score_id,
        dim,
        metric,
    }
}

/// Column-wise generated rows.
///
/// Vectors are uniform in [-1, 1), counters and row ids equal the row index,
/// timestamps equal the row index unless overridden, scores are random.
pub struct DataGen {
    pub rows: usize,
    pub dim: usize,
    pub row_ids: Vec<RowId>,
    pub timestamps: Vec<Timestamp>,
    pub vectors: Vec<f32>,
    pub counters: Vec<i64>,
    pub scores: Vec<f64>,
}

impl DataGen {
    pub fn new(rows: usize, dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let vectors = (0..rows * dim)
            .map(|_| rng.random_range(-1.0f32..1.0))
            .collect();
        let scores = (0..rows).map(|_| rng.random_range(0.0..100.0)).collect();

        DataGen {
            rows,
            dim,
            row_ids: (0..rows as i64).collect(),
            timestamps: (0..rows as u64).collect(),
            vectors,
            counters: (0..rows as i64).collect(),
            scores,
        }
    }

    pub fn vector(&self, row: usize) -> &[f32] {
        &self.vectors[row * self.dim..(row + 1) * self.dim]
    }

    /// User columns of rows `[start, end)` in schema order.
    pub fn columns(&self, start: usize, end: usize) -> Vec<FieldData> {
        vec![
            FieldData::FloatVector {
                dim: self.dim,
                data: self.vectors[start * self.dim..end * self.dim].to_vec(),
            },
            FieldData::Int64(self.counters[start..end].to_vec()),
            FieldData::Double(self.scores[start..end].to_vec()),
        ]
    }

    /// Serialized placeholder group whose queries are copies of `rows`.
    pub fn query_blob(&self, rows: &[usize]) -> Vec<u8> {
        let data = rows.iter().flat_map(|r| self.vector(*r).to_vec()).collect();
        PlaceholderGroup::from_vectors("$0", self.dim, data)
            .unwrap()
            .serialize()
    }

    /// Exact top-k over the rows accepted by `keep`, computed independently
    /// of the segment code paths.
    pub fn reference_topk<F>(&self, query: &[f32], metric: MetricType, topk: usize, keep: F) -> Vec<SearchHit>
    where
        F: Fn(usize) -> bool,
    {
        let mut hits: Vec<SearchHit> = (0..self.rows)
            .filter(|row| keep(*row))
            .map(|row| SearchHit::new(row as i64, metric.distance(query, self.vector(row))))
            .collect();
        hits.sort();
        hits.truncate(topk);
        hits
    }
}

/// Build a growing segment and insert `data` in batches of `batch` rows.
pub fn fill_growing(ts: &TestSchema, data: &DataGen, config: SegmentConfig, batch: usize) -> GrowingSegment {
    let segment = GrowingSegment::new(ts.schema.clone(), config).unwrap();
    let mut start = 0;
    while start < data.rows {
        let end = (start + batch).min(data.rows);
        let n = end - start;
        let offset = segment.pre_insert(n).unwrap();
        assert_eq!(offset, start);
        segment
            .insert(
                offset,
                n,
                &data.row_ids[start..end],
                &data.timestamps[start..end],
                &data.columns(start, end),
            )
            .unwrap();
        start = end;
    }
    segment
}

/// Build a sealed segment and bulk load every column of `data`, including
/// the row id and timestamp system fields.
pub fn load_sealed(ts: &TestSchema, data: &DataGen, with_vectors: bool) -> SealedSegment {
    let segment = SealedSegment::new(ts.schema.clone(), SegmentConfig::default()).unwrap();
    segment
        .load_field_data(LoadFieldDataInfo::new(
            ROW_ID_FIELD_ID,
            FieldData::Int64(data.row_ids.clone()),
        ))
        .unwrap();
    segment
        .load_field_data(LoadFieldDataInfo::new(
            TIMESTAMP_FIELD_ID,
            FieldData::Timestamp(data.timestamps.clone()),
        ))
        .unwrap();

    let ids = [ts.vec_id, ts.counter_id, ts.score_id];
    for (field_id, column) in ids.into_iter().zip(data.columns(0, data.rows)) {
        if field_id == ts.vec_id && !with_vectors {
            continue;
        }
        segment
            .load_field_data(LoadFieldDataInfo::new(field_id, column))
            .unwrap();
    }
    segment
}
