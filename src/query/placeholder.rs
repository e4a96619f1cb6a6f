//! Serialized query-vector batches ("placeholder groups").
//!
//! Wire layout, little-endian:
//!
//! ```text
//! [u32 tag_len][tag bytes, utf-8][u32 num_queries][u32 dim][num_queries * dim f32]
//! ```

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SegcoreError};
use crate::index::Dataset;
use crate::query::plan::Plan;
use crate::schema::Schema;

/// Query vectors of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderGroup {
    tag: String,
    dim: usize,
    data: Vec<f32>,
}

impl PlaceholderGroup {
    /// Build a group from row-major vectors.
    pub fn from_vectors<S: Into<String>>(tag: S, dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 || data.is_empty() || data.len() % dim != 0 {
            return Err(SegcoreError::invalid_argument(format!(
                "{} floats do not form vectors of dim {dim}",
                data.len()
            )));
        }
        Ok(PlaceholderGroup {
            tag: tag.into(),
            dim,
            data,
        })
    }

    /// A group of `num_queries` vectors uniform in [-1, 1), reproducible by seed.
    pub fn random<S: Into<String>>(tag: S, num_queries: usize, dim: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..num_queries * dim)
            .map(|_| rng.random_range(-1.0f32..1.0))
            .collect();
        Self::from_vectors(tag, dim, data)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_queries(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn vectors(&self) -> &[f32] {
        &self.data
    }

    pub fn dataset(&self) -> Result<Dataset<'_>> {
        Dataset::new(self.dim, &self.data)
    }

    /// Encode the group in wire layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.tag.len() + self.data.len() * 4);
        // Writes into a Vec cannot fail.
        let _ = out.write_u32::<LittleEndian>(self.tag.len() as u32);
        out.extend_from_slice(self.tag.as_bytes());
        let _ = out.write_u32::<LittleEndian>(self.num_queries() as u32);
        let _ = out.write_u32::<LittleEndian>(self.dim as u32);
        for value in &self.data {
            let _ = out.write_f32::<LittleEndian>(*value);
        }
        out
    }

    /// Decode a blob without checking it against a plan.
    pub fn deserialize(blob: &[u8]) -> Result<Self> {
        let truncated = |_| SegcoreError::parse("Placeholder group is truncated");
        let mut cursor = Cursor::new(blob);

        let tag_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        if tag_len > blob.len() {
            return Err(SegcoreError::parse("Placeholder tag length exceeds blob"));
        }
        let mut tag = vec![0u8; tag_len];
        cursor.read_exact(&mut tag).map_err(truncated)?;
        let tag = String::from_utf8(tag)
            .map_err(|_| SegcoreError::parse("Placeholder tag is not valid utf-8"))?;

        let num_queries = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let dim = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        if num_queries == 0 || dim == 0 {
            return Err(SegcoreError::parse(format!(
                "Placeholder group declares {num_queries} vectors of dim {dim}"
            )));
        }

        let remaining = blob.len() - cursor.position() as usize;
        let expected = num_queries
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| SegcoreError::parse("Placeholder group size overflows"))?;
        if remaining != expected {
            return Err(SegcoreError::parse(format!(
                "Placeholder group carries {remaining} payload bytes, expected {expected} for {num_queries} x {dim}"
            )));
        }

        let mut data = vec![0.0f32; num_queries * dim];
        cursor
            .read_f32_into::<LittleEndian>(&mut data)
            .map_err(truncated)?;

        Ok(PlaceholderGroup { tag, dim, data })
    }

    /// Decode a blob and check it against the plan's vector-search leaf:
    /// the tag must match and the dimension must equal the target field's.
    pub fn parse(plan: &Plan, schema: &Schema, blob: &[u8]) -> Result<Self> {
        let group = Self::deserialize(blob)?;
        let leaf = &plan.vector_search;
        if group.tag != leaf.placeholder_tag {
            return Err(SegcoreError::parse(format!(
                "Placeholder tag '{}' does not match plan tag '{}'",
                group.tag, leaf.placeholder_tag
            )));
        }
        let meta = schema.field_by_id(leaf.field_id).ok_or_else(|| {
            SegcoreError::schema_mismatch(format!("Unknown field id {}", leaf.field_id))
        })?;
        if group.dim != meta.dim() {
            return Err(SegcoreError::parse(format!(
                "Placeholder dim {} does not match field '{}' dim {}",
                group.dim,
                meta.name(),
                meta.dim()
            )));
        }
        Ok(group)
    }
}
