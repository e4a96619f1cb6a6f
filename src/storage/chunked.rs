//! Append-friendly chunked vector with stable, zero-copy chunk views.

use std::sync::OnceLock;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::error::{Result, SegcoreError};

/// A typed, read-locked view over the populated prefix of one chunk.
///
/// The view dereferences to `[T]` without copying. Writers targeting the same
/// chunk wait until the view is dropped; other chunks are unaffected. Views
/// are taken recursively, so a thread already holding one can take more even
/// while a writer is queued on the chunk.
pub type ChunkSpan<'a, T> = MappedRwLockReadGuard<'a, [T]>;

/// Rows of one field stored in fixed-capacity chunks.
///
/// Each row occupies `elems_per_row` consecutive elements (the dimension of a
/// vector field, 1 for scalars). Chunk slots are created up front for the
/// whole capacity and filled lazily; an allocated chunk is never reallocated
/// or moved, so references into it remain stable for the lifetime of the
/// vector.
#[derive(Debug)]
pub struct ChunkedVec<T> {
    elems_per_row: usize,
    rows_per_chunk: usize,
    chunks: Box<[OnceLock<RwLock<Vec<T>>>]>,
}

impl<T: Copy + Default + Send + Sync> ChunkedVec<T> {
    /// Create an empty chunked vector able to hold `max_rows` rows.
    pub fn new(elems_per_row: usize, rows_per_chunk: usize, max_rows: usize) -> Result<Self> {
        if elems_per_row == 0 || rows_per_chunk == 0 {
            return Err(SegcoreError::invalid_argument(
                "Chunk geometry must be non-zero",
            ));
        }
        let slots = max_rows.div_ceil(rows_per_chunk);
        let chunks = (0..slots).map(|_| OnceLock::new()).collect();

        Ok(ChunkedVec {
            elems_per_row,
            rows_per_chunk,
            chunks,
        })
    }

    /// Wrap a fully populated column as a single chunk without copying.
    pub fn from_vec(elems_per_row: usize, data: Vec<T>) -> Result<Self> {
        if elems_per_row == 0 {
            return Err(SegcoreError::invalid_argument(
                "Chunk geometry must be non-zero",
            ));
        }
        if data.len() % elems_per_row != 0 {
            return Err(SegcoreError::range(format!(
                "Column of {} elements is not a multiple of row width {}",
                data.len(),
                elems_per_row
            )));
        }

        let rows = data.len() / elems_per_row;
        let slot = OnceLock::new();
        // A fresh OnceLock always accepts its first value.
        let _ = slot.set(RwLock::new(data));

        Ok(ChunkedVec {
            elems_per_row,
            rows_per_chunk: rows.max(1),
            chunks: vec![slot].into_boxed_slice(),
        })
    }

    pub fn elems_per_row(&self) -> usize {
        self.elems_per_row
    }

    pub fn rows_per_chunk(&self) -> usize {
        self.rows_per_chunk
    }

    /// Maximum number of rows this vector can hold.
    pub fn capacity_rows(&self) -> usize {
        self.chunks.len() * self.rows_per_chunk
    }

    /// Number of chunks covering the first `valid_rows` rows.
    pub fn chunk_count(&self, valid_rows: usize) -> usize {
        valid_rows.div_ceil(self.rows_per_chunk)
    }

    fn allocated(&self, chunk_index: usize) -> Option<&RwLock<Vec<T>>> {
        self.chunks.get(chunk_index).and_then(|slot| slot.get())
    }

    fn allocate(&self, chunk_index: usize) -> Result<&RwLock<Vec<T>>> {
        let slot = self.chunks.get(chunk_index).ok_or_else(|| {
            SegcoreError::range(format!("Chunk index {chunk_index} exceeds capacity"))
        })?;
        let len = self.rows_per_chunk * self.elems_per_row;
        Ok(slot.get_or_init(|| RwLock::new(vec![T::default(); len])))
    }

    /// Copy `values` into the rows starting at `row_offset`.
    ///
    /// Chunks touched by the write are allocated if needed. Bounds are checked
    /// before anything is written, so a failed call leaves the vector intact.
    pub fn write_rows(&self, row_offset: usize, values: &[T]) -> Result<()> {
        if values.len() % self.elems_per_row != 0 {
            return Err(SegcoreError::range(format!(
                "{} values do not form whole rows of width {}",
                values.len(),
                self.elems_per_row
            )));
        }
        let rows = values.len() / self.elems_per_row;
        let end = row_offset
            .checked_add(rows)
            .filter(|end| *end <= self.capacity_rows())
            .ok_or_else(|| {
                SegcoreError::range(format!(
                    "Rows [{row_offset}, {row_offset}+{rows}) exceed capacity {}",
                    self.capacity_rows()
                ))
            })?;

        let epr = self.elems_per_row;
        let mut row = row_offset;
        let mut consumed = 0;
        while row < end {
            let chunk_index = row / self.rows_per_chunk;
            let in_chunk = row % self.rows_per_chunk;
            let take = (self.rows_per_chunk - in_chunk).min(end - row);

            let chunk = self.allocate(chunk_index)?;
            let mut guard = chunk.write();
            guard[in_chunk * epr..(in_chunk + take) * epr]
                .copy_from_slice(&values[consumed * epr..(consumed + take) * epr]);

            row += take;
            consumed += take;
        }

        Ok(())
    }

    /// Zero-copy view over chunk `chunk_index`, limited to the first
    /// `valid_rows` rows of the vector.
    pub fn chunk_span(&self, chunk_index: usize, valid_rows: usize) -> Result<ChunkSpan<'_, T>> {
        let chunk_count = self.chunk_count(valid_rows);
        if chunk_index >= chunk_count {
            return Err(SegcoreError::range(format!(
                "Chunk index {chunk_index} out of range (chunk count {chunk_count})"
            )));
        }

        let first_row = chunk_index * self.rows_per_chunk;
        let rows = (valid_rows - first_row).min(self.rows_per_chunk);
        let chunk = self.allocated(chunk_index).ok_or_else(|| {
            SegcoreError::range(format!("Chunk {chunk_index} has not been allocated"))
        })?;

        let len = rows * self.elems_per_row;
        Ok(RwLockReadGuard::map(chunk.read_recursive(), |data| &data[..len]))
    }

    /// Visit every chunk covering the first `valid_rows` rows in order,
    /// passing the first row index of the chunk and its populated slice.
    pub fn for_each_span<F>(&self, valid_rows: usize, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &[T]),
    {
        for chunk_index in 0..self.chunk_count(valid_rows) {
            let span = self.chunk_span(chunk_index, valid_rows)?;
            f(chunk_index * self.rows_per_chunk, &*span);
        }
        Ok(())
    }

    /// Index of the first row (within `valid_rows`) whose value fails `pred`,
    /// assuming the values are partitioned (all passing rows come first).
    /// Only meaningful for single-element rows.
    pub fn partition_point<P>(&self, valid_rows: usize, pred: P) -> Result<usize>
    where
        P: Fn(&T) -> bool,
    {
        for chunk_index in 0..self.chunk_count(valid_rows) {
            let span = self.chunk_span(chunk_index, valid_rows)?;
            match span.last() {
                Some(last) if pred(last) => continue,
                _ => {
                    return Ok(chunk_index * self.rows_per_chunk + span.partition_point(&pred));
                }
            }
        }
        Ok(valid_rows)
    }

    /// Copy the first `valid_rows` rows into a contiguous vector.
    pub fn to_vec(&self, valid_rows: usize) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(valid_rows * self.elems_per_row);
        self.for_each_span(valid_rows, |_, span| out.extend_from_slice(span))?;
        Ok(out)
    }
}
