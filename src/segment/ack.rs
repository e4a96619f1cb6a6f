//! Tracking of reserved row ranges that have finished writing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Result, SegcoreError};

#[derive(Debug, Default)]
struct AckState {
    /// Ranges being written, `start -> end`.
    claimed: BTreeMap<usize, usize>,
    /// Finished ranges not yet contiguous with the acknowledged prefix.
    completed: BTreeMap<usize, usize>,
    acked: usize,
}

impl AckState {
    fn overlaps(map: &BTreeMap<usize, usize>, start: usize, end: usize) -> bool {
        map.range(..end)
            .next_back()
            .is_some_and(|(_, e)| *e > start)
    }
}

/// Publishes the length of the longest fully written row prefix.
///
/// Inserters claim a reserved range, write it, then complete it. The prefix
/// only advances over completed ranges, and is published with release
/// ordering so a reader that observes a prefix also observes every value
/// written inside it.
#[derive(Debug, Default)]
pub struct AckResponder {
    state: Mutex<AckState>,
    acked: AtomicUsize,
}

impl AckResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leading rows whose writes have completed.
    #[inline]
    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::Acquire)
    }

    /// Claim `[start, start + n)` for writing. The range must lie within the
    /// first `reserved` rows and must not overlap any claimed or written range.
    pub fn claim(&self, start: usize, n: usize, reserved: usize) -> Result<()> {
        let end = start
            .checked_add(n)
            .filter(|end| *end <= reserved)
            .ok_or_else(|| {
                SegcoreError::range(format!(
                    "Rows [{start}, {start}+{n}) were not reserved (reserved {reserved})"
                ))
            })?;

        let mut state = self.state.lock();
        if start < state.acked
            || AckState::overlaps(&state.claimed, start, end)
            || AckState::overlaps(&state.completed, start, end)
        {
            return Err(SegcoreError::range(format!(
                "Rows [{start}, {end}) overlap rows that were already inserted"
            )));
        }
        state.claimed.insert(start, end);
        Ok(())
    }

    /// Drop a claim whose write failed.
    pub fn release(&self, start: usize) {
        self.state.lock().claimed.remove(&start);
    }

    /// Mark the claim starting at `start` as written and advance the prefix.
    pub fn complete(&self, start: usize) {
        let mut state = self.state.lock();
        let Some(end) = state.claimed.remove(&start) else {
            return;
        };
        state.completed.insert(start, end);

        let mut acked = state.acked;
        while let Some(end) = state.completed.remove(&acked) {
            acked = end;
        }
        state.acked = acked;
        self.acked.store(acked, Ordering::Release);
    }
}
