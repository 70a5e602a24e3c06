//! Recovery of the most recent armed maneuver from the output history

use crate::store::OutputRecord;

/// Contiguous run of output rows, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySegment {
    pub records: Vec<OutputRecord>,
}

impl ReplaySegment {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Step indices of the first and last row
    pub fn span(&self) -> Option<(u64, u64)> {
        Some((self.records.first()?.step_index, self.records.last()?.step_index))
    }
}

/// Newest window of rows bounded by a disarmed row on each side that holds
/// at least one armed row. Empty when no such window exists.
pub fn extract(records: &[OutputRecord]) -> ReplaySegment {
    let mut rows = records.to_vec();
    rows.sort_by_key(|r| r.step_index);

    let disarmed: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.armed)
        .map(|(i, _)| i)
        .collect();

    let bounds = disarmed
        .windows(2)
        .rev()
        .map(|pair| (pair[0], pair[1]))
        .find(|&(f0, f1)| f1 > f0 + 1 && rows[f0 + 1..f1].iter().any(|r| r.armed));

    match bounds {
        Some((f0, f1)) => ReplaySegment { records: rows.drain(f0 + 1..f1).collect() },
        None => ReplaySegment::default(),
    }
}
