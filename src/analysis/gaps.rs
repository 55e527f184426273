use chrono::{DateTime, Utc};

use crate::dashboard::GapInterval;

/// Finds breaks in the sequence of CI ids.
///
/// For each consecutive pair `(ids[i], ids[i + 1])` with `i < ids.len() - 2`,
/// a jump larger than one yields `(dates[i], dates[i + 1])`; contiguous ids
/// yield the zero-width `(dates[i], dates[i])`. Each interval records how
/// many ids were skipped. The last pair is never
/// considered, so the result has `ids.len() - 2` entries (none for fewer than
/// two ids).
pub fn detect_gaps(ids: &[i64], dates: &[DateTime<Utc>]) -> Vec<GapInterval> {
    let len = ids.len().min(dates.len());
    let last = len.saturating_sub(2);

    (0..last)
        .map(|i| {
            let start = dates[i];
            let missing = ids[i + 1].saturating_sub(ids[i]).saturating_sub(1).max(0);
            let end = if missing > 0 { dates[i + 1] } else { start };
            GapInterval { start, end, missing }
        })
        .collect()
}
