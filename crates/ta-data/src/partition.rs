//! Query partitioner: splits the session's object set into contiguous
//! index ranges for parallel fetching.

use std::ops::Range;

/// Split `count` objects into at most `parts` contiguous, non-overlapping
/// ranges whose sizes sum to `count` and differ by at most one element
/// (ceiling-division balancing).
///
/// `parts` is clamped to `[1, count]`; a single partition is a fully
/// supported path, not a degenerate one — parallelism is an optimization.
pub fn partition_objects(count: usize, parts: usize) -> Vec<Range<usize>> {
    if count == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, count);
    let base = count / parts;
    let extra = count % parts;

    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}
