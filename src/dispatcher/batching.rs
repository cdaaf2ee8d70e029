//! Partitioning of a block's handlers into concurrency-safe batches.

use std::collections::HashSet;
use std::ops::Range;

/// Split handlers, given by their parallelization ids in event order, into
/// maximal contiguous batches whose id sets are pairwise disjoint.
///
/// A handler joins the current batch unless one of its ids is already
/// claimed there, in which case it opens the next batch. Contiguity keeps a
/// later event from running before an earlier one it conflicts with. An
/// empty id set never conflicts.
pub fn partition(id_sets: &[HashSet<String>]) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut claimed: HashSet<&str> = HashSet::new();

    for (index, ids) in id_sets.iter().enumerate() {
        if ids.iter().any(|id| claimed.contains(id.as_str())) {
            batches.push(start..index);
            start = index;
            claimed.clear();
        }
        claimed.extend(ids.iter().map(String::as_str));
    }

    if start < id_sets.len() {
        batches.push(start..id_sets.len());
    }

    batches
}
