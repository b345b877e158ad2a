//! Retention policy: keep the N most recent snapshots, delete the rest

use crate::providers::Snapshot;
use std::cmp::Ordering;

/// Partition of a server's snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionDecision {
    /// Newest first
    pub keep: Vec<Snapshot>,
    /// Newest first
    pub delete: Vec<Snapshot>,
}

/// Decide which snapshots survive.
///
/// Orders by `created_at` descending with `id` ascending as tiebreak, keeps
/// the first `min(retain, len)` and deletes the rest. `retain == 0` deletes
/// everything, including a snapshot that was just created.
pub fn decide(snapshots: &[Snapshot], retain: usize) -> RetentionDecision {
    let mut ordered = snapshots.to_vec();
    ordered.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| compare_ids(&a.id, &b.id))
    });

    let delete = ordered.split_off(retain.min(ordered.len()));
    RetentionDecision { keep: ordered, delete }
}

/// Numeric ids compare numerically, anything else lexicographically
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
