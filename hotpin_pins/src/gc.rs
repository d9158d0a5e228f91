use hotpin_core::{ContentId, PinError, PinnedEntry};
use std::collections::HashSet;

/// Outcome of one staged garbage-collection run.
///
/// Collection stops at the first failure, so `collected` is always the
/// prefix of candidates handled before `error` occurred.
#[derive(Debug, Default)]
pub struct GcReport {
    /// Content ids unpinned at the node and purged from the ledger.
    pub collected: Vec<ContentId>,
    /// The failure that ended the run early, if any.
    pub error: Option<PinError>,
}

impl GcReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Picks the entries the staged GC may reclaim, in content id order.
///
/// An entry qualifies when nobody holds it durably, it is not in `exclude`
/// and none of its staged records was touched after `older_than`.
pub fn select_candidates(
    entries: impl IntoIterator<Item = PinnedEntry>,
    exclude: &HashSet<ContentId>,
    older_than: i64,
) -> Vec<ContentId> {
    let mut out: Vec<_> = entries
        .into_iter()
        .filter(|e| e.is_gc_candidate(older_than) && !exclude.contains(&e.content))
        .map(|e| e.content)
        .collect();
    out.sort();
    out
}
