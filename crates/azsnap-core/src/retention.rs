use crate::model::SnapshotRecord;

/// Decide which snapshots to discard: of all records whose name contains
/// `key`, keep the `keep` most recent (by provider creation time) and return
/// the ids of the rest, newest-first.
///
/// Matching is containment, not an anchored prefix: key `backup` also groups
/// `backup-weekly_...`. That mirrors how existing snapshot fleets were
/// grouped before this tool; callers wanting disjoint groups must pick
/// prefixes that are not substrings of each other.
///
/// `keep == 0` means unlimited and yields an empty discard list.
pub fn plan(snapshots: &[SnapshotRecord], key: &str, keep: usize) -> Vec<String> {
    if keep == 0 {
        return Vec::new();
    }

    let mut matching: Vec<&SnapshotRecord> = snapshots
        .iter()
        .filter(|s| s.name.contains(key))
        .collect();
    matching.sort_by(|a, b| b.time_created.cmp(&a.time_created));

    matching
        .into_iter()
        .skip(keep)
        .map(|s| s.id.clone())
        .collect()
}
