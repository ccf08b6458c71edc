use chrono::{DateTime, Local};

/// Two-digit year, month, day, then a 12-hour clock. This matches the names
/// produced by earlier deployments of the tool, so it cannot change without
/// breaking retention grouping of already-existing snapshots.
pub const TIMESTAMP_FORMAT: &str = "%y-%m-%d.%I.%M.%S";

/// Build the snapshot name as `{prefix}_{timestamp}` in local time.
///
/// No collision detection: two invocations within the same second produce
/// the same name and the second create will fail provider-side.
pub fn snapshot_name(prefix: &str, now: DateTime<Local>) -> String {
    format!("{}_{}", prefix, now.format(TIMESTAMP_FORMAT))
}

/// Grouping key for retention: the text before the first `_` of a snapshot
/// name, whitespace-trimmed.
pub fn retention_key(snapshot_name: &str) -> &str {
    snapshot_name
        .split('_')
        .next()
        .unwrap_or(snapshot_name)
        .trim()
}
