use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A managed disk as resolved from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disk {
    /// Fully-qualified resource id.
    pub id: String,
    pub name: String,
    /// Region the disk lives in; the snapshot is created in the same region.
    pub location: String,
}

/// The provider fields the retention planner needs. Decoupled from the wire
/// representation so planning stays testable without live resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    /// Fully-qualified resource id.
    pub id: String,
    pub name: String,
    /// Provider-reported creation time, not client-observed.
    pub time_created: DateTime<Utc>,
}

/// Everything needed to issue one snapshot create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
    /// Copied from the source disk.
    pub location: String,
    pub source_disk_id: String,
    /// Storage SKU, e.g. `Standard_LRS`. Validated provider-side.
    pub sku: String,
}

pub fn disk_resource_id(subscription_id: &str, resource_group: &str, disk_name: &str) -> String {
    format!(
        "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.Compute/disks/{disk_name}"
    )
}

pub fn snapshot_resource_id(
    subscription_id: &str,
    resource_group: &str,
    snapshot_name: &str,
) -> String {
    format!(
        "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.Compute/snapshots/{snapshot_name}"
    )
}
