//! The one operation this tool performs: resolve the source disk, create a
//! named snapshot of it, then optionally prune older snapshots sharing the
//! new name's prefix. Linear and fail-fast: any error aborts the run and
//! nothing is rolled back.

use crate::arm::{ArmError, ComputeClient};
use azsnap_core::{disk_resource_id, retention, retention_key, snapshot_name, SnapshotRequest};
use chrono::Local;
use std::time::Instant;
use tracing::debug;

/// Sanitized inputs for one run. Built from CLI flags, trimmed once at the
/// parse boundary.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub tenant_id: String,
    pub subscription_id: String,
    pub target_subscription_id: String,
    pub resource_group: String,
    pub target_resource_group: String,
    pub disk_name: String,
    pub snapshot_prefix: String,
    /// 0 keeps everything and skips the pruning pass entirely.
    pub retain_limit: usize,
    pub sku: String,
}

pub async fn run_create<C: ComputeClient + Sync>(
    client: &C,
    spec: &CreateSpec,
) -> Result<(), ArmError> {
    let disk_id = disk_resource_id(&spec.subscription_id, &spec.resource_group, &spec.disk_name);
    let disk = client.get_disk(&disk_id).await?;
    debug!(disk = %disk.id, location = %disk.location, "resolved source disk");

    let name = snapshot_name(&spec.snapshot_prefix, Local::now());
    println!("Creating snapshot '{name}'...");
    let started = Instant::now();
    client
        .create_snapshot(&SnapshotRequest {
            subscription_id: spec.target_subscription_id.clone(),
            resource_group: spec.target_resource_group.clone(),
            name: name.clone(),
            location: disk.location.clone(),
            source_disk_id: disk.id.clone(),
            sku: spec.sku.clone(),
        })
        .await?;
    println!("Done creating snapshot in {:.1?}.", started.elapsed());

    if spec.retain_limit > 0 {
        let snapshots = client
            .list_snapshots(&spec.target_subscription_id, &spec.target_resource_group)
            .await?;
        let key = retention_key(&name);
        let discard = retention::plan(&snapshots, key, spec.retain_limit);
        if !discard.is_empty() {
            println!(
                "Retaining {} snapshot(s) and discarding {} snapshot(s)...",
                spec.retain_limit,
                discard.len()
            );
            let started = Instant::now();
            client.delete_snapshots(&discard).await?;
            println!("Done discarding snapshot(s) in {:.1?}.", started.elapsed());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use azsnap_core::{Disk, SnapshotRecord};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::Mutex;

    /// In-memory double recording every call the flow makes.
    struct MockCompute {
        disks: Vec<Disk>,
        listing: Vec<SnapshotRecord>,
        created: Mutex<Vec<SnapshotRequest>>,
        list_calls: Mutex<u32>,
        deleted: Mutex<Vec<Vec<String>>>,
    }

    impl MockCompute {
        fn new(disks: Vec<Disk>, listing: Vec<SnapshotRecord>) -> Self {
            Self {
                disks,
                listing,
                created: Mutex::new(Vec::new()),
                list_calls: Mutex::new(0),
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ComputeClient for MockCompute {
        async fn get_disk(&self, disk_id: &str) -> Result<Disk, ArmError> {
            self.disks
                .iter()
                .find(|d| d.id == disk_id)
                .cloned()
                .ok_or_else(|| ArmError::NotFound(disk_id.to_string()))
        }

        async fn create_snapshot(&self, req: &SnapshotRequest) -> Result<(), ArmError> {
            self.created.lock().unwrap().push(req.clone());
            Ok(())
        }

        async fn list_snapshots(
            &self,
            _subscription_id: &str,
            _resource_group: &str,
        ) -> Result<Vec<SnapshotRecord>, ArmError> {
            *self.list_calls.lock().unwrap() += 1;
            Ok(self.listing.clone())
        }

        async fn delete_snapshots(&self, ids: &[String]) -> Result<(), ArmError> {
            self.deleted.lock().unwrap().push(ids.to_vec());
            Ok(())
        }
    }

    fn disk_d1() -> Disk {
        Disk {
            id: disk_resource_id("sub-src", "rg-src", "d1"),
            name: "d1".into(),
            location: "eastus".into(),
        }
    }

    fn spec(retain_limit: usize) -> CreateSpec {
        CreateSpec {
            tenant_id: "tenant-1".into(),
            subscription_id: "sub-src".into(),
            target_subscription_id: "sub-dst".into(),
            resource_group: "rg-src".into(),
            target_resource_group: "rg-dst".into(),
            disk_name: "d1".into(),
            snapshot_prefix: "nightly".into(),
            retain_limit,
            sku: "Standard_LRS".into(),
        }
    }

    fn record(id: &str, name: &str, day: u32) -> SnapshotRecord {
        SnapshotRecord {
            id: id.to_string(),
            name: name.to_string(),
            time_created: Utc.with_ymd_and_hms(2023, 1, day, 1, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_copies_disk_fields_and_names_by_prefix() {
        let mock = MockCompute::new(vec![disk_d1()], vec![]);
        run_create(&mock, &spec(0)).await.unwrap();

        let created = mock.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let req = &created[0];
        assert_eq!(req.subscription_id, "sub-dst");
        assert_eq!(req.resource_group, "rg-dst");
        assert_eq!(req.location, "eastus");
        assert_eq!(req.source_disk_id, disk_d1().id);
        assert_eq!(req.sku, "Standard_LRS");

        // nightly_{yy-mm-dd.hh.mm.ss}
        let tail = req.name.strip_prefix("nightly_").expect("prefix");
        let parts: Vec<&str> = tail.split('.').collect();
        assert_eq!(parts.len(), 4, "unexpected name: {}", req.name);
        assert!(NaiveDate::parse_from_str(parts[0], "%y-%m-%d").is_ok());
        for clock in &parts[1..] {
            assert_eq!(clock.len(), 2);
            assert!(clock.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn zero_retain_limit_never_lists_or_deletes() {
        let mock = MockCompute::new(
            vec![disk_d1()],
            vec![
                record("a", "nightly_23-01-01.01.00.00", 1),
                record("b", "nightly_23-01-02.01.00.00", 2),
            ],
        );
        run_create(&mock, &spec(0)).await.unwrap();

        assert_eq!(*mock.list_calls.lock().unwrap(), 0);
        assert!(mock.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn under_limit_lists_but_does_not_delete() {
        let mock = MockCompute::new(
            vec![disk_d1()],
            vec![record("a", "nightly_23-01-01.01.00.00", 1)],
        );
        run_create(&mock, &spec(2)).await.unwrap();

        assert_eq!(*mock.list_calls.lock().unwrap(), 1);
        assert!(mock.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn over_limit_deletes_the_oldest_in_one_batch() {
        // Listing as the provider would report it after the create: the two
        // pre-existing nightly snapshots plus the new one.
        let mock = MockCompute::new(
            vec![disk_d1()],
            vec![
                record("old-1", "nightly_23-01-01.01.00.00", 1),
                record("old-2", "nightly_23-01-02.01.00.00", 2),
                record("new", "nightly_23-01-03.01.00.00", 3),
            ],
        );
        run_create(&mock, &spec(2)).await.unwrap();

        let deleted = mock.deleted.lock().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0], vec!["old-1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_disk_aborts_before_creating() {
        let mock = MockCompute::new(vec![], vec![]);
        let err = run_create(&mock, &spec(2)).await.unwrap_err();
        assert!(matches!(err, ArmError::NotFound(_)));
        assert!(mock.created.lock().unwrap().is_empty());
        assert_eq!(*mock.list_calls.lock().unwrap(), 0);
    }
}
