//! Thin client for the Azure Resource Manager compute endpoints this tool
//! consumes: get disk, create snapshot, list snapshots, delete snapshots.
//!
//! Create and delete are long-running operations on the provider side; the
//! client polls the operation URL until a terminal state and only then
//! returns, so callers see plain suspending calls.

use async_trait::async_trait;
use azsnap_core::{snapshot_resource_id, Disk, SnapshotRecord, SnapshotRequest};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Compute resource provider api-version used for all calls.
const API_VERSION: &str = "2024-03-02";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("authentication rejected by provider: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authorization denied: {0}")]
    Forbidden(String),
    #[error("snapshot create rejected: {0}")]
    Create(String),
    #[error("snapshot delete failed: {0}")]
    Delete(String),
    #[error("unexpected provider response ({status}): {body}")]
    Provider { status: StatusCode, body: String },
    #[error("transport error")]
    Http(#[from] reqwest::Error),
}

/// The four management-plane operations the lifecycle needs. The production
/// implementation is [`ArmClient`]; tests inject an in-memory double.
#[async_trait]
pub trait ComputeClient {
    /// Resolve a disk by fully-qualified resource id.
    async fn get_disk(&self, disk_id: &str) -> Result<Disk, ArmError>;

    /// Create a snapshot and wait for the provider to finish provisioning it.
    async fn create_snapshot(&self, req: &SnapshotRequest) -> Result<(), ArmError>;

    /// All snapshots in a resource group, every page materialized.
    async fn list_snapshots(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<Vec<SnapshotRecord>, ArmError>;

    /// Delete each snapshot by fully-qualified id, waiting for completion.
    /// Partial-failure semantics are the provider's; no retry here.
    async fn delete_snapshots(&self, ids: &[String]) -> Result<(), ArmError>;
}

pub struct ArmClient {
    http: Client,
    endpoint: String,
    token: String,
    poll_interval: Duration,
}

enum LroKind {
    Create,
    Delete,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotPage {
    value: Vec<SnapshotItem>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotItem {
    id: String,
    name: String,
    properties: Option<SnapshotProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotProperties {
    time_created: Option<DateTime<Utc>>,
}

impl ArmClient {
    pub fn new(token: String) -> Self {
        Self::with_endpoint(token, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(token: String, endpoint: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn resource_url(&self, resource_id: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, resource_id, API_VERSION)
    }

    /// Map a non-success response to the error taxonomy shared by the
    /// read-side calls.
    async fn fail(resp: Response, ctx: &str) -> ArmError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => ArmError::Auth(format!("{ctx}: {body}")),
            StatusCode::FORBIDDEN => ArmError::Forbidden(format!("{ctx}: {body}")),
            StatusCode::NOT_FOUND => ArmError::NotFound(ctx.to_string()),
            _ => ArmError::Provider { status, body },
        }
    }

    /// Follow the operation the provider pointed us at until it reaches a
    /// terminal state. A response with neither an `Azure-AsyncOperation` nor
    /// a `Location` header already completed synchronously.
    async fn wait_complete(&self, resp: Response, kind: LroKind) -> Result<(), ArmError> {
        let accepted = matches!(resp.status(), StatusCode::ACCEPTED | StatusCode::CREATED);
        let operation_url = header_str(&resp, "azure-asyncoperation");
        let location_url = header_str(&resp, "location");
        if !accepted {
            return Ok(());
        }

        if let Some(url) = operation_url {
            loop {
                tokio::time::sleep(self.poll_interval).await;
                let poll = self.http.get(&url).bearer_auth(&self.token).send().await?;
                if !poll.status().is_success() {
                    return Err(Self::fail(poll, "operation poll").await);
                }
                let op: OperationStatus = poll.json().await?;
                debug!(status = %op.status, "operation poll");
                match op.status.as_str() {
                    "Succeeded" => return Ok(()),
                    "Failed" | "Canceled" => {
                        let detail = op
                            .error
                            .map(|e| {
                                format!(
                                    "{}: {}",
                                    e.code.unwrap_or_default(),
                                    e.message.unwrap_or_default()
                                )
                            })
                            .unwrap_or_else(|| op.status.clone());
                        return Err(match kind {
                            LroKind::Create => ArmError::Create(detail),
                            LroKind::Delete => ArmError::Delete(detail),
                        });
                    }
                    _ => continue,
                }
            }
        }

        if let Some(url) = location_url {
            loop {
                tokio::time::sleep(self.poll_interval).await;
                let poll = self.http.get(&url).bearer_auth(&self.token).send().await?;
                match poll.status() {
                    StatusCode::ACCEPTED => continue,
                    s if s.is_success() => return Ok(()),
                    _ => return Err(Self::fail(poll, "operation poll").await),
                }
            }
        }

        // 202 with no pollable header; nothing more we can observe.
        Ok(())
    }
}

fn header_str(resp: &Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl ComputeClient for ArmClient {
    async fn get_disk(&self, disk_id: &str) -> Result<Disk, ArmError> {
        let resp = self
            .http
            .get(self.resource_url(disk_id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, disk_id).await);
        }
        Ok(resp.json().await?)
    }

    async fn create_snapshot(&self, req: &SnapshotRequest) -> Result<(), ArmError> {
        let id = snapshot_resource_id(&req.subscription_id, &req.resource_group, &req.name);
        let body = json!({
            "location": req.location,
            "sku": { "name": req.sku },
            "properties": {
                "creationData": {
                    "createOption": "Copy",
                    "sourceResourceId": req.source_disk_id,
                }
            }
        });
        let resp = self
            .http
            .put(self.resource_url(&id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            // Quota, invalid SKU and name conflicts come back as 400/409.
            if matches!(status, StatusCode::BAD_REQUEST | StatusCode::CONFLICT) {
                let body = resp.text().await.unwrap_or_default();
                return Err(ArmError::Create(body));
            }
            return Err(Self::fail(resp, &id).await);
        }
        self.wait_complete(resp, LroKind::Create).await
    }

    async fn list_snapshots(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<Vec<SnapshotRecord>, ArmError> {
        let mut url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/snapshots?api-version={}",
            self.endpoint, subscription_id, resource_group, API_VERSION
        );
        let mut records = Vec::new();
        loop {
            let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
            if !resp.status().is_success() {
                return Err(Self::fail(resp, resource_group).await);
            }
            let page: SnapshotPage = resp.json().await?;
            records.extend(page.value.into_iter().map(|item| SnapshotRecord {
                id: item.id,
                name: item.name,
                time_created: item
                    .properties
                    .and_then(|p| p.time_created)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            }));
            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }
        debug!(count = records.len(), "listed snapshots");
        Ok(records)
    }

    async fn delete_snapshots(&self, ids: &[String]) -> Result<(), ArmError> {
        for id in ids {
            let resp = self
                .http
                .delete(self.resource_url(id))
                .bearer_auth(&self.token)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ArmError::Delete(format!("{id}: {status}: {body}")));
            }
            self.wait_complete(resp, LroKind::Delete)
                .await
                .map_err(|e| match e {
                    e @ ArmError::Delete(_) => e,
                    other => ArmError::Delete(other.to_string()),
                })?;
        }
        Ok(())
    }
}
