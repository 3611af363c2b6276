//! Request log storage for the request guard service.
//!
//! Every component receives the store as an explicit `Arc<dyn LogStore>`
//! handle. Postgres backs production deployments; the in-memory store is
//! used for local development, tests and benchmarks.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{EndpointStat, RequestIdentity, SuspiciousIp};

pub use memory::MemoryLogStore;
pub use postgres::PgLogStore;

/// Errors that can occur during log store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Storage(String),
}

/// Append-only log of accepted requests.
///
/// Window queries count entries strictly newer than `since`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one entry stamped with the service clock (`Utc::now()`).
    async fn append(&self, identity: &RequestIdentity) -> Result<(), StoreError>;

    async fn count_by_ip(&self, ip: &str, since: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn count_by_ip_endpoint(
        &self,
        ip: &str,
        endpoint: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn count_by_fingerprint(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Delete every entry older than `cutoff`, for all clients.
    /// Returns the number of removed entries.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Busiest endpoints since `since`, ordered by request count.
    async fn endpoint_stats(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<EndpointStat>, StoreError>;

    /// IPs with more than `min_requests` entries since `since`, busiest first.
    async fn suspicious_ips(
        &self,
        since: DateTime<Utc>,
        min_requests: u64,
        limit: u32,
    ) -> Result<Vec<SuspiciousIp>, StoreError>;
}
