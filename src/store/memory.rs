//! In-process request log.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{EndpointStat, RequestIdentity, RequestLogEntry, SuspiciousIp};
use super::{LogStore, StoreError};

/// Request log held in memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryLogStore {
    entries: RwLock<Vec<RequestLogEntry>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry with an explicit timestamp.
    pub async fn insert_at(&self, identity: &RequestIdentity, timestamp: DateTime<Utc>) {
        self.entries.write().await.push(RequestLogEntry {
            timestamp,
            source_ip: identity.ip.clone(),
            endpoint: identity.endpoint.clone(),
            fingerprint: identity.fingerprint.clone(),
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn count_where<F>(&self, since: DateTime<Utc>, predicate: F) -> u64
    where
        F: Fn(&RequestLogEntry) -> bool,
    {
        self.entries
            .read()
            .await
            .iter()
            .filter(|entry| entry.timestamp > since && predicate(entry))
            .count() as u64
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, identity: &RequestIdentity) -> Result<(), StoreError> {
        self.insert_at(identity, Utc::now()).await;
        Ok(())
    }

    async fn count_by_ip(&self, ip: &str, since: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.count_where(since, |entry| entry.source_ip == ip).await)
    }

    async fn count_by_ip_endpoint(
        &self,
        ip: &str,
        endpoint: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .count_where(since, |entry| entry.source_ip == ip && entry.endpoint == endpoint)
            .await)
    }

    async fn count_by_fingerprint(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .count_where(since, |entry| entry.fingerprint.as_deref() == Some(fingerprint))
            .await)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.timestamp >= cutoff);
        Ok((before - entries.len()) as u64)
    }

    async fn endpoint_stats(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<EndpointStat>, StoreError> {
        let entries = self.entries.read().await;
        let mut groups: HashMap<&str, (u64, HashSet<&str>, HashSet<&str>)> = HashMap::new();

        for entry in entries.iter().filter(|entry| entry.timestamp > since) {
            let group = groups.entry(entry.endpoint.as_str()).or_default();
            group.0 += 1;
            group.1.insert(entry.source_ip.as_str());
            if let Some(fingerprint) = entry.fingerprint.as_deref() {
                group.2.insert(fingerprint);
            }
        }

        let mut stats: Vec<EndpointStat> = groups
            .into_iter()
            .map(|(endpoint, (total, ips, devices))| EndpointStat {
                endpoint: endpoint.to_string(),
                total_requests: total,
                unique_ips: ips.len() as u64,
                unique_devices: devices.len() as u64,
            })
            .collect();
        stats.sort_by(|a, b| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a.endpoint.cmp(&b.endpoint))
        });
        stats.truncate(limit as usize);
        Ok(stats)
    }

    async fn suspicious_ips(
        &self,
        since: DateTime<Utc>,
        min_requests: u64,
        limit: u32,
    ) -> Result<Vec<SuspiciousIp>, StoreError> {
        let entries = self.entries.read().await;
        let mut groups: HashMap<&str, SuspiciousIp> = HashMap::new();

        for entry in entries.iter().filter(|entry| entry.timestamp > since) {
            groups
                .entry(entry.source_ip.as_str())
                .and_modify(|ip| {
                    ip.request_count += 1;
                    ip.first_seen = ip.first_seen.min(entry.timestamp);
                    ip.last_seen = ip.last_seen.max(entry.timestamp);
                })
                .or_insert_with(|| SuspiciousIp {
                    ip_address: entry.source_ip.clone(),
                    request_count: 1,
                    first_seen: entry.timestamp,
                    last_seen: entry.timestamp,
                });
        }

        let mut suspicious: Vec<SuspiciousIp> = groups
            .into_values()
            .filter(|ip| ip.request_count > min_requests)
            .collect();
        suspicious.sort_by(|a, b| {
            b.request_count
                .cmp(&a.request_count)
                .then_with(|| a.ip_address.cmp(&b.ip_address))
        });
        suspicious.truncate(limit as usize);
        Ok(suspicious)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn identity(ip: &str, endpoint: &str, fingerprint: Option<&str>) -> RequestIdentity {
        RequestIdentity::new(ip, Some(endpoint.to_string()), fingerprint.map(str::to_string))
    }

    #[tokio::test]
    async fn test_window_counts() {
        let store = MemoryLogStore::new();
        let now = Utc::now();

        store.insert_at(&identity("10.0.0.1", "appointments", Some("fp-a")), now - Duration::seconds(10)).await;
        store.insert_at(&identity("10.0.0.1", "chat", Some("fp-a")), now - Duration::seconds(20)).await;
        store.insert_at(&identity("10.0.0.1", "chat", None), now - Duration::minutes(5)).await;
        store.insert_at(&identity("10.0.0.2", "chat", Some("fp-a")), now - Duration::seconds(30)).await;

        let minute_ago = now - Duration::minutes(1);
        assert_eq!(store.count_by_ip("10.0.0.1", minute_ago).await.unwrap(), 2);
        assert_eq!(store.count_by_ip("10.0.0.1", now - Duration::hours(1)).await.unwrap(), 3);
        assert_eq!(store.count_by_ip_endpoint("10.0.0.1", "chat", minute_ago).await.unwrap(), 1);
        assert_eq!(store.count_by_fingerprint("fp-a", minute_ago).await.unwrap(), 3);
        assert_eq!(store.count_by_ip("10.0.0.9", minute_ago).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_before_is_global() {
        let store = MemoryLogStore::new();
        let now = Utc::now();

        store.insert_at(&identity("10.0.0.1", "chat", None), now - Duration::hours(30)).await;
        store.insert_at(&identity("10.0.0.2", "forum", None), now - Duration::hours(25)).await;
        store.insert_at(&identity("10.0.0.3", "forum", None), now - Duration::hours(1)).await;

        let removed = store.prune_before(now - Duration::hours(24)).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_endpoint_stats_ignores_missing_fingerprints() {
        let store = MemoryLogStore::new();
        let now = Utc::now() - Duration::minutes(1);

        store.insert_at(&identity("10.0.0.1", "chat", Some("fp-a")), now).await;
        store.insert_at(&identity("10.0.0.1", "chat", None), now).await;
        store.insert_at(&identity("10.0.0.2", "chat", Some("fp-b")), now).await;
        store.insert_at(&identity("10.0.0.2", "forum", None), now).await;

        let stats = store.endpoint_stats(now - Duration::hours(1), 20).await.unwrap();
        assert_eq!(
            stats[0],
            EndpointStat {
                endpoint: "chat".to_string(),
                total_requests: 3,
                unique_ips: 2,
                unique_devices: 2,
            }
        );
        assert_eq!(stats[1].endpoint, "forum");
        assert_eq!(stats[1].unique_devices, 0);
    }
}
