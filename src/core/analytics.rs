//! Traffic statistics for the request guard service.
//!
//! Read-only reporting over the request log for operators: the busiest
//! endpoints and the IPs whose volume looks automated.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::models::{Statistics, StatisticsConfig};
use crate::store::{LogStore, StoreError};

/// Statistics aggregator
pub struct Analytics {
    store: Arc<dyn LogStore>,
    config: StatisticsConfig,
}

impl Analytics {
    /// Create a new analytics instance
    pub fn new(store: Arc<dyn LogStore>, config: StatisticsConfig) -> Self {
        Self { store, config }
    }

    /// Build the operator report over the configured window.
    ///
    /// Either query failing fails the whole report.
    pub async fn get_statistics(&self) -> Result<Statistics, StoreError> {
        let since = Utc::now() - Duration::hours(i64::from(self.config.window_hours));

        let endpoint_stats = self
            .store
            .endpoint_stats(since, self.config.top_endpoints)
            .await?;
        let suspicious_ips = self
            .store
            .suspicious_ips(since, self.config.suspicious_threshold, self.config.top_suspicious)
            .await?;

        Ok(Statistics {
            endpoint_stats,
            suspicious_ips,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestIdentity;
    use crate::store::{MemoryLogStore, MockLogStore};

    fn identity(ip: &str, endpoint: &str) -> RequestIdentity {
        RequestIdentity::new(ip, Some(endpoint.to_string()), None)
    }

    #[tokio::test]
    async fn test_suspicious_threshold_is_exclusive() {
        let store = Arc::new(MemoryLogStore::new());
        let at = Utc::now() - Duration::hours(2);

        for _ in 0..501 {
            store.insert_at(&identity("198.51.100.1", "chat"), at).await;
        }
        for _ in 0..500 {
            store.insert_at(&identity("198.51.100.2", "chat"), at).await;
        }

        let analytics = Analytics::new(store, StatisticsConfig::default());
        let stats = analytics.get_statistics().await.unwrap();

        assert_eq!(stats.suspicious_ips.len(), 1);
        assert_eq!(stats.suspicious_ips[0].ip_address, "198.51.100.1");
        assert_eq!(stats.suspicious_ips[0].request_count, 501);
    }

    #[tokio::test]
    async fn test_entries_outside_window_are_ignored() {
        let store = Arc::new(MemoryLogStore::new());

        for _ in 0..600 {
            store
                .insert_at(&identity("198.51.100.3", "forum"), Utc::now() - Duration::hours(25))
                .await;
        }
        store
            .insert_at(&identity("198.51.100.4", "chat"), Utc::now() - Duration::minutes(5))
            .await;

        let analytics = Analytics::new(store, StatisticsConfig::default());
        let stats = analytics.get_statistics().await.unwrap();

        assert!(stats.suspicious_ips.is_empty());
        assert_eq!(stats.endpoint_stats.len(), 1);
        assert_eq!(stats.endpoint_stats[0].endpoint, "chat");
    }

    #[tokio::test]
    async fn test_report_limits() {
        let store = Arc::new(MemoryLogStore::new());
        let at = Utc::now() - Duration::minutes(30);

        for endpoint in 0..25 {
            for _ in 0..=endpoint {
                store.insert_at(&identity("192.0.2.1", &format!("ep-{:02}", endpoint)), at).await;
            }
        }
        for ip in 0..12 {
            for _ in 0..(501 + ip) {
                store.insert_at(&identity(&format!("192.0.2.{}", 100 + ip), "chat"), at).await;
            }
        }

        let analytics = Analytics::new(store, StatisticsConfig::default());
        let stats = analytics.get_statistics().await.unwrap();

        assert_eq!(stats.endpoint_stats.len(), 20);
        assert_eq!(stats.endpoint_stats[0].endpoint, "chat");
        assert_eq!(stats.endpoint_stats[1].endpoint, "ep-24");

        assert_eq!(stats.suspicious_ips.len(), 10);
        assert_eq!(stats.suspicious_ips[0].ip_address, "192.0.2.111");
        assert!(stats
            .suspicious_ips
            .windows(2)
            .all(|pair| pair[0].request_count >= pair[1].request_count));
    }

    #[tokio::test]
    async fn test_store_failure_fails_report() {
        let mut store = MockLogStore::new();
        store.expect_endpoint_stats().returning(|_, _| Ok(Vec::new()));
        store
            .expect_suspicious_ips()
            .returning(|_, _, _| Err(StoreError::Storage("timeout".to_string())));

        let analytics = Analytics::new(Arc::new(store), StatisticsConfig::default());
        assert!(analytics.get_statistics().await.is_err());
    }
}
