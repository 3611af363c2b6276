//! Request log recorder.
//!
//! Appends accepted requests to the log and prunes expired entries on the
//! way out. Pruning is global, so every write pays for retention cleanup on
//! behalf of all clients; there is no background sweep.

use std::sync::Arc;

use chrono::{Duration, Utc};
use log::debug;
use metrics::{counter, increment_counter};

use crate::models::RequestIdentity;
use crate::store::{LogStore, StoreError};

pub struct LogRecorder {
    store: Arc<dyn LogStore>,
    retention: Duration,
}

impl LogRecorder {
    pub fn new(store: Arc<dyn LogStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// Record one accepted request, then delete entries older than the
    /// retention horizon.
    pub async fn record(&self, identity: &RequestIdentity) -> Result<(), StoreError> {
        self.store.append(identity).await?;
        increment_counter!("request_guard_records_total");

        let cutoff = Utc::now() - self.retention;
        let pruned = self.store.prune_before(cutoff).await?;
        if pruned > 0 {
            debug!("Pruned {} request log entries older than {}", pruned, cutoff);
            counter!("request_guard_pruned_total", pruned);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryLogStore, MockLogStore};

    #[tokio::test]
    async fn test_record_appends_and_prunes() {
        let store = Arc::new(MemoryLogStore::new());
        let recorder = LogRecorder::new(store.clone(), Duration::hours(24));
        let stale = RequestIdentity::new("10.8.0.1", Some("chat".to_string()), None);
        let fresh = RequestIdentity::new("10.8.0.2", Some("forum".to_string()), Some("dev".to_string()));

        store.insert_at(&stale, Utc::now() - Duration::hours(25)).await;
        store.insert_at(&stale, Utc::now() - Duration::hours(23)).await;

        recorder.record(&fresh).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(
            store.count_by_ip("10.8.0.1", Utc::now() - Duration::days(2)).await.unwrap(),
            1
        );
        assert_eq!(
            store.count_by_fingerprint("dev", Utc::now() - Duration::minutes(1)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_append_failure_skips_pruning() {
        let mut store = MockLogStore::new();
        store
            .expect_append()
            .times(1)
            .returning(|_| Err(StoreError::Storage("disk full".to_string())));
        store.expect_prune_before().never();

        let recorder = LogRecorder::new(Arc::new(store), Duration::hours(24));
        let identity = RequestIdentity::new("10.8.0.3", None, None);

        assert!(recorder.record(&identity).await.is_err());
    }
}
