//! Postgres-backed request log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::models::{EndpointStat, RequestIdentity, SuspiciousIp};
use super::{LogStore, StoreError};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS rate_limit_logs (
        id BIGSERIAL PRIMARY KEY,
        ip_address TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        fingerprint TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_rate_limit_logs_ip_created ON rate_limit_logs (ip_address, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_rate_limit_logs_fp_created ON rate_limit_logs (fingerprint, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_rate_limit_logs_created ON rate_limit_logs (created_at)",
];

/// Request log stored in the `rate_limit_logs` table
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    /// Open a connection pool against `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the log table and its indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Request log schema is ready");
        Ok(())
    }
}

fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn append(&self, identity: &RequestIdentity) -> Result<(), StoreError> {
        // Stamped with the service clock, the same one the windows start from.
        sqlx::query(
            r#"
            INSERT INTO rate_limit_logs (ip_address, endpoint, fingerprint, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&identity.ip)
        .bind(&identity.endpoint)
        .bind(identity.fingerprint.as_deref())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_by_ip(&self, ip: &str, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rate_limit_logs WHERE ip_address = $1 AND created_at > $2",
        )
        .bind(ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(to_count(count))
    }

    async fn count_by_ip_endpoint(
        &self,
        ip: &str,
        endpoint: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM rate_limit_logs
            WHERE ip_address = $1 AND endpoint = $2 AND created_at > $3
            "#,
        )
        .bind(ip)
        .bind(endpoint)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(to_count(count))
    }

    async fn count_by_fingerprint(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rate_limit_logs WHERE fingerprint = $1 AND created_at > $2",
        )
        .bind(fingerprint)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(to_count(count))
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM rate_limit_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn endpoint_stats(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<EndpointStat>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                endpoint,
                COUNT(*) AS total_requests,
                COUNT(DISTINCT ip_address) AS unique_ips,
                COUNT(DISTINCT fingerprint) AS unique_devices
            FROM rate_limit_logs
            WHERE created_at > $1
            GROUP BY endpoint
            ORDER BY total_requests DESC, endpoint ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<EndpointStat, StoreError> {
                Ok(EndpointStat {
                    endpoint: row.try_get("endpoint")?,
                    total_requests: to_count(row.try_get("total_requests")?),
                    unique_ips: to_count(row.try_get("unique_ips")?),
                    unique_devices: to_count(row.try_get("unique_devices")?),
                })
            })
            .collect()
    }

    async fn suspicious_ips(
        &self,
        since: DateTime<Utc>,
        min_requests: u64,
        limit: u32,
    ) -> Result<Vec<SuspiciousIp>, StoreError> {
        let min_requests = i64::try_from(min_requests).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT
                ip_address,
                COUNT(*) AS request_count,
                MIN(created_at) AS first_seen,
                MAX(created_at) AS last_seen
            FROM rate_limit_logs
            WHERE created_at > $1
            GROUP BY ip_address
            HAVING COUNT(*) > $2
            ORDER BY request_count DESC, ip_address ASC
            LIMIT $3
            "#,
        )
        .bind(since)
        .bind(min_requests)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SuspiciousIp, StoreError> {
                Ok(SuspiciousIp {
                    ip_address: row.try_get("ip_address")?,
                    request_count: to_count(row.try_get("request_count")?),
                    first_seen: row.try_get("first_seen")?,
                    last_seen: row.try_get("last_seen")?,
                })
            })
            .collect()
    }
}
