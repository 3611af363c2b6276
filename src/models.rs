use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::utils::{normalize_endpoint, normalize_fingerprint};

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per IP within one minute
    pub ip_per_minute: u64,
    /// Requests allowed per IP within one hour
    pub ip_per_hour: u64,
    /// Requests allowed per (IP, endpoint) pair within one minute
    pub endpoint_per_minute: u64,
    /// Requests allowed per device fingerprint within one minute
    pub fingerprint_per_minute: u64,
    /// How long request log entries are kept, in hours
    pub retention_hours: u32,
    /// Addresses rejected before any counting happens
    #[serde(default)]
    pub blocked_ips: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ip_per_minute: 60,
            ip_per_hour: 1000,
            endpoint_per_minute: 10,
            fingerprint_per_minute: 60,
            retention_hours: 24,
            blocked_ips: Vec::new(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which log store to use
    pub backend: StorageBackend,
    /// Postgres connection URL
    pub database_url: Option<String>,
    /// Postgres connection pool size
    pub max_connections: u32,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Statistics report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Reporting window in hours
    pub window_hours: u32,
    /// Number of endpoints listed in the report
    pub top_endpoints: u32,
    /// An IP with more requests than this inside the window is suspicious
    pub suspicious_threshold: u64,
    /// Number of suspicious IPs listed in the report
    pub top_suspicious: u32,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            top_endpoints: 20,
            suspicious_threshold: 500,
            top_suspicious: 10,
        }
    }
}

/// Operator access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Shared secret expected in the `X-Admin-Token` header.
    /// Statistics are unavailable while this is unset.
    pub token: Option<String>,
}

/// Application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Rate limit configuration
    pub rate_limit: RateLimitConfig,
    /// Statistics configuration
    pub statistics: StatisticsConfig,
    /// Admin configuration
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                backend: StorageBackend::Postgres,
                database_url: None,
                max_connections: 10,
            },
            rate_limit: RateLimitConfig::default(),
            statistics: StatisticsConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// The identity a request is counted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub ip: String,
    pub endpoint: String,
    /// Never `Some("")`; empty fingerprints are normalized away.
    pub fingerprint: Option<String>,
}

impl RequestIdentity {
    pub fn new(ip: impl Into<String>, endpoint: Option<String>, fingerprint: Option<String>) -> Self {
        Self {
            ip: ip.into(),
            endpoint: normalize_endpoint(endpoint),
            fingerprint: normalize_fingerprint(fingerprint),
        }
    }
}

/// One row of the request log
#[derive(Debug, Clone)]
pub struct RequestLogEntry {
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub endpoint: String,
    pub fingerprint: Option<String>,
}

/// Per-endpoint traffic summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStat {
    pub endpoint: String,
    pub total_requests: u64,
    pub unique_ips: u64,
    pub unique_devices: u64,
}

/// An IP whose volume crossed the suspicious threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspiciousIp {
    pub ip_address: String,
    pub request_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Operator report returned by the statistics endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub endpoint_stats: Vec<EndpointStat>,
    pub suspicious_ips: Vec<SuspiciousIp>,
}
