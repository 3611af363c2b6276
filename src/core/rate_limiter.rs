//! Rate limiting policy for the request guard service.
//!
//! The limiter counts request log entries inside sliding windows that end
//! at "now" and are recomputed for every check. Checking never records a
//! request, so the usual flow is `check` followed by `record` once the
//! caller accepts the request. Nothing serializes that pair: two concurrent
//! requests may both pass the check before either is recorded, which makes
//! the limiter advisory rather than a hard admission gate.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, warn};
use metrics::increment_counter;

use crate::models::{RateLimitConfig, RequestIdentity};
use crate::store::{LogStore, StoreError};

/// Why a request was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The IP is on the static blocklist
    BlockedIp,
    /// Too many requests from one IP in the last minute
    PerMinuteIp { limit: u64 },
    /// Too many requests from one IP in the last hour
    PerHourIp { limit: u64 },
    /// Too many requests from one IP to one endpoint in the last minute
    PerEndpoint { endpoint: String, limit: u64 },
    /// Too many requests from one device in the last minute
    PerDevice { limit: u64 },
}

impl BlockReason {
    /// Short label used for metrics
    pub fn rule(&self) -> &'static str {
        match self {
            BlockReason::BlockedIp => "blocked_ip",
            BlockReason::PerMinuteIp { .. } => "ip_per_minute",
            BlockReason::PerHourIp { .. } => "ip_per_hour",
            BlockReason::PerEndpoint { .. } => "endpoint_per_minute",
            BlockReason::PerDevice { .. } => "fingerprint_per_minute",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::BlockedIp => write!(f, "IP address is blocked"),
            BlockReason::PerMinuteIp { limit } => write!(
                f,
                "per-minute IP limit exceeded: more than {} requests per minute",
                limit
            ),
            BlockReason::PerHourIp { limit } => write!(
                f,
                "per-hour IP limit exceeded: more than {} requests per hour",
                limit
            ),
            BlockReason::PerEndpoint { endpoint, limit } => write!(
                f,
                "per-endpoint limit exceeded for {}: more than {} requests per minute",
                endpoint, limit
            ),
            BlockReason::PerDevice { limit } => write!(
                f,
                "per-device limit exceeded: more than {} requests per minute",
                limit
            ),
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Blocked(BlockReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn reason(&self) -> Option<&BlockReason> {
        match self {
            Decision::Allowed => None,
            Decision::Blocked(reason) => Some(reason),
        }
    }
}

/// Sliding-window rate limiter over the request log
pub struct RateLimiter {
    /// Request log
    store: Arc<dyn LogStore>,
    /// Rate limit configuration
    config: RateLimitConfig,
    /// Addresses that are always rejected
    blocked_ips: HashSet<String>,
}

impl RateLimiter {
    /// Create a new rate limiter instance
    pub fn new(store: Arc<dyn LogStore>, config: RateLimitConfig) -> Self {
        let blocked_ips = config.blocked_ips.iter().cloned().collect();
        Self {
            store,
            config,
            blocked_ips,
        }
    }

    /// Check whether a request should be allowed
    ///
    /// Rules are evaluated in order and the first violation wins:
    ///
    /// 1. static IP blocklist
    /// 2. requests per IP in the last minute
    /// 3. requests per IP in the last hour
    /// 4. requests per (IP, endpoint) in the last minute
    /// 5. requests per fingerprint in the last minute, only when one is given
    ///
    /// A limit of N admits N requests per window. The check runs before the
    /// incoming request is recorded, so it is rejected once N entries are
    /// already in the window, i.e. when it would be the (N+1)th.
    ///
    /// # Returns
    ///
    /// * `Ok(Decision::Allowed)` if the request should be allowed
    /// * `Ok(Decision::Blocked(_))` with the first violated rule
    /// * `Err(StoreError)` if the request log could not be read
    pub async fn check(&self, identity: &RequestIdentity) -> Result<Decision, StoreError> {
        let decision = self.evaluate(identity).await?;

        match &decision {
            Decision::Allowed => {
                debug!("Allowed {} on {}", identity.ip, identity.endpoint);
                increment_counter!("request_guard_checks_total", "outcome" => "allowed");
            }
            Decision::Blocked(reason) => {
                warn!("Blocked {} on {}: {}", identity.ip, identity.endpoint, reason);
                increment_counter!(
                    "request_guard_checks_total",
                    "outcome" => "blocked",
                    "rule" => reason.rule()
                );
            }
        }

        Ok(decision)
    }

    async fn evaluate(&self, identity: &RequestIdentity) -> Result<Decision, StoreError> {
        if self.blocked_ips.contains(&identity.ip) {
            return Ok(Decision::Blocked(BlockReason::BlockedIp));
        }

        let now = Utc::now();
        let minute_ago = now - Duration::minutes(1);
        let hour_ago = now - Duration::hours(1);

        let per_minute = self.store.count_by_ip(&identity.ip, minute_ago).await?;
        if exceeds(per_minute, self.config.ip_per_minute) {
            return Ok(Decision::Blocked(BlockReason::PerMinuteIp {
                limit: self.config.ip_per_minute,
            }));
        }

        let per_hour = self.store.count_by_ip(&identity.ip, hour_ago).await?;
        if exceeds(per_hour, self.config.ip_per_hour) {
            return Ok(Decision::Blocked(BlockReason::PerHourIp {
                limit: self.config.ip_per_hour,
            }));
        }

        let per_endpoint = self
            .store
            .count_by_ip_endpoint(&identity.ip, &identity.endpoint, minute_ago)
            .await?;
        if exceeds(per_endpoint, self.config.endpoint_per_minute) {
            return Ok(Decision::Blocked(BlockReason::PerEndpoint {
                endpoint: identity.endpoint.clone(),
                limit: self.config.endpoint_per_minute,
            }));
        }

        if let Some(fingerprint) = identity.fingerprint.as_deref() {
            let per_device = self.store.count_by_fingerprint(fingerprint, minute_ago).await?;
            if exceeds(per_device, self.config.fingerprint_per_minute) {
                return Ok(Decision::Blocked(BlockReason::PerDevice {
                    limit: self.config.fingerprint_per_minute,
                }));
            }
        }

        Ok(Decision::Allowed)
    }
}

/// True when admitting one more request would put `recorded` over `limit`.
fn exceeds(recorded: u64, limit: u64) -> bool {
    recorded >= limit
}
