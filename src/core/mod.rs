//! Core functionality for the request guard service.
//!
//! This module contains the policy evaluator, the log recorder and the
//! statistics aggregator. All three share one request log store.

pub mod rate_limiter;
pub mod recorder;
pub mod analytics;

pub use rate_limiter::{RateLimiter, Decision, BlockReason};
pub use recorder::LogRecorder;
pub use analytics::Analytics;
