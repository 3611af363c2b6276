//! Configuration management for the request guard service.
//!
//! This module loads application configuration from an optional TOML file,
//! built-in defaults and `REQUEST_GUARD__*` environment variables.
//! `DATABASE_URL` is honoured as well, since that is where hosting platforms
//! put the Postgres DSN. `REQUEST_GUARD__RATE_LIMIT__BLOCKED_IPS` takes a
//! comma-separated list.

use std::env;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use crate::models::Config;

/// Load configuration from the config file and environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

    let config = ConfigBuilder::builder()
        .add_source(File::with_name(&config_file).required(false))
        .add_source(
            Environment::with_prefix("REQUEST_GUARD")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("rate_limit.blocked_ips"),
        )
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("storage.backend", "postgres")?
        .set_default("storage.max_connections", 10)?
        .set_default("rate_limit.ip_per_minute", 60)?
        .set_default("rate_limit.ip_per_hour", 1000)?
        .set_default("rate_limit.endpoint_per_minute", 10)?
        .set_default("rate_limit.fingerprint_per_minute", 60)?
        .set_default("rate_limit.retention_hours", 24)?
        .set_default("rate_limit.blocked_ips", Vec::<String>::new())?
        .set_default("statistics.window_hours", 24)?
        .set_default("statistics.top_endpoints", 20)?
        .set_default("statistics.suspicious_threshold", 500)?
        .set_default("statistics.top_suspicious", 10)?
        .set_override_option("storage.database_url", env::var("DATABASE_URL").ok())?
        .build()?;

    config.try_deserialize()
}
