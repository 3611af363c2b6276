//! Request Guard Service
//!
//! This is the main entry point for the request guard service.
//! It initializes the request log store and starts the web server.

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use anyhow::{anyhow, Context};
use dotenv::dotenv;
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;

use request_guard_service::api::{self, ApiState};
use request_guard_service::config;
use request_guard_service::models::StorageBackend;
use request_guard_service::store::{LogStore, MemoryLogStore, PgLogStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting request guard service...");

    let config = config::load_config().context("Failed to load configuration")?;

    let store: Arc<dyn LogStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow!("Database configuration missing"))?;
            let store = PgLogStore::connect(url, config.storage.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            store.ensure_schema().await.context("Failed to prepare request log schema")?;
            info!("Using Postgres request log");
            Arc::new(store)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory request log; entries are lost on restart");
            Arc::new(MemoryLogStore::new())
        }
    };

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics exporter unavailable: {}", e);
            None
        }
    };

    let state = web::Data::new(ApiState::new(store, &config, metrics));

    info!("Listening on {}:{}", config.server.host, config.server.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*")))
            .configure(api::config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
