//! API endpoints for the request guard service.
//!
//! Callers talk to a single action endpoint: `POST /` carries
//! `{"action": "check" | "record", ...}` and `GET /?action=get-stats`
//! returns the operator report. Health and Prometheus metrics live under
//! their own paths.

mod error;

pub use error::ApiError;

use std::sync::Arc;

use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Duration;
use log::warn;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::core::{Analytics, LogRecorder, RateLimiter};
use crate::models::{Config, RequestIdentity, Statistics};
use crate::store::LogStore;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

pub struct ApiState {
    pub rate_limiter: RateLimiter,
    pub recorder: LogRecorder,
    pub analytics: Analytics,
    pub admin_token: Option<String>,
    pub metrics: Option<PrometheusHandle>,
}

impl ApiState {
    /// Wire every component to the same request log
    pub fn new(store: Arc<dyn LogStore>, config: &Config, metrics: Option<PrometheusHandle>) -> Self {
        let retention = Duration::hours(i64::from(config.rate_limit.retention_hours));
        Self {
            rate_limiter: RateLimiter::new(store.clone(), config.rate_limit.clone()),
            recorder: LogRecorder::new(store.clone(), retention),
            analytics: Analytics::new(store, config.statistics.clone()),
            admin_token: config.admin.token.clone().filter(|token| !token.is_empty()),
            metrics,
        }
    }
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/")
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                ApiError::BadRequest(err.to_string()).into()
            }))
            .route(web::post().to(handle_action))
            .route(web::get().to(handle_query))
            .route(web::method(Method::OPTIONS).to(preflight))
            .default_service(web::to(invalid_action)),
    )
    .service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health_check))),
    )
    .service(web::resource("/metrics").route(web::get().to(render_metrics)));
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Body of `POST /`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: String,
    pub ip: Option<String>,
    pub endpoint: Option<String>,
    pub fingerprint: Option<String>,
}

impl ActionRequest {
    fn identity(self) -> Result<RequestIdentity, ApiError> {
        match self.ip {
            Some(ip) if !ip.is_empty() => Ok(RequestIdentity::new(ip, self.endpoint, self.fingerprint)),
            _ => Err(ApiError::MissingField("IP address required")),
        }
    }
}

/// Query string of `GET /`
#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

/// Rate limit check response
#[derive(Serialize)]
struct CheckResponse {
    allowed: bool,
    reason: Option<String>,
}

#[derive(Serialize)]
struct RecordResponse {
    success: bool,
}

#[derive(Serialize)]
struct StatsResponse {
    stats: Statistics,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `check` and `record` actions
pub async fn handle_action(
    state: web::Data<ApiState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: ActionRequest = if body.is_empty() {
        ActionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    match request.action.as_str() {
        "check" => {
            let identity = request.identity()?;
            let decision = state.rate_limiter.check(&identity).await?;
            Ok(HttpResponse::Ok().json(CheckResponse {
                allowed: decision.is_allowed(),
                reason: decision.reason().map(ToString::to_string),
            }))
        }
        "record" => {
            let identity = request.identity()?;
            state.recorder.record(&identity).await?;
            Ok(HttpResponse::Ok().json(RecordResponse { success: true }))
        }
        _ => Err(ApiError::InvalidAction),
    }
}

/// `get-stats` action, guarded by the admin token
pub async fn handle_query(
    state: web::Data<ApiState>,
    query: web::Query<ActionQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    if query.action.as_deref() != Some("get-stats") {
        return Err(ApiError::InvalidAction);
    }

    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let authorized = match (state.admin_token.as_deref(), provided) {
        (Some(expected), Some(provided)) => expected == provided,
        _ => false,
    };
    if !authorized {
        warn!(
            "Rejected statistics request from {}",
            req.peer_addr().map(|addr| addr.ip().to_string()).unwrap_or_default()
        );
        return Err(ApiError::Unauthorized);
    }

    let stats = state.analytics.get_statistics().await?;
    Ok(HttpResponse::Ok().json(StatsResponse { stats }))
}

/// CORS preflight
async fn preflight() -> HttpResponse {
    HttpResponse::Ok()
        .insert_header(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .insert_header(("Access-Control-Allow-Headers", "Content-Type, X-Admin-Token"))
        .insert_header(("Access-Control-Max-Age", "86400"))
        .finish()
}

async fn invalid_action() -> Result<HttpResponse, ApiError> {
    Err(ApiError::InvalidAction)
}

/// Prometheus scrape endpoint
async fn render_metrics(state: web::Data<ApiState>) -> HttpResponse {
    match &state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}
