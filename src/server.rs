//! HTTP surface of the proxy.
//!
//! ## Routes
//!
//! - `GET /` - Entry form
//! - `GET /health` - Health check (JSON)
//! - `GET /{target}` - Reader view of the percent-encoded target URL

use std::sync::Arc;

use axum::extract::State;
use axum::http::Uri;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::proxy_service::ProxyService;
use crate::ProxyError;

/// Build the proxy router.
pub fn router(service: ProxyService) -> Router {
    Router::new()
        .route("/", get(proxy_handler))
        .route("/health", get(health_check))
        .route("/{*target}", get(proxy_handler))
        .with_state(Arc::new(service))
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The raw path and query are used instead of the matched parameter so the
/// target is percent-decoded exactly once.
async fn proxy_handler(
    State(service): State<Arc<ProxyService>>,
    uri: Uri,
) -> Result<Html<String>, ProxyError> {
    let raw_target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let page = service.handle(raw_target).await?;
    Ok(Html(page.html))
}
