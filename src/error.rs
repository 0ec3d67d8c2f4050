use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid URL: {0}")]
    InvalidTargetUrl(String),

    #[error("Blocked target: {0}")]
    TargetBlocked(String),

    /// The remote answered, but not with a success status.
    #[error("Failed to fetch URL: {status} {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("Failed to fetch URL: {0}")]
    UpstreamUnreachable(String),

    #[error("Metadata payload did not match the expected schema: {0}")]
    MetadataSchemaMismatch(String),

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Content too large: {0} bytes exceeds the limit")]
    ContentTooLarge(usize),

    #[error("Failed to rewrite document: {0}")]
    RewriteFailed(String),

    #[error("Failed to extract content: {0}")]
    ExtractionFailed(String),

    #[error("Too many concurrent requests")]
    ConcurrencyLimit,

    #[error("Failed to initialize HTTP client: {0}")]
    HttpClient(String),
}

impl ProxyError {
    pub fn log(&self) {
        match self {
            ProxyError::InvalidTargetUrl(target) => {
                warn!(target_url = %target, "Rejected invalid target URL");
            }
            ProxyError::TargetBlocked(reason) => {
                warn!(reason = %reason, "Target blocked by policy");
            }
            ProxyError::UpstreamStatus { status, message } => {
                warn!(status = *status, message = %message, "Upstream returned non-success status");
            }
            ProxyError::UpstreamUnreachable(e) => {
                error!(error = %e, "Upstream fetch failed");
            }
            ProxyError::MetadataSchemaMismatch(e) => {
                error!(error = %e, "Metadata schema validation failed");
            }
            ProxyError::InvalidContentType(content_type) => {
                warn!(content_type = %content_type, "Invalid content type received");
            }
            ProxyError::ContentTooLarge(size) => {
                warn!(size = *size, "Upstream body exceeded the size limit");
            }
            ProxyError::RewriteFailed(e) => {
                error!(error = %e, "Link rewriting failed");
            }
            ProxyError::ExtractionFailed(e) => {
                error!(error = %e, "Content extraction failed");
            }
            ProxyError::ConcurrencyLimit => {
                warn!("Concurrency limit reached");
            }
            ProxyError::HttpClient(e) => {
                error!(error = %e, "HTTP client setup failed");
            }
        }
    }

    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTargetUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::TargetBlocked(_) => StatusCode::FORBIDDEN,
            ProxyError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let body = match &self {
            ProxyError::InvalidTargetUrl(_)
            | ProxyError::TargetBlocked(_)
            | ProxyError::UpstreamStatus { .. } => self.to_string(),
            _ => format!("Server error: {self}"),
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
