use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response};
use tracing::{debug, error, instrument};
use url::Url;

use crate::fxtwitter_types::FxTwitterResponse;
use crate::metadata::{MetadataProvider, TweetMetadata};
use crate::status::StatusReference;
use crate::utils::{charset_param, media_type};
use crate::ProxyError;

/// Desktop browser identity used for page fetches; some sites refuse
/// unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_METADATA_API: &str = "https://api.fxtwitter.com";

/// Identifies the proxy to the metadata API.
pub const METADATA_USER_AGENT: &str = concat!("reader-proxy/", env!("CARGO_PKG_VERSION"));

/// Options for the page [`Fetcher`].
///
/// ```ignore
/// let fetcher = Fetcher::new_with_config(FetcherConfig {
///     user_agent: "my-agent/1.0".to_string(),
///     timeout: Duration::from_secs(5),
///     ..Default::default()
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub headers: Option<HeaderMap>,
    pub max_redirects: usize,
    /// Maximum body size in bytes (default: 10MB)
    pub max_content_size: usize,
    /// Accepted media types when the upstream declares one
    pub allowed_content_types: HashSet<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            headers: None,
            max_redirects: 10,
            max_content_size: 10 * 1024 * 1024,
            allowed_content_types: ["text/html", "application/xhtml+xml", "text/plain"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// A successfully fetched and decoded page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects; relative links resolve against it.
    pub final_url: Url,
    pub html: String,
}

/// Fetches target pages, one request per call and no retries.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_content_size: usize,
    allowed_content_types: HashSet<String>,
}

impl Fetcher {
    pub fn new() -> Result<Self, ProxyError> {
        Self::new_with_config(FetcherConfig::default())
    }

    pub fn new_with_config(config: FetcherConfig) -> Result<Self, ProxyError> {
        let mut headers = config.headers.unwrap_or_default();
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ));
        headers
            .entry(ACCEPT_LANGUAGE)
            .or_insert(HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| {
                error!(error = %e, "Failed to create HTTP client");
                ProxyError::HttpClient(e.to_string())
            })?;

        debug!("Fetcher initialized");
        Ok(Self {
            client,
            max_content_size: config.max_content_size,
            allowed_content_types: config.allowed_content_types,
        })
    }

    /// Wraps a prebuilt client, keeping the default content limits.
    pub fn with_client(client: Client) -> Self {
        let defaults = FetcherConfig::default();
        Self {
            client,
            max_content_size: defaults.max_content_size,
            allowed_content_types: defaults.allowed_content_types,
        }
    }

    /// Fetches `url` and decodes the body to text.
    ///
    /// A non-success response becomes [`ProxyError::UpstreamStatus`] carrying
    /// the upstream code; transport failures become
    /// [`ProxyError::UpstreamUnreachable`].
    #[instrument(level = "debug", skip(self, url), fields(url = %url), err)]
    pub async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, ProxyError> {
        debug!("Starting fetch request");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to send request");
            ProxyError::UpstreamUnreachable(e.to_string())
        })?;

        let response = error_for_status(response)?;
        let final_url = response.url().clone();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(content_type) = &content_type {
            let essence = media_type(content_type);
            if !essence.is_empty() && !self.allowed_content_types.contains(&essence) {
                return Err(ProxyError::InvalidContentType(essence));
            }
        }

        let body = self.read_limited(response).await?;
        let encoding = content_type
            .as_deref()
            .and_then(charset_param)
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8);
        let (html, used_encoding, had_errors) = encoding.decode(&body);
        if had_errors {
            debug!(encoding = used_encoding.name(), "Body contained malformed sequences");
        }

        debug!(
            final_url = %final_url,
            content_length = body.len(),
            "Successfully fetched webpage"
        );
        Ok(FetchedPage {
            final_url,
            html: html.into_owned(),
        })
    }

    async fn read_limited(&self, mut response: Response) -> Result<Vec<u8>, ProxyError> {
        if let Some(declared) = response.content_length() {
            if declared as usize > self.max_content_size {
                return Err(ProxyError::ContentTooLarge(declared as usize));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            error!(error = %e, "Failed to read response body");
            ProxyError::UpstreamUnreachable(e.to_string())
        })? {
            if body.len() + chunk.len() > self.max_content_size {
                return Err(ProxyError::ContentTooLarge(body.len() + chunk.len()));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn error_for_status(response: Response) -> Result<Response, ProxyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(ProxyError::UpstreamStatus {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or_default().to_string(),
    })
}

/// [`MetadataProvider`] backed by the FxTwitter status API.
#[derive(Clone)]
pub struct FxTwitterClient {
    client: Client,
    api_base: String,
}

impl FxTwitterClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::HttpClient(e.to_string()))?;
        Ok(Self::with_client(client, api_base))
    }

    pub fn with_client(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    fn status_endpoint(&self, reference: &StatusReference) -> String {
        format!(
            "{}/{}/status/{}",
            self.api_base.trim_end_matches('/'),
            reference.screen_name,
            reference.status_id
        )
    }
}

#[async_trait]
impl MetadataProvider for FxTwitterClient {
    #[instrument(level = "debug", skip(self), err)]
    async fn fetch_status(&self, reference: &StatusReference) -> Result<TweetMetadata, ProxyError> {
        let endpoint = self.status_endpoint(reference);
        debug!(endpoint = %endpoint, "Fetching status metadata");

        let response = self
            .client
            .get(&endpoint)
            .header(USER_AGENT, METADATA_USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, endpoint = %endpoint, "Failed to reach metadata API");
                ProxyError::UpstreamUnreachable(e.to_string())
            })?;

        let response = error_for_status(response)?;
        let body = response.bytes().await.map_err(|e| {
            error!(error = %e, "Failed to read metadata response");
            ProxyError::UpstreamUnreachable(e.to_string())
        })?;

        let payload: FxTwitterResponse = serde_json::from_slice(&body)
            .map_err(|e| ProxyError::MetadataSchemaMismatch(e.to_string()))?;

        debug!(status = %reference, "Successfully fetched status metadata");
        Ok(payload.into())
    }
}
