use std::sync::Arc;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use url::Url;

use crate::extractor::{Extractor, ReadabilityExtractor};
use crate::fetcher::{Fetcher, FxTwitterClient, DEFAULT_METADATA_API};
use crate::metadata::{render_tweet, MetadataProvider};
use crate::rewriter::{rewrite_html, RewriteContext};
use crate::sanitizer::{AmmoniaSanitizer, Sanitizer};
use crate::security::{TargetPolicy, TargetPolicyConfig};
use crate::status::{self, StatusReference};
use crate::template;
use crate::ProxyError;

pub const MAX_CONCURRENT_REQUESTS: usize = 500;

/// Which kind of page a request produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    EntryForm,
    Status,
    Article,
}

/// A complete HTML document ready to be sent.
#[derive(Debug, Clone)]
pub struct ProxyPage {
    pub kind: PageKind,
    pub html: String,
}

/// Where a decoded target is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Branch {
    EntryForm,
    Metadata(StatusReference),
    Fetch(Url),
}

/// Turns the raw request target (`/<percent-encoded URL>[?query]`) into the
/// URL to proxy. `None` means no target was given.
///
/// An unencoded query on the proxy path belongs to the target and is
/// appended as-is.
pub fn decode_target(raw_target: &str) -> Result<Option<String>, ProxyError> {
    let raw = raw_target.strip_prefix('/').unwrap_or(raw_target);
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    };
    if path.is_empty() {
        return Ok(None);
    }

    let mut target = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| ProxyError::InvalidTargetUrl(raw.to_string()))?
        .into_owned();

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push(if target.contains('?') { '&' } else { '?' });
        target.push_str(query);
    }
    Ok(Some(target))
}

/// Reader-mode proxy: status posts are rendered from metadata, everything
/// else is fetched, link-rewritten, extracted and wrapped.
#[derive(Clone)]
pub struct ProxyService {
    fetcher: Fetcher,
    metadata_provider: Arc<dyn MetadataProvider>,
    extractor: Arc<dyn Extractor>,
    sanitizer: Arc<dyn Sanitizer>,
    policy: TargetPolicy,
    // Max Concurrent Requests
    semaphore: Arc<Semaphore>,
}

impl ProxyService {
    pub fn new() -> Result<Self, ProxyError> {
        Self::new_with_config(ProxyServiceConfig::new())
    }

    pub fn new_with_config(config: ProxyServiceConfig) -> Result<Self, ProxyError> {
        debug!("Initializing ProxyService with custom configuration");

        let fetcher = match config.fetcher {
            Some(fetcher) => fetcher,
            None => Fetcher::new()?,
        };
        let metadata_provider: Arc<dyn MetadataProvider> = match config.metadata_provider {
            Some(provider) => provider,
            None => Arc::new(FxTwitterClient::new(
                DEFAULT_METADATA_API,
                Duration::from_secs(30),
            )?),
        };

        Ok(Self {
            fetcher,
            metadata_provider,
            extractor: config
                .extractor
                .unwrap_or_else(|| Arc::new(ReadabilityExtractor::new())),
            sanitizer: config
                .sanitizer
                .unwrap_or_else(|| Arc::new(AmmoniaSanitizer::new())),
            policy: TargetPolicy::new(config.target_policy),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
        })
    }

    /// Routes a decoded target. Targets are validated before any branch is
    /// chosen, so invalid or refused URLs never reach the network.
    pub fn decide_branch(&self, target: Option<&str>) -> Result<Branch, ProxyError> {
        let Some(target) = target else {
            return Ok(Branch::EntryForm);
        };
        let url = self.policy.validate(target)?;

        Ok(match status::detect(&url) {
            Some(reference) => Branch::Metadata(reference),
            None => Branch::Fetch(url),
        })
    }

    /// Serves one proxy request. `raw_target` is the request path plus the
    /// query string, if any.
    #[instrument(level = "debug", skip(self))]
    pub async fn handle(&self, raw_target: &str) -> Result<ProxyPage, ProxyError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProxyError::ConcurrencyLimit)?;

        let target = decode_target(raw_target)?;
        match self.decide_branch(target.as_deref())? {
            Branch::EntryForm => Ok(ProxyPage {
                kind: PageKind::EntryForm,
                html: template::entry_form(),
            }),
            Branch::Metadata(reference) => {
                debug!(status = %reference, "Detected status URL, using metadata provider");
                let metadata = self.metadata_provider.fetch_status(&reference).await?;
                Ok(ProxyPage {
                    kind: PageKind::Status,
                    html: render_tweet(&metadata, self.sanitizer.as_ref()),
                })
            }
            Branch::Fetch(url) => {
                info!(url = %url, "Fetching");
                let source = target.unwrap_or_else(|| url.to_string());
                self.proxy_article(&source, &url).await
            }
        }
    }

    async fn proxy_article(&self, source: &str, url: &Url) -> Result<ProxyPage, ProxyError> {
        let page = self.fetcher.fetch_page(url).await?;

        let rewritten = rewrite_html(&page.html, &RewriteContext::new(page.final_url.clone()))?;
        debug!(
            rewritten = rewritten.report.rewritten,
            injected = rewritten.report.injected,
            skipped = rewritten.report.skipped_total,
            "Rewrote links"
        );

        let mut article = self.extractor.extract(&rewritten.html, &page.final_url)?;
        article.content = article
            .content
            .map(|content| self.sanitizer.sanitize(&content))
            .filter(|content| !content.trim().is_empty());

        Ok(ProxyPage {
            kind: PageKind::Article,
            html: template::article_page(source, &article),
        })
    }
}

pub struct ProxyServiceConfig {
    pub max_concurrent_requests: usize,
    pub fetcher: Option<Fetcher>,
    pub metadata_provider: Option<Arc<dyn MetadataProvider>>,
    pub extractor: Option<Arc<dyn Extractor>>,
    pub sanitizer: Option<Arc<dyn Sanitizer>>,
    pub target_policy: TargetPolicyConfig,
}

impl Default for ProxyServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyServiceConfig {
    pub fn new() -> Self {
        Self {
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            fetcher: None,
            metadata_provider: None,
            extractor: None,
            sanitizer: None,
            target_policy: TargetPolicyConfig::default(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata_provider = Some(provider);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn with_target_policy(mut self, target_policy: TargetPolicyConfig) -> Self {
        self.target_policy = target_policy;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max_concurrent_requests: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_target_is_the_entry_form() {
        assert_eq!(decode_target("/").unwrap(), None);
        assert_eq!(decode_target("").unwrap(), None);
        assert_eq!(decode_target("/?utm=1").unwrap(), None);
    }

    #[test]
    fn decodes_the_encoded_target() {
        assert_eq!(
            decode_target("/https%3A%2F%2Fexample.com%2Fa%3Fb%3D1").unwrap(),
            Some("https://example.com/a?b=1".to_string())
        );
        assert_eq!(
            decode_target("/https://example.com/plain").unwrap(),
            Some("https://example.com/plain".to_string())
        );
    }

    #[test]
    fn appends_the_proxy_query() {
        assert_eq!(
            decode_target("/https%3A%2F%2Fexample.com%2Fsearch?q=rust").unwrap(),
            Some("https://example.com/search?q=rust".to_string())
        );
        assert_eq!(
            decode_target("/https%3A%2F%2Fexample.com%2F%3Fa%3D1?b=2").unwrap(),
            Some("https://example.com/?a=1&b=2".to_string())
        );
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        assert!(matches!(
            decode_target("/https%3A%2F%2Fexample.com%2F%FF"),
            Err(ProxyError::InvalidTargetUrl(_))
        ));
    }
}
