//! Reader-mode proxy.
//!
//! A page requested as `/<percent-encoded URL>` is fetched, every anchor and
//! image reference is made absolute, each followable anchor gains a sibling
//! link that re-enters the proxy, and the main content is extracted into a
//! clean page. Status posts on x.com/twitter.com are rendered from the
//! FxTwitter API instead.

mod config;
mod error;
mod extractor;
mod fetcher;
mod fxtwitter_types;
mod logging;
mod metadata;
mod proxy_service;
mod resolver;
mod rewriter;
mod sanitizer;
mod security;
mod server;
mod status;
mod template;
mod utils;

pub use config::Config;
pub use error::ProxyError;
pub use extractor::{Article, Extractor, ReadabilityExtractor};
pub use fetcher::{
    FetchedPage, Fetcher, FetcherConfig, FxTwitterClient, DEFAULT_METADATA_API,
    DEFAULT_USER_AGENT, METADATA_USER_AGENT,
};
pub use fxtwitter_types::FxTwitterResponse;
pub use logging::{setup_logging, LogConfig};
pub use metadata::{render_tweet, MetadataProvider, TweetMedia, TweetMetadata};
pub use proxy_service::{
    decode_target, Branch, PageKind, ProxyPage, ProxyService, ProxyServiceConfig,
    MAX_CONCURRENT_REQUESTS,
};
pub use resolver::{resolve, resolve_against, ResolutionError};
pub use rewriter::{
    plan, reentry_href, reentry_link, rewrite_html, LinkEvent, LinkRewriter, LinkTag, RewriteContext,
    RewriteOutcome, RewriteReport, RewrittenHtml, SkippedLink, EXEMPT_ATTRIBUTE, REENTRY_LABEL,
};
pub use sanitizer::{AmmoniaSanitizer, Sanitizer};
pub use security::{TargetPolicy, TargetPolicyConfig};
pub use server::router;
pub use status::{detect, detect_path, is_twitter_url, StatusReference};
pub use template::{article_page, entry_form, EMPTY_CONTENT_NOTICE};
pub use utils::truncate_str;
