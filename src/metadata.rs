//! Status metadata and the self-contained page rendered from it.

use async_trait::async_trait;
use maud::{html, PreEscaped, DOCTYPE};

use crate::sanitizer::Sanitizer;
use crate::status::StatusReference;
use crate::ProxyError;

/// The parts of a post the renderer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetMetadata {
    /// Canonical URL of the post.
    pub url: String,
    pub author_name: String,
    pub screen_name: String,
    pub text: String,
    pub media: Option<TweetMedia>,
}

/// At most one kind of media is shown per post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TweetMedia {
    Video { url: String },
    Photos(Vec<String>),
}

/// Source of [`TweetMetadata`] for a status reference.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fails with [`ProxyError::UpstreamStatus`] when the API answers with a
    /// non-success status and [`ProxyError::MetadataSchemaMismatch`] when the
    /// payload is incomplete.
    async fn fetch_status(&self, reference: &StatusReference)
        -> Result<TweetMetadata, ProxyError>;
}

/// Renders a post as a standalone HTML document.
///
/// Author and body text go through `sanitizer`; URLs are attribute-escaped.
pub fn render_tweet(metadata: &TweetMetadata, sanitizer: &dyn Sanitizer) -> String {
    let author_name = sanitizer.sanitize(&metadata.author_name);
    let screen_name = sanitizer.sanitize(&metadata.screen_name);
    let text = sanitizer.sanitize(&metadata.text);

    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Post by @" (metadata.screen_name) }
                style { (PreEscaped(TWEET_CSS)) }
            }
            body {
                div style="font-family: system-ui, sans-serif; padding: 2rem; max-width: 800px; margin: 0 auto;" {
                    h2 { (PreEscaped(author_name)) " (@" (PreEscaped(screen_name)) ")" }
                    p style="white-space: pre-wrap;" { (PreEscaped(text)) }
                    @match &metadata.media {
                        Some(TweetMedia::Video { url }) => {
                            video controls width="100%" {
                                source src=(url) type="video/mp4";
                            }
                        }
                        Some(TweetMedia::Photos(photos)) => {
                            @for photo in photos {
                                img src=(photo) alt="Tweet Image" style="max-width: 100%;";
                            }
                        }
                        None => {}
                    }
                    p {
                        a href=(metadata.url) target="_blank" data-no-proxy { "View on Twitter" }
                    }
                }
            }
        }
    };

    markup.into_string()
}

const TWEET_CSS: &str = "html{color-scheme:dark light}body{margin:0;line-height:1.5}";
