use std::collections::HashMap;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::ProxyError;

/// Title and main content of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub title: Option<String>,
    /// HTML fragment of the main content.
    pub content: Option<String>,
}

/// Readability capability: turns a whole document into an [`Article`].
///
/// Implementations must tolerate malformed markup and return an empty
/// article rather than an error when nothing useful is found.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, url: &Url) -> Result<Article, ProxyError>;
}

/// Content containers tried in order before falling back to scoring.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".content",
    "#content",
    ".post",
    ".article",
];

const MIN_CONTENT_LEN: usize = 100;
const MIN_PARAGRAPH_LEN: usize = 25;

/// Readability-style extractor built on scraper.
#[derive(Debug, Clone, Default)]
pub struct ReadabilityExtractor;

impl ReadabilityExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        let og_title_selector = Selector::parse("meta[property='og:title']").ok()?;
        let title_selector = Selector::parse("title").ok()?;
        let h1_selector = Selector::parse("h1").ok()?;

        let og_title = document
            .select(&og_title_selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.to_string());

        og_title
            .or_else(|| {
                document
                    .select(&title_selector)
                    .next()
                    .map(|el| el.text().collect::<String>())
            })
            .or_else(|| {
                document
                    .select(&h1_selector)
                    .next()
                    .map(|el| el.text().collect::<String>())
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn find_main_content<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        for selector_str in CONTENT_SELECTORS {
            if let Ok(selector) = Selector::parse(selector_str) {
                if let Some(element) = document
                    .select(&selector)
                    .find(|el| text_len(el) > MIN_CONTENT_LEN)
                {
                    debug!("Found content using selector: {}", selector_str);
                    return Some(element);
                }
            }
        }

        self.highest_scoring(document)
    }

    /// Credits each substantial paragraph's length to its parent and, halved,
    /// to its grandparent; the best-scored container wins.
    fn highest_scoring<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let p_selector = Selector::parse("p").ok()?;
        let mut scores = HashMap::new();

        for paragraph in document.select(&p_selector) {
            let len = text_len(&paragraph);
            if len < MIN_PARAGRAPH_LEN {
                continue;
            }
            let commas = paragraph.text().map(|t| t.matches(',').count()).sum::<usize>();
            let score = 1.0 + commas as f64 + (len as f64 / 100.0).min(3.0);

            let containers = paragraph
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take(2)
                .enumerate();
            for (depth, container) in containers {
                if is_boilerplate(&container) {
                    break;
                }
                *scores.entry(container.id()).or_insert(0.0) += score / (depth + 1) as f64;
            }
        }

        scores
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .and_then(|(id, _)| document.tree.get(id))
            .and_then(ElementRef::wrap)
    }
}

impl Extractor for ReadabilityExtractor {
    fn extract(&self, html: &str, url: &Url) -> Result<Article, ProxyError> {
        let document = Html::parse_document(html);
        let body_selector = Selector::parse("body")
            .map_err(|e| ProxyError::ExtractionFailed(format!("Invalid selector: {e}")))?;

        let title = self.extract_title(&document);
        let content = self
            .find_main_content(&document)
            .or_else(|| document.select(&body_selector).next())
            .filter(|el| text_len(el) > 0 || has_media(el))
            .map(|el| el.inner_html().trim().to_string())
            .filter(|s| !s.is_empty());

        debug!(
            url = %url,
            title = ?title,
            content_length = content.as_ref().map_or(0, String::len),
            "Extracted article"
        );
        Ok(Article { title, content })
    }
}

fn text_len(element: &ElementRef<'_>) -> usize {
    element.text().collect::<String>().trim().len()
}

fn has_media(element: &ElementRef<'_>) -> bool {
    Selector::parse("img, video, picture")
        .map(|selector| element.select(&selector).next().is_some())
        .unwrap_or(false)
}

fn is_boilerplate(element: &ElementRef<'_>) -> bool {
    let tag = element.value().name();
    if matches!(tag, "nav" | "header" | "footer" | "aside") {
        return true;
    }
    let class_and_id = format!(
        "{} {}",
        element.value().attr("class").unwrap_or_default(),
        element.value().id().unwrap_or_default()
    )
    .to_lowercase();
    ["sidebar", "comment", "footer", "menu", "navbar"]
        .iter()
        .any(|marker| class_and_id.contains(marker))
}
