//! Entry form and the reader-mode page shell.

use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::extractor::Article;

pub const EMPTY_CONTENT_NOTICE: &str = "No content could be extracted";
const FALLBACK_TITLE: &str = "Extracted Content";

const BASE_CSS: &str = "\
html{color-scheme:dark light}\
body{font-family:system-ui,sans-serif;max-width:800px;margin:0 auto;padding:2rem;line-height:1.6}\
img{max-width:100%;height:auto}\
a[data-no-proxy]{margin-left:.5em;font-size:.8em}";

const FORM_CSS: &str = "\
form{display:flex;gap:1rem;margin-bottom:2rem}\
input{flex:1;padding:.5rem}\
button{padding:.5rem 1rem}";

const ARTICLE_CSS: &str = "\
.source{margin-bottom:2rem;color:#555;border:1px solid #ccc;padding:1rem}\
@media (prefers-color-scheme:dark){.source{background-color:#111;color:#ddd;border-color:#333}}\
h1{margin-bottom:1.5rem}";

/// Navigates to `/<url>` without submitting the form.
const FORM_SUBMIT_JS: &str = "event.preventDefault(); \
    window.location.href = '/' + encodeURIComponent(document.getElementById('url').value);";

/// Page served for the empty target.
pub fn entry_form() -> String {
    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            (head("Reader Proxy", FORM_CSS))
            body {
                h1 { "Reader Proxy" }
                form action="/" method="get" onsubmit=(FORM_SUBMIT_JS) {
                    input id="url" type="url" placeholder="Enter URL to extract (e.g. https://example.com)" required;
                    button type="submit" { "Extract" }
                }
                p { "Enter a URL in the input field above to extract its main content." }
            }
        }
    };
    markup.into_string()
}

/// Wraps extracted (already sanitized) content in the reader shell.
///
/// `source` is the URL the user asked for; it is shown and linked escaped.
pub fn article_page(source: &str, article: &Article) -> String {
    let title = article.title.as_deref().unwrap_or(FALLBACK_TITLE);

    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            (head(title, ARTICLE_CSS))
            body {
                div class="source" {
                    "Source: "
                    a href=(source) target="_blank" data-no-proxy { (source) }
                    br;
                    a href="/" data-no-proxy { "← Back to form" }
                }
                h1 { (title) }
                div class="content" {
                    @match &article.content {
                        Some(content) => { (PreEscaped(content)) }
                        None => { (EMPTY_CONTENT_NOTICE) }
                    }
                }
            }
        }
    };
    markup.into_string()
}

fn head(title: &str, page_css: &str) -> Markup {
    html! {
        head {
            meta charset="UTF-8";
            meta name="viewport" content="width=device-width, initial-scale=1";
            title { (title) }
            style { (PreEscaped(BASE_CSS)) (PreEscaped(page_css)) }
        }
    }
}
