//! Streaming link rewriter.
//!
//! Runs a single forward pass over the tag stream with `lol_html`, so memory
//! stays proportional to the element being looked at rather than to the
//! document. Every `a[href]` and `img[src]` is resolved against the request's
//! base URL; ordinary anchors additionally get a sibling link that re-enters
//! the proxy for the resolved target.

use std::cell::RefCell;
use std::rc::Rc;

use lol_html::html_content::{ContentType, Element, EndTag, TextChunk};
use lol_html::{
    doc_comments, doc_text, element, end, text, HandlerResult, HtmlRewriter, OutputSink, Settings,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, warn};
use url::Url;

use crate::resolver::{resolve, ResolutionError};
use crate::utils::truncate_str;
use crate::ProxyError;

/// Boolean attribute marking an anchor the rewriter must leave alone.
pub const EXEMPT_ATTRIBUTE: &str = "data-no-proxy";

/// Visible text of the injected re-entry link.
pub const REENTRY_LABEL: &str = "(proxy)";

/// Skipped links kept in a [`RewriteReport`]; the rest are only counted.
const MAX_RECORDED_SKIPS: usize = 32;

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Per-request rewrite settings.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub base_url: Url,
}

impl RewriteContext {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTag {
    Anchor,
    Image,
}

impl LinkTag {
    /// The attribute holding the reference for this tag.
    pub fn attribute(self) -> &'static str {
        match self {
            LinkTag::Anchor => "href",
            LinkTag::Image => "src",
        }
    }
}

/// What the rewriter saw on one `a` or `img` start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub tag: LinkTag,
    /// Entity-decoded `href`/`src` value, if present.
    pub value: Option<String>,
    /// Only anchors can be exempt.
    pub exempt: bool,
}

impl LinkEvent {
    pub fn new(tag: LinkTag, value: Option<&str>, exempt: bool) -> Self {
        Self {
            tag,
            value: value.map(|v| html_escape::decode_html_entities(v).into_owned()),
            exempt: tag == LinkTag::Anchor && exempt,
        }
    }

    fn from_element(tag: LinkTag, el: &Element<'_, '_>) -> Self {
        let value = el.get_attribute(tag.attribute());
        Self::new(tag, value.as_deref(), el.has_attribute(EXEMPT_ATTRIBUTE))
    }
}

/// Decision taken for a single element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Exempt, or nothing to resolve.
    Unchanged,
    Rewritten(String),
    RewrittenWithInjection { value: String, injected: String },
    /// Resolution failed; the original value stays in place.
    Skipped(ResolutionError),
}

/// Decides how one element is rewritten. Pure, so it can be tested without a tokenizer.
pub fn plan(event: &LinkEvent, context: &RewriteContext) -> RewriteOutcome {
    if event.exempt {
        return RewriteOutcome::Unchanged;
    }
    let reference = match event.value.as_deref() {
        Some(value) if !value.trim().is_empty() => value,
        _ => return RewriteOutcome::Unchanged,
    };

    match resolve(reference, &context.base_url) {
        Ok(url) if event.tag == LinkTag::Anchor && is_proxyable(&url) => {
            RewriteOutcome::RewrittenWithInjection {
                injected: reentry_link(&url),
                value: url.into(),
            }
        }
        Ok(url) => RewriteOutcome::Rewritten(url.into()),
        Err(e) => RewriteOutcome::Skipped(e),
    }
}

/// Only targets the proxy can fetch get a re-entry link.
fn is_proxyable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Proxy path for `url`: `/` followed by the URI-component encoded URL.
pub fn reentry_href(url: &Url) -> String {
    encode_reentry(url.as_str())
}

fn encode_reentry(target: &str) -> String {
    format!("/{}", utf8_percent_encode(target, URI_COMPONENT))
}

/// Markup injected right after a rewritten anchor.
pub fn reentry_link(url: &Url) -> String {
    format!(
        r#"<a href="{}" {EXEMPT_ATTRIBUTE} target="_blank">{REENTRY_LABEL}</a>"#,
        reentry_href(url)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLink {
    pub tag: LinkTag,
    pub value: String,
    pub error: ResolutionError,
}

/// Counters collected over one rewrite pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub rewritten: usize,
    pub injected: usize,
    /// Stale re-entry links dropped because an identical one was just injected.
    pub deduplicated: usize,
    pub skipped_total: usize,
    pub skipped: Vec<SkippedLink>,
}

impl RewriteReport {
    fn record_skip(&mut self, tag: LinkTag, value: &str, error: ResolutionError) {
        warn!(
            tag = tag.attribute(),
            value = %truncate_str(value, 120),
            error = %error,
            "Could not resolve URL, leaving attribute unchanged"
        );
        self.skipped_total += 1;
        if self.skipped.len() < MAX_RECORDED_SKIPS {
            self.skipped.push(SkippedLink {
                tag,
                value: value.to_string(),
                error,
            });
        }
    }
}

/// Exempt anchor met right after an injected link with the same target.
/// Its tags are withheld until its text shows whether it is a stale re-entry
/// link or an author's own anchor.
struct HeldAnchor {
    id: usize,
    start_tag: String,
    text: String,
}

struct RewriteState {
    context: RewriteContext,
    /// Re-entry href injected after the last rewritten anchor. Armed at that
    /// anchor's end tag, cleared by anything other than an immediately
    /// following anchor.
    pending_reentry: Option<String>,
    held: Option<HeldAnchor>,
    next_hold_id: usize,
    report: RewriteReport,
}

impl RewriteState {
    fn on_anchor(state: &Rc<RefCell<Self>>, el: &mut Element<'_, '_>) -> HandlerResult {
        let mut this = state.borrow_mut();
        let event = LinkEvent::from_element(LinkTag::Anchor, el);
        let pending = this.pending_reentry.take();
        if let Some(markup) = this.release_held() {
            el.before(&markup, ContentType::Html);
        }

        if event.exempt {
            if pending.is_some() && event.value == pending {
                this.hold(state, el);
            }
            return Ok(());
        }

        let outcome = plan(&event, &this.context);
        match outcome {
            RewriteOutcome::Unchanged => {}
            RewriteOutcome::Rewritten(value) => {
                this.apply(el, LinkTag::Anchor, &event, &value)?;
            }
            RewriteOutcome::RewrittenWithInjection { value, injected } => {
                this.apply(el, LinkTag::Anchor, &event, &value)?;
                el.after(&injected, ContentType::Html);
                // Content placed after an element is only emitted with its
                // end tag, so the injection is counted there.
                if let Some(handlers) = el.end_tag_handlers() {
                    let handle = Rc::clone(state);
                    let reentry = encode_reentry(&value);
                    handlers.push(Box::new(move |_end| {
                        let mut state = handle.borrow_mut();
                        state.report.injected += 1;
                        state.pending_reentry = Some(reentry);
                        Ok(())
                    }));
                }
            }
            RewriteOutcome::Skipped(error) => {
                let original = event.value.as_deref().unwrap_or_default();
                this.report.record_skip(LinkTag::Anchor, original, error);
            }
        }
        Ok(())
    }

    fn on_image(&mut self, el: &mut Element<'_, '_>) -> HandlerResult {
        let event = LinkEvent::from_element(LinkTag::Image, el);
        match plan(&event, &self.context) {
            RewriteOutcome::Unchanged => {}
            RewriteOutcome::Rewritten(value)
            | RewriteOutcome::RewrittenWithInjection { value, .. } => {
                self.apply(el, LinkTag::Image, &event, &value)?;
            }
            RewriteOutcome::Skipped(error) => {
                let original = event.value.as_deref().unwrap_or_default();
                self.report.record_skip(LinkTag::Image, original, error);
            }
        }
        Ok(())
    }

    /// Any element other than an anchor.
    fn on_other_element(&mut self, el: &mut Element<'_, '_>) {
        if el.tag_name().eq_ignore_ascii_case("a") {
            return;
        }
        if let Some(markup) = self.interrupt() {
            el.before(&markup, ContentType::Html);
        }
    }

    fn on_text(&mut self, chunk: &TextChunk<'_>) {
        if !chunk.as_str().is_empty() {
            self.pending_reentry = None;
        }
    }

    /// Text inside an anchor: withheld while the anchor is held.
    fn on_anchor_text(&mut self, chunk: &mut TextChunk<'_>) {
        if let Some(held) = self.held.as_mut() {
            held.text.push_str(chunk.as_str());
            chunk.remove();
        }
    }

    /// Something other than text interrupts the stream. Returns the markup of
    /// a held anchor that must be emitted before the current token.
    fn interrupt(&mut self) -> Option<String> {
        self.pending_reentry = None;
        self.release_held()
    }

    fn release_held(&mut self) -> Option<String> {
        self.held
            .take()
            .map(|held| format!("{}{}", held.start_tag, held.text))
    }

    fn hold(&mut self, state: &Rc<RefCell<Self>>, el: &mut Element<'_, '_>) {
        let id = self.next_hold_id;
        let start_tag = start_tag_markup(el);
        let Some(handlers) = el.end_tag_handlers() else {
            return;
        };
        let handle = Rc::clone(state);
        handlers.push(Box::new(move |end| {
            handle.borrow_mut().settle_held(id, end);
            Ok(())
        }));

        el.remove_and_keep_content();
        self.next_hold_id += 1;
        self.held = Some(HeldAnchor {
            id,
            start_tag,
            text: String::new(),
        });
    }

    /// End tag of a held anchor: a stale re-entry link is dropped, anything
    /// else is restored as it was.
    fn settle_held(&mut self, id: usize, end: &mut EndTag<'_>) {
        match self.held.take() {
            Some(held) if held.id == id => {
                if held.text == REENTRY_LABEL {
                    self.report.deduplicated += 1;
                } else {
                    end.after(
                        &format!("{}{}</a>", held.start_tag, held.text),
                        ContentType::Html,
                    );
                }
            }
            other => {
                // Released early; its start tag and content are already out.
                self.held = other;
                end.after("</a>", ContentType::Html);
            }
        }
    }

    /// Writes `value` back unless the attribute already holds it, which keeps
    /// already-absolute markup byte-identical.
    fn apply(
        &mut self,
        el: &mut Element<'_, '_>,
        tag: LinkTag,
        event: &LinkEvent,
        value: &str,
    ) -> HandlerResult {
        if event.value.as_deref() == Some(value) {
            return Ok(());
        }
        let escaped = html_escape::encode_double_quoted_attribute(value);
        el.set_attribute(tag.attribute(), &escaped)?;
        self.report.rewritten += 1;
        Ok(())
    }
}

/// Serializes a start tag from its raw attribute values.
fn start_tag_markup(el: &Element<'_, '_>) -> String {
    let mut markup = format!("<{}", el.tag_name());
    for attribute in el.attributes() {
        let name = attribute.name_preserve_case();
        let value = attribute.value();
        if value.is_empty() {
            markup.push_str(&format!(" {name}"));
        } else {
            markup.push_str(&format!(r#" {name}="{}""#, value.replace('"', "&quot;")));
        }
    }
    markup.push('>');
    markup
}

/// Incremental rewriter: feed chunks with [`LinkRewriter::write`] as they
/// arrive, output is pushed to the sink as soon as it is final.
pub struct LinkRewriter<O: OutputSink> {
    inner: HtmlRewriter<'static, O>,
    state: Rc<RefCell<RewriteState>>,
}

impl<O: OutputSink> LinkRewriter<O> {
    pub fn new(context: RewriteContext, sink: O) -> Self {
        let state = Rc::new(RefCell::new(RewriteState {
            context,
            pending_reentry: None,
            held: None,
            next_hold_id: 0,
            report: RewriteReport::default(),
        }));
        let anchors = Rc::clone(&state);
        let anchor_text = Rc::clone(&state);
        let images = Rc::clone(&state);
        let elements = Rc::clone(&state);
        let texts = Rc::clone(&state);
        let comments = Rc::clone(&state);
        let document_end = Rc::clone(&state);

        let inner = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("a", move |el| RewriteState::on_anchor(&anchors, el)),
                    text!("a", move |t| {
                        anchor_text.borrow_mut().on_anchor_text(t);
                        Ok(())
                    }),
                    element!("img", move |el| images.borrow_mut().on_image(el)),
                    element!("*", move |el| {
                        elements.borrow_mut().on_other_element(el);
                        Ok(())
                    }),
                ],
                document_content_handlers: vec![
                    doc_text!(move |t| {
                        texts.borrow_mut().on_text(t);
                        Ok(())
                    }),
                    doc_comments!(move |c| {
                        if let Some(markup) = comments.borrow_mut().interrupt() {
                            c.before(&markup, ContentType::Html);
                        }
                        Ok(())
                    }),
                    end!(move |end| {
                        if let Some(markup) = document_end.borrow_mut().interrupt() {
                            end.append(&markup, ContentType::Html);
                        }
                        Ok(())
                    }),
                ],
                // Adversarial markup must never abort the pass.
                strict: false,
                ..Settings::default()
            },
            sink,
        );

        Self { inner, state }
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<(), ProxyError> {
        self.inner
            .write(chunk)
            .map_err(|e| ProxyError::RewriteFailed(e.to_string()))
    }

    /// Flushes the remaining output. `injected` in the report counts links
    /// actually emitted, which excludes anchors never closed by an end tag.
    pub fn end(self) -> Result<RewriteReport, ProxyError> {
        self.inner
            .end()
            .map_err(|e| ProxyError::RewriteFailed(e.to_string()))?;
        let report = std::mem::take(&mut self.state.borrow_mut().report);
        debug!(
            rewritten = report.rewritten,
            injected = report.injected,
            deduplicated = report.deduplicated,
            skipped = report.skipped_total,
            "Link rewrite finished"
        );
        Ok(report)
    }
}

/// Output of [`rewrite_html`].
#[derive(Debug, Clone)]
pub struct RewrittenHtml {
    pub html: String,
    pub report: RewriteReport,
}

/// Rewrites a whole document held in memory.
pub fn rewrite_html(html: &str, context: &RewriteContext) -> Result<RewrittenHtml, ProxyError> {
    let mut output = Vec::with_capacity(html.len() + html.len() / 8);
    let mut rewriter = LinkRewriter::new(context.clone(), |chunk: &[u8]| {
        output.extend_from_slice(chunk)
    });
    rewriter.write(html.as_bytes())?;
    let report = rewriter.end()?;

    let html = String::from_utf8(output).map_err(|e| ProxyError::RewriteFailed(e.to_string()))?;
    Ok(RewrittenHtml { html, report })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(base: &str) -> RewriteContext {
        RewriteContext::new(Url::parse(base).unwrap())
    }

    #[test]
    fn reentry_href_matches_uri_component_encoding() {
        let url = Url::parse("https://example.com/a b?x=1&y=(ok)!").unwrap();
        assert_eq!(
            reentry_href(&url),
            "/https%3A%2F%2Fexample.com%2Fa%2520b%3Fx%3D1%26y%3D(ok)!"
        );
    }

    #[test]
    fn plan_injects_only_for_anchors() {
        let ctx = context("https://example.com/dir/");
        let anchor = LinkEvent::new(LinkTag::Anchor, Some("/page"), false);
        let image = LinkEvent::new(LinkTag::Image, Some("pic.png"), false);

        match plan(&anchor, &ctx) {
            RewriteOutcome::RewrittenWithInjection { value, injected } => {
                assert_eq!(value, "https://example.com/page");
                assert!(injected.contains(EXEMPT_ATTRIBUTE));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            plan(&image, &ctx),
            RewriteOutcome::Rewritten("https://example.com/dir/pic.png".to_string())
        );
    }

    #[test]
    fn plan_leaves_exempt_and_empty_links() {
        let ctx = context("https://example.com/");
        let exempt = LinkEvent::new(LinkTag::Anchor, Some("http://[::1"), true);
        let missing = LinkEvent::new(LinkTag::Anchor, None, false);
        let blank = LinkEvent::new(LinkTag::Image, Some("  "), false);

        assert_eq!(plan(&exempt, &ctx), RewriteOutcome::Unchanged);
        assert_eq!(plan(&missing, &ctx), RewriteOutcome::Unchanged);
        assert_eq!(plan(&blank, &ctx), RewriteOutcome::Unchanged);
    }

    #[test]
    fn exemption_is_ignored_on_images() {
        let event = LinkEvent::new(LinkTag::Image, Some("a.png"), true);
        assert!(!event.exempt);
    }

    #[test]
    fn plan_skips_unresolvable_references() {
        let ctx = context("https://example.com/");
        let event = LinkEvent::new(LinkTag::Anchor, Some("http://[::1"), false);
        assert!(matches!(plan(&event, &ctx), RewriteOutcome::Skipped(_)));
    }

    #[test]
    fn non_http_targets_are_rewritten_without_reentry() {
        let ctx = context("https://example.com/");
        let event = LinkEvent::new(LinkTag::Anchor, Some("mailto:me@example.com"), false);
        assert_eq!(
            plan(&event, &ctx),
            RewriteOutcome::Rewritten("mailto:me@example.com".to_string())
        );
    }

    #[test]
    fn attribute_entities_are_decoded_before_resolution() {
        let event = LinkEvent::new(LinkTag::Anchor, Some("?a=1&amp;b=2"), false);
        assert_eq!(event.value.as_deref(), Some("?a=1&b=2"));
    }
}
