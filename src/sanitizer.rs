//! HTML sanitization for untrusted fragments.

use ammonia::Builder;

use crate::rewriter::EXEMPT_ATTRIBUTE;

/// Makes untrusted markup safe to embed verbatim in a page.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, input: &str) -> String;
}

/// [`Sanitizer`] backed by ammonia's whitelist.
///
/// Anchors keep `target` and the proxy exemption marker so re-entry links
/// survive; scripts, styles, event handlers and unknown tags are dropped.
#[derive(Debug, Clone, Default)]
pub struct AmmoniaSanitizer;

impl AmmoniaSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for AmmoniaSanitizer {
    fn sanitize(&self, input: &str) -> String {
        let mut builder = Builder::default();
        builder.add_tag_attributes("a", &["target", EXEMPT_ATTRIBUTE]);
        builder.clean(input).to_string()
    }
}
