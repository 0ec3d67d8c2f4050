use reader_proxy::{rewrite_html, LinkRewriter, RewriteContext, REENTRY_LABEL};
use url::Url;

fn context(base: &str) -> RewriteContext {
    RewriteContext::new(Url::parse(base).unwrap())
}

#[test]
fn test_relative_anchor_gets_absolute_href_and_reentry_link() {
    let output = rewrite_html(
        r#"<a href="/page">text</a>"#,
        &context("https://example.com/dir/"),
    )
    .unwrap();

    assert_eq!(
        output.html,
        r#"<a href="https://example.com/page">text</a><a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy target="_blank">(proxy)</a>"#
    );
    assert_eq!(output.report.rewritten, 1);
    assert_eq!(output.report.injected, 1);
}

#[test]
fn test_rewrite_is_idempotent() {
    let ctx = context("https://example.com/dir/");
    let input = r##"<html><body>
        <p><a href="../up">up</a> and <a href="https://other.org/x?a=1&amp;b=2">other</a></p>
        <img src="img/a.png" alt="">
        <a href="#top">top</a>
    </body></html>"##;

    let first = rewrite_html(input, &ctx).unwrap();
    let second = rewrite_html(&first.html, &ctx).unwrap();

    assert_eq!(first.html, second.html);
    assert_eq!(second.report.rewritten, 0);
    assert_eq!(second.report.deduplicated, first.report.injected);
}

#[test]
fn test_exempt_anchor_never_gets_a_sibling() {
    let ctx = context("https://example.com/");
    let input = r#"<a href="relative" data-no-proxy>keep</a><a href="::bad::" data-no-proxy>odd</a>"#;

    let output = rewrite_html(input, &ctx).unwrap();

    assert_eq!(output.html, input);
    assert_eq!(output.report.injected, 0);
}

#[test]
fn test_author_anchor_after_other_content_is_kept() {
    let ctx = context("https://example.com/dir/");
    let input = r#"<a href="/page">t</a><p>see also</p><a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy>Mirror copy</a>"#;

    let output = rewrite_html(input, &ctx).unwrap();

    assert!(output.html.ends_with(
        r#"<p>see also</p><a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy>Mirror copy</a>"#
    ));
    assert_eq!(output.report.deduplicated, 0);
}

#[test]
fn test_adjacent_author_anchor_with_other_text_is_kept() {
    let ctx = context("https://example.com/dir/");
    let input = r#"<a href="/page">t</a><a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy>Mirror <b>copy</b></a> <a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy>Mirror</a>"#;

    let output = rewrite_html(input, &ctx).unwrap();

    assert_eq!(
        output.html,
        r#"<a href="https://example.com/page">t</a><a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy target="_blank">(proxy)</a><a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy>Mirror <b>copy</b></a> <a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy>Mirror</a>"#
    );
    assert_eq!(output.report.deduplicated, 0);
}

#[test]
fn test_adjacent_plain_text_anchor_is_restored() {
    let ctx = context("https://example.com/dir/");
    let input = r#"<a href="/page">t</a><a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy>Mirror copy</a>"#;

    let output = rewrite_html(input, &ctx).unwrap();

    assert!(output.html.ends_with(
        r#"(proxy)</a><a href="/https%3A%2F%2Fexample.com%2Fpage" data-no-proxy>Mirror copy</a>"#
    ));
    assert_eq!(output.report.deduplicated, 0);
}

#[test]
fn test_injection_count_matches_emitted_links() {
    let ctx = context("https://example.com/");
    let output = rewrite_html(r#"<a href="a">one<a href="b">two</a>"#, &ctx).unwrap();

    assert_eq!(output.report.rewritten, 2);
    assert_eq!(output.html.matches(REENTRY_LABEL).count(), output.report.injected);
    assert_eq!(output.report.injected, 1);
}

#[test]
fn test_malformed_href_passes_through_and_later_links_still_rewrite() {
    let ctx = context("https://example.com/base/");
    let input = r#"<a href="http://[::1">broken</a><img src="pic.png"><a href="next">next</a>"#;

    let output = rewrite_html(input, &ctx).unwrap();

    assert!(output.html.starts_with(r#"<a href="http://[::1">broken</a><img src="https://example.com/base/pic.png">"#));
    assert!(output.html.contains(r#"<a href="https://example.com/base/next">next</a>"#));
    assert_eq!(output.report.skipped_total, 1);
    assert_eq!(output.report.skipped[0].value, "http://[::1");
    assert_eq!(output.report.injected, 1);
}

#[test]
fn test_images_are_resolved_without_injection() {
    let ctx = context("https://cdn.example.com/a/b/");
    let output = rewrite_html(r#"<img src="//static.example.com/x.png"><img src="../y.png">"#, &ctx).unwrap();

    assert_eq!(
        output.html,
        r#"<img src="https://static.example.com/x.png"><img src="https://cdn.example.com/a/y.png">"#
    );
    assert_eq!(output.report.injected, 0);
}

#[test]
fn test_query_ampersands_stay_escaped() {
    let ctx = context("https://example.com/");
    let output = rewrite_html(r#"<a href="/s?q=1&amp;page=2">s</a>"#, &ctx).unwrap();

    assert!(output
        .html
        .starts_with(r#"<a href="https://example.com/s?q=1&amp;page=2">s</a>"#));
    assert!(output
        .html
        .contains("/https%3A%2F%2Fexample.com%2Fs%3Fq%3D1%26page%3D2"));
}

#[test]
fn test_non_http_schemes_get_no_reentry_link() {
    let ctx = context("https://example.com/");
    let input = r#"<a href="mailto:me@example.com">mail</a>"#;

    let output = rewrite_html(input, &ctx).unwrap();

    assert_eq!(output.html, input);
    assert_eq!(output.report.injected, 0);
}

#[test]
fn test_chunked_input_matches_whole_document() {
    let ctx = context("https://example.com/docs/");
    let input = r#"<!doctype html><html><head><title>Ünïcode ✓</title></head><body>
        <a class="nav" href="intro.html">Intro</a>
        <img src='figures/one.svg'>
        <a href="https://example.com/docs/guide">Guide</a>
    </body></html>"#;

    let whole = rewrite_html(input, &ctx).unwrap();

    for chunk_size in [1, 3, 7, 64] {
        let mut output = Vec::new();
        let report = {
            let mut rewriter =
                LinkRewriter::new(ctx.clone(), |chunk: &[u8]| output.extend_from_slice(chunk));
            for chunk in input.as_bytes().chunks(chunk_size) {
                rewriter.write(chunk).unwrap();
            }
            rewriter.end().unwrap()
        };

        assert_eq!(String::from_utf8(output).unwrap(), whole.html, "chunk size {chunk_size}");
        assert_eq!(report, whole.report);
    }
}
