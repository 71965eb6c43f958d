//! Best-effort DOI meta-tag scraping for arbitrary article URLs.
//!
//! Publisher landing pages commonly carry the DOI in a `citation_doi` or
//! `DC.Identifier` meta tag. This is a single short-timeout GET; any
//! failure is reported to the caller, which treats it as non-fatal.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::trace;

use super::find_doi;

/// Meta tags that carry a DOI, in the order publishers tend to use them.
/// Attribute order varies (`name` before `content` and vice versa), so
/// both orderings are matched.
#[allow(clippy::expect_used)]
static META_TAG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(
            r#"(?i)<meta[^>]+name=["'](?:citation_doi|dc\.identifier)["'][^>]+content=["']([^"']+)["']"#,
        )
        .expect("meta tag regex is valid"),
        Regex::new(
            r#"(?i)<meta[^>]+content=["']([^"']+)["'][^>]+name=["'](?:citation_doi|dc\.identifier)["']"#,
        )
        .expect("meta tag regex is valid"),
    ]
});

/// Fetches the page and extracts a DOI from its meta tags, if present.
///
/// # Errors
///
/// Returns the underlying `reqwest` error on network failure or non-2xx
/// status; the caller downgrades this to opaque-URL classification.
pub(super) async fn scrape_doi_meta_tag(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Option<String>, reqwest::Error> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;
    let html = response.text().await?;
    Ok(doi_from_html(&html))
}

/// Scans HTML for a DOI-bearing meta tag.
fn doi_from_html(html: &str) -> Option<String> {
    for pattern in META_TAG_PATTERNS.iter() {
        for cap in pattern.captures_iter(html) {
            let content = &cap[1];
            trace!(content = %content, "meta tag candidate");
            if let Some(doi) = find_doi(content) {
                return Some(doi);
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_doi_from_html_citation_doi() {
        let html = r#"<html><head>
            <meta name="citation_doi" content="10.1038/nature12345">
        </head></html>"#;
        assert_eq!(doi_from_html(html).as_deref(), Some("10.1038/nature12345"));
    }

    #[test]
    fn test_doi_from_html_dc_identifier() {
        let html = r#"<meta name="DC.Identifier" content="doi:10.1016/j.cell.2024.01.001">"#;
        assert_eq!(
            doi_from_html(html).as_deref(),
            Some("10.1016/j.cell.2024.01.001")
        );
    }

    #[test]
    fn test_doi_from_html_reversed_attribute_order() {
        let html = r#"<meta content="10.1234/example" name="citation_doi">"#;
        assert_eq!(doi_from_html(html).as_deref(), Some("10.1234/example"));
    }

    #[test]
    fn test_doi_from_html_no_meta_tag() {
        let html = "<html><body>just an article</body></html>";
        assert_eq!(doi_from_html(html), None);
    }

    #[test]
    fn test_doi_from_html_meta_without_doi_content() {
        let html = r#"<meta name="citation_doi" content="not-a-doi">"#;
        assert_eq!(doi_from_html(html), None);
    }
}
