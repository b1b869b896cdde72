//! HTML link extraction for category crawls
//!
//! This module turns a loaded category page into the links it points at:
//! - every anchor resolved against the page URL (`external`)
//! - the subset on the crawled site without a fragment (`internal`)

use crate::url::matches_site;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Extracts anchor links from a page, split into internal and external sets
///
/// # Link Rules
///
/// **Skipped entirely:**
/// - `javascript:`, `mailto:`, `tel:` and `data:` hrefs
/// - `<a href="..." download>`
/// - fragment-only hrefs and anything that does not resolve to http(s)
///
/// **Internal:** host belongs to `domain` and the resolved URL has no `#`.
///
/// **External:** every link that was not skipped, internal ones included.
///
/// # Example
///
/// ```
/// use ladle::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/lasagna/">Lasagna</a><a href="https://pinterest.com/x">Pin</a>"#;
/// let page = Url::parse("https://therecipecritic.com/category/dinner/").unwrap();
/// let (internal, external) = extract_links(html, &page, "therecipecritic.com");
/// assert_eq!(internal.len(), 1);
/// assert_eq!(external.len(), 2);
/// ```
pub fn extract_links(
    html: &str,
    page_url: &Url,
    domain: &str,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let document = Html::parse_document(html);
    let mut internal = BTreeSet::new();
    let mut external = BTreeSet::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return (internal, external);
    };

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_link(href, page_url) else {
            continue;
        };

        let on_site = resolved
            .host_str()
            .map(|host| matches_site(domain, host))
            .unwrap_or(false);
        let link = resolved.to_string();
        if on_site && resolved.fragment().is_none() {
            internal.insert(link.clone());
        }
        external.insert(link);
    }

    (internal, external)
}

/// Returns true if the page says the category has no further pages
pub fn no_more_pages(html: &str, marker: &str) -> bool {
    !marker.is_empty() && html.contains(marker)
}

fn resolve_link(href: &str, page_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = page_url.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute)
    } else {
        None
    }
}
