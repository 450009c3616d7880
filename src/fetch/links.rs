//! Outbound link extraction from HTML documents.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

/// Elements and the attribute holding their target.
const LINK_SOURCES: [(&str, &str); 5] = [
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("img[src]", "src"),
    ("script[src]", "src"),
    ("iframe[src]", "src"),
];

#[allow(clippy::expect_used)]
static SELECTORS: LazyLock<Vec<(Selector, &'static str)>> = LazyLock::new(|| {
    LINK_SOURCES
        .iter()
        .map(|(css, attr)| {
            (
                Selector::parse(css).expect("link selector is valid"), // Static selector, safe to panic
                *attr,
            )
        })
        .collect()
});

/// Extracts link targets from `html`, resolved against `base`.
///
/// Fragment-only references are dropped and fragments are stripped from the
/// rest. Output keeps document order and may contain duplicates; dedup is the
/// crawler's job.
#[must_use]
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for (selector, attr) in SELECTORS.iter() {
        for element in document.select(selector) {
            let Some(raw) = element.value().attr(attr) else {
                continue;
            };
            if let Some(resolved) = resolve(base, raw) {
                links.push(resolved);
            }
        }
    }

    links
}

/// Resolves an href against the page URL, or `None` when it is unusable.
#[must_use]
pub fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);
    Some(resolved.into())
}
