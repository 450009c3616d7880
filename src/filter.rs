//! Admission filter for discovered links.
//!
//! A link is admitted to the frontier only if:
//! 1. its path does not end in a blacklisted non-HTML extension, and
//! 2. the [`FilterRule`] for its root (or the `*` rule) does not disallow it
//!    and does allow it.
//!
//! When rules exist but a link matches neither list it is rejected. With no
//! rules configured at all, everything that passes the extension check is
//! admitted.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::link::NormalizedUrl;

/// Root key for the default rule set.
pub const WILDCARD: &str = "*";

/// Paths ending in these extensions are never worth fetching as pages.
#[allow(clippy::expect_used)]
static BLOCKED_EXTENSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\.(png|jpg|jpeg|gif|ico|eps|pdf|iso|mp3|mp4|zip|aif|mpa|wav|wma|7z|deb|pkg|rar|rpm|bin|dmg|dat|tar|exe|ps|psd|svg|tif|tiff|pps|ppt|pptx|xls|xlsx|wmv|doc|docx|txt|mov|mpl)$",
    )
    .expect("extension regex is valid") // Static pattern, safe to panic
});

/// Errors building filter rules.
#[derive(Debug, Error)]
pub enum FilterError {
    /// An allow/disallow pattern is not a valid regex.
    #[error("invalid filter pattern {pattern:?} for {root}: {source}")]
    InvalidPattern {
        /// Root the rule was declared for.
        root: String,
        /// The offending pattern.
        pattern: String,
        /// Regex compile error.
        #[source]
        source: regex::Error,
    },
}

/// Allow/disallow patterns for one root, matched against the full URL.
#[derive(Debug, Clone)]
pub struct FilterRule {
    root: String,
    allow: Vec<Regex>,
    disallow: Vec<Regex>,
}

impl FilterRule {
    /// Compiles a rule from pattern strings.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidPattern`] for the first pattern that fails
    /// to compile.
    pub fn new<S: AsRef<str>>(
        root: impl Into<String>,
        allow: &[S],
        disallow: &[S],
    ) -> Result<Self, FilterError> {
        let root = root.into();
        let allow = compile_patterns(&root, allow)?;
        let disallow = compile_patterns(&root, disallow)?;
        Ok(Self {
            root,
            allow,
            disallow,
        })
    }

    /// Root this rule applies to (`*` for the default rule).
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Adds an allow pattern.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidPattern`] if the pattern does not compile.
    pub fn push_allow(&mut self, pattern: &str) -> Result<(), FilterError> {
        self.allow.push(compile(&self.root, pattern)?);
        Ok(())
    }

    /// Adds a disallow pattern.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidPattern`] if the pattern does not compile.
    pub fn push_disallow(&mut self, pattern: &str) -> Result<(), FilterError> {
        self.disallow.push(compile(&self.root, pattern)?);
        Ok(())
    }

    fn decide(&self, link: &str) -> bool {
        if self.disallow.iter().any(|p| p.is_match(link)) {
            return false;
        }
        self.allow.iter().any(|p| p.is_match(link))
    }
}

fn compile_patterns<S: AsRef<str>>(root: &str, patterns: &[S]) -> Result<Vec<Regex>, FilterError> {
    patterns.iter().map(|p| compile(root, p.as_ref())).collect()
}

fn compile(root: &str, pattern: &str) -> Result<Regex, FilterError> {
    Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
        root: root.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

/// Read-only rule table consulted for every candidate link.
#[derive(Debug, Clone, Default)]
pub struct AdmissionFilter {
    rules: HashMap<String, FilterRule>,
}

impl AdmissionFilter {
    /// Creates a filter from rules. A later rule for the same root replaces an
    /// earlier one.
    #[must_use]
    pub fn new(rules: impl IntoIterator<Item = FilterRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| (rule.root.clone(), rule))
            .collect();
        Self { rules }
    }

    /// Returns whether any rules are configured.
    #[must_use]
    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Decides whether `link` may enter the frontier.
    #[must_use]
    pub fn allow(&self, link: &NormalizedUrl) -> bool {
        if has_blocked_extension(link) {
            debug!(link = %link, "blocked file extension");
            return false;
        }

        let Some(rule) = self
            .rules
            .get(link.root())
            .or_else(|| self.rules.get(WILDCARD))
        else {
            return true;
        };

        rule.decide(link.as_str())
    }
}

fn has_blocked_extension(link: &NormalizedUrl) -> bool {
    BLOCKED_EXTENSIONS.is_match(link.url().path())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::link::normalize;

    fn url(raw: &str) -> NormalizedUrl {
        normalize(raw).unwrap()
    }

    #[test]
    fn test_no_rules_allows_html_pages() {
        let filter = AdmissionFilter::default();
        assert!(!filter.has_rules());
        assert!(filter.allow(&url("https://example.com/about")));
        assert!(filter.allow(&url("https://example.com/index.html")));
    }

    #[test]
    fn test_blocked_extensions_rejected_without_rules() {
        let filter = AdmissionFilter::default();
        for raw in [
            "https://example.com/logo.png",
            "https://example.com/files/archive.ZIP",
            "https://example.com/report.pdf",
            "https://example.com/slides.pptx",
        ] {
            assert!(!filter.allow(&url(raw)), "{raw} should be blocked");
        }
    }

    #[test]
    fn test_extension_checked_on_path_not_query() {
        let filter = AdmissionFilter::default();
        assert!(filter.allow(&url("https://example.com/view?file=a.pdf")));
    }

    #[test]
    fn test_disallow_beats_allow() {
        let rule = FilterRule::new("example.com", &[".*"], &["/private/"]).unwrap();
        let filter = AdmissionFilter::new([rule]);
        assert!(filter.allow(&url("https://example.com/public/page")));
        assert!(!filter.allow(&url("https://example.com/private/page")));
    }

    #[test]
    fn test_rule_without_match_defaults_to_deny() {
        let rule = FilterRule::new("example.com", &["/blog/"], &[]).unwrap();
        let filter = AdmissionFilter::new([rule]);
        assert!(filter.allow(&url("https://example.com/blog/post")));
        assert!(!filter.allow(&url("https://example.com/shop/item")));
    }

    #[test]
    fn test_disallow_pdf_rejected_even_without_allow() {
        let rule = FilterRule::new("example.com", &[] as &[&str], &[r".*\.pdf$"]).unwrap();
        let filter = AdmissionFilter::new([rule]);
        assert!(!filter.allow(&url("http://example.com/report.pdf")));
    }

    #[test]
    fn test_wildcard_rule_used_for_unknown_root() {
        let wildcard = FilterRule::new(WILDCARD, &["/docs/"], &[]).unwrap();
        let specific = FilterRule::new("example.com", &[".*"], &[]).unwrap();
        let filter = AdmissionFilter::new([wildcard, specific]);

        assert!(filter.allow(&url("https://example.com/anything")));
        assert!(filter.allow(&url("https://other.org/docs/intro")));
        assert!(!filter.allow(&url("https://other.org/blog")));
    }

    #[test]
    fn test_rules_for_other_roots_allow_by_default_without_wildcard() {
        let rule = FilterRule::new("example.com", &["/only/"], &[]).unwrap();
        let filter = AdmissionFilter::new([rule]);
        assert!(filter.allow(&url("https://other.org/page")));
    }

    #[test]
    fn test_invalid_pattern_reports_root_and_pattern() {
        let err = FilterRule::new("example.com", &["(unclosed"], &[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("example.com"));
        assert!(msg.contains("(unclosed"));
    }

    #[test]
    fn test_push_patterns_extend_rule() {
        let mut rule = FilterRule::new("example.com", &[] as &[&str], &[]).unwrap();
        rule.push_allow("/a").unwrap();
        rule.push_disallow("/a/secret").unwrap();
        let filter = AdmissionFilter::new([rule]);
        assert!(filter.allow(&url("https://example.com/a/open")));
        assert!(!filter.allow(&url("https://example.com/a/secret")));
    }
}
