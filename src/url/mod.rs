//! URL handling for Ladle
//!
//! Target identity, normalization, host matching and the file-name slugs
//! that tie a target to its persisted output.

mod domain;
mod matcher;
mod normalize;

use crate::UrlError;
use std::fmt;
use url::Url;

pub use domain::{extract_domain, site_slug, target_slug};
pub use matcher::matches_site;
pub use normalize::normalize_url;

/// One URL scheduled for fetching
///
/// Identity is the normalized URL; two targets built from strings that
/// normalize the same compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    url: Url,
}

impl Target {
    /// Parses and normalizes a target URL
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        Ok(Self {
            url: normalize_url(raw)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Lowercase host of the target
    pub fn domain(&self) -> Option<String> {
        extract_domain(&self.url)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_identity_is_normalized() {
        let a = Target::parse("https://Example.com/soup/#comments").unwrap();
        let b = Target::parse("https://example.com/soup/?utm_source=x").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://example.com/soup/");
    }

    #[test]
    fn test_target_ordering_is_lexicographic() {
        let mut targets = vec![
            Target::parse("https://example.com/zucchini/").unwrap(),
            Target::parse("https://example.com/apple-pie/").unwrap(),
        ];
        targets.sort();
        assert_eq!(targets[0].as_str(), "https://example.com/apple-pie/");
    }

    #[test]
    fn test_target_domain() {
        let target = Target::parse("https://www.example.com/a/").unwrap();
        assert_eq!(target.domain().as_deref(), Some("www.example.com"));
    }

    #[test]
    fn test_target_rejects_non_http() {
        assert!(Target::parse("mailto:cook@example.com").is_err());
    }
}
