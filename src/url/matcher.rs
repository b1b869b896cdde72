/// Checks whether a link's host belongs to the crawled site
///
/// `site` is the site's host, optionally written as `*.site.com`. The bare
/// host and every subdomain match, so `www.` variants of the site's own
/// pages are treated as internal links.
///
/// # Examples
///
/// ```
/// use ladle::url::matches_site;
///
/// assert!(matches_site("therecipecritic.com", "therecipecritic.com"));
/// assert!(matches_site("therecipecritic.com", "www.therecipecritic.com"));
/// assert!(!matches_site("therecipecritic.com", "pinterest.com"));
/// ```
pub fn matches_site(site: &str, candidate: &str) -> bool {
    let site = site.strip_prefix("*.").unwrap_or(site);
    let site = site.strip_prefix("www.").unwrap_or(site);
    if site.is_empty() {
        return false;
    }

    let candidate = candidate.to_ascii_lowercase();
    let site = site.to_ascii_lowercase();
    candidate == site || candidate.ends_with(&format!(".{}", site))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_host() {
        assert!(matches_site("example.com", "example.com"));
        assert!(!matches_site("example.com", "other.com"));
    }

    #[test]
    fn test_subdomains_match() {
        assert!(matches_site("example.com", "www.example.com"));
        assert!(matches_site("*.example.com", "cdn.images.example.com"));
    }

    #[test]
    fn test_www_site_matches_bare_host() {
        assert!(matches_site("www.example.com", "example.com"));
    }

    #[test]
    fn test_no_partial_suffix_match() {
        assert!(!matches_site("example.com", "myexample.com"));
        assert!(!matches_site("example.com", "example.com.evil.org"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(matches_site("example.com", "EXAMPLE.com"));
    }

    #[test]
    fn test_empty_site_never_matches() {
        assert!(!matches_site("", "example.com"));
        assert!(!matches_site("*.", ""));
    }
}
