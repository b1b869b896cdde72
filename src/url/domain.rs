use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ladle::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Directory name for a category target's link shards
///
/// The scheme is dropped and every `/` becomes `_`, so
/// `https://site.com/category/dinner/` maps to `site.com_category_dinner_`.
pub fn site_slug(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    sanitize(&without_scheme.replace('/', "_"))
}

/// File stem for a recipe target's record
///
/// The path relative to `base_url` with every `/` replaced by `_`, so
/// `chicken-alfredo/` maps to `chicken-alfredo_` and records written by
/// earlier runs keep their names. Targets outside `base_url` fall back to
/// [`site_slug`]. The site root maps to `index`.
pub fn target_slug(target: &str, base_url: &str) -> String {
    let relative = match target.strip_prefix(base_url) {
        Some(rest) => rest,
        None => return site_slug(target),
    };

    if relative.is_empty() {
        "index".to_string()
    } else {
        sanitize(&relative.replace('/', "_"))
    }
}

/// Replaces characters that are awkward in file names
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '?' | '&' | '=' | ':' | '*' | '"' | '<' | '>' | '|' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
