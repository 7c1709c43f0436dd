use crate::UrlError;
use url::Url;

/// Query parameters that only carry tracking information
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Resolves an href found on a page to an absolute HTTP(S) URL
///
/// Returns None if the link should be ignored:
/// - empty or fragment-only hrefs
/// - javascript:, mailto:, tel: and data: links
/// - anything that does not resolve to an http or https URL
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
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

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

/// Reduces a URL to the canonical form used for record keys
///
/// # Canonicalization Steps
///
/// 1. Reject non-HTTP(S) URLs and URLs without a host
/// 2. Lowercase the host
/// 3. Collapse repeated slashes and drop a trailing slash (except for root)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters, keeping the order of the rest
///
/// The scheme and `www.` prefix are left alone: listing sites often serve
/// different content on them, and a key must never merge distinct listings.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::canonicalize_url;
///
/// let url = canonicalize_url("https://EXAMPLE.com/studies/42/?utm_source=x#about").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/studies/42");
/// ```
pub fn canonicalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/search/master?page=3").unwrap()
    }

    #[test]
    fn test_resolve_relative_link() {
        let url = resolve_link("/studies/42/msc-physics.html", &base_url()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/studies/42/msc-physics.html");
    }

    #[test]
    fn test_resolve_absolute_link() {
        let url = resolve_link("https://other.org/p", &base_url()).unwrap();
        assert_eq!(url.as_str(), "https://other.org/p");
    }

    #[test]
    fn test_skip_special_links() {
        assert!(resolve_link("javascript:void(0)", &base_url()).is_none());
        assert!(resolve_link("mailto:a@b.com", &base_url()).is_none());
        assert!(resolve_link("#top", &base_url()).is_none());
        assert!(resolve_link("   ", &base_url()).is_none());
    }

    #[test]
    fn test_remove_fragment_and_trailing_slash() {
        let url = canonicalize_url("https://example.com/studies/42/#fees").unwrap();
        assert_eq!(url.as_str(), "https://example.com/studies/42");
    }

    #[test]
    fn test_keep_root_slash() {
        let url = canonicalize_url("https://example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_tracking_params_removed_others_kept_in_order() {
        let url =
            canonicalize_url("https://example.com/p?b=2&utm_medium=mail&a=1&fbclid=x").unwrap();
        assert_eq!(url.as_str(), "https://example.com/p?b=2&a=1");
    }

    #[test]
    fn test_listing_params_are_not_tracking() {
        let a = canonicalize_url("https://example.com/studies?ref=1&gclid=z").unwrap();
        let b = canonicalize_url("https://example.com/studies?ref=2").unwrap();
        let c = canonicalize_url("https://example.com/studies?source=uni").unwrap();
        assert_eq!(a.as_str(), "https://example.com/studies?ref=1");
        assert_ne!(a, b);
        assert_eq!(c.as_str(), "https://example.com/studies?source=uni");
    }

    #[test]
    fn test_www_is_preserved() {
        let url = canonicalize_url("https://www.Example.com/p").unwrap();
        assert_eq!(url.as_str(), "https://www.example.com/p");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonicalize_url("ftp://example.com/file");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(canonicalize_url("not a url").is_err());
    }
}
