//! URL handling for listing links
//!
//! Listing pages link to their detail pages with relative or decorated hrefs.
//! This module resolves them against the page they were found on and reduces
//! them to a canonical form that is stable enough to serve as a record key.

mod normalize;

pub use normalize::{canonicalize_url, resolve_link};

use ::url::Url;

/// Builds the URL of a numbered listing page
///
/// The base URL is used as a prefix, so `https://example.com/search?page=`
/// with page 3 becomes `https://example.com/search?page=3`.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::page_url;
///
/// assert_eq!(page_url("https://example.com/list?page=", 3), "https://example.com/list?page=3");
/// ```
pub fn page_url(base_url: &str, page: u32) -> String {
    format!("{}{}", base_url, page)
}

/// Extracts the decoded value of a query parameter from a URL
///
/// Returns None when the URL has no such parameter.
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
