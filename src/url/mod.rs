//! URL handling module
//!
//! This module provides dedup-key normalization, listing id derivation and
//! search URL rendering.

mod normalize;
mod search;

pub use normalize::normalize_url;
pub use search::{format_keywords, render_search_url};

use sha2::{Digest, Sha256};
use url::Url;

/// Returns the dedup key of a page URL
///
/// Two URLs that normalize to the same form share a key. URLs that cannot be
/// normalized (non-HTTP schemes) fall back to their serialized form.
pub fn listing_key(url: &Url) -> String {
    match normalize_url(url.as_str()) {
        Ok(normalized) => normalized.to_string(),
        Err(_) => url.to_string(),
    }
}

/// Derives a listing id from a detail page URL
///
/// Listing URLs typically end in a segment such as `2817432165-88-3331`; the
/// leading run of digits is the site-assigned id. Without such a segment the
/// id is the first 16 hex characters of the SHA-256 of the dedup key.
///
/// # Examples
///
/// ```
/// use listing_harvester::url::derive_listing_id;
/// use url::Url;
///
/// let url = Url::parse("https://example.com/s-anzeige/kommode/2817432165-88-3331").unwrap();
/// assert_eq!(derive_listing_id(&url), "2817432165");
/// ```
pub fn derive_listing_id(url: &Url) -> String {
    let last_segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");

    let digits: String = last_segment
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    let is_id_segment = !digits.is_empty()
        && last_segment[digits.len()..]
            .chars()
            .next()
            .map_or(true, |c| c == '-');

    if is_id_segment {
        return digits;
    }

    let mut hasher = Sha256::new();
    hasher.update(listing_key(url).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
