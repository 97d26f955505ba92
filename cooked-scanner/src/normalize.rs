//! Canonical URL form used as the deduplication key.
//!
//! A canonical URL keeps scheme, authority and path; query string and
//! fragment are dropped. Relative references are resolved against a base
//! before canonicalization.

use crate::error::{Result, ScanError};
use url::Url;

/// Resolve `url` against `base` (when it is relative) and strip query and fragment.
pub fn normalize(url: &str, base: Option<&Url>) -> Result<Url> {
    let parsed = match base {
        Some(base) => base.join(url),
        None => Url::parse(url),
    }
    .map_err(|source| ScanError::MalformedUrl {
        url: url.to_string(),
        source,
    })?;

    Ok(canonicalize(parsed))
}

/// Strip query and fragment from an already parsed URL.
pub fn canonicalize(mut url: Url) -> Url {
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Host-equality test that defines "internal" for a traversal.
///
/// Compares host and explicit port; a scheme's default port counts as no port.
pub fn same_host(url: &Url, start: &Url) -> bool {
    match (url.host_str(), start.host_str()) {
        (Some(host), Some(start_host)) => host == start_host && url.port() == start.port(),
        _ => false,
    }
}
