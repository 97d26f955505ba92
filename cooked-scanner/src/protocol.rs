use crate::browser::PageFetcher;
use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Https,
    Http,
}

impl Scheme {
    /// Probe order: secure first.
    pub const PREFERENCE: [Scheme; 2] = [Scheme::Https, Scheme::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root URL of a bare site name under `scheme`.
pub fn site_url(scheme: Scheme, site: &str) -> Result<Url> {
    let raw = format!("{}://{}", scheme, site.trim().trim_end_matches('/'));
    Url::parse(&raw).map_err(|source| ScanError::MalformedUrl { url: raw, source })
}

/// Find the first scheme, in preference order, on which `site` loads.
///
/// `None` means no scheme answered and the site should be skipped.
pub async fn resolve_scheme<F: PageFetcher>(fetcher: &F, site: &str) -> Option<Scheme> {
    for scheme in Scheme::PREFERENCE {
        let url = match site_url(scheme, site) {
            Ok(url) => url,
            Err(e) => {
                warn!("Protocol ({}): {}", site, e);
                continue;
            }
        };

        match fetcher.probe(&url).await {
            Ok(()) => {
                info!("Protocol ({}): {}", site, scheme);
                return Some(scheme);
            }
            Err(e) => debug!("Protocol ({}): {} failed: {}", site, url, e),
        }
    }

    warn!("{}", ScanError::ProtocolResolution(site.to_string()));
    None
}
