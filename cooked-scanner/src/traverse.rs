use crate::browser::ContextFactory;
use crate::error::Result;
use crate::frontier::Explorer;
use crate::protocol::{resolve_scheme, site_url};
use tracing::{info, warn};
use url::Url;

/// Turns a bare site name into a group of its internal URLs.
pub struct SiteTraverser<B> {
    browser: B,
    seed: Option<u64>,
}

impl<B: ContextFactory> SiteTraverser<B> {
    pub fn new(browser: B) -> Self {
        Self {
            browser,
            seed: None,
        }
    }

    /// Make frontier selection reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    /// Resolve the site's scheme and explore it in a fresh context.
    ///
    /// `Ok(None)` means no scheme answered; errors only come from context setup.
    pub async fn traverse(&self, site: &str, target: usize) -> Result<Option<Vec<Url>>> {
        info!("Traverse: {}", site);

        let context = self.browser.new_context()?;

        let Some(scheme) = resolve_scheme(&context, site).await else {
            warn!("{}: no scheme answered, skipping", site);
            return Ok(None);
        };

        let root = match site_url(scheme, site) {
            Ok(root) => root,
            Err(e) => {
                warn!("{}: {}", site, e);
                return Ok(None);
            }
        };

        let urls = match self.seed {
            Some(seed) => Explorer::seeded(&context, seed).explore(&root, target).await,
            None => Explorer::new(&context).explore(&root, target).await,
        };

        Ok(Some(urls))
    }
}
