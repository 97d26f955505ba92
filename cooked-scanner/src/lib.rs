pub mod browser;
pub mod cookies;
pub mod error;
pub mod frontier;
pub mod normalize;
pub mod page;
pub mod protocol;
pub mod traverse;

pub use browser::{BrowserOptions, BrowserSession, ContextFactory, HttpBrowser, HttpContext, PageFetcher};
pub use error::ScanError;
pub use frontier::{Explorer, Frontier};
pub use normalize::normalize;
pub use page::Page;
pub use protocol::{Scheme, resolve_scheme};
pub use traverse::SiteTraverser;
