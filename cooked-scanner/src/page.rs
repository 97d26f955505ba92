use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// A page that loaded successfully as HTML.
#[derive(Debug, Clone)]
pub struct Page {
    /// The URL that was requested (links resolve against it).
    pub url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub response_time: Duration,
    pub body: String,
}

impl Page {
    /// Every non-empty `href` of an anchor element, unresolved.
    pub fn links(&self) -> Vec<String> {
        extract_links(&self.body)
    }
}

/// Pull anchor targets out of an HTML document, in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when a Content-Type header value denotes HTML.
pub fn is_html(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false)
}
