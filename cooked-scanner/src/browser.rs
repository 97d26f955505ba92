//! Page loading.
//!
//! Two capabilities are consumed by the rest of the workspace: fetching a
//! page for link discovery ([`PageFetcher`]) and driving a cookie-keeping
//! session through a list of URLs ([`BrowserSession`]). [`HttpBrowser`]
//! hands out isolated [`HttpContext`]s that implement both over `reqwest`.

use crate::cookies::SessionCookies;
use crate::error::{Result, ScanError};
use crate::page::{Page, is_html};
use reqwest::{Client, Response};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Loads pages for frontier exploration and scheme probing.
pub trait PageFetcher {
    /// Fetch `url`; only a 2xx HTML response is a success.
    fn fetch_page(&self, url: &Url) -> impl Future<Output = Result<Page>> + Send;

    /// Succeeds when any response arrives within the probe timeout.
    fn probe(&self, url: &Url) -> impl Future<Output = Result<()>> + Send;
}

/// A long-lived browsing session that accumulates cookies.
pub trait BrowserSession {
    /// Navigate to `url`, returning the final status code.
    fn goto(&self, url: &Url) -> impl Future<Output = Result<u16>> + Send;

    fn clear_cookies(&self);

    /// Names of the cookies currently held, one per distinct cookie.
    fn cookie_names(&self) -> Vec<String>;
}

/// Hands out isolated browsing contexts; nothing is shared between two contexts.
pub trait ContextFactory {
    type Context: PageFetcher;

    fn new_context(&self) -> Result<Self::Context>;
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub page_timeout: Duration,
    pub probe_timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
        }
    }
}

/// Factory for isolated browsing contexts.
#[derive(Debug, Clone, Default)]
pub struct HttpBrowser {
    options: BrowserOptions,
}

impl HttpBrowser {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

}

impl ContextFactory for HttpBrowser {
    type Context = HttpContext;

    /// A fresh context with its own connection pool and cookie store.
    fn new_context(&self) -> Result<HttpContext> {
        HttpContext::new(self.options.clone())
    }
}

pub struct HttpContext {
    client: Client,
    cookies: Arc<SessionCookies>,
    options: BrowserOptions,
}

impl HttpContext {
    pub fn new(options: BrowserOptions) -> Result<Self> {
        let cookies = Arc::new(SessionCookies::new());
        let connect_timeout = options.page_timeout.min(options.probe_timeout);

        let client = Client::builder()
            .user_agent(options.user_agent.as_str())
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .cookie_provider(cookies.clone())
            .build()?;

        Ok(Self {
            client,
            cookies,
            options,
        })
    }

    async fn send(&self, url: &Url, timeout: Duration) -> Result<Response> {
        self.client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)
    }
}

impl PageFetcher for HttpContext {
    async fn fetch_page(&self, url: &Url) -> Result<Page> {
        debug!("Fetching {}", url);

        let start = Instant::now();
        let response = self.send(url, self.options.page_timeout).await?;
        let response_time = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !is_html(content_type.as_deref()) {
            return Err(ScanError::NotHtml(content_type));
        }

        let body = response.text().await.map_err(classify)?;

        Ok(Page {
            url: url.clone(),
            status_code: status.as_u16(),
            content_type,
            response_time,
            body,
        })
    }

    async fn probe(&self, url: &Url) -> Result<()> {
        debug!("Probing {}", url);
        let response = self.send(url, self.options.probe_timeout).await?;
        debug!("Probe {} answered {}", url, response.status());
        Ok(())
    }
}

impl BrowserSession for HttpContext {
    async fn goto(&self, url: &Url) -> Result<u16> {
        let response = self.send(url, self.options.page_timeout).await?;
        let status = response.status().as_u16();
        // Drain the body so the load completes like a page navigation would.
        response.bytes().await.map_err(classify)?;
        Ok(status)
    }

    fn clear_cookies(&self) {
        self.cookies.clear();
    }

    fn cookie_names(&self) -> Vec<String> {
        self.cookies.names()
    }
}

fn classify(error: reqwest::Error) -> ScanError {
    if error.is_timeout() {
        ScanError::Timeout
    } else {
        ScanError::Http(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn context() -> HttpContext {
        HttpContext::new(BrowserOptions {
            page_timeout: Duration::from_millis(500),
            probe_timeout: Duration::from_millis(500),
            ..BrowserOptions::default()
        })
        .unwrap()
    }

    async fn mount_html(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(body),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_page_html() {
        let server = MockServer::start().await;
        mount_html(&server, "/", r#"<a href="/next">next</a>"#).await;

        let url = Url::parse(&server.uri()).unwrap();
        let page = context().fetch_page(&url).await.unwrap();

        assert_eq!(page.status_code, 200);
        assert_eq!(page.links(), vec!["/next"]);
    }

    #[tokio::test]
    async fn test_fetch_page_rejects_non_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = context().fetch_page(&url).await.unwrap_err();
        assert!(matches!(err, ScanError::Status(404)));
    }

    #[tokio::test]
    async fn test_fetch_page_rejects_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("{}"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/data.json", server.uri())).unwrap();
        let err = context().fetch_page(&url).await.unwrap_err();
        assert!(matches!(err, ScanError::NotHtml(Some(ref ct)) if ct == "application/json"));
    }

    #[tokio::test]
    async fn test_fetch_page_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = context().fetch_page(&url).await.unwrap_err();
        assert!(matches!(err, ScanError::Timeout));
    }

    #[tokio::test]
    async fn test_probe_accepts_any_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        assert!(context().probe(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_session_accumulates_and_clears_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("set-cookie", "sid=abc; Path=/")
                    .set_body_string("a"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(
                ResponseTemplate::new(404)
                    .append_header("set-cookie", "consent=no; Path=/")
                    .set_body_string("b"),
            )
            .mount(&server)
            .await;

        let session = context();
        let a = Url::parse(&format!("{}/a", server.uri())).unwrap();
        let b = Url::parse(&format!("{}/b", server.uri())).unwrap();

        assert_eq!(session.goto(&a).await.unwrap(), 200);
        assert_eq!(session.goto(&b).await.unwrap(), 404);
        assert_eq!(session.cookie_names(), vec!["sid", "consent"]);

        session.clear_cookies();
        assert!(session.cookie_names().is_empty());
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).append_header("set-cookie", "sid=1"))
            .mount(&server)
            .await;

        let browser = HttpBrowser::default();
        let first = browser.new_context().unwrap();
        let second = browser.new_context().unwrap();

        first.goto(&Url::parse(&server.uri()).unwrap()).await.unwrap();

        assert_eq!(first.cookie_names(), vec!["sid"]);
        assert!(second.cookie_names().is_empty());
    }
}
