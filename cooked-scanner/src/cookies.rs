//! Per-session cookie storage.
//!
//! Backed by `cookie_store` through `reqwest_cookie_store`. Names are read
//! from the store itself: cookies it refuses (foreign `Domain=`, bad
//! prefixes) never appear, and expired ones drop out of
//! [`SessionCookies::names`] once they lapse.

use cookie_store::CookieStore as Store;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest_cookie_store::CookieStoreMutex;
use std::sync::{MutexGuard, PoisonError};
use url::Url;

#[derive(Default)]
pub struct SessionCookies {
    store: CookieStoreMutex,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all unexpired cookies, grouped by domain in the order first set.
    pub fn names(&self) -> Vec<String> {
        self.lock()
            .iter_unexpired()
            .map(|cookie| cookie.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cookie.
    pub fn clear(&self) {
        *self.lock() = Store::default();
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.store.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.store.cookies(url)
    }
}
