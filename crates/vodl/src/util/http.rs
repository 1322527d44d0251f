use std::{ops::Deref, sync::Arc};

use reqwest::{header::HeaderMap, Client, ClientBuilder, IntoUrl};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::error::VodResult;

/// Shared HTTP client. Cookies and default headers supplied by the credential
/// store are attached to every request transparently.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> VodResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    pub fn with_headers(headers: HeaderMap) -> VodResult<Self> {
        Self::new(Client::builder().default_headers(headers))
    }

    pub fn add_cookies(&self, cookies: Vec<String>, url: impl IntoUrl) -> VodResult<()> {
        let url = url.into_url()?;
        let mut lock = self
            .cookies_store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, &url) {
                tracing::warn!("Ignored invalid cookie {cookie}: {e}");
            }
        }
        Ok(())
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
