//! Script-less browser driver over plain HTTP
//!
//! Loads pages with reqwest and keeps a private cookie jar so cookies can be
//! copied between handles like they are between real browser windows.

use super::{BrowserDriver, Cookie, DriverError, DriverFactory, LaunchOptions};
use async_trait::async_trait;
use cookie_store::{CookieStore, RawCookie};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Builds the HTTP client backing one driver handle
///
/// The client timeout is the driver's own page-load timeout; the crawler's
/// watchdog sits on top of it.
pub fn build_http_client(options: &LaunchOptions) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(options.user_agent.clone())
        .timeout(options.page_load_timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[derive(Debug, Default)]
struct PageState {
    current_url: Option<String>,
    source: String,
    jar: CookieStore,
    closed: bool,
}

/// A browser handle without a script engine
#[derive(Debug)]
pub struct HttpDriver {
    client: Client,
    state: Mutex<PageState>,
}

impl HttpDriver {
    pub fn new(options: &LaunchOptions) -> Result<Self, DriverError> {
        let client =
            build_http_client(options).map_err(|e| DriverError::Launch(e.to_string()))?;
        Ok(Self {
            client,
            state: Mutex::new(PageState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.state().closed {
            return Err(DriverError::Fatal("session has been quit".to_string()));
        }
        Ok(())
    }

    /// `Cookie` header for a request to `url`, honouring domain, path and expiry
    fn cookie_header(&self, url: &Url) -> Option<String> {
        let state = self.state();
        let pairs: Vec<String> = state
            .jar
            .get_request_values(url)
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

/// Maps a reqwest failure onto the driver error classes
fn classify(error: reqwest::Error) -> DriverError {
    if error.is_timeout() {
        DriverError::ReadTimeout(error.to_string())
    } else if error.is_connect() || error.is_body() {
        DriverError::ConnectionReset(error.to_string())
    } else {
        DriverError::Other(error.to_string())
    }
}

fn parse_url(url: &str) -> Result<Url, DriverError> {
    Url::parse(url).map_err(|e| DriverError::Other(format!("invalid URL '{}': {}", url, e)))
}

/// URL a transferred cookie is scoped to when no page is loaded yet
fn cookie_origin(cookie: &Cookie) -> Option<Url> {
    let domain = cookie.domain.as_deref()?.trim_start_matches('.');
    Url::parse(&format!("https://{}/", domain)).ok()
}

#[async_trait]
impl BrowserDriver for HttpDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        let request_url = parse_url(url)?;

        let mut request = self.client.get(request_url.clone());
        if let Some(header) = self.cookie_header(&request_url) {
            request = request.header(COOKIE, header);
        }

        let response = request.send().await.map_err(classify)?;
        let final_url = response.url().clone();
        let received: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        // Error pages are still pages; callers decide what the content means
        let body = response.text().await.map_err(classify)?;

        let mut state = self.state();
        if state.closed {
            return Err(DriverError::Fatal("session quit during navigation".to_string()));
        }
        for header in &received {
            // Expired cookies evict the stored one instead of being kept
            if let Err(e) = state.jar.parse(header, &final_url) {
                debug!("Ignoring cookie from {}: {}", final_url, e);
            }
        }
        state.current_url = Some(final_url.to_string());
        state.source = body;
        Ok(())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        self.ensure_open()?;
        Ok(self.state().source.clone())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.ensure_open()?;
        Ok(self.state().current_url.clone().unwrap_or_default())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError> {
        self.ensure_open()?;
        Ok(self
            .state()
            .jar
            .iter_unexpired()
            .map(|c| Cookie {
                name: c.name().to_string(),
                value: c.value().to_string(),
                domain: c.domain().map(str::to_string),
                path: c.path().map(str::to_string),
            })
            .collect())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut state = self.state();
        let current = state.current_url.as_deref().and_then(|u| Url::parse(u).ok());
        for cookie in cookies {
            let scope = match current.clone().or_else(|| cookie_origin(cookie)) {
                Some(scope) => scope,
                None => {
                    return Err(DriverError::Other(format!(
                        "cookie '{}' has no domain and no page is loaded",
                        cookie.name
                    )))
                }
            };
            let mut raw = RawCookie::new(cookie.name.clone(), cookie.value.clone());
            if let Some(domain) = &cookie.domain {
                raw.set_domain(domain.clone());
            }
            if let Some(path) = &cookie.path {
                raw.set_path(path.clone());
            }
            if let Err(e) = state.jar.insert_raw(&raw, &scope) {
                debug!("Cookie '{}' rejected for {}: {}", cookie.name, scope, e);
            }
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), DriverError> {
        let url = self.state().current_url.clone();
        match url {
            Some(url) => self.navigate(&url).await,
            None => Err(DriverError::Other("nothing to reload".to_string())),
        }
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.state().jar = CookieStore::default();
        Ok(())
    }

    async fn close_windows(&self) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut state = self.state();
        state.current_url = None;
        state.source.clear();
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let mut state = self.state();
        state.closed = true;
        state.source.clear();
        state.jar = CookieStore::default();
        Ok(())
    }
}

/// Launches [`HttpDriver`] handles
///
/// There is no window, so `headless` and the viewport are ignored.
#[derive(Debug, Default, Clone)]
pub struct HttpDriverFactory;

#[async_trait]
impl DriverFactory for HttpDriverFactory {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Arc<dyn BrowserDriver>, DriverError> {
        Ok(Arc::new(HttpDriver::new(options)?))
    }
}
