//! Chromium driver using chromiumoxide

use super::{BrowserDriver, Cookie, DriverError, DriverFactory, LaunchOptions};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

fn classify(error: CdpError) -> DriverError {
    match error {
        CdpError::Timeout => DriverError::ReadTimeout(error.to_string()),
        CdpError::Ws(_) | CdpError::NoResponse | CdpError::ChannelSendError(_) => {
            DriverError::Fatal(error.to_string())
        }
        other => DriverError::Other(other.to_string()),
    }
}

/// One Chromium process with a single tab
pub struct ChromeDriver {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChromeDriver {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(options.page_load_timeout)
            .window_size(options.width, options.height)
            .arg(format!("--user-agent={}", options.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .arg("--no-first-run");

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(DriverError::Launch)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("browser handler event error: {}", e);
                }
            }
            debug!("browser handler task completed");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DriverError::Launch(e.to_string()));
            }
        };

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler: std::sync::Mutex::new(Some(handler_task)),
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await.map_err(classify)?;
        Ok(())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        self.page.content().await.map_err(classify)
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(classify)?
            .unwrap_or_default())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError> {
        let cookies = self.page.get_cookies().await.map_err(classify)?;
        Ok(cookies
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: Some(c.domain),
                path: Some(c.path),
            })
            .collect())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<(), DriverError> {
        let current = self.current_url().await?;
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone());
            builder = match &cookie.domain {
                Some(domain) => builder.domain(domain.clone()),
                None => builder.url(current.clone()),
            };
            if let Some(path) = &cookie.path {
                builder = builder.path(path.clone());
            }
            params.push(builder.build().map_err(DriverError::Other)?);
        }
        self.page.set_cookies(params).await.map_err(classify)?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), DriverError> {
        self.page.reload().await.map_err(classify)?;
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        let browser = self.browser.lock().await;
        match browser.as_ref() {
            Some(browser) => browser.clear_cookies().await.map_err(classify),
            None => Err(DriverError::Fatal("browser already closed".to_string())),
        }
    }

    async fn close_windows(&self) -> Result<(), DriverError> {
        let browser = self.browser.lock().await;
        let Some(browser) = browser.as_ref() else {
            return Err(DriverError::Fatal("browser already closed".to_string()));
        };
        for page in browser.pages().await.map_err(classify)? {
            // One stuck tab must not keep the others open
            if let Err(e) = page.close().await {
                debug!("failed to close tab: {}", e);
            }
        }
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let closed = browser.close().await.map_err(classify);
                let _ = browser.wait().await;
                closed.map(|_| ())
            }
            None => Ok(()),
        };

        let handler = self
            .handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handler) = handler {
            handler.abort();
        }
        result
    }
}

/// Launches [`ChromeDriver`] handles
#[derive(Debug, Default, Clone)]
pub struct ChromeDriverFactory;

#[async_trait]
impl DriverFactory for ChromeDriverFactory {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Arc<dyn BrowserDriver>, DriverError> {
        Ok(Arc::new(ChromeDriver::launch(options).await?))
    }
}
