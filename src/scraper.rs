use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use scraper::{Html, Selector};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;
use crate::error::{AppError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Load `url` and return the plain text of the bill container
    async fn extract(&self, url: &str) -> Result<String>;
}

/// Returns the text of the first element matching `selector`, or `None` when the
/// document has no such element.
pub fn extract_container_text(html: &str, selector: &Selector) -> Option<String> {
    let document = Html::parse_document(html);

    document
        .select(selector)
        .next()
        .map(|element| element.text().collect())
}

/// Renders pages in a fresh headless Chromium per call.
pub struct BrowserExtractor {
    settings: BrowserSettings,
    selector: Selector,
}

impl BrowserExtractor {
    pub fn new(settings: BrowserSettings) -> Result<Self> {
        let selector = Selector::parse(&settings.selector).map_err(|e| {
            AppError::ConfigError(format!("Invalid selector {}: {:?}", settings.selector, e))
        })?;
        Ok(Self { settings, selector })
    }

    fn not_found(&self) -> AppError {
        AppError::ElementNotFound {
            selector: self.settings.selector.clone(),
            wait_secs: self.settings.element_wait.as_secs(),
        }
    }

    async fn extract_with(&self, session: &BrowserSession, url: &str) -> Result<String> {
        let page = session.browser.new_page("about:blank").await?;

        let headers: HashMap<&str, &str> = self
            .settings
            .extra_headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::to_value(headers).map_err(|e| AppError::NavigationError(e.to_string()))?,
        )))
        .await?;

        page.goto(url).await?;
        debug!(%url, "Navigation finished");

        timeout(self.settings.element_wait, wait_for_element(&page, &self.settings.selector))
            .await
            .map_err(|_| self.not_found())??;

        let html = page.content().await?;
        debug!(%url, html = %html, "Rendered page source");

        if let Err(err) = page.close().await {
            debug!(error = %err, "Failed to close page");
        }

        extract_container_text(&html, &self.selector).ok_or_else(|| self.not_found())
    }
}

#[async_trait]
impl TextExtractor for BrowserExtractor {
    async fn extract(&self, url: &str) -> Result<String> {
        info!(%url, "Launching headless browser");
        let session = BrowserSession::launch(&self.settings).await?;

        let result = self.extract_with(&session, url).await;
        session.close().await;

        match &result {
            Ok(text) => info!(%url, chars = text.len(), "Extracted bill text"),
            Err(err) => warn!(%url, error = %err, "Extraction failed"),
        }
        result
    }
}

/// Polls the page until `selector` matches. An absent element keeps the loop going;
/// a failed evaluation (page crashed, connection lost) ends it with that error.
async fn wait_for_element(page: &Page, selector: &str) -> Result<()> {
    let script = presence_script(selector)?;
    let script = script.as_str();
    poll_until_present(move || element_present(page, script), POLL_INTERVAL).await
}

async fn element_present(page: &Page, script: &str) -> Result<bool> {
    page.evaluate(script)
        .await?
        .into_value()
        .map_err(|e| AppError::NavigationError(format!("Unexpected element check result: {}", e)))
}

fn presence_script(selector: &str) -> Result<String> {
    let quoted = serde_json::to_string(selector)
        .map_err(|e| AppError::NavigationError(format!("Invalid selector {}: {}", selector, e)))?;
    Ok(format!("document.querySelector({}) !== null", quoted))
}

async fn poll_until_present<F, Fut>(mut check: F, interval: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    while !check().await? {
        sleep(interval).await;
    }
    Ok(())
}

/// A launched browser and the task driving its CDP connection.
///
/// [`BrowserSession::close`] shuts the browser down. If the session is dropped without
/// closing, the handler task is aborted and the child process is killed on drop.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .new_headless_mode()
            .args(vec![
                "--disable-gpu".to_string(),
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                format!("--user-agent={}", settings.user_agent),
            ]);
        if let Some(path) = &settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| AppError::NavigationError(format!("Invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser");
        }
        if let Err(err) = self.browser.wait().await {
            warn!(error = %err, "Failed to reap browser process");
        }
        self.handler.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
