pub mod browser;
pub mod extractor;
pub mod relevance;
pub mod robots;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use ureq::Agent;
use url::Url;

use self::browser::{BrowserConfig, PageRenderer};
use self::extractor::{ExtractionConfig, extract_content, render_markdown};
use self::relevance::RelevanceFilter;
use crate::SeekifyError;

/// Desktop Chrome user agent sent with every page, robots and search request
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

/// Configuration for page acquisition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrawlerConfig {
    /// User agent string to use for requests
    pub user_agent: String,
    /// Per-page fetch timeout in seconds
    pub page_timeout_seconds: u64,
    /// Maximum number of pages fetched at the same time
    pub max_concurrent_fetches: usize,
    /// Whether to render pages in a headless browser before extraction
    pub enable_js_rendering: bool,
    /// Structural tags stripped from every page
    pub excluded_tags: Vec<String>,
    /// Drop links that point at social networks
    pub exclude_social_media_links: bool,
    /// Drop modals, cookie banners and other overlays
    pub remove_overlay_elements: bool,
    /// Minimum BM25 score for a passage to be kept
    pub relevance_threshold: f64,
}

impl Default for CrawlerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            page_timeout_seconds: 20,
            max_concurrent_fetches: 5,
            enable_js_rendering: true,
            excluded_tags: ExtractionConfig::default().excluded_tags,
            exclude_social_media_links: true,
            remove_overlay_elements: true,
            relevance_threshold: relevance::DEFAULT_THRESHOLD,
        }
    }
}

impl CrawlerConfig {
    #[inline]
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_seconds)
    }
}

/// Blocking HTTP client shared by robots checks and plain page fetches
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: Agent,
}

impl HttpClient {
    #[inline]
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .user_agent(user_agent)
            .build()
            .into();

        Self { agent }
    }

    /// Perform a single HTTP GET request. Blocking.
    #[inline]
    pub fn get(&self, url: &str) -> Result<String> {
        self.get_checked(url, false)
    }

    /// GET a page, rejecting responses that are not HTML or text. Blocking.
    #[inline]
    pub fn get_html(&self, url: &str) -> Result<String> {
        self.get_checked(url, true)
    }

    /// Perform a GET on a blocking thread
    #[inline]
    pub async fn fetch(&self, url: &Url) -> Result<String> {
        let client = self.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || client.get(&url))
            .await
            .context("HTTP fetch task failed")?
    }

    fn get_checked(&self, url: &str, require_text: bool) -> Result<String> {
        debug!("Making HTTP GET request to: {}", url);

        match self.agent.get(url).call() {
            Ok(mut response) => {
                if require_text {
                    let content_type = response
                        .headers()
                        .get("content-type")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_ascii_lowercase();
                    if !content_type.is_empty()
                        && !content_type.contains("html")
                        && !content_type.starts_with("text/")
                    {
                        return Err(anyhow!("unsupported content type '{}'", content_type));
                    }
                }

                let text = response
                    .body_mut()
                    .read_to_string()
                    .with_context(|| format!("Failed to read response body from {}", url))?;
                debug!("Successfully read {} bytes from {}", text.len(), url);
                Ok(text)
            }
            Err(ureq::Error::StatusCode(code)) => {
                debug!("HTTP request failed with status {}: {}", code, url);
                Err(anyhow!("HTTP error {}", code))
            }
            Err(e) => {
                debug!("HTTP request failed with transport error: {}", e);
                Err(anyhow::Error::from(e))
                    .with_context(|| format!("Failed to make HTTP request to {}", url))
            }
        }
    }
}

/// A fetched page reduced to the passages relevant to the active question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub url: Url,
    pub title: String,
    /// Markdown of everything left after structural cleanup
    pub raw_markdown: String,
    /// Markdown of the passages that passed the relevance filter
    pub fit_markdown: String,
}

/// Reduce a fetched document to a [`Page`].
///
/// Returns `None` when nothing in the document is relevant to the question.
#[inline]
pub fn reduce_page(
    url: Url,
    html: &str,
    extraction_config: &ExtractionConfig,
    filter: &RelevanceFilter,
) -> Result<Option<Page>> {
    let content = extract_content(html, extraction_config)
        .with_context(|| format!("Failed to extract content from {}", url))?;

    let relevant = filter.filter_blocks(&content.blocks);
    let fit_markdown = render_markdown(&relevant);
    if fit_markdown.trim().is_empty() {
        debug!("No relevant text on {}", url);
        return Ok(None);
    }

    Ok(Some(Page {
        url,
        title: content.title,
        raw_markdown: content.raw_markdown,
        fit_markdown,
    }))
}

/// Fetches pages concurrently and reduces each one to relevant text
pub struct ContentAcquirer {
    config: CrawlerConfig,
    http_client: HttpClient,
    renderer: Option<PageRenderer>,
    extraction_config: ExtractionConfig,
}

impl ContentAcquirer {
    #[inline]
    pub fn new(config: CrawlerConfig) -> Self {
        let http_client = HttpClient::new(&config.user_agent, config.page_timeout());

        let renderer = if config.enable_js_rendering {
            info!("JavaScript rendering enabled with shared headless browser");
            Some(PageRenderer::new(BrowserConfig {
                page_timeout: config.page_timeout(),
                user_agent: config.user_agent.clone(),
                ..BrowserConfig::default()
            }))
        } else {
            None
        };

        Self {
            extraction_config: ExtractionConfig::from(&config),
            config,
            http_client,
            renderer,
        }
    }

    /// HTTP client configured with the acquirer's user agent and timeout
    #[inline]
    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    /// Fetch every URL with bounded concurrency and keep the pages that have
    /// relevant text, in input order. Failed or timed-out pages are logged and
    /// left out.
    #[inline]
    pub async fn acquire(&self, urls: &[Url], query: &str) -> Vec<Page> {
        if urls.is_empty() {
            return Vec::new();
        }

        let filter = RelevanceFilter::new(query, self.config.relevance_threshold);

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(urls.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Fetching {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<_> = futures::stream::iter(urls.iter().cloned())
            .map(|url| {
                let bar = bar.clone();
                let filter = &filter;
                async move {
                    bar.set_message(url.to_string());
                    let result = self.acquire_page(url, filter).await;
                    bar.inc(1);
                    result
                }
            })
            .buffered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await;
        bar.finish_and_clear();

        let mut pages = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(Some(page)) => pages.push(page),
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }

        info!(
            "Acquired {} relevant pages from {} URLs",
            pages.len(),
            urls.len()
        );
        pages
    }

    async fn acquire_page(
        &self,
        url: Url,
        filter: &RelevanceFilter,
    ) -> std::result::Result<Option<Page>, SeekifyError> {
        let failure = |message: String| SeekifyError::Acquisition {
            url: url.to_string(),
            message,
        };

        let http_client = self.http_client.clone();
        let renderer = self.renderer.clone();
        let extraction_config = self.extraction_config.clone();
        let filter = filter.clone();
        let task_url = url.clone();

        let task = tokio::task::spawn_blocking(move || {
            let html = fetch_html(&http_client, renderer.as_ref(), &task_url)?;
            reduce_page(task_url, &html, &extraction_config, &filter)
        });

        let timeout = self.config.page_timeout();
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(page))) => Ok(page),
            Ok(Ok(Err(e))) => Err(failure(format!("{:#}", e))),
            Ok(Err(e)) => Err(failure(format!("fetch task failed: {}", e))),
            Err(_) => Err(failure(format!(
                "timed out after {} seconds",
                timeout.as_secs()
            ))),
        }
    }
}

/// Render with the browser when there is one, falling back to plain HTTP
fn fetch_html(http_client: &HttpClient, renderer: Option<&PageRenderer>, url: &Url) -> Result<String> {
    if let Some(renderer) = renderer {
        match renderer.render(url) {
            Ok(html) => {
                debug!("Successfully rendered page with JavaScript: {}", url);
                return Ok(html);
            }
            Err(e) => debug!(
                "Browser rendering failed for {}, falling back to HTTP: {:#}",
                url, e
            ),
        }
    }

    http_client.get_html(url.as_str())
}
