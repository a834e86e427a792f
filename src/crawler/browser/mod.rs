#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Configuration for the shared headless browser
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Whether to run the browser headless
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Timeout for navigation and DOM queries
    pub page_timeout: Duration,
    /// Extra time given to scripts after the page has loaded
    pub render_wait: Duration,
    /// Timeout after which an idle browser process is shut down
    pub idle_timeout: Duration,
    /// Additional Chrome arguments
    pub chrome_args: Vec<String>,
    /// User agent string to use
    pub user_agent: String,
}

impl Default for BrowserConfig {
    #[inline]
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 720,
            page_timeout: Duration::from_secs(20),
            render_wait: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(120),
            chrome_args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--disable-extensions".to_string(),
                "--blink-settings=imagesEnabled=false".to_string(),
                "--mute-audio".to_string(),
            ],
            user_agent: crate::crawler::BROWSER_USER_AGENT.to_string(),
        }
    }
}

/// A single browser process shared by every fetch in an acquisition batch.
///
/// The process is launched on first use. If the launch fails the renderer
/// stays unavailable for its lifetime and callers fall back to plain HTTP.
#[derive(Clone)]
pub struct PageRenderer {
    config: BrowserConfig,
    browser: Arc<OnceLock<Option<Browser>>>,
}

impl PageRenderer {
    #[inline]
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Arc::new(OnceLock::new()),
        }
    }

    /// Launch (or reuse) the shared browser. Blocks while Chrome starts.
    fn browser(&self) -> Option<&Browser> {
        self.browser
            .get_or_init(|| match launch(&self.config) {
                Ok(browser) => {
                    info!("Launched headless browser for page rendering");
                    Some(browser)
                }
                Err(e) => {
                    warn!("Browser unavailable, pages will be fetched over HTTP: {:#}", e);
                    None
                }
            })
            .as_ref()
    }

    /// Whether a launch has been attempted and produced a usable browser
    #[inline]
    pub fn is_launched(&self) -> bool {
        matches!(self.browser.get(), Some(Some(_)))
    }

    /// Render `url` in a fresh tab and return the resulting HTML.
    ///
    /// Blocking; run it on a blocking thread.
    #[inline]
    pub fn render(&self, url: &Url) -> Result<String> {
        let browser = self
            .browser()
            .ok_or_else(|| anyhow!("Browser could not be launched"))?;

        let tab = browser
            .new_tab()
            .with_context(|| "Failed to create new browser tab")?;
        tab.set_default_timeout(self.config.page_timeout);
        tab.set_user_agent(&self.config.user_agent, None, None)
            .with_context(|| "Failed to set user agent")?;

        debug!("Rendering {} in headless browser", url);
        let result = (|| {
            tab.navigate_to(url.as_str())
                .with_context(|| format!("Failed to navigate to {}", url))?
                .wait_until_navigated()
                .with_context(|| format!("Navigation to {} did not complete", url))?;

            if let Err(e) = tab.wait_for_element("body") {
                debug!("No body element on {}: {}", url, e);
            }
            std::thread::sleep(self.config.render_wait);

            tab.get_content()
                .with_context(|| format!("Failed to read rendered content of {}", url))
        })();

        if let Err(e) = tab.close(true) {
            debug!("Failed to close tab for {}: {}", url, e);
        }

        result
    }
}

fn launch(config: &BrowserConfig) -> Result<Browser> {
    let args: Vec<&OsStr> = config.chrome_args.iter().map(OsStr::new).collect();

    let launch_options = LaunchOptions {
        headless: config.headless,
        window_size: Some((config.window_width, config.window_height)),
        args,
        idle_browser_timeout: config.idle_timeout,
        ..Default::default()
    };

    Browser::new(launch_options).with_context(|| "Failed to launch browser instance")
}
