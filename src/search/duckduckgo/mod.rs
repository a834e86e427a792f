
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{SearchConfig, SearchProvider};
use crate::{Result, SeekifyError};

/// Search provider backed by DuckDuckGo's HTML interface (no API key required)
#[derive(Debug, Clone)]
pub struct DuckDuckGoProvider {
    endpoint: Url,
    agent: ureq::Agent,
}

impl DuckDuckGoProvider {
    #[inline]
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            SeekifyError::Config(format!("Invalid search endpoint {}: {}", config.endpoint, e))
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(&config.user_agent)
            .build()
            .into();

        Ok(Self { endpoint, agent })
    }

    fn fetch_results_page(&self, query: &str) -> anyhow::Result<String> {
        debug!("POST {} q={}", self.endpoint, query);

        match self
            .agent
            .post(self.endpoint.as_str())
            .send_form([("q", query)])
        {
            Ok(mut response) => response
                .body_mut()
                .read_to_string()
                .context("Failed to read search response body"),
            Err(ureq::Error::StatusCode(code)) => Err(anyhow!("search provider returned HTTP {}", code)),
            Err(e) => Err(anyhow::Error::from(e))
                .with_context(|| format!("Failed to reach search provider at {}", self.endpoint)),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn search(&self, query: &str) -> Result<Vec<Url>> {
        let provider = self.clone();
        let query = query.to_string();

        let html = tokio::task::spawn_blocking(move || provider.fetch_results_page(&query))
            .await
            .map_err(|e| SeekifyError::Discovery(format!("search task failed: {}", e)))?
            .map_err(|e| SeekifyError::Discovery(format!("{:#}", e)))?;

        parse_results_page(&html, &self.endpoint)
            .map_err(|e| SeekifyError::Discovery(format!("{:#}", e)))
    }

    fn name(&self) -> &'static str {
        "duckduckgo"
    }
}

/// Extract result URLs from a DuckDuckGo HTML results page.
///
/// A page that is neither a result list nor an explicit "no results" page is
/// treated as malformed, which covers rate-limit and captcha interstitials.
pub(crate) fn parse_results_page(html: &str, endpoint: &Url) -> anyhow::Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let result_selector = Selector::parse("a.result__a")
        .map_err(|e| anyhow!("Failed to create CSS selector: {:?}", e))?;
    let container_selector = Selector::parse("#links, .results, .serp__results, .no-results")
        .map_err(|e| anyhow!("Failed to create CSS selector: {:?}", e))?;

    let mut urls = Vec::new();
    let mut saw_result = false;

    for element in document.select(&result_selector) {
        saw_result = true;

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        match resolve_result_href(href, endpoint) {
            Some(url) => {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
            None => debug!("Skipping non-web search result link: {}", href),
        }
    }

    if !saw_result && document.select(&container_selector).next().is_none() {
        warn!("Search response did not look like a results page");
        return Err(anyhow!("unrecognized search response"));
    }

    Ok(urls)
}

/// Resolve a result link, unwrapping DuckDuckGo's `/l/?uddg=` redirect
fn resolve_result_href(href: &str, endpoint: &Url) -> Option<Url> {
    let link = endpoint.join(href).ok()?;

    let target = if link.path().ends_with("/l/") {
        let encoded = link
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())?;
        Url::parse(&encoded).ok()?
    } else if same_site(link.host_str(), endpoint.host_str())
        || same_site(link.host_str(), Some("duckduckgo.com"))
    {
        // Ads and internal navigation point back at the search host
        return None;
    } else {
        link
    };

    matches!(target.scheme(), "http" | "https").then_some(target)
}

fn same_site(a: Option<&str>, b: Option<&str>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    a == b || a.ends_with(&format!(".{}", b)) || b.ends_with(&format!(".{}", a))
}
