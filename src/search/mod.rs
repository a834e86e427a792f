// Web search module
// Turns a question into a bounded, ranked list of candidate URLs

pub mod duckduckgo;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{Result, SeekifyError};

pub use duckduckgo::DuckDuckGoProvider;

/// Settings for result discovery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Search endpoint (DuckDuckGo HTML interface by default)
    pub endpoint: String,
    /// Maximum number of candidate URLs per query
    pub max_results: usize,
    /// Domains excluded from every search with `-site:` clauses
    pub excluded_domains: Vec<String>,
    /// User agent sent to the search endpoint
    pub user_agent: String,
    /// Timeout for the search request in seconds
    pub timeout_seconds: u64,
}

impl Default for SearchConfig {
    #[inline]
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            max_results: 10,
            excluded_domains: vec![
                "youtube.com".to_string(),
                "britannica.com".to_string(),
                "vimeo.com".to_string(),
            ],
            user_agent: crate::crawler::BROWSER_USER_AGENT.to_string(),
            timeout_seconds: 15,
        }
    }
}

/// A general web search backend.
///
/// Implementations return every result URL of one results page in
/// provider-ranked order; capping is left to the caller. Any failure to
/// reach the provider or to make sense of its answer must be reported as
/// [`SeekifyError::Discovery`]; an empty `Ok` means the search genuinely found nothing.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Url>>;

    fn name(&self) -> &'static str;
}

/// Issues keyword searches with the domain blocklist applied
pub struct ResultDiscovery {
    provider: Box<dyn SearchProvider>,
    excluded_domains: Vec<String>,
}

impl ResultDiscovery {
    #[inline]
    pub fn new(provider: Box<dyn SearchProvider>, excluded_domains: Vec<String>) -> Self {
        Self {
            provider,
            excluded_domains,
        }
    }

    /// Build discovery on top of the DuckDuckGo provider
    #[inline]
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let provider = DuckDuckGoProvider::new(config)?;
        Ok(Self::new(
            Box::new(provider),
            config.excluded_domains.clone(),
        ))
    }

    /// Append one `-site:` clause per excluded domain
    #[inline]
    pub fn build_search_term(&self, term: &str) -> String {
        let mut search_term = term.trim().to_string();
        for domain in &self.excluded_domains {
            search_term.push_str(" -site:");
            search_term.push_str(domain);
        }
        search_term
    }

    /// Search for `term` and return at most `max_results` candidate URLs
    #[inline]
    pub async fn discover(&self, term: &str, max_results: usize) -> Result<Vec<Url>> {
        if term.trim().is_empty() {
            return Err(SeekifyError::Discovery(
                "search term cannot be empty".to_string(),
            ));
        }

        let search_term = self.build_search_term(term);
        debug!(
            "Searching {} for: {}",
            self.provider.name(),
            search_term
        );

        let results = self.provider.search(&search_term).await?;

        let mut urls: Vec<Url> = Vec::with_capacity(results.len().min(max_results));
        for url in results {
            if self.is_excluded(&url) {
                debug!("Dropping result from excluded domain: {}", url);
                continue;
            }
            if urls.contains(&url) {
                continue;
            }
            urls.push(url);
            if urls.len() == max_results {
                break;
            }
        }

        info!(
            "Discovered {} candidate URLs via {}",
            urls.len(),
            self.provider.name()
        );
        Ok(urls)
    }

    /// Providers do not always honour `-site:`, so results are checked again here
    fn is_excluded(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        let host = host.trim_start_matches("www.");
        self.excluded_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
