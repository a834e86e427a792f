
use anyhow::Result;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::HttpClient;

/// Agent name robots rules are evaluated for
pub const ROBOTS_AGENT: &str = "*";

/// Number of robots.txt files fetched at the same time
const MAX_CONCURRENT_ROBOTS_FETCHES: usize = 8;

/// Represents a robots.txt file and its rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsTxt {
    groups: Vec<Group>,
}

/// A run of `User-agent` lines and the rules that follow them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

impl RobotsTxt {
    /// Parse robots.txt content
    #[inline]
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut last_line_was_agent = false;

        for line in content.lines() {
            let Some((directive, value)) = parse_directive(line) else {
                continue;
            };

            match directive.to_lowercase().as_str() {
                "user-agent" => {
                    if !last_line_was_agent || groups.is_empty() {
                        groups.push(Group::default());
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_lowercase());
                    }
                    last_line_was_agent = true;
                }
                kind @ ("allow" | "disallow") => {
                    last_line_was_agent = false;
                    let Some(group) = groups.last_mut() else {
                        warn!("{} directive without User-agent: {}", directive, line.trim());
                        continue;
                    };
                    // An empty pattern matches nothing
                    if value.is_empty() {
                        continue;
                    }
                    group.rules.push(Rule {
                        allow: kind == "allow",
                        pattern: value.to_string(),
                    });
                }
                _ => {
                    debug!("Ignoring robots.txt directive: {}: {}", directive, value);
                }
            }
        }

        Self { groups }
    }

    /// Check if a URL is allowed to be crawled by the given user agent.
    ///
    /// Rules come from every group naming the agent, or from the `*` groups
    /// when none does. The longest matching pattern decides; on a tie
    /// `Allow` wins. A URL no rule matches is allowed.
    #[inline]
    pub fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let user_agent = user_agent.to_lowercase();

        let specific: Vec<&Group> = self
            .groups
            .iter()
            .filter(|group| {
                group
                    .agents
                    .iter()
                    .any(|agent| agent != "*" && user_agent.contains(agent.as_str()))
            })
            .collect();
        let groups = if specific.is_empty() {
            self.groups
                .iter()
                .filter(|group| group.agents.iter().any(|agent| agent == "*"))
                .collect()
        } else {
            specific
        };

        let decisive = groups
            .iter()
            .flat_map(|group| group.rules.iter())
            .filter(|rule| path_matches_pattern(&target, &rule.pattern))
            .max_by_key(|rule| (rule.pattern.len(), rule.allow));

        match decisive {
            Some(rule) => {
                debug!(
                    "URL {} {} by pattern: {}",
                    url,
                    if rule.allow { "allowed" } else { "disallowed" },
                    rule.pattern
                );
                rule.allow
            }
            None => true,
        }
    }

    /// Get the robots.txt URL for the origin of `url`
    #[inline]
    pub fn robots_url(url: &Url) -> Url {
        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);
        let _ = robots_url.set_username("");
        let _ = robots_url.set_password(None);
        robots_url
    }
}

/// Parse a robots.txt directive line, dropping comments
fn parse_directive(line: &str) -> Option<(&str, &str)> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let (directive, value) = line.split_once(':')?;
    Some((directive.trim(), value.trim()))
}

/// Check if a path matches a robots.txt pattern with `*` wildcards and a `$` end anchor
fn path_matches_pattern(path: &str, pattern: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(pattern) => (pattern, true),
        None => (pattern, false),
    };

    let mut segments = pattern.split('*');
    let first = segments.next().unwrap_or_default();
    let Some(mut rest) = path.strip_prefix(first) else {
        return false;
    };

    let segments: Vec<&str> = segments.collect();
    let Some((last, middle)) = segments.split_last() else {
        return !anchored || rest.is_empty();
    };

    for segment in middle {
        match rest
            .find(segment)
            .and_then(|position| rest.get(position + segment.len()..))
        {
            Some(remaining) => rest = remaining,
            None => return false,
        }
    }

    if anchored {
        rest.ends_with(last)
    } else {
        rest.contains(last)
    }
}

/// What governs crawling of one origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsPolicy {
    /// robots.txt was retrieved and its rules apply
    Rules(RobotsTxt),
    /// robots.txt could not be retrieved, so every URL on the origin is allowed
    FailOpen { reason: String },
}

impl RobotsPolicy {
    #[inline]
    pub fn allows(&self, url: &Url, user_agent: &str) -> bool {
        match self {
            Self::Rules(robots) => robots.is_allowed(url, user_agent),
            Self::FailOpen { .. } => true,
        }
    }
}

/// Fetch and parse robots.txt for the origin of `url`
#[inline]
pub async fn fetch_robots_txt(http_client: &HttpClient, url: &Url) -> Result<RobotsTxt> {
    let robots_url = RobotsTxt::robots_url(url);

    debug!("Fetching robots.txt from: {}", robots_url);
    let content = http_client.fetch(&robots_url).await?;
    debug!("Successfully fetched robots.txt ({} bytes)", content.len());

    Ok(RobotsTxt::parse(&content))
}

/// Filters candidate URLs by each origin's robots policy for the generic agent
#[derive(Debug, Clone)]
pub struct RobotsGate {
    http_client: HttpClient,
}

impl RobotsGate {
    #[inline]
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    /// Resolve the policy for the origin of `url`. Never fails: any problem
    /// retrieving robots.txt resolves to [`RobotsPolicy::FailOpen`].
    #[inline]
    pub async fn policy_for(&self, url: &Url) -> RobotsPolicy {
        match fetch_robots_txt(&self.http_client, url).await {
            Ok(robots) => RobotsPolicy::Rules(robots),
            Err(e) => {
                debug!("robots.txt unavailable for {}, failing open: {:#}", url, e);
                RobotsPolicy::FailOpen {
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    /// Keep the URLs robots rules permit, in input order. Each origin's
    /// robots.txt is fetched once.
    #[inline]
    pub async fn filter(&self, urls: &[Url]) -> Vec<Url> {
        let mut origins: Vec<(String, &Url)> = Vec::new();
        for url in urls {
            let origin = url.origin().ascii_serialization();
            if !origins.iter().any(|(known, _)| *known == origin) {
                origins.push((origin, url));
            }
        }

        let policies: HashMap<String, RobotsPolicy> = futures::stream::iter(origins)
            .map(|(origin, url)| async move { (origin, self.policy_for(url).await) })
            .buffer_unordered(MAX_CONCURRENT_ROBOTS_FETCHES)
            .collect()
            .await;

        let allowed: Vec<Url> = urls
            .iter()
            .filter(|url| {
                let origin = url.origin().ascii_serialization();
                let permitted = policies
                    .get(&origin)
                    .is_none_or(|policy| policy.allows(url, ROBOTS_AGENT));
                if !permitted {
                    info!("Skipping {} (disallowed by robots.txt)", url);
                }
                permitted
            })
            .cloned()
            .collect();

        info!(
            "{} of {} URLs allowed by robots policies",
            allowed.len(),
            urls.len()
        );
        allowed
    }
}
