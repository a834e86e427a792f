#[cfg(test)]
mod tests;

use anyhow::{Result, anyhow};
use fancy_regex::Regex;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Elements that never carry readable content
const ALWAYS_REMOVED: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "template", "object", "embed",
];

/// Elements whose text becomes a block of its own
const BLOCK_TAGS: &[&str] = &[
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "p",
    "li",
    "blockquote",
    "pre",
    "td",
    "th",
    "dt",
    "dd",
    "figcaption",
];

/// Elements whose text flows into the surrounding paragraph
const INLINE_TAGS: &[&str] = &[
    "span", "strong", "b", "em", "i", "u", "code", "small", "sup", "sub", "abbr", "mark",
    "label", "time", "cite", "q", "kbd", "var", "s", "del", "ins", "font",
];

/// Elements never removed as overlays, even when their class says so
const OVERLAY_PROTECTED: &[&str] = &["html", "head", "body", "main", "article"];

const SOCIAL_MEDIA_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "instagram.com",
    "pinterest.com",
    "tiktok.com",
    "snapchat.com",
    "reddit.com",
    "tumblr.com",
    "whatsapp.com",
];

static OVERLAY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?<![a-z])(modal|popup|pop-up|overlay|lightbox|cookie|consent|gdpr|newsletter|subscribe-box|interstitial)(?![a-z])",
    )
    .expect("valid regex")
});

static FIXED_POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)position\s*:\s*(fixed|sticky)").expect("valid regex"));

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

static HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2").expect("valid selector"));

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

static MARKED_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[class], [id], [style], [role], [aria-modal]").expect("valid selector"));

/// What to strip from a document before its text is extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Structural tags removed together with their content
    pub excluded_tags: Vec<String>,
    /// Drop links that point at social networks
    pub exclude_social_media_links: bool,
    /// Drop modals, cookie banners and other fixed overlays
    pub remove_overlay_elements: bool,
}

impl Default for ExtractionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            excluded_tags: ["nav", "footer", "header", "form", "img", "a"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            exclude_social_media_links: true,
            remove_overlay_elements: true,
        }
    }
}

impl From<&super::CrawlerConfig> for ExtractionConfig {
    #[inline]
    fn from(config: &super::CrawlerConfig) -> Self {
        Self {
            excluded_tags: config.excluded_tags.clone(),
            exclude_social_media_links: config.exclude_social_media_links,
            remove_overlay_elements: config.remove_overlay_elements,
        }
    }
}

/// A run of text taken from one block-level element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Lowercase tag name of the element the text came from
    pub tag: String,
    pub text: String,
}

impl TextBlock {
    #[inline]
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
        }
    }
}

/// Page content after structural noise has been removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// The page title
    pub title: String,
    /// Text blocks in document order
    pub blocks: Vec<TextBlock>,
    /// Markdown projection of every block
    pub raw_markdown: String,
}

/// Strip non-content elements from `html` and split what remains into text blocks
#[inline]
pub fn extract_content(html: &str, config: &ExtractionConfig) -> Result<ExtractedContent> {
    let mut document = Html::parse_document(html);
    let title = extract_title(&document);

    remove_excluded_tags(&mut document, &config.excluded_tags)?;
    if config.exclude_social_media_links {
        remove_social_media_links(&mut document);
    }
    if config.remove_overlay_elements {
        remove_overlay_elements(&mut document);
    }

    let blocks = extract_blocks(&document);
    let raw_markdown = render_markdown(&blocks);

    debug!(
        "Extracted content: title='{}', {} blocks, {} chars markdown",
        title,
        blocks.len(),
        raw_markdown.len()
    );

    Ok(ExtractedContent {
        title,
        blocks,
        raw_markdown,
    })
}

/// Render blocks as markdown, one paragraph per block
#[inline]
pub fn render_markdown(blocks: &[TextBlock]) -> String {
    blocks
        .iter()
        .filter(|block| !block.text.trim().is_empty())
        .map(|block| match block.tag.as_str() {
            "h1" => format!("# {}", block.text),
            "h2" => format!("## {}", block.text),
            "h3" => format!("### {}", block.text),
            "h4" => format!("#### {}", block.text),
            "h5" => format!("##### {}", block.text),
            "h6" => format!("###### {}", block.text),
            "li" => format!("- {}", block.text),
            "blockquote" => format!("> {}", block.text),
            "pre" => format!("```\n{}\n```", block.text),
            _ => block.text.clone(),
        })
        .join("\n\n")
}

fn extract_title(document: &Html) -> String {
    document
        .select(&TITLE_SELECTOR)
        .chain(document.select(&HEADING_SELECTOR))
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .find(|title| !title.is_empty())
        .unwrap_or_else(|| "Untitled Document".to_string())
}

fn remove_excluded_tags(document: &mut Html, excluded_tags: &[String]) -> Result<()> {
    let tags = ALWAYS_REMOVED
        .iter()
        .copied()
        .chain(excluded_tags.iter().map(String::as_str))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .unique()
        .join(", ");

    let selector =
        Selector::parse(&tags).map_err(|e| anyhow!("Invalid excluded tag list '{}': {:?}", tags, e))?;

    remove_matching(document, &selector, |_| true);
    Ok(())
}

fn remove_social_media_links(document: &mut Html) {
    remove_matching(document, &LINK_SELECTOR, |element| {
        element
            .value()
            .attr("href")
            .and_then(|href| Url::parse(href).ok())
            .is_some_and(|url| is_social_media_url(&url))
    });
}

fn remove_overlay_elements(document: &mut Html) {
    remove_matching(document, &MARKED_SELECTOR, is_overlay);
}

/// Detach every element matched by `selector` for which `predicate` holds
fn remove_matching<F>(document: &mut Html, selector: &Selector, predicate: F)
where
    F: Fn(&ElementRef<'_>) -> bool,
{
    let node_ids: Vec<_> = document
        .select(selector)
        .filter(|element| predicate(element))
        .map(|element| element.id())
        .collect();

    for node_id in node_ids {
        if let Some(mut node) = document.tree.get_mut(node_id) {
            node.detach();
        }
    }
}

#[inline]
pub(crate) fn is_social_media_url(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_start_matches("www.");
    SOCIAL_MEDIA_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn is_overlay(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if OVERLAY_PROTECTED.contains(&value.name()) {
        return false;
    }

    if value.attr("aria-modal") == Some("true")
        || matches!(value.attr("role"), Some("dialog" | "alertdialog"))
    {
        return true;
    }

    let marked = |attr: Option<&str>| {
        attr.is_some_and(|text| matches!(OVERLAY_MARKER.is_match(text), Ok(true)))
    };
    if marked(value.attr("class")) || marked(value.attr("id")) {
        return true;
    }

    value
        .attr("style")
        .is_some_and(|style| matches!(FIXED_POSITION.is_match(style), Ok(true)))
}

fn extract_blocks(document: &Html) -> Vec<TextBlock> {
    let root = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut blocks = Vec::new();
    let mut loose_text = String::new();
    collect_blocks(root, &mut blocks, &mut loose_text);
    flush_loose_text(&mut blocks, &mut loose_text);
    blocks
}

/// Depth-first walk. Text outside any block element is gathered into
/// paragraph blocks, closed at the edges of every non-inline element.
fn collect_blocks(element: ElementRef<'_>, blocks: &mut Vec<TextBlock>, loose_text: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            loose_text.push_str(text);
            continue;
        }

        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child.value().name();

        if BLOCK_TAGS.contains(&name) {
            flush_loose_text(blocks, loose_text);
            let raw: String = child.text().collect();
            let text = if name == "pre" {
                raw.trim().to_string()
            } else {
                collapse_whitespace(&raw)
            };
            if !text.is_empty() {
                blocks.push(TextBlock::new(block_tag(child), text));
            }
        } else if INLINE_TAGS.contains(&name) {
            collect_blocks(child, blocks, loose_text);
        } else {
            flush_loose_text(blocks, loose_text);
            collect_blocks(child, blocks, loose_text);
            flush_loose_text(blocks, loose_text);
        }
    }
}

/// A paragraph made up entirely of one emphasised run is weighted like the emphasis
fn block_tag<'a>(element: ElementRef<'a>) -> &'a str {
    let name = element.value().name();
    if name != "p" {
        return name;
    }

    let mut child_elements = element.children().filter_map(ElementRef::wrap);
    let has_loose_text = element
        .children()
        .filter_map(|child| child.value().as_text())
        .any(|text| !text.trim().is_empty());

    match (child_elements.next(), child_elements.next(), has_loose_text) {
        (Some(only), None, false)
            if matches!(only.value().name(), "strong" | "b" | "em" | "code") =>
        {
            only.value().name()
        }
        _ => name,
    }
}

fn flush_loose_text(blocks: &mut Vec<TextBlock>, loose_text: &mut String) {
    let text = collapse_whitespace(loose_text);
    if !text.is_empty() {
        blocks.push(TextBlock::new("div", text));
    }
    loose_text.clear();
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}
