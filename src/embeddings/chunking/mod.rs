
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};
use url::Url;

use crate::crawler::Page;

/// Separators tried in order: paragraphs, lines, sentence ends, words, characters
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ".", "?", "!", " ", ""];

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 100,
        }
    }
}

/// A bounded piece of page text, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source_url: Url,
    /// Position of the chunk within its page
    pub sequence_index: usize,
}

impl Chunk {
    /// Stable identity `{normalized_source_url}_{sequence_index}`.
    ///
    /// Re-chunking the same page yields the same identities, so indexing it
    /// again overwrites instead of duplicating.
    #[inline]
    pub fn id(&self) -> String {
        format!(
            "{}_{}",
            normalized_url(self.source_url.as_str()),
            self.sequence_index
        )
    }
}

/// Flatten a URL into an identifier prefix.
///
/// Scheme and `www.` are dropped, so `https://www.a.com/x` and
/// `https://a.com/x` map to the same prefix.
#[inline]
pub fn normalized_url(url: &str) -> String {
    url.replace("https://", "")
        .replace("http://", "")
        .replace("www.", "")
        .replace(['/', '-', '.'], "_")
}

/// Splits text on the highest-priority separator that occurs in it, recursing
/// into pieces that are still too long, then merges small pieces back up to
/// the chunk size with overlap between neighbours. Lengths are in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: config.chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[inline]
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Split `text` into trimmed, non-empty chunks in document order
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or_default();
        let mut remaining: &[String] = &[];
        for (index, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = separators.get(index + 1..).unwrap_or_default();
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut short_splits: Vec<&str> = Vec::new();

        for split in split_keeping_separator(text, separator) {
            if char_len(split) < self.chunk_size {
                short_splits.push(split);
                continue;
            }

            if !short_splits.is_empty() {
                chunks.extend(self.merge_splits(&short_splits));
                short_splits.clear();
            }

            if remaining.is_empty() {
                chunks.push(split.to_string());
            } else {
                chunks.extend(self.split_recursive(split, remaining));
            }
        }

        if !short_splits.is_empty() {
            chunks.extend(self.merge_splits(&short_splits));
        }

        chunks
    }

    /// Greedily pack splits into chunks, carrying up to `chunk_overlap`
    /// characters of trailing splits into the next chunk
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for split in splits {
            let len = char_len(split);

            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }

                if !current.is_empty() {
                    if let Some(chunk) = join_trimmed(current.iter().map(|(text, _)| *text)) {
                        chunks.push(chunk);
                    }

                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        match current.pop_front() {
                            Some((_, front_len)) => total -= front_len,
                            None => break,
                        }
                    }
                }
            }

            current.push_back((split, len));
            total += len;
        }

        if let Some(chunk) = join_trimmed(current.iter().map(|(text, _)| *text)) {
            chunks.push(chunk);
        }

        chunks
    }
}

/// Split after each occurrence of `separator`, keeping the separator at the
/// start of the following piece. An empty separator splits into characters.
#[expect(
    clippy::string_slice,
    reason = "indices come from match_indices and char_indices"
)]
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(index, c)| &text[index..index + c.len_utf8()])
            .collect();
    }

    let mut splits = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            splits.push(&text[start..index]);
        }
        start = index;
    }
    splits.push(&text[start..]);

    splits.retain(|split| !split.is_empty());
    splits
}

fn join_trimmed<'a>(pieces: impl Iterator<Item = &'a str>) -> Option<String> {
    let joined: String = pieces.collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Project markdown onto plain text: one paragraph per block element, markup removed
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, blocks: &mut Vec<String>| {
        let text = current.trim();
        if !text.is_empty() {
            blocks.push(text.to_string());
        }
        current.clear();
    };

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Item | Tag::CodeBlock(_) | Tag::Heading { .. }) => {
                flush(&mut current, &mut blocks);
            }
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::TableHead
                | TagEnd::TableRow,
            ) => flush(&mut current, &mut blocks),
            Event::End(TagEnd::TableCell) => current.push(' '),
            Event::Text(text) | Event::Code(text) => current.push_str(&text),
            Event::SoftBreak => current.push(' '),
            Event::HardBreak => current.push('\n'),
            _ => {}
        }
    }
    flush(&mut current, &mut blocks);

    blocks.join("\n\n")
}

/// Split a page's relevant text into chunks. Empty text yields no chunks.
#[inline]
pub fn chunk_page(page: &Page, splitter: &RecursiveSplitter) -> Vec<Chunk> {
    let text = markdown_to_text(&page.fit_markdown);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunks: Vec<Chunk> = splitter
        .split_text(&text)
        .into_iter()
        .enumerate()
        .map(|(sequence_index, text)| Chunk {
            text,
            source_url: page.url.clone(),
            sequence_index,
        })
        .collect();

    debug!("Chunked {} into {} chunks", page.url, chunks.len());
    chunks
}
