//! Lexical relevance filtering of extracted page text.
//!
//! Every text block is split into sentence passages, and each passage is
//! scored against the active question with Okapi BM25 computed over all
//! passages of the same page. The score is scaled by a weight for the tag
//! the passage came from, so headings and emphasised text survive more easily.
//! Passages scoring at or above the threshold are kept in document order.


use fancy_regex::Regex;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

use super::extractor::TextBlock;

/// Default minimum weighted score for a passage to be kept
pub const DEFAULT_THRESHOLD: f64 = 1.2;

const K1: f64 = 1.2;
const B: f64 = 0.75;

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=[.!?])\s+").expect("valid regex"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
        "are", "as", "at", "be", "because", "been", "before", "being", "below", "between",
        "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during",
        "each", "few", "for", "from", "further", "had", "has", "have", "having", "he", "her",
        "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into",
        "is", "it", "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "nor",
        "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours",
        "ourselves", "out", "over", "own", "same", "she", "should", "so", "some", "such",
        "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
        "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
        "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom",
        "why", "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Scores passages against a question and drops those below the threshold
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    query_terms: Vec<String>,
    threshold: f64,
}

/// One sentence-sized unit of text with the tag it came from
#[derive(Debug, Clone, PartialEq)]
struct Passage<'a> {
    block: usize,
    tag: &'a str,
    text: &'a str,
    terms: Vec<String>,
}

impl RelevanceFilter {
    #[inline]
    pub fn new(query: &str, threshold: f64) -> Self {
        let query_terms = tokenize(query).into_iter().unique().collect();
        Self {
            query_terms,
            threshold,
        }
    }

    /// Normalized terms of the question that take part in scoring
    #[inline]
    pub fn query_terms(&self) -> &[String] {
        &self.query_terms
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Keep only the passages of `blocks` relevant to the question.
    ///
    /// Blocks keep their tag; a block whose passages all fall below the
    /// threshold disappears. A question with no usable terms cannot rank
    /// anything, so every block is kept.
    #[inline]
    pub fn filter_blocks(&self, blocks: &[TextBlock]) -> Vec<TextBlock> {
        if self.query_terms.is_empty() {
            debug!("Query has no scoreable terms, keeping all {} blocks", blocks.len());
            return blocks.to_vec();
        }

        let passages = split_passages(blocks);
        let scores = self.score(&passages);

        let mut kept: Vec<TextBlock> = Vec::new();
        let mut kept_passages = 0;
        let mut last_block = None;
        for (passage, score) in passages.iter().zip(scores) {
            if score < self.threshold {
                continue;
            }
            kept_passages += 1;

            match kept.last_mut() {
                Some(block) if last_block == Some(passage.block) => {
                    block.text.push(' ');
                    block.text.push_str(passage.text);
                }
                _ => kept.push(TextBlock::new(passage.tag, passage.text)),
            }
            last_block = Some(passage.block);
        }

        debug!(
            "Relevance filter kept {} of {} passages",
            kept_passages,
            passages.len()
        );
        kept
    }

    /// Weighted BM25 score of each passage, in input order
    fn score(&self, passages: &[Passage<'_>]) -> Vec<f64> {
        if passages.is_empty() {
            return Vec::new();
        }

        let passage_count = passages.len() as f64;
        let total_len: usize = passages.iter().map(|p| p.terms.len()).sum();
        let avg_len = total_len as f64 / passage_count;
        if avg_len == 0.0 {
            return vec![0.0; passages.len()];
        }

        let idf: HashMap<&str, f64> = self
            .query_terms
            .iter()
            .map(|term| {
                let df = passages
                    .iter()
                    .filter(|p| p.terms.iter().any(|t| t == term))
                    .count() as f64;
                let idf = ((passage_count + 1.0) / (df + 0.5)).ln() + 1.0;
                (term.as_str(), idf)
            })
            .collect();

        passages
            .iter()
            .map(|passage| {
                let len = passage.terms.len() as f64;
                let norm = K1 * (1.0 - B + B * len / avg_len);
                let bm25: f64 = self
                    .query_terms
                    .iter()
                    .map(|term| {
                        let tf = passage.terms.iter().filter(|t| *t == term).count() as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        idf.get(term.as_str()).copied().unwrap_or_default() * tf * (K1 + 1.0)
                            / (tf + norm)
                    })
                    .sum();
                bm25 * tag_weight(passage.tag)
            })
            .collect()
    }

    /// Every passage of `blocks` with its weighted score, in document order
    #[inline]
    pub fn score_passages(&self, blocks: &[TextBlock]) -> Vec<(String, f64)> {
        let passages = split_passages(blocks);
        let scores = self.score(&passages);
        passages
            .into_iter()
            .zip(scores)
            .map(|(passage, score)| (passage.text.to_string(), score))
            .collect()
    }
}

fn split_passages(blocks: &[TextBlock]) -> Vec<Passage<'_>> {
    blocks
        .iter()
        .enumerate()
        .flat_map(|(index, block)| {
            let sentences = if block.tag == "pre" {
                vec![block.text.trim()]
            } else {
                split_sentences(&block.text)
            };
            sentences.into_iter().map(move |text| Passage {
                block: index,
                tag: block.tag.as_str(),
                text,
                terms: tokenize(text),
            })
        })
        .collect()
}

/// Split text after sentence terminators that are followed by whitespace
#[inline]
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text).flatten() {
        #[expect(
            clippy::string_slice,
            reason = "regex match offsets are on char boundaries"
        )]
        let sentence = text[start..boundary.start()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    #[expect(
        clippy::string_slice,
        reason = "regex match offsets are on char boundaries"
    )]
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Lowercase alphanumeric words with stop words removed and plurals folded
#[inline]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(word.as_str()))
        .map(fold_plural)
        .collect()
}

fn fold_plural(word: String) -> String {
    if word.chars().count() <= 3 {
        return word;
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word;
    }
    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word,
    }
}

/// Multiplier applied to passages taken from emphasised elements
#[inline]
pub fn tag_weight(tag: &str) -> f64 {
    match tag {
        "h1" => 5.0,
        "h2" => 4.0,
        "h3" => 3.0,
        "title" => 4.0,
        "strong" | "blockquote" | "code" => 2.0,
        "b" | "em" | "pre" | "th" => 1.5,
        _ => 1.0,
    }
}
