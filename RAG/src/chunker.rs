//! Sentence-aligned chunking.
//!
//! Sentences are packed greedily into chunks whose measured size stays within
//! `max_size`. A sentence is never split: one that is larger than `max_size` on
//! its own becomes a chunk of its own.

use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::Chunk;
use crate::tokenizer::TextMeasure;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

// UAX #29 breaks after "Dr." when the next word is capitalised. "St." and
// "vs." are not listed: they end real sentences as often as not.
static TRAILING_ABBREVIATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)(?:mr|mrs|ms|dr|prof|sr|jr|cf|approx|e\.g|i\.e)\.$")
        .expect("abbreviation pattern is valid")
});

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Splits text into whitespace-normalized sentences, in order.
///
/// Whitespace is collapsed before segmentation, so hard-wrapped lines (as
/// produced by PDF extraction) do not end sentences.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut pending: Option<String> = None;

    let text = normalize_whitespace(text);
    for raw in text.unicode_sentences() {
        let sentence = normalize_whitespace(raw);
        if sentence.is_empty() {
            continue;
        }
        let sentence = match pending.take() {
            Some(prefix) => format!("{prefix} {sentence}"),
            None => sentence,
        };
        if TRAILING_ABBREVIATION.is_match(&sentence) {
            pending = Some(sentence);
        } else {
            sentences.push(sentence);
        }
    }

    if let Some(rest) = pending {
        sentences.push(rest);
    }
    sentences
}

/// Packs the sentences of `text` into chunks of at most `max_size`, as measured by `size_fn`.
pub fn chunk<F>(text: &str, max_size: usize, size_fn: F) -> Vec<String>
where
    F: Fn(&str) -> usize,
{
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_into_sentences(text) {
        let would_be_size = if current.is_empty() {
            size_fn(&sentence)
        } else {
            size_fn(&format!("{current} {sentence}"))
        };

        if would_be_size <= max_size {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
        } else if !current.is_empty() {
            chunks.push(current.trim().to_string());
            current = sentence;
        } else {
            current = sentence;
        }
    }

    if !current.is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}

/// A chunker bound to a size budget and a measure.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_size: usize,
    measure: TextMeasure,
}

impl Chunker {
    pub fn new(max_size: usize, measure: TextMeasure) -> Self {
        Self {
            max_size: max_size.max(1),
            measure,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        chunk(text, self.max_size, |s| self.measure.measure(s))
    }

    pub fn chunk_document(&self, source_name: &str, text: &str) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self
            .chunk_text(text)
            .into_iter()
            .enumerate()
            .map(|(sequence_index, text)| Chunk {
                sequence_index,
                text,
                source_name: source_name.to_string(),
            })
            .collect();

        log::info!("Created {} chunks for {}", chunks.len(), source_name);
        chunks
    }
}
