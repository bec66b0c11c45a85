//! Text segmentation into speakable chunks.
//!
//! Paragraphs (separated by blank lines) are kept whole when they fit the chunk size,
//! otherwise they fall back to sentence splitting on terminal punctuation.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Two or more consecutive line breaks (LF or CRLF).
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:\r?\n){2,}").expect("valid paragraph regex"));

/// A contiguous, independently synthesizable unit of input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Split text into ordered chunks of at most `max_chunk_size` characters where possible.
///
/// Paragraphs longer than the limit are re-split into sentences. The sentence splitter
/// does not re-check the limit, so a single run-on sentence is still emitted whole.
///
/// # Arguments
/// * `text` - Raw input text
/// * `max_chunk_size` - Maximum characters per paragraph chunk
///
/// # Returns
/// Chunks indexed from 0 in playback order. Empty for blank input.
pub fn segment(text: &str, max_chunk_size: usize) -> Vec<Chunk> {
    let mut pieces = Vec::new();

    for paragraph in PARAGRAPH_BREAK.split(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.chars().count() > max_chunk_size {
            pieces.extend(split_sentences(paragraph));
        } else {
            pieces.push(paragraph.to_string());
        }
    }

    pieces.into_iter().enumerate().map(|(index, text)| Chunk { index, text }).collect()
}

/// Split text into sentences, closing one at each `.`, `!` or `?`.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);

        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    // Trailing text without a terminal mark
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}
