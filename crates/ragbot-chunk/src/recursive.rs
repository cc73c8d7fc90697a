//! Recursive character splitter.
//!
//! Splits text on the coarsest separator present, recursing into pieces
//! that are still too long, then greedily merges pieces back up to the
//! chunk size with a character overlap between neighbours.

use std::collections::VecDeque;

use tracing::debug;

use ragbot_core::{RagError, Result, Splitter, SplitterConfig};

/// Separators tried in order: paragraphs, lines, words, characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Character-count splitter with overlap.
///
/// Lengths are counted in `char`s, not bytes.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    /// Create a splitter. Fails if `chunk_size` is zero or smaller than
    /// `chunk_overlap`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::chunking("chunk_size must be positive"));
        }
        if chunk_overlap > chunk_size {
            return Err(RagError::chunking(format!(
                "chunk_overlap ({}) exceeds chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &SplitterConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len(), ""));
        let remaining = separators.get(idx + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_by_separator(text, separator) {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }

        chunks
    }

    /// Greedily join pieces up to `chunk_size`, keeping up to
    /// `chunk_overlap` characters of trailing pieces for the next chunk.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>, total: usize| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&window, total) > self.chunk_size && !window.is_empty() {
                push_chunk(&mut chunks, &window, separator);

                while total > self.chunk_overlap
                    || (joined_len(&window, total) > self.chunk_size && total > 0)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }

        push_chunk(&mut chunks, &window, separator);
        chunks
    }
}

impl Splitter for RecursiveSplitter {
    fn split(&self, text: &str) -> Result<Vec<String>> {
        let chunks = self.split_recursive(text, &SEPARATORS);
        debug!(
            "Split {} chars into {} chunks (size {}, overlap {})",
            char_len(text),
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );
        Ok(chunks)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn split_by_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    text.split(separator).filter(|s| !s.is_empty()).collect()
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = RecursiveSplitter::new(100, 10).unwrap();
        let chunks = splitter.split("Hello, world!").unwrap();
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_text() {
        let splitter = RecursiveSplitter::new(100, 10).unwrap();
        assert!(splitter.split("").unwrap().is_empty());
        assert!(splitter.split("  \n\n  ").unwrap().is_empty());
    }

    #[test]
    fn test_paragraphs_split_first() {
        let splitter = RecursiveSplitter::new(5, 0).unwrap();
        let chunks = splitter.split("aaa\n\nbbb\n\nccc").unwrap();
        assert_eq!(chunks, vec!["aaa", "bbb", "ccc"]);
    }

    #[test]
    fn test_word_overlap() {
        let splitter = RecursiveSplitter::new(10, 5).unwrap();
        let chunks = splitter.split("one two three four five six").unwrap();
        assert_eq!(
            chunks,
            vec!["one two", "two three", "three four", "four five", "five six"]
        );
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = RecursiveSplitter::new(40, 8).unwrap();
        let text = "The quick brown fox jumps over the lazy dog.\n".repeat(20);

        let chunks = splitter.split(&text).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
    }

    #[test]
    fn test_long_word_split_by_character() {
        let splitter = RecursiveSplitter::new(4, 0).unwrap();
        let chunks = splitter.split("abcdefghij").unwrap();
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let splitter = RecursiveSplitter::new(3, 0).unwrap();
        let chunks = splitter.split("héé ééé").unwrap();
        assert_eq!(chunks, vec!["héé", "ééé"]);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            RecursiveSplitter::new(10, 11),
            Err(RagError::Chunking { .. })
        ));
        assert!(RecursiveSplitter::new(0, 0).is_err());

        let config = SplitterConfig::default();
        let splitter = RecursiveSplitter::from_config(&config).unwrap();
        assert_eq!(splitter.chunk_size(), 500);
    }
}
