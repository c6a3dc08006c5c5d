use crate::error::IngestError;
use crate::models::SessionOptions;
use std::collections::VecDeque;
use std::ops::Range;

/// Paragraph, line, sentence, word, then raw characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<&SessionOptions> for ChunkingConfig {
    fn from(value: &SessionOptions) -> Self {
        Self {
            max_chars: value.chunk_size,
            overlap_chars: value.chunk_overlap,
        }
    }
}

/// Recursive character splitter.
///
/// Chunks are contiguous spans of the input. A chunk never exceeds
/// `max_chars` characters, and each chunk after the first starts with at
/// most `overlap_chars` characters repeated from the end of its predecessor.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        if config.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if config.overlap_chars >= config.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max_chars {}",
                config.overlap_chars, config.max_chars
            )));
        }

        Ok(Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|sep| sep.to_string()).collect(),
        })
    }

    pub fn with_separators(mut self, separators: &[&str]) -> Self {
        self.separators = separators.iter().map(|sep| sep.to_string()).collect();
        self
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|span| text[span].to_string())
            .collect()
    }

    /// Byte ranges of each chunk within `text`.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut atoms = Vec::new();
        self.atomize(text, 0, &self.separators, &mut atoms);
        self.merge(text, atoms)
    }

    fn atomize(&self, text: &str, base: usize, separators: &[String], out: &mut Vec<Range<usize>>) {
        if char_len(text) <= self.config.max_chars {
            out.push(base..base + text.len());
            return;
        }

        let found = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()));

        let Some(position) = found else {
            hard_cut(text, base, self.config.max_chars, out);
            return;
        };

        let separator = separators[position].as_str();
        if separator.is_empty() {
            hard_cut(text, base, self.config.max_chars, out);
            return;
        }

        let finer = &separators[position + 1..];
        let mut start = 0;
        for (index, matched) in text.match_indices(separator) {
            // the separator stays attached to the piece it terminates
            let end = index + matched.len();
            self.atomize(&text[start..end], base + start, finer, out);
            start = end;
        }
        if start < text.len() {
            self.atomize(&text[start..], base + start, finer, out);
        }
    }

    fn merge(&self, text: &str, atoms: Vec<Range<usize>>) -> Vec<Range<usize>> {
        let max = self.config.max_chars;
        let overlap = self.config.overlap_chars;

        let mut chunks = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut window_chars = 0usize;

        for atom in atoms {
            let atom_chars = char_len(&text[atom.clone()]);

            if !window.is_empty() && window_chars + atom_chars > max {
                if let Some(span) = window_span(&window) {
                    chunks.push(span);
                }

                while window_chars > overlap || (window_chars > 0 && window_chars + atom_chars > max) {
                    match window.pop_front() {
                        Some((_, dropped)) => window_chars -= dropped,
                        None => break,
                    }
                }
            }

            window_chars += atom_chars;
            window.push_back((atom, atom_chars));
        }

        if let Some(span) = window_span(&window) {
            chunks.push(span);
        }

        chunks
    }
}

fn window_span(window: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) => Some(first.0.start..last.0.end),
        _ => None,
    }
}

fn hard_cut(text: &str, base: usize, max_chars: usize, out: &mut Vec<Range<usize>>) {
    let mut start = 0;
    let mut count = 0;
    for (index, _) in text.char_indices() {
        if count == max_chars {
            out.push(base + start..base + index);
            start = index;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(base + start..base + text.len());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(max_chars: usize, overlap_chars: usize) -> TextSplitter {
        TextSplitter::new(ChunkingConfig {
            max_chars,
            overlap_chars,
        })
        .expect("valid config")
    }

    fn reconstruct(text: &str, spans: &[Range<usize>]) -> String {
        let mut rebuilt = String::new();
        let mut covered = 0;
        for span in spans {
            assert!(span.start <= covered, "gap before {span:?}");
            rebuilt.push_str(&text[covered.max(span.start)..span.end]);
            covered = span.end;
        }
        rebuilt
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = splitter(500, 50).split("The capital of France is Paris.\n");
        assert_eq!(chunks, vec!["The capital of France is Paris.\n".to_string()]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(splitter(500, 50).split("").is_empty());
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let chunks = splitter(20, 5).split("alpha beta\n\ngamma delta epsilon");
        assert_eq!(chunks, vec!["alpha beta\n\n", "gamma delta epsilon"]);
    }

    #[test]
    fn word_chunks_carry_bounded_overlap() {
        let chunks = splitter(10, 4).split("aa bb cc dd ee ff");
        assert_eq!(chunks, vec!["aa bb cc ", "cc dd ee ", "ee ff"]);
    }

    #[test]
    fn unbroken_text_falls_back_to_character_cuts() {
        let chunks = splitter(4, 1).split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn chunks_reconstruct_input_and_respect_bounds() {
        let mut text = String::new();
        for paragraph in 0..12 {
            for sentence in 0..7 {
                text.push_str(&format!(
                    "Paragraph {paragraph} sentence {sentence} mentions café résumé naïve terms. "
                ));
            }
            text.push_str("\n\n");
        }
        text.push_str(&"x".repeat(1_300));

        let splitter = splitter(500, 50);
        let spans = splitter.split_spans(&text);
        assert!(spans.len() > 1);
        assert_eq!(reconstruct(&text, &spans), text);

        for pair in spans.windows(2) {
            let overlap = &text[pair[1].start..pair[0].end.max(pair[1].start)];
            assert!(overlap.chars().count() <= 50);
            assert!(pair[1].end > pair[0].end);
        }
        for span in &spans {
            assert!(text[span.clone()].chars().count() <= 500);
        }
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(TextSplitter::new(ChunkingConfig {
            max_chars: 0,
            overlap_chars: 0,
        })
        .is_err());
        assert!(TextSplitter::new(ChunkingConfig {
            max_chars: 10,
            overlap_chars: 10,
        })
        .is_err());
    }

    #[test]
    fn custom_separators_are_honoured() {
        let chunks = splitter(6, 0)
            .with_separators(&[";", ""])
            .split("abc;def;ghi");
        assert_eq!(chunks, vec!["abc;", "def;", "ghi"]);
    }
}
