use crate::chunk::Chunk;

/// Only windows larger than this look for a sentence boundary.
const MIN_BOUNDARY_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Window size in characters; 0 disables chunking
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
        }
    }
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        // overlap must stay strictly below the window
        let overlap = config.overlap.min(config.chunk_size.saturating_sub(1));
        Self {
            config: ChunkerConfig {
                chunk_size: config.chunk_size,
                overlap,
            },
        }
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Split `text` into trimmed, non-empty segments, preferring to end each
    /// one on a sentence terminator.
    pub fn split(&self, text: &str) -> Vec<String> {
        let ChunkerConfig {
            chunk_size,
            overlap,
        } = self.config;

        if chunk_size == 0 {
            return vec![text.to_string()];
        }

        // Work on chars so a window never ends inside a multibyte sequence
        let chars: Vec<char> = text.chars().collect();
        let text_len = chars.len();

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text_len {
            // `end` may run past the text; only the slice is clamped
            let mut end = start + chunk_size;

            if end < text_len && chunk_size > MIN_BOUNDARY_WINDOW {
                if let Some(cut) = self.sentence_break(&chars[start..end]) {
                    end = start + cut + 1;
                }
            }

            let piece: String = chars[start..end.min(text_len)].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            let next = if overlap > 0 {
                end.saturating_sub(overlap)
            } else {
                end
            };
            if next >= text_len {
                break;
            }
            // A short sentence cut plus a large overlap can point backwards
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Split `text` and wrap each segment with its source and position.
    pub fn chunk_text(&self, source_id: &str, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(i, piece)| Chunk::new(piece, source_id.to_string(), i))
            .collect()
    }

    /// Index of the last terminator inside the final 20% of the window.
    fn sentence_break(&self, window: &[char]) -> Option<usize> {
        let chunk_size = self.config.chunk_size;
        let search_start = chunk_size - chunk_size / 5;

        (search_start + 1..window.len())
            .rev()
            .find(|&i| is_terminator(window[i]))
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}

/// Convenience wrapper: chunk `text` with the given window and overlap.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    Chunker::new(ChunkerConfig {
        chunk_size,
        overlap,
    })
    .split(text)
}
