use crate::error::IngestError;
use crate::models::Chunk;

pub const DEFAULT_MAX_CHARS: usize = 1_200;
pub const DEFAULT_OVERLAP_CHARS: usize = 150;
pub const DEFAULT_MIN_SENTENCE_BREAK: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Upper bound on a window, in characters.
    pub max_chars: usize,
    /// Characters shared between the end of one window and the start of the next.
    pub overlap_chars: usize,
    /// A window is only cut at a sentence break lying further than this past its start.
    pub min_sentence_break: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
            min_sentence_break: DEFAULT_MIN_SENTENCE_BREAK,
        }
    }
}

impl ChunkingConfig {
    /// Every window must leave the cursor strictly ahead of where it started,
    /// including windows shortened at a sentence break.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars <= self.overlap_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "max_chars ({}) must be greater than overlap_chars ({})",
                self.max_chars, self.overlap_chars
            )));
        }

        if self.overlap_chars > self.min_sentence_break {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars ({}) must not exceed min_sentence_break ({})",
                self.overlap_chars, self.min_sentence_break
            )));
        }

        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits `text` into overlapping windows of at most `max_chars` characters,
/// preferring to end a window right after a `". "` sentence break.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let normalized = normalize_whitespace(text);
    let chars: Vec<char> = normalized.chars().collect();
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let mut end = total.min(start.saturating_add(config.max_chars));

        if let Some(boundary) = last_sentence_break(&chars[..end], start) {
            if boundary > start.saturating_add(config.min_sentence_break) {
                end = boundary + 1;
            }
        }

        let window: String = chars[start..end].iter().collect();
        let candidate = window.trim();
        if !candidate.is_empty() {
            chunks.push(Chunk {
                text: candidate.to_string(),
                start_char: start,
                end_char: end,
            });
        }

        if end >= total {
            break;
        }
        start = end.saturating_sub(config.overlap_chars);
    }

    Ok(chunks)
}

/// Position of the last `". "` lying entirely inside `chars[from..]`.
fn last_sentence_break(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len().saturating_sub(1))
        .rev()
        .find(|&position| chars[position] == '.' && chars[position + 1] == ' ')
}
