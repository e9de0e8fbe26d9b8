use crate::error::IngestError;
use crate::models::{PipelineOptions, TextChunk};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&PipelineOptions::default())
    }
}

impl From<&PipelineOptions> for ChunkingConfig {
    fn from(value: &PipelineOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
            separator: value.chunk_separator.clone(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        if self.separator.is_empty() {
            return Err(IngestError::InvalidChunkConfig(
                "separator must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits `text` into overlapping chunks of at most `max_chars` characters.
///
/// The text is cut after every separator and the pieces are packed greedily.
/// Each chunk after the first starts with up to `overlap_chars` characters of
/// the text that precedes it, trimmed so that a fitting piece never overflows
/// the budget because of the overlap. A single piece longer than `max_chars`
/// becomes its own chunk unsplit.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    let mut current_overlap = 0usize;

    for (start, unit) in separator_units(text, &config.separator) {
        let unit_len = unit.chars().count();

        if current_len > 0 && current_len + unit_len > config.max_chars {
            chunks.push(make_chunk(
                chunks.len() as u64,
                std::mem::take(&mut current),
                current_overlap,
            ));

            let carry_budget = config
                .overlap_chars
                .min(config.max_chars.saturating_sub(unit_len));
            let carry = tail_chars(&text[..start], carry_budget);
            current_overlap = carry.chars().count();
            current_len = current_overlap;
            current.push_str(carry);
        }

        current.push_str(unit);
        current_len += unit_len;
    }

    if current_len > current_overlap {
        chunks.push(make_chunk(chunks.len() as u64, current, current_overlap));
    }

    Ok(chunks)
}

/// Rebuilds the source text by dropping every chunk's overlap prefix.
pub fn reassemble(chunks: &[TextChunk]) -> String {
    chunks.iter().map(TextChunk::fresh_text).collect()
}

/// Byte offset and slice of every separator-terminated piece of `text`.
fn separator_units<'a>(text: &'a str, separator: &'a str) -> impl Iterator<Item = (usize, &'a str)> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset >= text.len() {
            return None;
        }
        let rest = &text[offset..];
        let end = rest
            .find(separator)
            .map(|position| position + separator.len())
            .unwrap_or(rest.len());
        let start = offset;
        offset += end;
        Some((start, &rest[..end]))
    })
}

fn tail_chars(text: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }
    match text.char_indices().rev().nth(count - 1) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

fn make_chunk(index: u64, text: String, overlap_chars: usize) -> TextChunk {
    TextChunk {
        chunk_id: make_chunk_id(index, &text),
        chunk_index: index,
        text,
        overlap_chars,
    }
}

fn make_chunk_id(index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
