use serde::{Deserialize, Serialize};

/// One uploaded PDF, held as raw bytes until text extraction.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextChunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub text: String,
    /// Leading characters repeated from the text before this chunk.
    pub overlap_chars: usize,
}

impl TextChunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// The part of the chunk not shared with its predecessor.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap_chars) {
            Some((offset, _)) => &self.text[offset..],
            None => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk: TextChunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Running dialogue: user questions at even positions, answers at odd ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    turns: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn record_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ChatMessage::user(question));
        self.turns.push(ChatMessage::assistant(answer));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    InnerProduct,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub metric: SimilarityMetric,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            metric: SimilarityMetric::Cosine,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub chunk_separator: String,
    pub embedding_batch_size: usize,
    pub retrieval: RetrievalOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            chunk_separator: "\n".to_string(),
            embedding_batch_size: 64,
            retrieval: RetrievalOptions::default(),
        }
    }
}
