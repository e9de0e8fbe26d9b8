pub mod chat;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod traits;

pub use chat::OpenAiChatModel;
pub use chunking::{reassemble, split_text, ChunkingConfig};
pub use config::{ProviderConfig, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
pub use embeddings::{CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{BuildError, IngestError, ProviderError, SessionError, TransientKind};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use index::{build_index, cosine_similarity, InMemoryIndex};
pub use ingest::{digest_bytes, discover_pdf_files, extract_text, load_documents};
pub use models::{
    ChatMessage, ConversationState, PipelineOptions, RawDocument, RetrievalOptions, Role,
    ScoredChunk, SimilarityMetric, TextChunk, VectorRecord,
};
pub use orchestrator::{BuildReport, ChatCoordinator, ChatSession};
pub use retry::RetryPolicy;
pub use session::ConversationSession;
pub use traits::{ChatModel, VectorIndex};
