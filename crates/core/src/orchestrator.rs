use crate::chunking::{split_text, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{BuildError, SessionError};
use crate::extractor::PdfExtractor;
use crate::index::build_index;
use crate::ingest::extract_text;
use crate::models::{ChatMessage, PipelineOptions, RawDocument, ScoredChunk};
use crate::session::ConversationSession;
use crate::traits::{ChatModel, VectorIndex};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

/// State of one user's chat: the current conversation, if any build succeeded.
#[derive(Debug)]
pub struct ChatSession {
    id: Uuid,
    conversation: Option<ConversationSession>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.conversation.is_some()
    }

    pub fn conversation(&self) -> Option<&ConversationSession> {
        self.conversation.as_ref()
    }

    /// Role-tagged turns in order; empty before the first build.
    pub fn turns(&self) -> &[ChatMessage] {
        self.conversation
            .as_ref()
            .map(ConversationSession::turns)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub documents: usize,
    pub extracted_chars: usize,
    pub chunks: usize,
    pub built_at: DateTime<Utc>,
}

/// Runs the extract, chunk, embed and answer pipeline against a [`ChatSession`].
pub struct ChatCoordinator<X, E, M>
where
    X: PdfExtractor,
    E: Embedder,
    M: ChatModel,
{
    extractor: X,
    embedder: E,
    model: M,
    options: PipelineOptions,
}

impl<X, E, M> ChatCoordinator<X, E, M>
where
    X: PdfExtractor,
    E: Embedder,
    M: ChatModel,
{
    pub fn new(extractor: X, embedder: E, model: M, options: PipelineOptions) -> Self {
        Self {
            extractor,
            embedder,
            model,
            options,
        }
    }

    /// Indexes `documents` and starts a fresh conversation over them.
    ///
    /// On failure the session keeps whatever conversation it had before.
    pub async fn build(
        &self,
        session: &mut ChatSession,
        documents: &[RawDocument],
    ) -> Result<BuildReport, BuildError> {
        info!(session = %session.id, documents = documents.len(), "building index");

        let result = self.build_conversation(documents).await;
        let (conversation, report) = match result {
            Ok(built) => built,
            Err(error) => {
                warn!(session = %session.id, %error, "build failed");
                return Err(error);
            }
        };

        session.conversation = Some(conversation);
        info!(
            session = %session.id,
            chunks = report.chunks,
            chars = report.extracted_chars,
            "conversation ready"
        );
        Ok(report)
    }

    async fn build_conversation(
        &self,
        documents: &[RawDocument],
    ) -> Result<(ConversationSession, BuildReport), BuildError> {
        let text = extract_text(&self.extractor, documents)?;
        let chunks = split_text(&text, &ChunkingConfig::from(&self.options))?;
        let chunk_count = chunks.len();

        let index = build_index(
            &self.embedder,
            chunks,
            self.options.embedding_batch_size,
            self.options.retrieval.metric,
        )
        .await?;

        let report = BuildReport {
            documents: documents.len(),
            extracted_chars: text.chars().count(),
            chunks: chunk_count,
            built_at: Utc::now(),
        };
        Ok((ConversationSession::new(index, self.options.retrieval.top_k), report))
    }

    /// Asks `question` in the session's conversation.
    ///
    /// Returns `Ok(None)` without doing anything when nothing has been built yet.
    pub async fn ask<'s>(
        &self,
        session: &'s mut ChatSession,
        question: &str,
    ) -> Result<Option<&'s [ChatMessage]>, SessionError> {
        let id = session.id;
        let Some(conversation) = session.conversation.as_mut() else {
            info!(session = %id, "question ignored: no documents indexed yet");
            return Ok(None);
        };

        match conversation.ask(&self.embedder, &self.model, question).await {
            Ok(turns) => Ok(Some(turns)),
            Err(error) => {
                warn!(session = %id, %error, "question failed");
                Err(error)
            }
        }
    }

    /// Retrieval only, without calling the chat model.
    pub async fn search(
        &self,
        session: &ChatSession,
        query: &str,
    ) -> Result<Option<Vec<ScoredChunk>>, SessionError> {
        match session.conversation.as_ref() {
            Some(conversation) => {
                if query.trim().is_empty() {
                    return Err(SessionError::EmptyQuestion);
                }
                let hits = conversation.retrieve(&self.embedder, query).await?;
                Ok(Some(hits))
            }
            None => Ok(None),
        }
    }

    pub fn indexed_chunks(&self, session: &ChatSession) -> usize {
        session
            .conversation
            .as_ref()
            .map(|conversation| conversation.index().len())
            .unwrap_or(0)
    }
}
