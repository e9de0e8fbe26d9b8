use crate::embeddings::Embedder;
use crate::error::SessionError;
use crate::index::InMemoryIndex;
use crate::models::{ChatMessage, ConversationState, Role, ScoredChunk};
use crate::traits::{ChatModel, VectorIndex};
use tracing::{debug, info};

const CONDENSE_PROMPT: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

const ANSWER_PROMPT: &str = "Use the following pieces of context to answer the user's question. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Retrieval-augmented conversation over one index.
///
/// The index is read-only here; it is replaced, together with the history,
/// only by building a new session. Ranking uses the metric the index was
/// built with.
#[derive(Debug)]
pub struct ConversationSession {
    index: InMemoryIndex,
    memory: ConversationState,
    top_k: usize,
}

impl ConversationSession {
    pub fn new(index: InMemoryIndex, top_k: usize) -> Self {
        Self {
            index,
            memory: ConversationState::default(),
            top_k,
        }
    }

    pub fn index(&self) -> &InMemoryIndex {
        &self.index
    }

    pub fn turns(&self) -> &[ChatMessage] {
        self.memory.turns()
    }

    /// Chunks most similar to `query`, best first.
    pub async fn retrieve<E>(&self, embedder: &E, query: &str) -> Result<Vec<ScoredChunk>, SessionError>
    where
        E: Embedder + ?Sized,
    {
        let query_vector = embedder.embed(query).await.map_err(SessionError::Embedding)?;
        Ok(self.index.search_vector(&query_vector, self.top_k))
    }

    /// Answers `question` and records the exchange.
    ///
    /// The history is only extended after the answer arrives, so a failed
    /// call leaves it exactly as it was.
    pub async fn ask<E, M>(
        &mut self,
        embedder: &E,
        model: &M,
        question: &str,
    ) -> Result<&[ChatMessage], SessionError>
    where
        E: Embedder + ?Sized,
        M: ChatModel + ?Sized,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        let standalone = if self.memory.is_empty() {
            question.to_string()
        } else {
            let condensed = model
                .complete(&condense_messages(self.memory.turns(), question))
                .await
                .map_err(SessionError::Chat)?;
            debug!(%condensed, "condensed follow-up question");
            condensed.trim().to_string()
        };

        let context = self.retrieve(embedder, &standalone).await?;
        info!(
            retrieved = context.len(),
            top_score = context.first().map(|hit| hit.score).unwrap_or_default(),
            "retrieved context"
        );

        let answer = model
            .complete(&answer_messages(&context, &standalone))
            .await
            .map_err(SessionError::Chat)?;

        self.memory.record_exchange(question, answer);
        Ok(self.memory.turns())
    }
}

fn condense_messages(history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    let transcript = history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "Human",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    vec![ChatMessage::user(format!(
        "{CONDENSE_PROMPT}\n\nChat History:\n{transcript}\nFollow Up Input: {question}\nStandalone question:"
    ))]
}

fn answer_messages(context: &[ScoredChunk], question: &str) -> Vec<ChatMessage> {
    let stuffed = context
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        ChatMessage::system(format!("{ANSWER_PROMPT}\n----------------\n{stuffed}")),
        ChatMessage::user(question),
    ]
}
