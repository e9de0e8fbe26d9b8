use crate::{ChatMessage, ProviderError, ScoredChunk, VectorRecord};
use async_trait::async_trait;

pub trait VectorIndex {
    fn insert_records(&mut self, records: Vec<VectorRecord>);

    fn search_vector(&self, query_vector: &[f32], top_k: usize) -> Vec<ScoredChunk>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the assistant reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}
