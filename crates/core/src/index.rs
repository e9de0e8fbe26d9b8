use crate::embeddings::Embedder;
use crate::error::BuildError;
use crate::models::{ScoredChunk, SimilarityMetric, TextChunk, VectorRecord};
use crate::traits::VectorIndex;
use tracing::{debug, info};

/// Exact nearest-neighbour index held in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    records: Vec<VectorRecord>,
    dimensions: Option<usize>,
    metric: SimilarityMetric,
}

impl InMemoryIndex {
    pub fn new(metric: SimilarityMetric) -> Self {
        Self {
            records: Vec::new(),
            dimensions: None,
            metric,
        }
    }

    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

impl VectorIndex for InMemoryIndex {
    fn insert_records(&mut self, records: Vec<VectorRecord>) {
        if self.dimensions.is_none() {
            self.dimensions = records.first().map(|record| record.embedding.len());
        }
        self.records.extend(records);
    }

    fn search_vector(&self, query_vector: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| {
                let score = match self.metric {
                    SimilarityMetric::Cosine => cosine_similarity(query_vector, &record.embedding),
                    SimilarityMetric::InnerProduct => inner_product(query_vector, &record.embedding),
                };
                (position, score)
            })
            .collect();

        // stable sort keeps chunk order among equal scores
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        scored
            .into_iter()
            .take(top_k)
            .map(|(position, score)| ScoredChunk {
                chunk: self.records[position].chunk.clone(),
                score,
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// Embeds every chunk and loads the vectors into a fresh index, in chunk order.
pub async fn build_index<E>(
    embedder: &E,
    chunks: Vec<TextChunk>,
    batch_size: usize,
    metric: SimilarityMetric,
) -> Result<InMemoryIndex, BuildError>
where
    E: Embedder + ?Sized,
{
    if chunks.is_empty() {
        return Err(BuildError::NothingToIndex);
    }

    let batch_size = batch_size.max(1);
    let mut embeddings = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        debug!(batch = batch_no, size = texts.len(), provider = embedder.name(), "embedded batch");
        embeddings.extend(vectors);
    }

    if embeddings.len() != chunks.len() {
        return Err(BuildError::EmbeddingCount {
            chunks: chunks.len(),
            embeddings: embeddings.len(),
        });
    }

    let expected = embeddings[0].len();
    let records = chunks
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(position, (chunk, embedding))| {
            if embedding.len() != expected || expected == 0 {
                return Err(BuildError::DimensionMismatch {
                    chunk_index: position,
                    expected,
                    found: embedding.len(),
                });
            }
            Ok(VectorRecord { chunk, embedding })
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    let mut index = InMemoryIndex::new(metric);
    index.insert_records(records);
    info!(records = index.len(), dimensions = expected, "vector index built");

    Ok(index)
}

/// Cosine of the angle between `a` and `b`; 0.0 for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{split_text, ChunkingConfig};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::ProviderError;
    use async_trait::async_trait;

    struct FixedEmbedder {
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(self.vectors.iter().take(texts.len()).cloned().collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::Auth {
                provider: "failing",
                details: "no key".to_string(),
            })
        }
    }

    fn chunks(text: &str, max_chars: usize) -> Vec<TextChunk> {
        let config = ChunkingConfig {
            max_chars,
            overlap_chars: 0,
            separator: "\n".to_string(),
        };
        split_text(text, &config).unwrap()
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn one_record_per_chunk_in_order() {
        let input = chunks("alpha\nbeta\ngamma\ndelta\n", 6);
        let expected: Vec<String> = input.iter().map(|chunk| chunk.text.clone()).collect();

        let index = build_index(&CharacterNgramEmbedder::default(), input, 3, SimilarityMetric::Cosine)
            .await
            .unwrap();

        let stored: Vec<String> = index
            .records()
            .iter()
            .map(|record| record.chunk.text.clone())
            .collect();
        assert_eq!(stored, expected);
        assert_eq!(index.dimensions(), Some(128));
    }

    #[tokio::test]
    async fn search_ranks_the_closest_chunk_first() {
        let input = chunks("uploaded pdf question answering\nconversation history memory\n", 40);
        let embedder = CharacterNgramEmbedder::default();
        let index = build_index(&embedder, input, 8, SimilarityMetric::Cosine)
            .await
            .unwrap();

        let query = embedder.embed_text("question answering");
        let hits = index.search_vector(&query, 1);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.text.starts_with("uploaded"));
    }

    #[tokio::test]
    async fn inner_product_metric_is_respected() {
        let input = chunks("a\nb\n", 2);
        let embedder = FixedEmbedder {
            vectors: vec![vec![1.0, 0.0], vec![3.0, 3.0]],
        };
        let index = build_index(&embedder, input, 8, SimilarityMetric::InnerProduct)
            .await
            .unwrap();

        let hits = index.search_vector(&[1.0, 0.0], 2);
        assert_eq!(hits[0].chunk.text, "b\n");
        assert!((hits[0].score - 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn empty_chunk_list_is_nothing_to_index() {
        let result = build_index(&CharacterNgramEmbedder::default(), Vec::new(), 8, SimilarityMetric::Cosine).await;
        assert!(matches!(result, Err(BuildError::NothingToIndex)));
    }

    #[tokio::test]
    async fn missing_vectors_fail_the_build() {
        let input = chunks("a\nb\nc\n", 2);
        let embedder = FixedEmbedder {
            vectors: vec![vec![1.0]],
        };
        let result = build_index(&embedder, input, 8, SimilarityMetric::Cosine).await;
        assert!(matches!(
            result,
            Err(BuildError::EmbeddingCount { chunks: 3, embeddings: 1 })
        ));
    }

    #[tokio::test]
    async fn inconsistent_dimensions_fail_the_build() {
        let input = chunks("a\nb\n", 2);
        let embedder = FixedEmbedder {
            vectors: vec![vec![1.0, 0.0], vec![1.0]],
        };
        let result = build_index(&embedder, input, 8, SimilarityMetric::Cosine).await;
        assert!(matches!(result, Err(BuildError::DimensionMismatch { chunk_index: 1, .. })));
    }

    #[tokio::test]
    async fn provider_errors_abort_the_build() {
        let input = chunks("a\n", 2);
        let result = build_index(&FailingEmbedder, input, 8, SimilarityMetric::Cosine).await;
        assert!(matches!(result, Err(BuildError::Embedding(ProviderError::Auth { .. }))));
    }
}
