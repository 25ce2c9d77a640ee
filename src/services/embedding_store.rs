// src/services/embedding_store.rs

use ndarray::ArrayView1;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::internal::Message;
use crate::services::embedding_provider::EmbeddingProvider;
use crate::storage::repository::MemoryRepository;

/// One ranked semantic search match.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub message: Message,
    pub score: f32,
}

/// Generates, persists, and searches message embeddings. Indexing and
/// search are best-effort: failures surface as `false` or an empty
/// result, never as errors.
pub struct EmbeddingStore {
    repo: Arc<dyn MemoryRepository>,
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
    dimension: usize,
}

impl EmbeddingStore {
    pub fn new(
        repo: Arc<dyn MemoryRepository>,
        provider: Arc<dyn EmbeddingProvider>,
        model: String,
        dimension: usize,
    ) -> Self {
        Self {
            repo,
            provider,
            model,
            dimension,
        }
    }

    /// Embed and store one message, replacing any previous vector for it.
    pub async fn index(&self, message_id: i64, text: &str) -> bool {
        let vector = match self.provider.generate_embedding(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Embedding generation failed for message {}: {}", message_id, e);
                return false;
            }
        };

        if vector.len() != self.dimension {
            tracing::warn!(
                "Rejected embedding for message {}: dimension {} (expected {})",
                message_id,
                vector.len(),
                self.dimension
            );
            return false;
        }

        match self
            .repo
            .upsert_embedding(message_id, &vector, &self.model)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Embedding storage failed for message {}: {}", message_id, e);
                false
            }
        }
    }

    /// Rank the user's embedded messages against the query. Hits below
    /// `min_similarity` are dropped; ties break toward newer messages.
    pub async fn search(
        &self,
        query: &str,
        user_id: Uuid,
        limit: usize,
        min_similarity: f32,
    ) -> Vec<SearchHit> {
        let query_vector = match self.provider.generate_embedding(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Query embedding failed: {}", e);
                return Vec::new();
            }
        };

        let candidates = match self.repo.embeddings_for_user(user_id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Similarity search failed for user {}: {}", user_id, e);
                return Vec::new();
            }
        };

        let mut hits = Vec::new();
        for (message, vector) in candidates {
            if vector.len() != query_vector.len() {
                tracing::warn!(
                    "Skipping embedding for message {}: dimension {} (query {})",
                    message.id,
                    vector.len(),
                    query_vector.len()
                );
                continue;
            }

            let score = cosine_similarity(&query_vector, &vector);
            if score >= min_similarity {
                hits.push(SearchHit { message, score });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.message.created_at.cmp(&a.message.created_at))
                .then_with(|| b.message.id.cmp(&a.message.id))
        });
        hits.truncate(limit);
        hits
    }
}

/// dot / (|a| * |b|), and 0.0 when either magnitude is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let va = ArrayView1::from(a);
    let vb = ArrayView1::from(b);

    let dot = va.dot(&vb);
    let norm_a = va.dot(&va).sqrt();
    let norm_b = vb.dot(&vb).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
