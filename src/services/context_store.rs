// src/services/context_store.rs

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::internal::ContextFact;
use crate::services::language_model::LanguageModel;
use crate::storage::repository::{MemoryRepository, RepositoryError};

/// Confidence recorded for facts written explicitly through the API.
pub const EXPLICIT_CONFIDENCE: f32 = 1.0;
/// Confidence recorded for facts inferred from conversation.
pub const INFERRED_CONFIDENCE: f32 = 0.7;

/// Fixed-shape profile view of the recognized preference keys.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ContextProfile {
    pub writing_style: Option<String>,
    pub industry: Option<String>,
    pub tone_preference: Option<String>,
    pub target_audience: Option<String>,
    pub favorite_templates: Vec<String>,
    pub learned_from: HashMap<String, String>,
}

/// Long-term per-user memory: key/value facts with confidence scores.
pub struct ContextStore {
    repo: Arc<dyn MemoryRepository>,
    model: Arc<dyn LanguageModel>,
}

impl ContextStore {
    pub fn new(repo: Arc<dyn MemoryRepository>, model: Arc<dyn LanguageModel>) -> Self {
        Self { repo, model }
    }

    /// Everything known about the user as a key/value map.
    pub async fn snapshot(
        &self,
        user_id: Uuid,
    ) -> Result<HashMap<String, String>, RepositoryError> {
        let facts = self.repo.list_contexts(user_id).await?;
        Ok(facts.into_iter().map(|f| (f.key, f.value)).collect())
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<ContextFact>, RepositoryError> {
        self.repo.find_context(user_id, key).await
    }

    /// All facts with their metadata, highest confidence first.
    pub async fn all(&self, user_id: Uuid) -> Result<Vec<ContextFact>, RepositoryError> {
        self.repo.list_contexts(user_id).await
    }

    /// Last-write-wins per (user, key).
    pub async fn upsert(
        &self,
        user_id: Uuid,
        key: &str,
        value: &str,
        confidence: f32,
        source_conversation_id: Option<&str>,
    ) -> Result<ContextFact, RepositoryError> {
        self.repo
            .upsert_context(user_id, key, value, confidence, source_conversation_id)
            .await
    }

    pub async fn delete(&self, user_id: Uuid, key: &str) -> Result<bool, RepositoryError> {
        self.repo.delete_context(user_id, key).await
    }

    /// Learn durable preferences from one exchange. Only non-empty
    /// string-valued candidates are persisted; every failure is absorbed
    /// and yields an empty or partial map.
    pub async fn extract_and_merge(
        &self,
        user_id: Uuid,
        conversation_id: &str,
        user_message: &str,
        assistant_message: &str,
    ) -> HashMap<String, String> {
        let extracted = match self.model.extract_facts(user_message, assistant_message).await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("Context extraction failed for user {}: {}", user_id, e);
                return HashMap::new();
            }
        };

        let mut learned = HashMap::new();
        for (key, value) in extracted {
            let Some(text) = value.as_str() else { continue };
            if text.is_empty() {
                continue;
            }

            match self
                .repo
                .upsert_context(user_id, &key, text, INFERRED_CONFIDENCE, Some(conversation_id))
                .await
            {
                Ok(_) => {
                    learned.insert(key, text.to_string());
                }
                Err(e) => {
                    tracing::warn!("Failed to save learned context '{}': {}", key, e);
                }
            }
        }

        learned
    }

    /// Profile summary for the context endpoint: the four recognized keys
    /// plus how often each was reinforced.
    pub async fn profile(&self, user_id: Uuid) -> Result<ContextProfile, RepositoryError> {
        let facts = self.repo.list_contexts(user_id).await?;

        let mut profile = ContextProfile::default();
        for fact in facts {
            let slot = match fact.key.as_str() {
                "writing_style" => Some(&mut profile.writing_style),
                "industry" => Some(&mut profile.industry),
                "tone_preference" => Some(&mut profile.tone_preference),
                "target_audience" => Some(&mut profile.target_audience),
                _ => None,
            };

            if let Some(slot) = slot {
                *slot = Some(fact.value.clone());
                profile
                    .learned_from
                    .insert(fact.key, format!("{} conversations", fact.usage_count));
            }
        }

        Ok(profile)
    }
}
