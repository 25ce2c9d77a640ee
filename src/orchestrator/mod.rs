pub mod costs;
pub mod prompt_builder;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::internal::{ConversationSummary, UserAccount};
use crate::services::context_store::ContextStore;
use crate::services::embedding_store::EmbeddingStore;
use crate::services::language_model::{ChatTurn, LanguageModel, ModelError};
use crate::storage::repository::{MemoryRepository, RepositoryError};

/// Words allotted to a generated conversation summary.
const SUMMARY_MAX_WORDS: u32 = 200;

/// Fatal engine conditions, mapped one-to-one to HTTP statuses at the
/// boundary. Embedding and extraction failures never appear here; they
/// are absorbed inside the components.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Monthly quota exceeded. Plan: {plan}, Used: {used}/{quota}")]
    QuotaExceeded {
        plan: String,
        used: i64,
        quota: i64,
    },
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Validation(String),
    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of one memory-augmented chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub conversation_id: String,
    pub response: String,
    pub tokens_used: i64,
    pub model_used: String,
    pub credits_used: i64,
    pub context_applied: HashMap<String, String>,
    pub learned_context: HashMap<String, String>,
}

/// Result of a one-shot content generation. No conversation is created
/// and nothing is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub content: String,
    pub tokens_used: i64,
    pub model_used: String,
    pub credits_used: i64,
    pub context_applied: HashMap<String, String>,
}

/// Top-level coordinator: context snapshot, prompt build, model call,
/// persistence, then best-effort embedding indexing and context
/// extraction.
pub struct ConversationOrchestrator {
    repo: Arc<dyn MemoryRepository>,
    model: Arc<dyn LanguageModel>,
    context_store: Arc<ContextStore>,
    embedding_store: Arc<EmbeddingStore>,
    max_context_messages: u64,
}

/// Conversation titles are a truncated prefix of the first message.
fn derive_title(message: &str, max_chars: usize) -> String {
    let mut title: String = message.chars().take(max_chars).collect();
    if message.chars().count() > max_chars {
        title.push_str("...");
    }
    title
}

impl ConversationOrchestrator {
    pub fn new(
        repo: Arc<dyn MemoryRepository>,
        model: Arc<dyn LanguageModel>,
        context_store: Arc<ContextStore>,
        embedding_store: Arc<EmbeddingStore>,
        max_context_messages: u64,
    ) -> Self {
        Self {
            repo,
            model,
            context_store,
            embedding_store,
            max_context_messages,
        }
    }

    /// The user's account, or `QuotaExceeded` when the monthly allotment
    /// is already consumed. Runs before any model invocation; no side
    /// effects on rejection.
    pub async fn check_quota(&self, user_id: Uuid) -> Result<UserAccount, EngineError> {
        let user = self
            .repo
            .find_user(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("User".to_string()))?;

        if user.used_quota >= user.monthly_quota {
            return Err(EngineError::QuotaExceeded {
                plan: user.plan.as_str().to_string(),
                used: user.used_quota,
                quota: user.monthly_quota,
            });
        }

        Ok(user)
    }

    /// One memory-augmented chat turn.
    ///
    /// A model failure aborts the call with nothing persisted. Embedding
    /// indexing and context extraction are best-effort and never block
    /// the returned response.
    pub async fn process(
        &self,
        user_id: Uuid,
        message: &str,
        conversation_id: Option<&str>,
        content_type: &str,
        use_memory: bool,
        model_hint: Option<&str>,
    ) -> Result<ChatOutcome, EngineError> {
        let conversation = match conversation_id {
            Some(id) => self
                .repo
                .find_conversation(id, user_id)
                .await?
                .ok_or_else(|| EngineError::NotFound("Conversation".to_string()))?,
            None => {
                let title = derive_title(message, 50);
                self.repo.create_conversation(user_id, &title).await?
            }
        };

        let (context_applied, history) = if use_memory {
            let snapshot = self.context_store.snapshot(user_id).await?;
            let recent = self
                .repo
                .recent_messages(&conversation.id, self.max_context_messages)
                .await?;
            let turns: Vec<ChatTurn> = recent.iter().map(ChatTurn::from).collect();
            (snapshot, turns)
        } else {
            (HashMap::new(), Vec::new())
        };

        let system_prompt = prompt_builder::build_prompt(content_type, &context_applied);
        let completion = self
            .model
            .generate(&system_prompt, &history, message, model_hint)
            .await?;

        // User message first, assistant second; each append bumps the
        // conversation's updated_at.
        self.repo
            .append_message(&conversation.id, "user", message, 0, None)
            .await?;
        let assistant = self
            .repo
            .append_message(
                &conversation.id,
                "assistant",
                &completion.text,
                completion.tokens_used as i64,
                Some(&completion.model),
            )
            .await?;

        self.embedding_store
            .index(assistant.id, &completion.text)
            .await;

        let learned_context = if use_memory {
            self.context_store
                .extract_and_merge(user_id, &conversation.id, message, &completion.text)
                .await
        } else {
            HashMap::new()
        };

        let tokens_used = completion.tokens_used as i64;
        let credits_used = costs::calculate_credits(&completion.model, tokens_used);

        Ok(ChatOutcome {
            conversation_id: conversation.id,
            response: completion.text,
            tokens_used,
            model_used: completion.model,
            credits_used,
            context_applied,
            learned_context,
        })
    }

    /// One-shot content generation: prompt build plus model call, with
    /// the context snapshot applied when `use_memory`. No conversation,
    /// no persistence, no extraction.
    pub async fn generate(
        &self,
        user_id: Uuid,
        topic: &str,
        content_type: &str,
        use_memory: bool,
        model_hint: Option<&str>,
    ) -> Result<GenerationOutcome, EngineError> {
        let context_applied = if use_memory {
            self.context_store.snapshot(user_id).await?
        } else {
            HashMap::new()
        };

        let system_prompt = prompt_builder::build_prompt(content_type, &context_applied);
        let completion = self
            .model
            .generate(&system_prompt, &[], topic, model_hint)
            .await?;

        let tokens_used = completion.tokens_used as i64;
        let credits_used = costs::calculate_credits(&completion.model, tokens_used);

        Ok(GenerationOutcome {
            content: completion.text,
            tokens_used,
            model_used: completion.model,
            credits_used,
            context_applied,
        })
    }

    /// Stored summary for the conversation, generating (or regenerating)
    /// it from the recent message window when needed. A conversation
    /// with no messages has nothing to summarize.
    pub async fn summarize_conversation(
        &self,
        user_id: Uuid,
        conversation_id: &str,
        regenerate: bool,
    ) -> Result<ConversationSummary, EngineError> {
        self.repo
            .find_conversation(conversation_id, user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Conversation".to_string()))?;

        if !regenerate {
            if let Some(existing) = self.repo.find_summary(conversation_id).await? {
                return Ok(existing);
            }
        }

        let recent = self
            .repo
            .recent_messages(conversation_id, self.max_context_messages)
            .await?;
        if recent.is_empty() {
            return Err(EngineError::NotFound("Conversation messages".to_string()));
        }

        let turns: Vec<ChatTurn> = recent.iter().map(ChatTurn::from).collect();
        let summary = self.model.summarize(&turns, SUMMARY_MAX_WORDS).await?;

        Ok(self
            .repo
            .upsert_summary(conversation_id, &summary, None)
            .await?)
    }
}
