use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::internal::{
    ContextFact, Conversation, Message, PlanTier, UsageStats, UserAccount,
};
use crate::orchestrator::{ChatOutcome, GenerationOutcome};

fn default_content_type() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_search_limit() -> usize {
    10
}

// ==================== REQUEST DTOs ====================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[schema(value_type = String, example = "free")]
    pub plan: PlanTier,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChatRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1))]
    pub message: String,
    pub conversation_id: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "default_true")]
    pub use_memory: bool,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateContentRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1))]
    pub topic: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "default_true")]
    pub use_memory: bool,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConversationRequest {
    pub user_id: Uuid,
    pub title: Option<String>,
    pub initial_message: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ContextValueRequest {
    #[validate(length(min = 1))]
    pub value: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ContextCreateRequest {
    #[validate(length(min = 1))]
    pub key: String,
    #[validate(length(min = 1))]
    pub value: String,
    #[serde(default, rename = "override")]
    pub override_existing: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MemorySearchRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1))]
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    pub min_similarity: Option<f32>,
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub plan: String,
    pub monthly_quota: i64,
    pub used_quota: i64,
    #[schema(value_type = String)]
    pub created_at: NaiveDateTime,
}

impl From<UserAccount> for UserResponse {
    fn from(user: UserAccount) -> Self {
        Self {
            id: user.id,
            plan: user.plan.as_str().to_string(),
            monthly_quota: user.monthly_quota,
            used_quota: user.used_quota,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuotaResponse {
    pub plan: String,
    pub monthly_quota: i64,
    pub used_quota: i64,
    pub remaining_quota: i64,
    pub percentage_used: f64,
}

impl From<UserAccount> for QuotaResponse {
    fn from(user: UserAccount) -> Self {
        let percentage_used = if user.monthly_quota > 0 {
            (user.used_quota as f64 / user.monthly_quota as f64 * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            plan: user.plan.as_str().to_string(),
            monthly_quota: user.monthly_quota,
            used_quota: user.used_quota,
            remaining_quota: user.remaining_quota(),
            percentage_used,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub total_requests: u64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub total_credits: i64,
    pub avg_response_time_ms: f64,
    pub by_model: HashMap<String, u64>,
    pub by_content_type: HashMap<String, u64>,
}

impl From<UsageStats> for StatsResponse {
    fn from(stats: UsageStats) -> Self {
        Self {
            total_requests: stats.total_requests,
            total_tokens: stats.total_tokens,
            total_cost: (stats.total_cost * 10_000.0).round() / 10_000.0,
            total_credits: stats.total_credits,
            avg_response_time_ms: stats.avg_response_time_ms,
            by_model: stats.by_model,
            by_content_type: stats.by_content_type,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub response: String,
    pub tokens_used: i64,
    pub model_used: String,
    pub credits_used: i64,
    pub context_applied: HashMap<String, String>,
    pub learned_context: HashMap<String, String>,
}

impl From<ChatOutcome> for ChatResponse {
    fn from(outcome: ChatOutcome) -> Self {
        Self {
            conversation_id: outcome.conversation_id,
            response: outcome.response,
            tokens_used: outcome.tokens_used,
            model_used: outcome.model_used,
            credits_used: outcome.credits_used,
            context_applied: outcome.context_applied,
            learned_context: outcome.learned_context,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContentResponse {
    pub content: String,
    pub tokens_used: i64,
    pub model_used: String,
    pub credits_used: i64,
    pub context_applied: HashMap<String, String>,
}

impl From<GenerationOutcome> for ContentResponse {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            content: outcome.content,
            tokens_used: outcome.tokens_used,
            model_used: outcome.model_used,
            credits_used: outcome.credits_used,
            context_applied: outcome.context_applied,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationResponse {
    pub id: String,
    pub title: String,
    pub is_active: bool,
    pub message_count: u64,
    #[schema(value_type = String)]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String)]
    pub updated_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_response: Option<String>,
}

impl ConversationResponse {
    pub fn from_conversation(conversation: Conversation, message_count: u64) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title,
            is_active: conversation.is_active,
            message_count,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            initial_response: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationResponse>,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageDto {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub tokens_used: i64,
    pub model_used: Option<String>,
    #[schema(value_type = String)]
    pub created_at: NaiveDateTime,
}

impl From<Message> for MessageDto {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            tokens_used: message.tokens_used,
            model_used: message.model_used,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationDetailResponse {
    pub id: String,
    pub title: String,
    pub is_active: bool,
    pub message_count: u64,
    #[schema(value_type = String)]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String)]
    pub updated_at: NaiveDateTime,
    pub messages: Vec<MessageDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub conversation_id: String,
    pub summary: String,
    #[schema(value_type = Object)]
    pub key_points: Option<serde_json::Value>,
    #[schema(value_type = String)]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContextFactResponse {
    pub key: String,
    pub value: String,
    pub confidence: f32,
    pub source_conversation_id: Option<String>,
    pub usage_count: i64,
    #[schema(value_type = Option<String>)]
    pub last_used: Option<NaiveDateTime>,
    #[schema(value_type = String)]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String)]
    pub updated_at: NaiveDateTime,
}

impl From<ContextFact> for ContextFactResponse {
    fn from(fact: ContextFact) -> Self {
        Self {
            key: fact.key,
            value: fact.value,
            confidence: fact.confidence,
            source_conversation_id: fact.source_conversation_id,
            usage_count: fact.usage_count,
            last_used: fact.last_used,
            created_at: fact.created_at,
            updated_at: fact.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHitDto {
    pub conversation_id: String,
    pub title: String,
    pub snippet: String,
    pub relevance_score: f32,
    #[schema(value_type = String)]
    pub date: NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemorySearchResponse {
    pub results: Vec<SearchHitDto>,
    pub total: usize,
}
