use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{prelude::*, QueryOrder, QuerySelect, Set, TransactionTrait};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::internal::{
    ContextFact, Conversation, ConversationSummary, Message, NewUsageRecord, PlanTier,
    UsageRecord, UsageStats, UserAccount,
};
use crate::storage::entities::{
    conversation_summaries, conversations, message_embeddings, messages, usage_records,
    user_contexts, users,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================
// TRAIT DEFINITION - with Send + Sync bounds
// ============================================
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    // Users
    async fn create_user(&self, plan: PlanTier) -> Result<UserAccount, RepositoryError>;
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserAccount>, RepositoryError>;

    // Conversations
    async fn create_conversation(
        &self,
        user_id: Uuid,
        title: &str,
    ) -> Result<Conversation, RepositoryError>;

    async fn find_conversation(
        &self,
        id: &str,
        user_id: Uuid,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Recency-ordered page of active conversations with per-conversation
    /// message counts, plus the total number of matches.
    async fn list_conversations(
        &self,
        user_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<(Conversation, u64)>, u64), RepositoryError>;

    /// Transactional cascade: embeddings, messages, summary, then the
    /// conversation row. Returns false when the conversation is not owned
    /// by the user or does not exist.
    async fn delete_conversation(&self, id: &str, user_id: Uuid)
        -> Result<bool, RepositoryError>;

    async fn count_conversations(&self) -> Result<u64, RepositoryError>;

    // Messages
    async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        tokens_used: i64,
        model_used: Option<&str>,
    ) -> Result<Message, RepositoryError>;

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// Most recent `limit` messages, returned oldest-first.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn count_messages_in_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<u64, RepositoryError>;

    async fn count_messages(&self) -> Result<u64, RepositoryError>;

    // Embeddings
    async fn upsert_embedding(
        &self,
        message_id: i64,
        vector: &[f32],
        model: &str,
    ) -> Result<(), RepositoryError>;

    async fn embedding_for_message(
        &self,
        message_id: i64,
    ) -> Result<Option<Vec<f32>>, RepositoryError>;

    /// Every embedded message belonging to the user, across all of their
    /// conversations.
    async fn embeddings_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Message, Vec<f32>)>, RepositoryError>;

    // Context facts
    async fn upsert_context(
        &self,
        user_id: Uuid,
        key: &str,
        value: &str,
        confidence: f32,
        source_conversation_id: Option<&str>,
    ) -> Result<ContextFact, RepositoryError>;

    async fn find_context(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<ContextFact>, RepositoryError>;

    /// All facts for the user, highest confidence first.
    async fn list_contexts(&self, user_id: Uuid) -> Result<Vec<ContextFact>, RepositoryError>;

    async fn delete_context(&self, user_id: Uuid, key: &str) -> Result<bool, RepositoryError>;

    // Summaries
    async fn find_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSummary>, RepositoryError>;

    async fn upsert_summary(
        &self,
        conversation_id: &str,
        summary: &str,
        key_points: Option<serde_json::Value>,
    ) -> Result<ConversationSummary, RepositoryError>;

    // Usage ledger
    /// Appends the record and debits the user's quota by `credits_used`
    /// in the same transaction.
    async fn record_usage(&self, rec: NewUsageRecord) -> Result<UsageRecord, RepositoryError>;

    async fn user_stats(&self, user_id: Uuid, days: i64) -> Result<UsageStats, RepositoryError>;

    fn get_db(&self) -> &DatabaseConnection;
}

// ============================================
// IMPLEMENTATION STRUCT
// ============================================
pub struct SeaOrmMemoryRepository {
    db: DatabaseConnection,
}

impl SeaOrmMemoryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn short_conversation_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("conv_{}", &hex[..12])
}

fn vector_from_json(value: &serde_json::Value) -> Option<Vec<f32>> {
    value.as_array().map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect()
    })
}

// ============================================
// TRAIT IMPLEMENTATION
// ============================================
#[async_trait]
impl MemoryRepository for SeaOrmMemoryRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn create_user(&self, plan: PlanTier) -> Result<UserAccount, RepositoryError> {
        let active_model = users::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            plan: Set(plan.as_str().to_string()),
            monthly_quota: Set(plan.monthly_quota()),
            used_quota: Set(0),
            created_at: Set(Utc::now().naive_utc()),
        };

        let result = active_model.insert(&self.db).await?;
        Ok(UserAccount::from(result))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserAccount>, RepositoryError> {
        let model = users::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(UserAccount::from))
    }

    async fn create_conversation(
        &self,
        user_id: Uuid,
        title: &str,
    ) -> Result<Conversation, RepositoryError> {
        let now = Utc::now().naive_utc();
        let active_model = conversations::ActiveModel {
            id: Set(short_conversation_id()),
            user_id: Set(user_id.to_string()),
            title: Set(title.to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = active_model.insert(&self.db).await?;
        tracing::info!("Created conversation: {}", result.id);
        Ok(Conversation::from(result))
    }

    async fn find_conversation(
        &self,
        id: &str,
        user_id: Uuid,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let model = conversations::Entity::find()
            .filter(conversations::Column::Id.eq(id))
            .filter(conversations::Column::UserId.eq(user_id.to_string()))
            .one(&self.db)
            .await?;

        Ok(model.map(Conversation::from))
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<(Conversation, u64)>, u64), RepositoryError> {
        let query = conversations::Entity::find()
            .filter(conversations::Column::UserId.eq(user_id.to_string()))
            .filter(conversations::Column::IsActive.eq(true));

        let total = query.clone().count(&self.db).await?;

        let models = query
            .order_by_desc(conversations::Column::UpdatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?;

        let mut page = Vec::with_capacity(models.len());
        for model in models {
            let message_count = messages::Entity::find()
                .filter(messages::Column::ConversationId.eq(model.id.clone()))
                .count(&self.db)
                .await?;
            page.push((Conversation::from(model), message_count));
        }

        Ok((page, total))
    }

    async fn delete_conversation(
        &self,
        id: &str,
        user_id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        let existing = conversations::Entity::find()
            .filter(conversations::Column::Id.eq(id))
            .filter(conversations::Column::UserId.eq(user_id.to_string()))
            .one(&txn)
            .await?;

        if existing.is_none() {
            return Ok(false);
        }

        let message_ids: Vec<i64> = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(id))
            .select_only()
            .column(messages::Column::Id)
            .into_tuple::<i64>()
            .all(&txn)
            .await?;

        if !message_ids.is_empty() {
            message_embeddings::Entity::delete_many()
                .filter(message_embeddings::Column::MessageId.is_in(message_ids))
                .exec(&txn)
                .await?;
        }

        messages::Entity::delete_many()
            .filter(messages::Column::ConversationId.eq(id))
            .exec(&txn)
            .await?;

        conversation_summaries::Entity::delete_many()
            .filter(conversation_summaries::Column::ConversationId.eq(id))
            .exec(&txn)
            .await?;

        conversations::Entity::delete_by_id(id.to_string())
            .exec(&txn)
            .await?;

        txn.commit().await?;
        tracing::info!("Deleted conversation: {}", id);
        Ok(true)
    }

    async fn count_conversations(&self) -> Result<u64, RepositoryError> {
        let count = conversations::Entity::find().count(&self.db).await?;
        Ok(count)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        tokens_used: i64,
        model_used: Option<&str>,
    ) -> Result<Message, RepositoryError> {
        let txn = self.db.begin().await?;
        let now = Utc::now().naive_utc();

        let active_model = messages::ActiveModel {
            conversation_id: Set(conversation_id.to_string()),
            role: Set(role.to_string()),
            content: Set(content.to_string()),
            tokens_used: Set(tokens_used),
            model_used: Set(model_used.map(|m| m.to_string())),
            created_at: Set(now),
            ..Default::default()
        };

        let result = active_model.insert(&txn).await?;

        // Every append bumps the conversation's recency
        conversations::Entity::update_many()
            .col_expr(conversations::Column::UpdatedAt, Expr::value(now))
            .filter(conversations::Column::Id.eq(conversation_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(Message::from(result))
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, RepositoryError> {
        let models = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Message::from).collect())
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut models = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        // Fetched newest-first; callers want chronological order
        models.reverse();
        Ok(models.into_iter().map(Message::from).collect())
    }

    async fn count_messages_in_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<u64, RepositoryError> {
        let count = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn count_messages(&self) -> Result<u64, RepositoryError> {
        let count = messages::Entity::find().count(&self.db).await?;
        Ok(count)
    }

    async fn upsert_embedding(
        &self,
        message_id: i64,
        vector: &[f32],
        model: &str,
    ) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;

        // Replace-or-insert keyed by message_id
        message_embeddings::Entity::delete_many()
            .filter(message_embeddings::Column::MessageId.eq(message_id))
            .exec(&txn)
            .await?;

        let active_model = message_embeddings::ActiveModel {
            message_id: Set(message_id),
            vector: Set(serde_json::json!(vector)),
            model: Set(model.to_string()),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        };

        active_model.insert(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn embedding_for_message(
        &self,
        message_id: i64,
    ) -> Result<Option<Vec<f32>>, RepositoryError> {
        let model = message_embeddings::Entity::find()
            .filter(message_embeddings::Column::MessageId.eq(message_id))
            .one(&self.db)
            .await?;

        Ok(model.and_then(|m| vector_from_json(&m.vector)))
    }

    async fn embeddings_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Message, Vec<f32>)>, RepositoryError> {
        let conversation_ids: Vec<String> = conversations::Entity::find()
            .filter(conversations::Column::UserId.eq(user_id.to_string()))
            .select_only()
            .column(conversations::Column::Id)
            .into_tuple::<String>()
            .all(&self.db)
            .await?;

        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }

        let message_models = messages::Entity::find()
            .filter(messages::Column::ConversationId.is_in(conversation_ids))
            .all(&self.db)
            .await?;

        if message_models.is_empty() {
            return Ok(Vec::new());
        }

        let message_ids: Vec<i64> = message_models.iter().map(|m| m.id).collect();
        let embedding_models = message_embeddings::Entity::find()
            .filter(message_embeddings::Column::MessageId.is_in(message_ids))
            .all(&self.db)
            .await?;

        let mut vectors: HashMap<i64, Vec<f32>> = embedding_models
            .into_iter()
            .filter_map(|e| vector_from_json(&e.vector).map(|v| (e.message_id, v)))
            .collect();

        Ok(message_models
            .into_iter()
            .filter_map(|m| vectors.remove(&m.id).map(|v| (Message::from(m), v)))
            .collect())
    }

    async fn upsert_context(
        &self,
        user_id: Uuid,
        key: &str,
        value: &str,
        confidence: f32,
        source_conversation_id: Option<&str>,
    ) -> Result<ContextFact, RepositoryError> {
        let now = Utc::now().naive_utc();

        let existing = user_contexts::Entity::find()
            .filter(user_contexts::Column::UserId.eq(user_id.to_string()))
            .filter(user_contexts::Column::Key.eq(key))
            .one(&self.db)
            .await?;

        let result = match existing {
            Some(model) => {
                let mut active_model: user_contexts::ActiveModel = model.into();
                active_model.value = Set(value.to_string());
                active_model.confidence = Set(confidence);
                active_model.source_conversation_id =
                    Set(source_conversation_id.map(|c| c.to_string()));
                active_model.updated_at = Set(now);
                active_model.update(&self.db).await?
            }
            None => {
                let active_model = user_contexts::ActiveModel {
                    user_id: Set(user_id.to_string()),
                    key: Set(key.to_string()),
                    value: Set(value.to_string()),
                    confidence: Set(confidence),
                    source_conversation_id: Set(source_conversation_id.map(|c| c.to_string())),
                    usage_count: Set(0),
                    last_used: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                active_model.insert(&self.db).await?
            }
        };

        Ok(ContextFact::from(result))
    }

    async fn find_context(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<ContextFact>, RepositoryError> {
        let model = user_contexts::Entity::find()
            .filter(user_contexts::Column::UserId.eq(user_id.to_string()))
            .filter(user_contexts::Column::Key.eq(key))
            .one(&self.db)
            .await?;

        Ok(model.map(ContextFact::from))
    }

    async fn list_contexts(&self, user_id: Uuid) -> Result<Vec<ContextFact>, RepositoryError> {
        let models = user_contexts::Entity::find()
            .filter(user_contexts::Column::UserId.eq(user_id.to_string()))
            .order_by_desc(user_contexts::Column::Confidence)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(ContextFact::from).collect())
    }

    async fn delete_context(&self, user_id: Uuid, key: &str) -> Result<bool, RepositoryError> {
        let result = user_contexts::Entity::delete_many()
            .filter(user_contexts::Column::UserId.eq(user_id.to_string()))
            .filter(user_contexts::Column::Key.eq(key))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn find_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSummary>, RepositoryError> {
        let model = conversation_summaries::Entity::find()
            .filter(conversation_summaries::Column::ConversationId.eq(conversation_id))
            .one(&self.db)
            .await?;

        Ok(model.map(ConversationSummary::from))
    }

    async fn upsert_summary(
        &self,
        conversation_id: &str,
        summary: &str,
        key_points: Option<serde_json::Value>,
    ) -> Result<ConversationSummary, RepositoryError> {
        let now = Utc::now().naive_utc();

        let existing = conversation_summaries::Entity::find()
            .filter(conversation_summaries::Column::ConversationId.eq(conversation_id))
            .one(&self.db)
            .await?;

        let result = match existing {
            Some(model) => {
                let mut active_model: conversation_summaries::ActiveModel = model.into();
                active_model.summary = Set(summary.to_string());
                active_model.key_points = Set(key_points);
                active_model.updated_at = Set(now);
                active_model.update(&self.db).await?
            }
            None => {
                let active_model = conversation_summaries::ActiveModel {
                    conversation_id: Set(conversation_id.to_string()),
                    summary: Set(summary.to_string()),
                    key_points: Set(key_points),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                active_model.insert(&self.db).await?
            }
        };

        Ok(ConversationSummary::from(result))
    }

    async fn record_usage(&self, rec: NewUsageRecord) -> Result<UsageRecord, RepositoryError> {
        let txn = self.db.begin().await?;

        let active_model = usage_records::ActiveModel {
            user_id: Set(rec.user_id.to_string()),
            endpoint: Set(rec.endpoint.clone()),
            content_type: Set(rec.content_type.clone()),
            tokens_used: Set(rec.tokens_used),
            credits_used: Set(rec.credits_used),
            cost: Set(rec.cost),
            ai_model: Set(rec.ai_model.clone()),
            response_time_ms: Set(rec.response_time_ms),
            status_code: Set(rec.status_code),
            extra_data: Set(rec.extra_data.clone()),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        };

        let result = active_model.insert(&txn).await?;

        // Quota debit rides the same transaction as the ledger append
        users::Entity::update_many()
            .col_expr(
                users::Column::UsedQuota,
                Expr::col(users::Column::UsedQuota).add(rec.credits_used),
            )
            .filter(users::Column::Id.eq(rec.user_id.to_string()))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(UsageRecord::from(result))
    }

    async fn user_stats(&self, user_id: Uuid, days: i64) -> Result<UsageStats, RepositoryError> {
        let cutoff = Utc::now().naive_utc() - chrono::Duration::days(days);

        let records = usage_records::Entity::find()
            .filter(usage_records::Column::UserId.eq(user_id.to_string()))
            .filter(usage_records::Column::CreatedAt.gte(cutoff))
            .all(&self.db)
            .await?;

        let total_requests = records.len() as u64;
        let total_tokens: i64 = records.iter().map(|r| r.tokens_used).sum();
        let total_cost: f64 = records.iter().map(|r| r.cost).sum();
        let total_credits: i64 = records.iter().map(|r| r.credits_used).sum();
        let avg_response_time_ms = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.response_time_ms as f64).sum::<f64>()
                / records.len() as f64
        };

        let mut by_model: HashMap<String, u64> = HashMap::new();
        let mut by_content_type: HashMap<String, u64> = HashMap::new();
        for record in &records {
            *by_model.entry(record.ai_model.clone()).or_insert(0) += 1;
            if let Some(content_type) = &record.content_type {
                *by_content_type.entry(content_type.clone()).or_insert(0) += 1;
            }
        }

        Ok(UsageStats {
            total_requests,
            total_tokens,
            total_cost,
            total_credits,
            avg_response_time_ms,
            by_model,
            by_content_type,
        })
    }
}

// ============================================
// Conversions
// ============================================

impl From<users::Model> for UserAccount {
    fn from(model: users::Model) -> Self {
        Self {
            id: Uuid::parse_str(&model.id).unwrap(),
            plan: PlanTier::from_name(&model.plan).unwrap_or(PlanTier::Free),
            monthly_quota: model.monthly_quota,
            used_quota: model.used_quota,
            created_at: model.created_at,
        }
    }
}

impl From<conversations::Model> for Conversation {
    fn from(model: conversations::Model) -> Self {
        Self {
            id: model.id,
            user_id: Uuid::parse_str(&model.user_id).unwrap(),
            title: model.title,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<messages::Model> for Message {
    fn from(model: messages::Model) -> Self {
        Self {
            id: model.id,
            conversation_id: model.conversation_id,
            role: model.role,
            content: model.content,
            tokens_used: model.tokens_used,
            model_used: model.model_used,
            created_at: model.created_at,
        }
    }
}

impl From<user_contexts::Model> for ContextFact {
    fn from(model: user_contexts::Model) -> Self {
        Self {
            id: model.id,
            user_id: Uuid::parse_str(&model.user_id).unwrap(),
            key: model.key,
            value: model.value,
            confidence: model.confidence,
            source_conversation_id: model.source_conversation_id,
            usage_count: model.usage_count,
            last_used: model.last_used,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<conversation_summaries::Model> for ConversationSummary {
    fn from(model: conversation_summaries::Model) -> Self {
        Self {
            id: model.id,
            conversation_id: model.conversation_id,
            summary: model.summary,
            key_points: model.key_points,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<usage_records::Model> for UsageRecord {
    fn from(model: usage_records::Model) -> Self {
        Self {
            id: model.id,
            user_id: Uuid::parse_str(&model.user_id).unwrap(),
            endpoint: model.endpoint,
            content_type: model.content_type,
            tokens_used: model.tokens_used,
            credits_used: model.credits_used,
            cost: model.cost,
            ai_model: model.ai_model,
            response_time_ms: model.response_time_ms,
            status_code: model.status_code,
            extra_data: model.extra_data,
            created_at: model.created_at,
        }
    }
}
