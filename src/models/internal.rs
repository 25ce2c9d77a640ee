use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Subscription tier determining the monthly credit quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn monthly_quota(&self) -> i64 {
        match self {
            PlanTier::Free => 100,
            PlanTier::Basic => 1_000,
            PlanTier::Pro => 10_000,
            PlanTier::Enterprise => 100_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    pub fn from_name(name: &str) -> Option<PlanTier> {
        match name {
            "free" => Some(PlanTier::Free),
            "basic" => Some(PlanTier::Basic),
            "pro" => Some(PlanTier::Pro),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub plan: PlanTier,
    pub monthly_quota: i64,
    pub used_quota: i64,
    pub created_at: NaiveDateTime,
}

impl UserAccount {
    pub fn remaining_quota(&self) -> i64 {
        (self.monthly_quota - self.used_quota).max(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: Uuid,
    pub title: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub tokens_used: i64,
    pub model_used: Option<String>,
    pub created_at: NaiveDateTime,
}

/// One remembered fact about a user, unique per (user, key).
#[derive(Debug, Clone, Serialize)]
pub struct ContextFact {
    pub id: i64,
    pub user_id: Uuid,
    pub key: String,
    pub value: String,
    pub confidence: f32,
    pub source_conversation_id: Option<String>,
    pub usage_count: i64,
    pub last_used: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub conversation_id: String,
    pub summary: String,
    pub key_points: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub endpoint: String,
    pub content_type: Option<String>,
    pub tokens_used: i64,
    pub credits_used: i64,
    pub cost: f64,
    pub ai_model: String,
    pub response_time_ms: i64,
    pub status_code: i32,
    pub extra_data: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
}

// Insert payload for the usage ledger; id and timestamp are assigned by
// the repository.
#[derive(Debug, Clone, Serialize)]
pub struct NewUsageRecord {
    pub user_id: Uuid,
    pub endpoint: String,
    pub content_type: Option<String>,
    pub tokens_used: i64,
    pub credits_used: i64,
    pub cost: f64,
    pub ai_model: String,
    pub response_time_ms: i64,
    pub status_code: i32,
    pub extra_data: Option<serde_json::Value>,
}

/// Aggregated usage over a trailing window of days.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub total_credits: i64,
    pub avg_response_time_ms: f64,
    pub by_model: HashMap<String, u64>,
    pub by_content_type: HashMap<String, u64>,
}
