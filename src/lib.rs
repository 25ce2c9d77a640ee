//! Scribe Engine - memory-augmented conversation engine for
//! personalized content generation.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::dto::*;
pub use crate::api::rate_limiter::{CounterStore, InMemoryCounterStore, RateLimiter};
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::models::internal::{Conversation, ContextFact, Message, PlanTier, UserAccount};
pub use crate::orchestrator::{ChatOutcome, ConversationOrchestrator, EngineError};
pub use crate::services::{ContextStore, EmbeddingProvider, EmbeddingStore, LanguageModel};
pub use crate::storage::db::init_db;
pub use crate::storage::repository::{MemoryRepository, SeaOrmMemoryRepository};
