pub mod context_store;
pub mod embedding_provider;
pub mod embedding_store;
pub mod language_model;

// Re-export for convenience
pub use context_store::ContextStore;
pub use embedding_provider::{EmbeddingError, EmbeddingProvider, OpenAiEmbeddingProvider};
pub use embedding_store::EmbeddingStore;
pub use language_model::{LanguageModel, ModelError, OpenAiChatClient};
