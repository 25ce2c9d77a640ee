pub mod conversation_summaries;
pub mod conversations;
pub mod message_embeddings;
pub mod messages;
pub mod usage_records;
pub mod user_contexts;
pub mod users;
