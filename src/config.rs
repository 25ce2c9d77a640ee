use serde::Deserialize;
use validator::Validate;

/// Main configuration for the engine
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Shared API key checked at the HTTP boundary
    #[validate(length(min = 32))]
    pub api_key: String,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// OpenAI-compatible API base URL (chat + embeddings)
    pub openai_base_url: String,

    /// Upstream API key for the model backend
    pub openai_api_key: String,

    /// Chat model used when the caller supplies no hint
    pub default_model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Fixed embedding dimension; mismatched vectors are rejected
    #[validate(range(min = 1))]
    pub embedding_dimension: usize,

    /// Minimum cosine similarity for memory search hits
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f32,

    /// Prior messages handed to the model as conversation history
    #[validate(range(min = 1, max = 200))]
    pub max_context_messages: u64,

    /// Chat endpoint rate limits
    pub chat_rate_per_minute: u64,
    pub chat_rate_per_hour: u64,

    /// One-shot content endpoint rate limits
    pub content_rate_per_minute: u64,
    pub content_rate_per_hour: u64,

    /// Maximum database connections
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let home = dirs::home_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());

        let settings = config::Config::builder()
            // Core defaults
            .set_default("server_port", 8080)?
            .set_default("database_url", "sqlite://scribe.db")?
            .set_default("max_connections", 10)?
            .set_default("log_level", "info")?
            // Model backend defaults
            .set_default("openai_base_url", "https://api.openai.com")?
            .set_default("openai_api_key", "")?
            .set_default("default_model", "gpt-4o-mini")?
            .set_default("embedding_model", "text-embedding-3-small")?
            .set_default("embedding_dimension", 1536)?
            // Memory defaults
            .set_default("similarity_threshold", 0.7)?
            .set_default("max_context_messages", 20)?
            // Rate limit defaults
            .set_default("chat_rate_per_minute", 60)?
            .set_default("chat_rate_per_hour", 1000)?
            .set_default("content_rate_per_minute", 30)?
            .set_default("content_rate_per_hour", 500)?
            // Load from ~/.scribe/config.toml (if present)
            .add_source(
                config::File::with_name(&format!("{}/.scribe/config", home)).required(false),
            )
            // Environment overrides: SCRIBE__SERVER_PORT, SCRIBE__API_KEY, etc.
            .add_source(config::Environment::with_prefix("SCRIBE").separator("__"))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }
}
