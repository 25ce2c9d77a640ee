use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scribe_engine::{
    api::{rate_limiter::InMemoryCounterStore, routes, RateLimiter},
    config::Config,
    orchestrator::ConversationOrchestrator,
    services::{
        context_store::ContextStore, embedding_provider::OpenAiEmbeddingProvider,
        embedding_store::EmbeddingStore, language_model::OpenAiChatClient,
    },
    storage::{self, repository::SeaOrmMemoryRepository},
};

#[derive(Debug, Parser)]
#[command(name = "scribe-engine", about = "Memory-augmented conversation engine")]
struct Cli {
    /// Override the configured HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured database URL
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribe_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }
    let config = Arc::new(config);

    let db = storage::init_db(&config.database_url).await?;
    let repo = Arc::new(SeaOrmMemoryRepository::new(db));

    let model = Arc::new(OpenAiChatClient::new(
        config.openai_base_url.clone(),
        config.openai_api_key.clone(),
        config.default_model.clone(),
    ));
    let provider = Arc::new(OpenAiEmbeddingProvider::new(
        config.openai_base_url.clone(),
        config.openai_api_key.clone(),
        config.embedding_model.clone(),
    ));

    let context_store = Arc::new(ContextStore::new(repo.clone(), model.clone()));
    let embedding_store = Arc::new(EmbeddingStore::new(
        repo.clone(),
        provider,
        config.embedding_model.clone(),
        config.embedding_dimension,
    ));
    let orchestrator = Arc::new(ConversationOrchestrator::new(
        repo.clone(),
        model,
        context_store.clone(),
        embedding_store.clone(),
        config.max_context_messages,
    ));

    // Counter backend with a periodic sweep of expired windows
    let counter_store = Arc::new(InMemoryCounterStore::new());
    let sweeper = counter_store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            sweeper.purge_expired().await;
        }
    });
    let rate_limiter = Arc::new(RateLimiter::new(counter_store));

    let state = routes::AppState {
        config: config.clone(),
        repo,
        orchestrator,
        context_store,
        embedding_store,
        rate_limiter,
    };

    let app = routes::create_router(state);

    let addr: SocketAddr = format!("127.0.0.1:{}", config.server_port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Model backend: {}", config.openai_base_url);
    tracing::info!("API docs: http://{}/docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
