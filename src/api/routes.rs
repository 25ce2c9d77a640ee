use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;
use validator::Validate;

use crate::api::dto::*;
use crate::api::rate_limiter::RateLimiter;
use crate::auth::ApiKeyAuth;
use crate::config::Config;
use crate::models::internal::NewUsageRecord;
use crate::orchestrator::{costs, ConversationOrchestrator, EngineError};
use crate::services::context_store::{ContextProfile, ContextStore, EXPLICIT_CONFIDENCE};
use crate::services::embedding_store::EmbeddingStore;
use crate::storage::repository::MemoryRepository;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Arc<dyn MemoryRepository>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub context_store: Arc<ContextStore>,
    pub embedding_store: Arc<EmbeddingStore>,
    pub rate_limiter: Arc<RateLimiter>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn engine_error(e: EngineError) -> ApiError {
    let status = match &e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::QuotaExceeded { .. } | EngineError::RateLimited(_) => {
            StatusCode::TOO_MANY_REQUESTS
        }
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Model(_) | EngineError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: status.as_u16(),
        }),
    )
}

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
            code: 500,
        }),
    )
}

fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{} not found", what),
            code: 404,
        }),
    )
}

fn validated<T: Validate>(req: &T) -> Result<(), ApiError> {
    req.validate()
        .map_err(|e| engine_error(EngineError::Validation(e.to_string())))
}

/// Content is truncated to a fixed snippet length for search results.
fn snippet(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let prefix: String = content.chars().take(max_chars).collect();
        format!("{}...", prefix)
    }
}

/// Ledger writes are not allowed to fail the response that already
/// happened; a failed append is logged and dropped.
async fn log_usage(state: &AppState, rec: NewUsageRecord) {
    let user_id = rec.user_id;
    if let Err(e) = state.repo.record_usage(rec).await {
        tracing::error!("Failed to record usage for user {}: {}", user_id, e);
    }
}

// ==================== USERS ====================

#[utoipa::path(post, path = "/api/v1/users", request_body = CreateUserRequest,
    responses((status = 201, body = UserResponse)))]
pub async fn create_user(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .repo
        .create_user(req.plan)
        .await
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[utoipa::path(get, path = "/api/v1/users/{user_id}/quota",
    responses((status = 200, body = QuotaResponse), (status = 404, body = ErrorResponse)))]
pub async fn get_quota(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path(user_id): Path<Uuid>,
) -> Result<Json<QuotaResponse>, ApiError> {
    let user = state
        .repo
        .find_user(user_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("User"))?;

    Ok(Json(QuotaResponse::from(user)))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_stats_days")]
    pub days: i64,
}

fn default_stats_days() -> i64 {
    30
}

#[utoipa::path(get, path = "/api/v1/users/{user_id}/stats",
    responses((status = 200, body = StatsResponse)))]
pub async fn get_stats(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path(user_id): Path<Uuid>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state
        .repo
        .user_stats(user_id, params.days)
        .await
        .map_err(internal_error)?;

    Ok(Json(StatsResponse::from(stats)))
}

// ==================== CHAT ====================

#[utoipa::path(post, path = "/api/v1/chat", request_body = ChatRequest,
    responses(
        (status = 200, body = ChatResponse),
        (status = 404, body = ErrorResponse),
        (status = 429, body = ErrorResponse),
    ))]
pub async fn chat(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    validated(&req)?;

    let decision = state
        .rate_limiter
        .check(
            req.user_id,
            "messages",
            state.config.chat_rate_per_minute,
            state.config.chat_rate_per_hour,
        )
        .await;
    if !decision.allowed {
        let reason = decision.reason.unwrap_or_else(|| "Rate limited".to_string());
        return Err(engine_error(EngineError::RateLimited(reason)));
    }

    state
        .orchestrator
        .check_quota(req.user_id)
        .await
        .map_err(engine_error)?;

    let started = Instant::now();
    let result = state
        .orchestrator
        .process(
            req.user_id,
            &req.message,
            req.conversation_id.as_deref(),
            &req.content_type,
            req.use_memory,
            req.model.as_deref(),
        )
        .await;
    let response_time_ms = started.elapsed().as_millis() as i64;

    match result {
        Ok(outcome) => {
            log_usage(
                &state,
                NewUsageRecord {
                    user_id: req.user_id,
                    endpoint: "/chat".to_string(),
                    content_type: Some(req.content_type.clone()),
                    tokens_used: outcome.tokens_used,
                    credits_used: outcome.credits_used,
                    cost: costs::calculate_cost(&outcome.model_used, outcome.tokens_used),
                    ai_model: outcome.model_used.clone(),
                    response_time_ms,
                    status_code: 200,
                    extra_data: None,
                },
            )
            .await;

            Ok(Json(ChatResponse::from(outcome)))
        }
        Err(e @ EngineError::NotFound(_)) => Err(engine_error(e)),
        Err(e) => {
            log_usage(
                &state,
                NewUsageRecord {
                    user_id: req.user_id,
                    endpoint: "/chat".to_string(),
                    content_type: Some(req.content_type.clone()),
                    tokens_used: 0,
                    credits_used: 0,
                    cost: 0.0,
                    ai_model: "unknown".to_string(),
                    response_time_ms,
                    status_code: 500,
                    extra_data: Some(serde_json::json!({ "error": e.to_string() })),
                },
            )
            .await;

            Err(engine_error(e))
        }
    }
}

// ==================== CONTENT ====================

#[utoipa::path(post, path = "/api/v1/content/generate", request_body = GenerateContentRequest,
    responses((status = 200, body = ContentResponse), (status = 429, body = ErrorResponse)))]
pub async fn generate_content(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Json(req): Json<GenerateContentRequest>,
) -> Result<Json<ContentResponse>, ApiError> {
    validated(&req)?;

    let decision = state
        .rate_limiter
        .check(
            req.user_id,
            "content",
            state.config.content_rate_per_minute,
            state.config.content_rate_per_hour,
        )
        .await;
    if !decision.allowed {
        let reason = decision.reason.unwrap_or_else(|| "Rate limited".to_string());
        return Err(engine_error(EngineError::RateLimited(reason)));
    }

    state
        .orchestrator
        .check_quota(req.user_id)
        .await
        .map_err(engine_error)?;

    let started = Instant::now();
    let result = state
        .orchestrator
        .generate(
            req.user_id,
            &req.topic,
            &req.content_type,
            req.use_memory,
            req.model.as_deref(),
        )
        .await;
    let response_time_ms = started.elapsed().as_millis() as i64;

    match result {
        Ok(outcome) => {
            log_usage(
                &state,
                NewUsageRecord {
                    user_id: req.user_id,
                    endpoint: "/content/generate".to_string(),
                    content_type: Some(req.content_type.clone()),
                    tokens_used: outcome.tokens_used,
                    credits_used: outcome.credits_used,
                    cost: costs::calculate_cost(&outcome.model_used, outcome.tokens_used),
                    ai_model: outcome.model_used.clone(),
                    response_time_ms,
                    status_code: 200,
                    extra_data: None,
                },
            )
            .await;

            Ok(Json(ContentResponse::from(outcome)))
        }
        Err(e) => {
            log_usage(
                &state,
                NewUsageRecord {
                    user_id: req.user_id,
                    endpoint: "/content/generate".to_string(),
                    content_type: Some(req.content_type.clone()),
                    tokens_used: 0,
                    credits_used: 0,
                    cost: 0.0,
                    ai_model: "unknown".to_string(),
                    response_time_ms,
                    status_code: 500,
                    extra_data: Some(serde_json::json!({ "error": e.to_string() })),
                },
            )
            .await;

            Err(engine_error(e))
        }
    }
}

// ==================== CONVERSATIONS ====================

#[utoipa::path(post, path = "/api/v1/conversations", request_body = CreateConversationRequest,
    responses((status = 201, body = ConversationResponse)))]
pub async fn create_conversation(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), ApiError> {
    let title = req.title.as_deref().unwrap_or("New Conversation");
    let conversation = state
        .repo
        .create_conversation(req.user_id, title)
        .await
        .map_err(internal_error)?;

    let mut initial_response = None;
    if let Some(message) = &req.initial_message {
        let outcome = state
            .orchestrator
            .process(
                req.user_id,
                message,
                Some(&conversation.id),
                "default",
                true,
                None,
            )
            .await
            .map_err(engine_error)?;
        initial_response = Some(outcome.response);
    }

    let message_count = state
        .repo
        .count_messages_in_conversation(&conversation.id)
        .await
        .map_err(internal_error)?;

    let mut body = ConversationResponse::from_conversation(conversation, message_count);
    body.initial_response = initial_response;
    Ok((StatusCode::CREATED, Json(body)))
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub user_id: Uuid,
    #[serde(default = "default_list_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

fn default_list_limit() -> u64 {
    20
}

#[utoipa::path(get, path = "/api/v1/conversations",
    responses((status = 200, body = ConversationListResponse)))]
pub async fn list_conversations(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Query(params): Query<ListConversationsQuery>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let (page, total) = state
        .repo
        .list_conversations(params.user_id, params.limit, params.offset)
        .await
        .map_err(internal_error)?;

    let conversations = page
        .into_iter()
        .map(|(conversation, count)| {
            ConversationResponse::from_conversation(conversation, count)
        })
        .collect();

    Ok(Json(ConversationListResponse {
        conversations,
        total,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConversationDetailQuery {
    pub user_id: Uuid,
    #[serde(default = "default_true_flag")]
    pub include_messages: bool,
}

fn default_true_flag() -> bool {
    true
}

#[utoipa::path(get, path = "/api/v1/conversations/{id}",
    responses((status = 200, body = ConversationDetailResponse), (status = 404, body = ErrorResponse)))]
pub async fn get_conversation(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path(id): Path<String>,
    Query(params): Query<ConversationDetailQuery>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let conversation = state
        .repo
        .find_conversation(&id, params.user_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Conversation"))?;

    let message_count = state
        .repo
        .count_messages_in_conversation(&id)
        .await
        .map_err(internal_error)?;

    let messages = if params.include_messages {
        state
            .repo
            .conversation_messages(&id)
            .await
            .map_err(internal_error)?
            .into_iter()
            .map(MessageDto::from)
            .collect()
    } else {
        Vec::new()
    };

    Ok(Json(ConversationDetailResponse {
        id: conversation.id,
        title: conversation.title,
        is_active: conversation.is_active,
        message_count,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        messages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: Uuid,
}

#[utoipa::path(delete, path = "/api/v1/conversations/{id}",
    responses((status = 204), (status = 404, body = ErrorResponse)))]
pub async fn delete_conversation(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path(id): Path<String>,
    Query(params): Query<OwnerQuery>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .repo
        .delete_conversation(&id, params.user_id)
        .await
        .map_err(internal_error)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Conversation"))
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub user_id: Uuid,
    #[serde(default)]
    pub regenerate: bool,
}

#[utoipa::path(get, path = "/api/v1/conversations/{id}/summary",
    responses((status = 200, body = SummaryResponse), (status = 404, body = ErrorResponse)))]
pub async fn get_conversation_summary(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path(id): Path<String>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = state
        .orchestrator
        .summarize_conversation(params.user_id, &id, params.regenerate)
        .await
        .map_err(engine_error)?;

    Ok(Json(SummaryResponse {
        conversation_id: summary.conversation_id,
        summary: summary.summary,
        key_points: summary.key_points,
        updated_at: summary.updated_at,
    }))
}

// ==================== MEMORY ====================

#[utoipa::path(get, path = "/api/v1/memory/context/{user_id}",
    responses((status = 200, body = ContextProfile)))]
pub async fn get_context_profile(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ContextProfile>, ApiError> {
    let profile = state
        .context_store
        .profile(user_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(profile))
}

#[utoipa::path(get, path = "/api/v1/memory/context/{user_id}/all",
    responses((status = 200, body = Vec<ContextFactResponse>)))]
pub async fn get_all_context(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ContextFactResponse>>, ApiError> {
    let facts = state
        .context_store
        .all(user_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(facts.into_iter().map(ContextFactResponse::from).collect()))
}

#[utoipa::path(put, path = "/api/v1/memory/context/{user_id}/{key}",
    request_body = ContextValueRequest,
    responses((status = 200, body = ContextFactResponse)))]
pub async fn update_context(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path((user_id, key)): Path<(Uuid, String)>,
    Json(req): Json<ContextValueRequest>,
) -> Result<Json<ContextFactResponse>, ApiError> {
    validated(&req)?;

    let fact = state
        .context_store
        .upsert(user_id, &key, &req.value, EXPLICIT_CONFIDENCE, None)
        .await
        .map_err(internal_error)?;

    Ok(Json(ContextFactResponse::from(fact)))
}

#[utoipa::path(post, path = "/api/v1/memory/context/{user_id}",
    request_body = ContextCreateRequest,
    responses((status = 200, body = ContextFactResponse), (status = 400, body = ErrorResponse)))]
pub async fn create_context(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ContextCreateRequest>,
) -> Result<Json<ContextFactResponse>, ApiError> {
    validated(&req)?;

    let existing = state
        .context_store
        .get(user_id, &req.key)
        .await
        .map_err(internal_error)?;
    if existing.is_some() && !req.override_existing {
        return Err(engine_error(EngineError::Validation(
            "Context key already exists. Use override=true to update.".to_string(),
        )));
    }

    let fact = state
        .context_store
        .upsert(user_id, &req.key, &req.value, EXPLICIT_CONFIDENCE, None)
        .await
        .map_err(internal_error)?;

    Ok(Json(ContextFactResponse::from(fact)))
}

#[utoipa::path(delete, path = "/api/v1/memory/context/{user_id}/{key}",
    responses((status = 204), (status = 404, body = ErrorResponse)))]
pub async fn delete_context(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path((user_id, key)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .context_store
        .delete(user_id, &key)
        .await
        .map_err(internal_error)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Context"))
    }
}

#[utoipa::path(post, path = "/api/v1/memory/search", request_body = MemorySearchRequest,
    responses((status = 200, body = MemorySearchResponse)))]
pub async fn search_memory(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Json(req): Json<MemorySearchRequest>,
) -> Result<Json<MemorySearchResponse>, ApiError> {
    validated(&req)?;

    let min_similarity = req
        .min_similarity
        .unwrap_or(state.config.similarity_threshold);
    let hits = state
        .embedding_store
        .search(&req.query, req.user_id, req.limit, min_similarity)
        .await;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let title = state
            .repo
            .find_conversation(&hit.message.conversation_id, req.user_id)
            .await
            .map_err(internal_error)?
            .map(|c| c.title)
            .unwrap_or_default();

        results.push(SearchHitDto {
            conversation_id: hit.message.conversation_id,
            title,
            snippet: snippet(&hit.message.content, 200),
            relevance_score: (hit.score * 1000.0).round() / 1000.0,
            date: hit.message.created_at,
        });
    }

    let total = results.len();
    Ok(Json(MemorySearchResponse { results, total }))
}

// ==================== ADMIN / OBSERVABILITY ====================

#[utoipa::path(delete, path = "/api/v1/admin/rate-limits/{user_id}/{endpoint}",
    responses((status = 204)))]
pub async fn reset_rate_limits(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Path((user_id, endpoint)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .rate_limiter
        .reset(user_id, &endpoint)
        .await
        .map_err(internal_error)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn metrics(State(state): State<AppState>) -> String {
    let conversations = state.repo.count_conversations().await.unwrap_or(0);
    let messages = state.repo.count_messages().await.unwrap_or(0);

    format!(
        "# HELP scribe_conversations_total Total number of conversations\n\
         # TYPE scribe_conversations_total gauge\n\
         scribe_conversations_total {}\n\
         # HELP scribe_messages_total Total number of messages\n\
         # TYPE scribe_messages_total gauge\n\
         scribe_messages_total {}\n\
         # HELP scribe_up Whether the service is up\n\
         # TYPE scribe_up gauge\n\
         scribe_up 1\n",
        conversations, messages
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_user,
        get_quota,
        get_stats,
        chat,
        generate_content,
        create_conversation,
        list_conversations,
        get_conversation,
        delete_conversation,
        get_conversation_summary,
        get_context_profile,
        get_all_context,
        update_context,
        create_context,
        delete_context,
        search_memory,
        reset_rate_limits,
    ),
    components(schemas(
        CreateUserRequest,
        ChatRequest,
        GenerateContentRequest,
        CreateConversationRequest,
        ContextValueRequest,
        ContextCreateRequest,
        MemorySearchRequest,
        UserResponse,
        QuotaResponse,
        StatsResponse,
        ChatResponse,
        ContentResponse,
        ConversationResponse,
        ConversationListResponse,
        ConversationDetailResponse,
        MessageDto,
        SummaryResponse,
        ContextFactResponse,
        ContextProfile,
        SearchHitDto,
        MemorySearchResponse,
        ErrorResponse,
    ))
)]
struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/users", post(create_user))
        .route("/api/v1/users/{user_id}/quota", get(get_quota))
        .route("/api/v1/users/{user_id}/stats", get(get_stats))
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/content/generate", post(generate_content))
        .route(
            "/api/v1/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route(
            "/api/v1/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route(
            "/api/v1/conversations/{id}/summary",
            get(get_conversation_summary),
        )
        .route(
            "/api/v1/memory/context/{user_id}",
            get(get_context_profile).post(create_context),
        )
        .route(
            "/api/v1/memory/context/{user_id}/all",
            get(get_all_context),
        )
        .route(
            "/api/v1/memory/context/{user_id}/{key}",
            put(update_context).delete(delete_context),
        )
        .route("/api/v1/memory/search", post(search_memory))
        .route(
            "/api/v1/admin/rate-limits/{user_id}/{endpoint}",
            delete(reset_rate_limits),
        )
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
