use super::*;
use scribe_engine::models::internal::PlanTier;
use scribe_engine::orchestrator::EngineError;
use scribe_engine::services::embedding_provider::{EmbeddingError, MockProvider};
use scribe_engine::services::language_model::{MockModel, ModelError};

#[tokio::test]
async fn test_process_creates_conversation_and_persists_pair() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let outcome = state
        .orchestrator
        .process(user, "Write me a blog post", None, "blog", true, None)
        .await
        .unwrap();

    assert!(outcome.conversation_id.starts_with("conv_"));
    assert_eq!(outcome.response, "Mock response.");
    assert_eq!(outcome.tokens_used, 250);
    assert_eq!(outcome.model_used, "gpt-4o-mini");
    // gpt-4o-mini: 2 x floor(250/100)
    assert_eq!(outcome.credits_used, 4);

    let conversation = state
        .repo
        .find_conversation(&outcome.conversation_id, user)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.title, "Write me a blog post");

    let messages = state
        .repo
        .conversation_messages(&outcome.conversation_id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);

    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].content, "Write me a blog post");
    assert_eq!(messages[0].tokens_used, 0);
    assert_eq!(messages[0].model_used, None);

    assert_eq!(messages[1].role, "assistant");
    assert_eq!(messages[1].content, "Mock response.");
    assert_eq!(messages[1].tokens_used, 250);
    assert_eq!(messages[1].model_used.as_deref(), Some("gpt-4o-mini"));
}

#[tokio::test]
async fn test_title_derived_from_long_first_message() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let message = "x".repeat(80);
    let outcome = state
        .orchestrator
        .process(user, &message, None, "default", false, None)
        .await
        .unwrap();

    let conversation = state
        .repo
        .find_conversation(&outcome.conversation_id, user)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.title.len(), 53);
    assert!(conversation.title.ends_with("..."));
}

#[tokio::test]
async fn test_process_unknown_conversation_is_fatal() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let err = state
        .orchestrator
        .process(user, "hello", Some("conv_missing00"), "default", true, None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(state.repo.count_messages().await.unwrap(), 0);
}

#[tokio::test]
async fn test_process_rejects_foreign_conversation() {
    let state = default_state().await;
    let owner = create_user(&state, PlanTier::Free).await;
    let intruder = create_user(&state, PlanTier::Free).await;

    let conversation = state
        .repo
        .create_conversation(owner, "Owner's thread")
        .await
        .unwrap();

    let err = state
        .orchestrator
        .process(intruder, "hello", Some(&conversation.id), "default", true, None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_actual_model_recorded_over_requested_hint() {
    let model = Arc::new(MockModel::new_success(
        "done",
        250,
        "gpt-4o-2024-08-06",
    ));
    let provider = Arc::new(MockProvider::new_success(vec![1.0, 0.0, 0.0]));
    let state = test_state_with(test_config(), model, provider).await;
    let user = create_user(&state, PlanTier::Pro).await;

    let outcome = state
        .orchestrator
        .process(user, "hello", None, "default", false, Some("gpt-4o"))
        .await
        .unwrap();

    assert_eq!(outcome.model_used, "gpt-4o-2024-08-06");
    // Unknown identifier falls back to the default credit rate
    assert_eq!(outcome.credits_used, 2);

    let messages = state
        .repo
        .conversation_messages(&outcome.conversation_id)
        .await
        .unwrap();
    assert_eq!(
        messages[1].model_used.as_deref(),
        Some("gpt-4o-2024-08-06")
    );
}

#[tokio::test]
async fn test_memory_applies_context_and_learns_facts() {
    let model = Arc::new(
        MockModel::new_success("Sure, punchy it is.", 100, "gpt-4o-mini").with_facts(json!({
            "writing_style": "punchy",
            "industry": "tech",
            "tone_preference": "",
            "specific_preferences": 42
        })),
    );
    let provider = Arc::new(MockProvider::new_success(vec![1.0, 0.0, 0.0]));
    let state = test_state_with(test_config(), model, provider).await;
    let user = create_user(&state, PlanTier::Basic).await;

    state
        .context_store
        .upsert(user, "writing_style", "casual", 1.0, None)
        .await
        .unwrap();

    let outcome = state
        .orchestrator
        .process(user, "make it punchy", None, "blog", true, None)
        .await
        .unwrap();

    assert_eq!(
        outcome.context_applied.get("writing_style").map(String::as_str),
        Some("casual")
    );

    // Empty strings and non-string values are dropped from the merge
    assert_eq!(outcome.learned_context.len(), 2);
    assert_eq!(outcome.learned_context["writing_style"], "punchy");
    assert_eq!(outcome.learned_context["industry"], "tech");

    let fact = state
        .repo
        .find_context(user, "industry")
        .await
        .unwrap()
        .unwrap();
    assert!((fact.confidence - 0.7).abs() < 1e-6);
    assert_eq!(
        fact.source_conversation_id.as_deref(),
        Some(outcome.conversation_id.as_str())
    );
}

#[tokio::test]
async fn test_use_memory_false_skips_snapshot_and_extraction() {
    let model = Arc::new(
        MockModel::new_success("ok", 50, "gpt-4o-mini")
            .with_facts(json!({ "writing_style": "casual" })),
    );
    let extract_calls = model.extract_calls.clone();
    let provider = Arc::new(MockProvider::new_success(vec![1.0, 0.0, 0.0]));
    let state = test_state_with(test_config(), model, provider).await;
    let user = create_user(&state, PlanTier::Free).await;

    state
        .context_store
        .upsert(user, "writing_style", "casual", 1.0, None)
        .await
        .unwrap();

    let outcome = state
        .orchestrator
        .process(user, "hello", None, "default", false, None)
        .await
        .unwrap();

    assert!(outcome.context_applied.is_empty());
    assert!(outcome.learned_context.is_empty());
    assert_eq!(*extract_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_model_failure_persists_nothing() {
    let model = Arc::new(MockModel::new_error(ModelError::Api {
        status: 503,
        message: "overloaded".to_string(),
    }));
    let provider = Arc::new(MockProvider::new_success(vec![1.0, 0.0, 0.0]));
    let state = test_state_with(test_config(), model, provider).await;
    let user = create_user(&state, PlanTier::Free).await;

    let err = state
        .orchestrator
        .process(user, "hello", None, "default", true, None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Model(_)));
    assert_eq!(state.repo.count_messages().await.unwrap(), 0);
}

#[tokio::test]
async fn test_embedding_failure_does_not_block_response() {
    let model = Arc::new(MockModel::new_success("fine", 80, "gpt-4o-mini"));
    let provider = Arc::new(MockProvider::new_error(EmbeddingError::NoEmbedding));
    let state = test_state_with(test_config(), model, provider).await;
    let user = create_user(&state, PlanTier::Free).await;

    let outcome = state
        .orchestrator
        .process(user, "hello", None, "default", false, None)
        .await
        .unwrap();

    assert_eq!(outcome.response, "fine");

    let messages = state
        .repo
        .conversation_messages(&outcome.conversation_id)
        .await
        .unwrap();
    let assistant_id = messages[1].id;
    assert!(state
        .repo
        .embedding_for_message(assistant_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_mismatched_embedding_dimension_is_rejected() {
    let model = Arc::new(MockModel::new_success("fine", 80, "gpt-4o-mini"));
    // Provider emits 2-dimensional vectors; the store expects 3
    let provider = Arc::new(MockProvider::new_success(vec![1.0, 2.0]));
    let state = test_state_with(test_config(), model, provider).await;
    let user = create_user(&state, PlanTier::Free).await;

    let outcome = state
        .orchestrator
        .process(user, "hello", None, "default", false, None)
        .await
        .unwrap();

    let messages = state
        .repo
        .conversation_messages(&outcome.conversation_id)
        .await
        .unwrap();
    assert!(state
        .repo
        .embedding_for_message(messages[1].id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_exhausted_quota_blocks_before_model_call() {
    let model = Arc::new(MockModel::new_success("never sent", 10, "gpt-4o-mini"));
    let generate_calls = model.generate_calls.clone();
    let provider = Arc::new(MockProvider::new_success(vec![1.0, 0.0, 0.0]));
    let state = test_state_with(test_config(), model, provider).await;
    let user = create_user(&state, PlanTier::Free).await;
    exhaust_quota(&state, user, 100).await;

    let err = state.orchestrator.check_quota(user).await.unwrap_err();
    match err {
        EngineError::QuotaExceeded { plan, used, quota } => {
            assert_eq!(plan, "free");
            assert_eq!(used, 100);
            assert_eq!(quota, 100);
        }
        other => panic!("expected QuotaExceeded, got {:?}", other),
    }
    assert_eq!(*generate_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_generate_is_one_shot_and_persists_nothing() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    state
        .context_store
        .upsert(user, "tone_preference", "friendly", 1.0, None)
        .await
        .unwrap();

    let outcome = state
        .orchestrator
        .generate(user, "a tagline for a bakery", "social_media", true, None)
        .await
        .unwrap();

    assert_eq!(outcome.content, "Mock response.");
    assert_eq!(
        outcome.context_applied.get("tone_preference").map(String::as_str),
        Some("friendly")
    );
    assert_eq!(state.repo.count_conversations().await.unwrap(), 0);
    assert_eq!(state.repo.count_messages().await.unwrap(), 0);
}

#[tokio::test]
async fn test_summarize_requires_messages() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let conversation = state
        .repo
        .create_conversation(user, "Empty")
        .await
        .unwrap();

    let err = state
        .orchestrator
        .summarize_conversation(user, &conversation.id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_summarize_stores_and_reuses_summary() {
    let model = Arc::new(
        MockModel::new_success("reply", 60, "gpt-4o-mini")
            .with_summary("They discussed bakery taglines."),
    );
    let provider = Arc::new(MockProvider::new_success(vec![1.0, 0.0, 0.0]));
    let state = test_state_with(test_config(), model, provider).await;
    let user = create_user(&state, PlanTier::Free).await;

    let outcome = state
        .orchestrator
        .process(user, "tagline ideas?", None, "default", false, None)
        .await
        .unwrap();

    let summary = state
        .orchestrator
        .summarize_conversation(user, &outcome.conversation_id, false)
        .await
        .unwrap();
    assert_eq!(summary.summary, "They discussed bakery taglines.");

    // Second call without regenerate returns the stored row
    let again = state
        .orchestrator
        .summarize_conversation(user, &outcome.conversation_id, false)
        .await
        .unwrap();
    assert_eq!(again.id, summary.id);

    // Regeneration upserts into the same unique row
    let regenerated = state
        .orchestrator
        .summarize_conversation(user, &outcome.conversation_id, true)
        .await
        .unwrap();
    assert_eq!(regenerated.id, summary.id);
}
