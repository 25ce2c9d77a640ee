use super::*;
use scribe_engine::models::internal::{NewUsageRecord, PlanTier};

#[tokio::test]
async fn test_create_user_assigns_plan_quota() {
    let state = default_state().await;

    let free = state.repo.create_user(PlanTier::Free).await.unwrap();
    assert_eq!(free.monthly_quota, 100);
    assert_eq!(free.used_quota, 0);

    let pro = state.repo.create_user(PlanTier::Pro).await.unwrap();
    assert_eq!(pro.monthly_quota, 10_000);

    let found = state.repo.find_user(free.id).await.unwrap().unwrap();
    assert_eq!(found.id, free.id);
    assert_eq!(found.plan, PlanTier::Free);
}

#[tokio::test]
async fn test_find_unknown_user_returns_none() {
    let state = default_state().await;
    assert!(state.repo.find_user(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_conversation_ids_are_prefixed_and_unique() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let a = state.repo.create_conversation(user, "First").await.unwrap();
    let b = state.repo.create_conversation(user, "Second").await.unwrap();

    assert!(a.id.starts_with("conv_"));
    assert_eq!(a.id.len(), "conv_".len() + 12);
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn test_find_conversation_is_scoped_to_owner() {
    let state = default_state().await;
    let owner = create_user(&state, PlanTier::Free).await;
    let other = create_user(&state, PlanTier::Free).await;

    let conversation = state
        .repo
        .create_conversation(owner, "Private")
        .await
        .unwrap();

    assert!(state
        .repo
        .find_conversation(&conversation.id, owner)
        .await
        .unwrap()
        .is_some());
    assert!(state
        .repo
        .find_conversation(&conversation.id, other)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_list_conversations_pages_with_counts() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    for i in 0..3 {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let conversation = state
            .repo
            .create_conversation(user, &format!("Thread {}", i))
            .await
            .unwrap();
        for _ in 0..=i {
            state
                .repo
                .append_message(&conversation.id, "user", "hi", 0, None)
                .await
                .unwrap();
        }
    }

    let (page, total) = state.repo.list_conversations(user, 2, 0).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);
    // Most recently updated first: "Thread 2" carries three messages
    assert_eq!(page[0].0.title, "Thread 2");
    assert_eq!(page[0].1, 3);

    let (rest, total) = state.repo.list_conversations(user, 2, 2).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(rest.len(), 1);
}

#[tokio::test]
async fn test_append_message_bumps_conversation_updated_at() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let conversation = state
        .repo
        .create_conversation(user, "Timestamps")
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    state
        .repo
        .append_message(&conversation.id, "user", "hello", 0, None)
        .await
        .unwrap();

    let refreshed = state
        .repo
        .find_conversation(&conversation.id, user)
        .await
        .unwrap()
        .unwrap();
    assert!(refreshed.updated_at >= conversation.updated_at);
}

#[tokio::test]
async fn test_recent_messages_returns_tail_oldest_first() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let conversation = state
        .repo
        .create_conversation(user, "Window")
        .await
        .unwrap();
    for i in 0..5 {
        state
            .repo
            .append_message(&conversation.id, "user", &format!("msg {}", i), 0, None)
            .await
            .unwrap();
    }

    let window = state.repo.recent_messages(&conversation.id, 3).await.unwrap();
    assert_eq!(window.len(), 3);
    assert_eq!(window[0].content, "msg 2");
    assert_eq!(window[2].content, "msg 4");
    assert!(window[0].id < window[1].id && window[1].id < window[2].id);
}

#[tokio::test]
async fn test_upsert_embedding_replaces_existing_vector() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let conversation = state
        .repo
        .create_conversation(user, "Vectors")
        .await
        .unwrap();
    let message = state
        .repo
        .append_message(&conversation.id, "assistant", "reply", 10, None)
        .await
        .unwrap();

    state
        .repo
        .upsert_embedding(message.id, &[1.0, 0.0, 0.0], "text-embedding-3-small")
        .await
        .unwrap();
    state
        .repo
        .upsert_embedding(message.id, &[0.0, 1.0, 0.0], "text-embedding-3-small")
        .await
        .unwrap();

    let stored = state
        .repo
        .embedding_for_message(message.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, vec![0.0, 1.0, 0.0]);

    let all = state.repo.embeddings_for_user(user).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_upsert_context_is_last_write_wins() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    state
        .repo
        .upsert_context(user, "writing_style", "casual", 0.7, None)
        .await
        .unwrap();
    state
        .repo
        .upsert_context(user, "writing_style", "formal", 1.0, Some("conv_abc123def456"))
        .await
        .unwrap();

    let fact = state
        .repo
        .find_context(user, "writing_style")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fact.value, "formal");
    assert!((fact.confidence - 1.0).abs() < 1e-6);
    assert_eq!(fact.source_conversation_id.as_deref(), Some("conv_abc123def456"));

    assert_eq!(state.repo.list_contexts(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_contexts_orders_by_confidence() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    state
        .repo
        .upsert_context(user, "industry", "tech", 0.7, None)
        .await
        .unwrap();
    state
        .repo
        .upsert_context(user, "writing_style", "casual", 1.0, None)
        .await
        .unwrap();

    let facts = state.repo.list_contexts(user).await.unwrap();
    assert_eq!(facts[0].key, "writing_style");
    assert_eq!(facts[1].key, "industry");
}

#[tokio::test]
async fn test_delete_context_reports_whether_row_existed() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    state
        .repo
        .upsert_context(user, "industry", "tech", 1.0, None)
        .await
        .unwrap();

    assert!(state.repo.delete_context(user, "industry").await.unwrap());
    assert!(!state.repo.delete_context(user, "industry").await.unwrap());
}

#[tokio::test]
async fn test_delete_conversation_cascades() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    let conversation = state
        .repo
        .create_conversation(user, "Doomed")
        .await
        .unwrap();
    let message = state
        .repo
        .append_message(&conversation.id, "assistant", "reply", 10, None)
        .await
        .unwrap();
    state
        .repo
        .upsert_embedding(message.id, &[1.0, 0.0, 0.0], "text-embedding-3-small")
        .await
        .unwrap();
    state
        .repo
        .upsert_summary(&conversation.id, "a summary", None)
        .await
        .unwrap();

    assert!(state
        .repo
        .delete_conversation(&conversation.id, user)
        .await
        .unwrap());

    assert!(state
        .repo
        .find_conversation(&conversation.id, user)
        .await
        .unwrap()
        .is_none());
    assert_eq!(state.repo.count_messages().await.unwrap(), 0);
    assert!(state
        .repo
        .embedding_for_message(message.id)
        .await
        .unwrap()
        .is_none());
    assert!(state
        .repo
        .find_summary(&conversation.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_delete_conversation_refuses_foreign_owner() {
    let state = default_state().await;
    let owner = create_user(&state, PlanTier::Free).await;
    let other = create_user(&state, PlanTier::Free).await;

    let conversation = state
        .repo
        .create_conversation(owner, "Mine")
        .await
        .unwrap();

    assert!(!state
        .repo
        .delete_conversation(&conversation.id, other)
        .await
        .unwrap());
    assert_eq!(state.repo.count_conversations().await.unwrap(), 1);
}

#[tokio::test]
async fn test_record_usage_debits_quota() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Free).await;

    state
        .repo
        .record_usage(NewUsageRecord {
            user_id: user,
            endpoint: "/chat".to_string(),
            content_type: Some("conversation".to_string()),
            tokens_used: 250,
            credits_used: 4,
            cost: 0.00025,
            ai_model: "gpt-4o-mini".to_string(),
            response_time_ms: 120,
            status_code: 200,
            extra_data: None,
        })
        .await
        .unwrap();

    let account = state.repo.find_user(user).await.unwrap().unwrap();
    assert_eq!(account.used_quota, 4);
    assert_eq!(account.remaining_quota(), 96);
}

#[tokio::test]
async fn test_user_stats_aggregates_recent_records() {
    let state = default_state().await;
    let user = create_user(&state, PlanTier::Basic).await;

    for (model, content_type, tokens) in [
        ("gpt-4o-mini", "blog", 100),
        ("gpt-4o-mini", "email", 200),
        ("gpt-4o", "blog", 300),
    ] {
        state
            .repo
            .record_usage(NewUsageRecord {
                user_id: user,
                endpoint: "/chat".to_string(),
                content_type: Some(content_type.to_string()),
                tokens_used: tokens,
                credits_used: 1,
                cost: 0.001,
                ai_model: model.to_string(),
                response_time_ms: 100,
                status_code: 200,
                extra_data: None,
            })
            .await
            .unwrap();
    }

    let stats = state.repo.user_stats(user, 30).await.unwrap();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.total_tokens, 600);
    assert_eq!(stats.total_credits, 3);
    assert_eq!(stats.by_model.get("gpt-4o-mini"), Some(&2));
    assert_eq!(stats.by_model.get("gpt-4o"), Some(&1));
    assert_eq!(stats.by_content_type.get("blog"), Some(&2));
    assert!((stats.avg_response_time_ms - 100.0).abs() < 1e-6);

    // Another user's ledger stays empty
    let stranger = create_user(&state, PlanTier::Free).await;
    let empty = state.repo.user_stats(stranger, 30).await.unwrap();
    assert_eq!(empty.total_requests, 0);
}
