use mockall::mock;
use mockall::predicate::{self, always, eq};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use scribe_engine::api::rate_limiter::{CounterError, CounterStore, RateLimiter};

mock! {
    Counter {}

    #[async_trait::async_trait]
    impl CounterStore for Counter {
        async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterError>;
        async fn remove(&self, key: &str) -> Result<(), CounterError>;
    }
}

#[tokio::test]
async fn test_minute_rejection_skips_hour_counter() {
    let mut store = MockCounter::new();
    store
        .expect_increment()
        .with(predicate::str::contains(":minute:"), eq(Duration::from_secs(60)))
        .times(1)
        .returning(|_, _| Ok(61));
    store
        .expect_increment()
        .with(predicate::str::contains(":hour:"), always())
        .times(0);

    let limiter = RateLimiter::new(Arc::new(store));
    let decision = limiter.check(Uuid::new_v4(), "messages", 60, 1000).await;

    assert!(!decision.allowed);
    assert_eq!(
        decision.reason.as_deref(),
        Some("Rate limit exceeded: 60 requests per minute")
    );
}

#[tokio::test]
async fn test_both_windows_incremented_on_allow() {
    let mut store = MockCounter::new();
    store
        .expect_increment()
        .with(predicate::str::contains(":minute:"), eq(Duration::from_secs(60)))
        .times(1)
        .returning(|_, _| Ok(1));
    store
        .expect_increment()
        .with(predicate::str::contains(":hour:"), eq(Duration::from_secs(3600)))
        .times(1)
        .returning(|_, _| Ok(1));

    let limiter = RateLimiter::new(Arc::new(store));
    let decision = limiter.check(Uuid::new_v4(), "messages", 60, 1000).await;

    assert!(decision.allowed);
    assert!(decision.reason.is_none());
}

#[tokio::test]
async fn test_hour_window_rejection_names_hour() {
    let mut store = MockCounter::new();
    store
        .expect_increment()
        .with(predicate::str::contains(":minute:"), always())
        .returning(|_, _| Ok(1));
    store
        .expect_increment()
        .with(predicate::str::contains(":hour:"), always())
        .returning(|_, _| Ok(1001));

    let limiter = RateLimiter::new(Arc::new(store));
    let decision = limiter.check(Uuid::new_v4(), "messages", 60, 1000).await;

    assert!(!decision.allowed);
    assert_eq!(
        decision.reason.as_deref(),
        Some("Rate limit exceeded: 1000 requests per hour")
    );
}

#[tokio::test]
async fn test_backend_outage_fails_open() {
    let mut store = MockCounter::new();
    store
        .expect_increment()
        .returning(|_, _| Err(CounterError::Backend("connection refused".to_string())));

    let limiter = RateLimiter::new(Arc::new(store));
    let decision = limiter.check(Uuid::new_v4(), "messages", 1, 1).await;

    assert!(decision.allowed);
}

#[tokio::test]
async fn test_reset_removes_both_window_keys() {
    let mut store = MockCounter::new();
    store
        .expect_remove()
        .with(predicate::str::contains(":minute:"))
        .times(1)
        .returning(|_| Ok(()));
    store
        .expect_remove()
        .with(predicate::str::contains(":hour:"))
        .times(1)
        .returning(|_| Ok(()));

    let limiter = RateLimiter::new(Arc::new(store));
    limiter.reset(Uuid::new_v4(), "messages").await.unwrap();
}

#[tokio::test]
async fn test_keys_scope_user_and_endpoint() {
    let user = Uuid::new_v4();
    let expected = format!("rate_limit:{}:content:", user);

    let mut store = MockCounter::new();
    store
        .expect_increment()
        .with(predicate::str::starts_with(expected), always())
        .times(2)
        .returning(|_, _| Ok(1));

    let limiter = RateLimiter::new(Arc::new(store));
    assert!(limiter.check(user, "content", 30, 500).await.allowed);
}
