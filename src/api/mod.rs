pub mod dto;
pub mod rate_limiter;
pub mod routes;

pub use rate_limiter::{CounterStore, InMemoryCounterStore, RateLimiter};
pub use routes::{create_router, AppState};
