//! Fixed per-model credit and cost tables. Unknown model identifiers
//! fall back to the default rate rather than failing.

/// Credit multiplier per 100 tokens for the given model.
fn credit_rate(model: &str) -> i64 {
    match model {
        "gpt-4o" => 10,
        "gpt-4o-mini" => 2,
        "gpt-3.5-turbo" => 1,
        _ => 1,
    }
}

/// USD per 1K tokens (combined input and output) for the given model.
fn usd_per_1k(model: &str) -> f64 {
    match model {
        "gpt-4o" => 0.06,
        "gpt-4o-mini" => 0.001,
        "gpt-3.5-turbo" => 0.002,
        _ => 0.002,
    }
}

/// Credits debited for one call: rate x floor(tokens/100), minimum 1.
pub fn calculate_credits(model: &str, tokens: i64) -> i64 {
    (credit_rate(model) * (tokens / 100)).max(1)
}

/// Monetary cost in USD for one call.
pub fn calculate_cost(model: &str, tokens: i64) -> f64 {
    (tokens as f64 / 1000.0) * usd_per_1k(model)
}
