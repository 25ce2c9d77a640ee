//! Shared-API-key guard for the HTTP boundary.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::api::routes::AppState;

/// Comparing digests rather than the raw keys keeps the comparison
/// length-independent of the secret.
fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Extractor that rejects requests without a valid bearer API key.
pub struct ApiKeyAuth;

impl FromRequestParts<AppState> for ApiKeyAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                let body = Json(json!({ "error": "Missing authorization header" }));
                (StatusCode::UNAUTHORIZED, body).into_response()
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            let body = Json(json!({ "error": "Invalid authorization format" }));
            (StatusCode::BAD_REQUEST, body).into_response()
        })?;

        if token.len() >= 32 && digest(token) == digest(&state.config.api_key) {
            Ok(ApiKeyAuth)
        } else {
            Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Invalid API key" })),
            )
                .into_response())
        }
    }
}
