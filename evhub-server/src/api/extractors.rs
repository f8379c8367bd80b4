//! Custom Axum extractors for request authentication and input decoding.
//!
//! Provides:
//! - `AdminAuth`: management API credential from `Authorization: Bearer` or
//!   `X-API-Key`.
//! - `StreamAuth`: event-stream credential from the `token` or `api_key`
//!   query parameter, checked before the WebSocket upgrade.
//! - `ApiJson`, `ApiQuery`, `ApiPath`: the stock extractors with rejections
//!   mapped onto [`WebhookApiError`].
//!
//! Credentials are checked against the argon2 hashes in the admin config on
//! the blocking pool.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::api::webhooks::{ErrorBody, WebhookApiError};
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// The authenticated principal of a management request.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub principal: String,
}

/// The authenticated principal of an event-stream upgrade.
#[derive(Debug, Clone)]
pub struct StreamAuth {
    pub principal: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential")]
    Invalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Verify `presented` against the configured tokens and return the
/// principal name.
async fn authenticate(state: &AppState, presented: String) -> Result<String, AuthError> {
    let admin = state.config.admin.read().await.clone();
    tokio::task::spawn_blocking(move || admin.authenticate(&presented).map(str::to_owned))
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Credential verification task failed");
            None
        })
        .ok_or(AuthError::Invalid)
}

fn header_credential(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        let value = value.to_str().ok()?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))?;
        return Some(token.trim().to_owned());
    }
    parts
        .headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_owned())
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = header_credential(parts)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Missing)?;
        let principal = authenticate(state, presented).await?;
        Ok(AdminAuth { principal })
    }
}

#[derive(Debug, Deserialize)]
struct StreamCredentialQuery {
    token: Option<String>,
    api_key: Option<String>,
}

impl FromRequestParts<AppState> for StreamAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<StreamCredentialQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::Missing)?;
        let presented = query
            .token
            .or(query.api_key)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Missing)?;
        let principal = authenticate(state, presented).await?;
        Ok(StreamAuth { principal })
    }
}

/// `axum::Json` with malformed bodies reported as validation errors.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(WebhookApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with malformed parameters reported as validation
/// errors.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(WebhookApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(WebhookApiError))]
pub struct ApiPath<T>(pub T);
