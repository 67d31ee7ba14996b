//! Public API types and the error taxonomy shared by every route.

use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use serde_json::{Value, json};

use crate::ai::ChatError;
use crate::calendar::CalendarError;
use crate::core::AdmissionGate;
use crate::openai::LlmError;

// Errors

/// Route-level error with a fixed status-code taxonomy. Everything
/// not explicitly classified falls through to a 500 whose detail is
/// logged but never exposed.
#[derive(Debug)]
pub enum ApiError {
    /// 401 — missing or expired credential.
    Unauthorized(String),
    /// 429 — rejected by the admission gate.
    RateLimited { retry_after: Duration },
    /// 400 — the request body failed validation.
    Validation {
        message: String,
        details: Option<Value>,
    },
    /// 503 — the language-model collaborator is unreachable.
    Unavailable(String),
    /// 500 — anything else.
    Internal(anyhow::Error),
}

/// Convert `ApiError` into an Axum compatible response.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": message})),
            )
                .into_response(),
            ApiError::RateLimited { retry_after } => {
                let seconds = retry_after.as_secs_f64().ceil() as u64;
                let body = json!({
                    "error": "Rate limit exceeded",
                    "retryAfter": seconds,
                    "message": format!("Too many requests. Try again in {seconds} seconds."),
                });
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
                response
            }
            ApiError::Validation { message, details } => {
                let mut body = json!({"error": message});
                if let Some(details) = details {
                    body["details"] = details;
                }
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ApiError::Unavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": message})),
            )
                .into_response(),
            ApiError::Internal(error) => {
                // Log the detail, expose a generic message
                tracing::error!("{}. Root cause: {}", error, error.root_cause());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Something went wrong"})),
                )
                    .into_response()
            }
        }
    }
}

/// Enables using `?` on functions that return `Result<_,
/// anyhow::Error>` to turn them into `Result<_, ApiError>`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl ApiError {
    /// Credential failures become a 401 that tells the client to
    /// re-authenticate; everything else is an internal failure.
    pub fn from_calendar(err: CalendarError) -> Self {
        match err {
            CalendarError::Unauthorized => Self::Unauthorized(err.to_string()),
            CalendarError::Fetch(source) => Self::Internal(source),
        }
    }

    pub fn from_chat(err: ChatError) -> Self {
        match err {
            ChatError::Llm(llm @ LlmError::Unavailable(_)) => {
                Self::Unavailable(llm.to_string())
            }
            ChatError::Llm(LlmError::Protocol(source)) => Self::Internal(source),
            ChatError::Internal(source) => Self::Internal(source),
        }
    }

    pub fn validation(message: &str, details: Option<Value>) -> Self {
        Self::Validation {
            message: message.to_string(),
            details,
        }
    }
}

// Request helpers shared by the routes

/// The calendar credential attached by the external authentication
/// gate.
pub fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::Unauthorized("Unauthorized - Please sign in with Google".to_string())
        })
}

/// The admission-control key for this request.
pub fn user_identifier(headers: &HeaderMap) -> String {
    headers
        .get("x-user-email")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

pub fn check_admission(gate: &dyn AdmissionGate, key: &str) -> Result<(), ApiError> {
    let decision = gate.check_and_consume(key);
    if decision.allowed {
        Ok(())
    } else {
        Err(ApiError::RateLimited {
            retry_after: decision.retry_after,
        })
    }
}

// Re-export public types from each route

pub mod calendar {
    pub use crate::api::routes::calendar::public::*;
}

pub mod chat {
    pub use crate::api::routes::chat::public::*;
}
