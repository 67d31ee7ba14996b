//! Test utilities for integration tests
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{Router, body::Body};

use calvin::api::{AppState, app};
use calvin::calendar::WorkingHours;
use calvin::core::config::RateLimitConfig;
use calvin::core::{AppConfig, InMemoryRateLimiter};

/// A config pointing both collaborators at test-controlled hostnames
/// with generous rate limits.
pub fn test_config(google_api_hostname: &str, openai_api_hostname: &str) -> AppConfig {
    AppConfig {
        google_api_hostname: google_api_hostname.to_string(),
        openai_api_hostname: openai_api_hostname.to_string(),
        openai_api_key: String::from("test-api-key"),
        openai_model: String::from("gpt-4-turbo-preview"),
        timezone: chrono_tz::UTC,
        working_hours: WorkingHours::default(),
        chat_rate_limit: RateLimitConfig {
            max_requests: 1000,
            window: Duration::from_secs(60),
        },
        calendar_rate_limit: RateLimitConfig {
            max_requests: 1000,
            window: Duration::from_secs(60),
        },
    }
}

/// Creates a test application router from a config.
pub fn test_app(config: AppConfig) -> Router {
    let app_state = AppState::new(config);
    app(Arc::new(RwLock::new(app_state)))
}

/// Like `test_app` but with a chat admission gate capped at
/// `max_requests` per minute.
pub fn test_app_with_chat_limit(config: AppConfig, max_requests: u32) -> Router {
    let chat_gate = Arc::new(InMemoryRateLimiter::new(RateLimitConfig {
        max_requests,
        window: Duration::from_secs(60),
    }));
    let calendar_gate = Arc::new(InMemoryRateLimiter::new(config.calendar_rate_limit));
    let app_state = AppState::with_gates(config, chat_gate, calendar_gate);
    app(Arc::new(RwLock::new(app_state)))
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read response body");
    String::from_utf8(bytes.to_vec()).expect("Response body was not valid UTF-8")
}
