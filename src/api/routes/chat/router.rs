//! Router for the chat API

use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Json, Response, sse::Event, sse::KeepAlive, sse::Sse},
    routing::post,
};
use chrono::Utc;
use http::HeaderMap;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::public;
use crate::ai::service::{message_id, process_message, stream_message};
use crate::api::public::{ApiError, bearer_token, check_admission, user_identifier};
use crate::api::state::AppState;
use crate::calendar::gcal::GoogleCalendarClient;
use crate::core::AppConfig;

type SharedState = Arc<RwLock<AppState>>;

const MAX_MESSAGE_CHARS: usize = 2000;

fn validate_request(payload: &public::ChatRequest) -> Result<(), ApiError> {
    let length = payload.message.chars().count();
    if length == 0 || length > MAX_MESSAGE_CHARS {
        return Err(ApiError::validation(
            "Invalid request format",
            Some(json!([{
                "path": ["message"],
                "message": "message must be between 1 and 2000 characters",
            }])),
        ));
    }

    if let Some(preferences) = &payload.context_preferences
        && !(1..=50).contains(&preferences.max_events)
    {
        return Err(ApiError::validation(
            "Invalid request format",
            Some(json!([{
                "path": ["contextPreferences", "maxEvents"],
                "message": "maxEvents must be between 1 and 50",
            }])),
        ));
    }

    Ok(())
}

fn admit(
    state: &SharedState,
    headers: &HeaderMap,
    payload: &public::ChatRequest,
) -> Result<(AppConfig, String), ApiError> {
    let token = bearer_token(headers)?;
    let (config, gate) = {
        let shared_state = state.read().expect("Unable to read shared state");
        (shared_state.config.clone(), shared_state.chat_gate.clone())
    };
    check_admission(gate.as_ref(), &user_identifier(headers))?;
    validate_request(payload)?;
    Ok((config, token))
}

/// Run one turn and return the packaged response.
async fn message_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<public::ChatRequest>,
) -> Result<Json<public::ChatResponse>, ApiError> {
    let started = Instant::now();
    let (config, token) = admit(&state, &headers, &payload)?;
    let now = Utc::now();

    let client = GoogleCalendarClient::new(&config.google_api_hostname, &token);
    let result = process_message(
        &client,
        &config,
        &payload.message,
        &payload.conversation_history,
        payload.include_calendar_context,
        payload.timestamp.as_deref(),
        now,
    )
    .await
    .map_err(ApiError::from_chat)?;

    Ok(Json(public::ChatResponse {
        id: message_id(now),
        message: result.response,
        timestamp: now,
        calendar_context: result.calendar_context,
        suggested_actions: Some(result.suggested_actions),
        processing_time: started.elapsed().as_millis() as u64,
        metadata: Some(public::ChatResponseMetadata {
            model: config.openai_model.clone(),
            tokens_used: None,
            context_length: payload.conversation_history.len(),
        }),
    }))
}

/// Run one turn and stream the response as SSE protocol chunks.
/// Auth, admission, and validation failures happen before the stream
/// opens and keep their status codes; later failures surface inside
/// the stream.
async fn stream_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<public::ChatRequest>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let (config, token) = admit(&state, &headers, &payload)?;
    let now = Utc::now();

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let sse_stream = UnboundedReceiverStream::new(rx)
        .map(|chunk| Ok::<Event, Infallible>(Event::default().data(chunk)));

    let client = GoogleCalendarClient::new(&config.google_api_hostname, &token);
    tokio::spawn(async move {
        stream_message(
            &client,
            &config,
            &payload.message,
            &payload.conversation_history,
            payload.include_calendar_context,
            payload.timestamp.as_deref(),
            now,
            started,
            tx,
        )
        .await;
    });

    let resp = Sse::new(sse_stream)
        .keep_alive(
            KeepAlive::default()
                .text("keep-alive")
                .interval(Duration::from_millis(100)),
        )
        .into_response();

    Ok(resp)
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/message", post(message_handler))
        .route("/stream", post(stream_handler))
}
