//! Builds the assistant's reply for a turn: synchronous completion
//! into a packaged response, or a producer task feeding protocol
//! chunks into an SSE channel.

use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ai::actions::{SuggestedAction, suggest_actions};
use crate::ai::context::{ChatCalendarContext, build_context, build_prompt, build_summary};
use crate::ai::prompt::render_system_prompt;
use crate::api::public::chat::{ChatMessage, ChatStreamChunk};
use crate::calendar::gcal::CalendarGateway;
use crate::core::AppConfig;
use crate::openai::{LlmError, Message, completion, completion_stream};

const APOLOGY: &str = "I apologize, but I encountered an error processing your message.";
const STREAM_APOLOGY: &str =
    "I apologize, but I encountered an error processing your message. Please try again.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Opaque per-turn message id.
pub fn message_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("msg_{}_{}", now.timestamp_millis(), &random[..9])
}

pub struct ProcessedMessage {
    pub response: String,
    pub calendar_context: Option<ChatCalendarContext>,
    pub suggested_actions: Vec<SuggestedAction>,
}

async fn assemble_prompt(
    gateway: &dyn CalendarGateway,
    config: &AppConfig,
    message: &str,
    history: &[ChatMessage],
    include_calendar_context: bool,
    timestamp: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(Vec<Message>, Option<ChatCalendarContext>), ChatError> {
    let calendar_context = if include_calendar_context {
        Some(build_context(gateway, now, config.timezone, &config.working_hours).await)
    } else {
        None
    };

    let system_prompt = match &calendar_context {
        Some(context) => {
            let summary = build_summary(context, now, config.timezone);
            let last_updated = context.last_updated.to_rfc3339();
            render_system_prompt(timestamp, Some(&summary), Some(&last_updated))?
        }
        None => render_system_prompt(timestamp, None, None)?,
    };

    Ok((
        build_prompt(&system_prompt, history, message),
        calendar_context,
    ))
}

/// Run one synchronous turn: fetch context, call the model, package
/// the reply with suggested follow-ups.
#[allow(clippy::too_many_arguments)]
pub async fn process_message(
    gateway: &dyn CalendarGateway,
    config: &AppConfig,
    message: &str,
    history: &[ChatMessage],
    include_calendar_context: bool,
    timestamp: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ProcessedMessage, ChatError> {
    let (messages, calendar_context) = assemble_prompt(
        gateway,
        config,
        message,
        history,
        include_calendar_context,
        timestamp,
        now,
    )
    .await?;

    let response = match completion(
        &messages,
        &config.openai_api_hostname,
        &config.openai_api_key,
        &config.openai_model,
    )
    .await
    {
        Ok(content) => content,
        // A reply we cannot read becomes an apology rather than a
        // failed turn; an unreachable model is surfaced to the
        // caller as unavailability.
        Err(LlmError::Protocol(e)) => {
            tracing::error!("Unusable completion response: {}", e);
            APOLOGY.to_string()
        }
        Err(e) => return Err(e.into()),
    };

    Ok(ProcessedMessage {
        response,
        calendar_context,
        suggested_actions: suggest_actions(message),
    })
}

fn send_chunk(tx: &mpsc::UnboundedSender<String>, chunk: &ChatStreamChunk) {
    match serde_json::to_string(chunk) {
        // Send failures mean the client went away; emission simply
        // stops.
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => tracing::error!("Failed to serialize stream chunk: {}", e),
    }
}

async fn try_stream(
    gateway: &dyn CalendarGateway,
    config: &AppConfig,
    message: &str,
    history: &[ChatMessage],
    include_calendar_context: bool,
    timestamp: Option<&str>,
    now: DateTime<Utc>,
    msg_id: &str,
    tx: &mpsc::UnboundedSender<String>,
) -> Result<(), ChatError> {
    let (messages, _) = assemble_prompt(
        gateway,
        config,
        message,
        history,
        include_calendar_context,
        timestamp,
        now,
    )
    .await?;

    // Fragments from the model are forwarded as content chunks while
    // the completion is still in flight.
    let (fragment_tx, mut fragment_rx) = mpsc::unbounded_channel::<String>();
    let chunk_tx = tx.clone();
    let chunk_id = msg_id.to_string();
    let forwarder = tokio::spawn(async move {
        while let Some(fragment) = fragment_rx.recv().await {
            send_chunk(&chunk_tx, &ChatStreamChunk::content(&chunk_id, &fragment));
        }
    });

    let result = completion_stream(
        fragment_tx,
        &messages,
        &config.openai_api_hostname,
        &config.openai_api_key,
        &config.openai_model,
    )
    .await;
    let _ = forwarder.await;
    result?;

    Ok(())
}

/// Run one streaming turn, emitting protocol chunks into `tx`:
/// an optional "context" chunk, one "content" chunk per model
/// fragment, and a terminal "done" chunk. A failure after the stream
/// has opened becomes a final apologetic content chunk; the channel
/// always reaches a terminal state.
#[allow(clippy::too_many_arguments)]
pub async fn stream_message(
    gateway: &dyn CalendarGateway,
    config: &AppConfig,
    message: &str,
    history: &[ChatMessage],
    include_calendar_context: bool,
    timestamp: Option<&str>,
    now: DateTime<Utc>,
    started_at: Instant,
    tx: mpsc::UnboundedSender<String>,
) {
    let msg_id = message_id(now);

    if include_calendar_context {
        send_chunk(
            &tx,
            &ChatStreamChunk::context(&msg_id, "Fetching calendar context..."),
        );
    }

    let result = try_stream(
        gateway,
        config,
        message,
        history,
        include_calendar_context,
        timestamp,
        now,
        &msg_id,
        &tx,
    )
    .await;

    match result {
        Ok(()) => {
            let processing_time = started_at.elapsed().as_millis() as u64;
            send_chunk(
                &tx,
                &ChatStreamChunk::done(&msg_id, processing_time, &config.openai_model),
            );
        }
        Err(e) => {
            tracing::error!("Streaming error: {}", e);
            let error_id = format!("error_{}", now.timestamp_millis());
            send_chunk(&tx, &ChatStreamChunk::content(&error_id, STREAM_APOLOGY));
        }
    }
}
