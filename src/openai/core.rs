use std::time::Duration;

use anyhow::anyhow;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

// Matches the original assistant's completion settings.
const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 1000;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    /// The model API could not be reached or refused the request.
    /// Surfaced as 503.
    #[error("AI service temporarily unavailable")]
    Unavailable(#[source] anyhow::Error),
    /// The API responded but the payload did not parse.
    #[error("Malformed completion response")]
    Protocol(#[source] anyhow::Error),
}

fn completions_url(api_hostname: &str) -> String {
    format!("{}/v1/chat/completions", api_hostname.trim_end_matches('/'))
}

/// Request a complete (non-streaming) chat completion and return the
/// assistant's message content.
pub async fn completion(
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<String, LlmError> {
    let payload = json!({
        "model": model,
        "messages": messages,
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS,
        "stream": false,
    });

    let response = reqwest::Client::new()
        .post(completions_url(api_hostname))
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 10))
        .json(&payload)
        .send()
        .await
        .map_err(|e| LlmError::Unavailable(e.into()))?
        .error_for_status()
        .map_err(|e| LlmError::Unavailable(e.into()))?;

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| LlmError::Protocol(e.into()))?;

    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LlmError::Protocol(anyhow!("No message content in response: {body}")))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Delta {
    Content { content: String },
    Stop {},
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChunkChoice>,
}

/// Request a streaming chat completion. Each content fragment is
/// forwarded through `tx` as it arrives; the assembled message is
/// returned once the stream finishes. Send failures on `tx` (the
/// receiver went away) stop forwarding, but the response is still
/// drained so the full content can be returned.
pub async fn completion_stream(
    tx: mpsc::UnboundedSender<String>,
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<String, LlmError> {
    let payload = json!({
        "model": model,
        "messages": messages,
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS,
        "stream": true,
    });

    let response = reqwest::Client::new()
        .post(completions_url(api_hostname))
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 5))
        .json(&payload)
        .send()
        .await
        .map_err(|e| LlmError::Unavailable(e.into()))?
        .error_for_status()
        .map_err(|e| LlmError::Unavailable(e.into()))?;

    let mut stream = response.bytes_stream();
    let mut content_buf = String::new();
    let mut buffer = String::new();

    'outer: while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| LlmError::Unavailable(e.into()))?;
        let chunk_str = std::str::from_utf8(&chunk).map_err(|e| LlmError::Protocol(e.into()))?;

        // Append new data to the buffer. This is necessary to handle
        // SSE fragmentation over HTTP/2 frames.
        buffer.push_str(chunk_str);

        // Process all complete SSE events from the buffer
        while let Some(event_end) = buffer.find("\n\n") {
            let event_data = buffer[..event_end].to_string();
            buffer = buffer[event_end + 2..].to_string();

            let event_data = event_data.trim();
            if event_data.is_empty() || !event_data.starts_with("data: ") {
                continue;
            }

            // Extract the JSON payload (after "data: ")
            let data = event_data[6..].trim();
            if data.is_empty() {
                continue;
            }

            if data == "[DONE]" {
                break 'outer;
            }

            let chunk = serde_json::from_str::<CompletionChunk>(data).map_err(|e| {
                tracing::error!("Parsing completion chunk failed for {}\nError: {}", data, e);
                LlmError::Protocol(e.into())
            })?;
            let Some(choice) = chunk.choices.first() else {
                continue;
            };

            if let Delta::Content { content } = &choice.delta {
                content_buf.push_str(content);
                let _ = tx.send(content.clone());
            }

            if choice.finish_reason.is_some() {
                break 'outer;
            }
        }
    }

    Ok(content_buf)
}
