//! Public types for the chat API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::SuggestedAction;
use crate::ai::context::ChatCalendarContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// One turn of client-held conversation history. History lives in
/// client-local storage only; each request resends the trimmed
/// transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn default_true() -> bool {
    true
}

fn default_max_events() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPreferences {
    #[serde(default = "default_true")]
    pub include_today: bool,
    #[serde(default = "default_true")]
    pub include_upcoming: bool,
    #[serde(default = "default_true")]
    pub include_analytics: bool,
    #[serde(default = "default_true")]
    pub include_availability: bool,
    #[serde(default = "default_max_events")]
    pub max_events: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default = "default_true")]
    pub include_calendar_context: bool,
    /// Client-side timestamp echoed into the system prompt.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    pub context_preferences: Option<ContextPreferences>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponseMetadata {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    pub context_length: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_context: Option<ChatCalendarContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<Vec<SuggestedAction>>,
    /// Milliseconds spent handling the request.
    pub processing_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChatResponseMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Content,
    Context,
    Actions,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One frame of the chat stream protocol, sent as an SSE data line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    pub id: String,
    pub r#type: ChunkType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChunkMetadata>,
}

impl ChatStreamChunk {
    pub fn context(id: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            r#type: ChunkType::Context,
            content: Some(content.to_string()),
            metadata: None,
        }
    }

    pub fn content(id: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            r#type: ChunkType::Content,
            content: Some(content.to_string()),
            metadata: None,
        }
    }

    pub fn done(id: &str, processing_time: u64, model: &str) -> Self {
        Self {
            id: id.to_string(),
            r#type: ChunkType::Done,
            content: None,
            metadata: Some(ChunkMetadata {
                processing_time: Some(processing_time),
                model: Some(model.to_string()),
            }),
        }
    }
}
