//! Conversational core: context assembly, prompt construction,
//! action suggestions, and the response/stream builder.

pub mod actions;
pub mod context;
pub mod prompt;
pub mod service;

pub use actions::{SuggestedAction, suggest_actions};
pub use context::{ChatCalendarContext, build_context, build_prompt, build_summary};
pub use service::{ChatError, ProcessedMessage, process_message, stream_message};
