//! Client for OpenAI-compatible chat completion APIs, non-streaming
//! and streaming.

mod core;

pub use core::{LlmError, Message, Role, completion, completion_stream};
