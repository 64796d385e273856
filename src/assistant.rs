//! Barista chat collaborator.
//!
//! The session controller treats the assistant as an opaque request/response
//! service. Any failure is replaced by fixed fallback text on the caller side.

pub mod gemini_client;
pub mod types;

pub use gemini_client::GeminiAssistant;
pub use types::{Assistant, AssistantRequest, ChatTurn, Speaker};
