//! Translators between the OpenAI Chat Completions and Anthropic Messages
//! formats.
//!
//! All translators are pure functions over `serde_json::Value` with no
//! network I/O. `request` and `response` handle the buffered direction;
//! `streaming` translates Anthropic's SSE event stream into OpenAI chunks.

pub mod request;
pub mod response;
pub mod streaming;

pub use request::{OpenAiToAnthropic, WEB_SEARCH_ENV};
pub use response::AnthropicToOpenAi;
pub use streaming::{translate_event, StreamContext};
