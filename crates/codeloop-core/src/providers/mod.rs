//! LLM provider implementation.
//!
//! A single OpenAI-compatible Chat Completions backend (OpenRouter by
//! default); any compatible endpoint is reachable via the base-URL override.

pub mod chat_completions;
pub mod openrouter;
pub mod shared;

pub use shared::{
    ChatMessage, ProviderError, ProviderErrorKind, ProviderResult, ProviderStream, StreamEvent,
    resolve_api_key, resolve_base_url,
};
