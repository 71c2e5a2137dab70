//! Prompt file helpers.

/// Protocol instructions sent as the conversation's system message.
pub const PROTOCOL_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/protocol_prompt.md"
));
