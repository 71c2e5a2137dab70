//! OpenAI-compatible Chat Completions streaming client.

use std::collections::VecDeque;
use std::pin::Pin;

use anyhow::Result;
use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::providers::{
    ChatMessage, ProviderError, ProviderErrorKind, ProviderResult, ProviderStream, StreamEvent,
};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// OpenAI-compatible chat completions configuration.
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Backend-level stop sequences; generation is cut server-side when one
    /// is emitted.
    pub stop: Vec<String>,
    pub extra_headers: HeaderMap,
}

/// OpenAI-compatible chat completions client.
pub struct ChatCompletionsClient {
    config: ChatCompletionsConfig,
    http: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatCompletionsConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Opens a streaming completion request for the given conversation.
    ///
    /// # Errors
    /// Returns an error if the request cannot be established or the backend
    /// answers with a non-success status.
    pub async fn send_messages_stream(&self, messages: &[ChatMessage]) -> Result<ProviderStream> {
        let request = ChatCompletionRequest::new(&self.config, messages);

        let url = format!("{}{}", self.config.base_url, CHAT_COMPLETIONS_PATH);
        let headers = build_headers(&self.config.api_key, &self.config.extra_headers);

        tracing::debug!(model = %self.config.model, messages = messages.len(), "opening completion stream");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status.as_u16(), &error_body).into());
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(SseParser::new(byte_stream)))
    }
}

fn build_headers(api_key: &str, extra_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("accept", HeaderValue::from_static("text/event-stream"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert(
        "user-agent",
        HeaderValue::from_static(crate::providers::shared::USER_AGENT),
    );

    for (name, value) in extra_headers {
        headers.insert(name, value.clone());
    }

    headers
}

fn classify_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ProviderError::timeout(format!("Connection failed: {e}"))
    } else if e.is_request() {
        ProviderError::new(ProviderErrorKind::HttpStatus, format!("Request error: {e}"))
    } else {
        ProviderError::new(ProviderErrorKind::HttpStatus, format!("Network error: {e}"))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatCompletionMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

impl ChatCompletionRequest {
    fn new(config: &ChatCompletionsConfig, messages: &[ChatMessage]) -> Self {
        let out_messages = messages
            .iter()
            .map(|msg| ChatCompletionMessage {
                role: msg.role.clone(),
                content: msg.content.clone(),
            })
            .collect();

        Self {
            model: config.model.clone(),
            stream: true,
            messages: out_messages,
            stop: config.stop.clone(),
        }
    }
}

/// Byte-stream wrapper that appends a blank line when the inner stream ends,
/// so `eventsource-stream` flushes a final event that lacked its terminator.
struct SseTerminatedStream<S> {
    inner: S,
    emitted_terminator: bool,
}

impl<S> SseTerminatedStream<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            emitted_terminator: false,
        }
    }
}

impl<S, E> Stream for SseTerminatedStream<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
{
    type Item = std::result::Result<bytes::Bytes, E>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        if self.emitted_terminator {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(item)),
            Poll::Ready(None) => {
                self.emitted_terminator = true;
                Poll::Ready(Some(Ok(bytes::Bytes::from_static(b"\n\n"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// SSE parser for OpenAI-compatible chat completions.
struct SseParser<S> {
    inner: EventStream<SseTerminatedStream<S>>,
    pending: VecDeque<StreamEvent>,
    finish_reason: Option<String>,
    emitted_done: bool,
}

impl<S> SseParser<S> {
    fn new<E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    {
        Self {
            inner: SseTerminatedStream::new(stream).eventsource(),
            pending: VecDeque::new(),
            finish_reason: None,
            emitted_done: false,
        }
    }

    /// Emit the completion event. Called once a finish reason arrives, or
    /// when the stream ends without one (force=true).
    fn emit_completion_if_pending(&mut self, force: bool) {
        if self.emitted_done {
            return;
        }
        if self.finish_reason.is_none() && !force {
            return;
        }

        self.emitted_done = true;
        self.pending.push_back(StreamEvent::Completed {
            finish_reason: self.finish_reason.clone(),
        });
    }

    fn handle_event_data(&mut self, data: &str) -> ProviderResult<()> {
        let trimmed = data.trim();
        if trimmed.is_empty() || trimmed == "[DONE]" {
            return Ok(());
        }

        let value = serde_json::from_str::<Value>(trimmed).map_err(|err| {
            ProviderError::new(
                ProviderErrorKind::Parse,
                format!("Failed to parse SSE JSON: {err}"),
            )
        })?;
        self.handle_chunk(&value);
        Ok(())
    }

    fn handle_chunk(&mut self, value: &Value) {
        // Handle errors first - these are terminal, no completion should follow
        if let Some(error) = value.get("error") {
            let error_type = error
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("error")
                .to_string();
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error")
                .to_string();
            self.pending.push_back(StreamEvent::Error {
                error_type,
                message,
            });
            self.emitted_done = true;
            return;
        }

        let first_choice = value
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first());

        if let Some(choice) = first_choice {
            if let Some(finish_reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
                self.finish_reason = Some(finish_reason.to_string());
            }

            if let Some(delta) = choice.get("delta") {
                self.process_delta(delta);
            }
        }

        self.emit_completion_if_pending(false);
    }

    fn process_delta(&mut self, delta: &Value) {
        // Regular and reasoning content both feed the same text channel; the
        // protocol operates on the concatenation of everything the model said.
        if let Some(text) = delta.get("content").and_then(|v| v.as_str())
            && !text.is_empty()
        {
            self.pending.push_back(StreamEvent::TextDelta {
                text: text.to_string(),
            });
        }

        if let Some(reasoning) = delta
            .get("reasoning_content")
            .or_else(|| delta.get("reasoning"))
            .and_then(|v| v.as_str())
            && !reasoning.is_empty()
        {
            self.pending.push_back(StreamEvent::TextDelta {
                text: reasoning.to_string(),
            });
        }
    }
}

impl<S, E> Stream for SseParser<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = ProviderResult<StreamEvent>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            let inner = Pin::new(&mut self.inner);
            match inner.poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if let Err(err) = self.handle_event_data(&event.data) {
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(ProviderError::new(
                        ProviderErrorKind::Parse,
                        format!("SSE stream error: {e}"),
                    ))));
                }
                Poll::Ready(None) => {
                    // Stream ended - emit a completion even if the backend
                    // never sent a finish_reason (disconnect mid-stream).
                    self.emit_completion_if_pending(true);
                    if let Some(event) = self.pending.pop_front() {
                        return Poll::Ready(Some(Ok(event)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn byte_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = std::result::Result<bytes::Bytes, std::io::Error>> + Unpin {
        futures_util::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(bytes::Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect_events(chunks: Vec<&'static str>) -> Vec<StreamEvent> {
        let parser = SseParser::new(byte_stream(chunks));
        parser
            .map(|r| r.expect("stream event"))
            .collect::<Vec<_>>()
            .await
    }

    fn joined_text(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_content_deltas_and_finish_reason() {
        let events = collect_events(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        assert_eq!(joined_text(&events), "Hello");
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Completed {
                finish_reason: Some(reason)
            }) if reason == "stop"
        ));
    }

    #[tokio::test]
    async fn test_reasoning_content_feeds_text_channel() {
        let events = collect_events(vec![
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"thinking \"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"},\"finish_reason\":\"stop\"}]}\n\n",
        ])
        .await;

        assert_eq!(joined_text(&events), "thinking answer");
    }

    /// A dropped stream (no finish_reason, no [DONE]) still completes, with
    /// no finish reason attached.
    #[tokio::test]
    async fn test_stream_end_without_finish_reason_completes() {
        let events = collect_events(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"},\"finish_reason\":null}]}\n\n",
        ])
        .await;

        assert_eq!(joined_text(&events), "partial");
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Completed {
                finish_reason: None
            })
        ));
    }

    /// SSE events split across arbitrary byte chunks reassemble correctly.
    #[tokio::test]
    async fn test_event_split_across_byte_chunks() {
        let events = collect_events(vec![
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"whole\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        ])
        .await;

        assert_eq!(joined_text(&events), "whole");
    }

    #[tokio::test]
    async fn test_error_chunk_emits_error_event() {
        let events = collect_events(vec![
            "data: {\"error\":{\"type\":\"overloaded\",\"message\":\"try later\"}}\n\n",
        ])
        .await;

        assert!(matches!(
            events.first(),
            Some(StreamEvent::Error { error_type, message })
                if error_type == "overloaded" && message == "try later"
        ));
        // No completion after a terminal error
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, StreamEvent::Completed { .. }))
        );
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let parser = SseParser::new(byte_stream(vec!["data: {not json}\n\n"]));
        let results: Vec<_> = parser.collect().await;
        assert!(matches!(
            results.first(),
            Some(Err(ProviderError {
                kind: ProviderErrorKind::Parse,
                ..
            }))
        ));
    }

    #[test]
    fn test_request_serializes_stop_sequences() {
        let config = ChatCompletionsConfig {
            api_key: "k".to_string(),
            base_url: "https://example.com/v1".to_string(),
            model: "test-model".to_string(),
            stop: vec!["-->".to_string()],
            extra_headers: HeaderMap::new(),
        };
        let request = ChatCompletionRequest::new(&config, &[ChatMessage::user("hi")]);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "test-model");
        assert_eq!(json["stream"], true);
        assert_eq!(json["stop"][0], "-->");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_request_omits_empty_stop() {
        let config = ChatCompletionsConfig {
            api_key: "k".to_string(),
            base_url: "https://example.com/v1".to_string(),
            model: "test-model".to_string(),
            stop: Vec::new(),
            extra_headers: HeaderMap::new(),
        };
        let request = ChatCompletionRequest::new(&config, &[]);
        let json = serde_json::to_value(&request).unwrap();

        assert!(json.get("stop").is_none());
    }
}
