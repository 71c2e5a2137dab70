//! Turn execution: one streamed model response, marker detection included.

use anyhow::Result;
use futures_util::StreamExt;

use crate::config::Config;
use crate::core::events::{ErrorKind, EventSender, LoopEvent};
use crate::core::marker::{ControlMarker, MARKER_CLOSE, MarkerScanner, strip_trailing_marker};
use crate::providers::openrouter::{OpenRouterClient, OpenRouterConfig};
use crate::providers::{ChatMessage, ProviderError, ProviderStream, StreamEvent};

/// Result of a single turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResult {
    /// Turn text with the trailing control marker removed and whitespace
    /// trimmed.
    pub text: String,
    /// Detected control marker; `None` when the stream ended without one.
    pub marker: Option<ControlMarker>,
}

/// Executes turns against the configured backend.
pub struct TurnExecutor {
    client: OpenRouterClient,
}

impl TurnExecutor {
    /// Builds the executor from configuration; credentials are resolved once
    /// here, not per turn.
    ///
    /// # Errors
    /// Returns an error if no API key is available or a URL is malformed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider_config = OpenRouterConfig::from_env(
            config.model.clone(),
            vec![MARKER_CLOSE.to_string()],
            config.providers.openrouter.effective_base_url(),
            config.providers.openrouter.effective_api_key(),
        )?;

        Ok(Self {
            client: OpenRouterClient::new(provider_config),
        })
    }

    /// Runs one turn: streams the response, echoes deltas as events, and
    /// returns the marker-stripped text plus the detected marker.
    ///
    /// # Errors
    /// Returns an error if the streaming call cannot be established or the
    /// backend reports an error; both are fatal to the run.
    pub async fn execute_turn(
        &self,
        messages: &[ChatMessage],
        sender: &EventSender,
    ) -> Result<TurnResult> {
        let stream = match self.client.send_messages_stream(messages).await {
            Ok(stream) => stream,
            Err(err) => return Err(emit_error(err, sender).await),
        };

        consume_turn_stream(stream, sender).await
    }
}

/// Consumes a provider stream into a [`TurnResult`].
///
/// Every text fragment is appended to the accumulator, fed to the marker
/// scanner, and echoed as an `AssistantDelta` event. Marker detection runs on
/// the raw accumulated text and is independent of whether the backend sent a
/// finish signal.
pub async fn consume_turn_stream(
    mut stream: ProviderStream,
    sender: &EventSender,
) -> Result<TurnResult> {
    let mut accumulator = String::new();
    let mut scanner = MarkerScanner::new();
    let mut finish_reason: Option<String> = None;

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => return Err(emit_error(anyhow::Error::new(err), sender).await),
        };

        match event {
            StreamEvent::TextDelta { text } => {
                accumulator.push_str(&text);
                scanner.push(&text);
                sender.send_delta(LoopEvent::AssistantDelta { text });
            }
            StreamEvent::Completed {
                finish_reason: reason,
            } => finish_reason = reason,
            StreamEvent::Error {
                error_type,
                message,
            } => {
                let provider_err = ProviderError::api_error(&error_type, &message);
                return Err(emit_error(anyhow::Error::new(provider_err), sender).await);
            }
        }
    }

    let (text, marker) = match scanner.trailing_marker() {
        Some((marker, matched_len)) => (
            strip_trailing_marker(&accumulator, matched_len),
            Some(marker),
        ),
        None => (accumulator.trim().to_string(), None),
    };

    tracing::debug!(?marker, ?finish_reason, bytes = text.len(), "turn finished");
    sender
        .send_important(LoopEvent::TurnCompleted { marker })
        .await;

    Ok(TurnResult { text, marker })
}

/// Sends an error event and returns the original error so the caller can
/// propagate the full chain.
async fn emit_error(err: anyhow::Error, sender: &EventSender) -> anyhow::Error {
    let event = if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
        LoopEvent::Error {
            kind: provider_err.kind.clone().into(),
            message: provider_err.message.clone(),
            details: provider_err.details.clone(),
        }
    } else {
        LoopEvent::Error {
            kind: ErrorKind::Internal,
            message: err.to_string(),
            details: None,
        }
    };
    sender.send_important(event).await;
    err
}
