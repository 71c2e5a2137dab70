//! Loop event types for streaming output.
//!
//! This module defines the contract for events emitted by the control loop.
//! The loop performs no direct stdout/stderr writes; a renderer consumes
//! these events instead.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::marker::ControlMarker;
use crate::providers::ProviderErrorKind;

/// Events emitted by the control loop during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// A model turn has started.
    TurnStarted,

    /// Incremental text chunk from the assistant (raw, marker included as it
    /// streams).
    AssistantDelta { text: String },

    /// A turn finished; `marker` is the detected control marker, if any.
    TurnCompleted { marker: Option<ControlMarker> },

    /// The working file was written.
    FileWritten { path: String, bytes: usize },

    /// The working file is being executed.
    RunStarted { path: String },

    /// Execution of the working file finished.
    RunFinished { exit_code: i32, timed_out: bool },

    /// The model ended a turn without a marker; a nudge was injected.
    Nudged,

    /// The loop terminated successfully.
    Completed { final_text: String },

    /// An error occurred during execution.
    Error {
        /// Error category for structured handling
        kind: ErrorKind,
        /// One-line summary
        message: String,
        /// Optional additional details
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

/// Error categories for `LoopEvent::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection/request timeout
    Timeout,
    /// Response parsing failed
    Parse,
    /// API-level error from provider
    ApiError,
    /// WRITE turn carried no extractable code block
    MissingArtifact,
    /// Working file could not be written
    Persistence,
    /// Internal/unknown error
    Internal,
}

impl From<ProviderErrorKind> for ErrorKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::HttpStatus => ErrorKind::HttpStatus,
            ProviderErrorKind::Timeout => ErrorKind::Timeout,
            ProviderErrorKind::Parse => ErrorKind::Parse,
            ProviderErrorKind::ApiError => ErrorKind::ApiError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::HttpStatus => write!(f, "http_status"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::ApiError => write!(f, "api_error"),
            ErrorKind::MissingArtifact => write!(f, "missing_artifact"),
            ErrorKind::Persistence => write!(f, "persistence"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Channel-based event sender (async, bounded).
pub type LoopEventTx = mpsc::Sender<Arc<LoopEvent>>;

/// Channel-based event receiver (async, bounded).
pub type LoopEventRx = mpsc::Receiver<Arc<LoopEvent>>;

/// Default channel capacity for event streams.
///
/// Set high enough (128) to accommodate best-effort delta sends without
/// blocking the loop on a slow renderer.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Creates a bounded event channel with the default capacity.
pub fn create_event_channel() -> (LoopEventTx, LoopEventRx) {
    mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY)
}

/// Event sender wrapper that provides best-effort and reliable send modes.
///
/// Use `send_delta()` for high-volume events (`AssistantDelta`) that can be
/// dropped if the consumer is slow. Use `send_important()` for events that
/// must be delivered (side effects, completion, errors).
#[derive(Clone)]
pub struct EventSender {
    tx: LoopEventTx,
}

impl EventSender {
    /// Creates a new `EventSender` wrapping the given channel sender.
    pub fn new(tx: LoopEventTx) -> Self {
        Self { tx }
    }

    /// Best-effort send: never awaits, drops if channel is full.
    pub fn send_delta(&self, ev: LoopEvent) {
        let _ = self.tx.try_send(Arc::new(ev));
    }

    /// Reliable send: awaits delivery.
    pub async fn send_important(&self, ev: LoopEvent) {
        let _ = self.tx.send(Arc::new(ev)).await;
    }
}
