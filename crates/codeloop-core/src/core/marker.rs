//! Control marker detection over streamed text.
//!
//! The model ends each turn with one of three literal tokens. The backend is
//! asked to stop generation at the closing delimiter `-->`, so the stream
//! usually ends on the open form (`<!--WRITE`); both forms are recognized.
//! Detection is incremental: a bounded suffix buffer is re-tested after each
//! fragment, so long turns are never rescanned in full.

use serde::{Deserialize, Serialize};

/// Closing delimiter shared by all markers; doubles as the backend-level
/// stop sequence.
pub const MARKER_CLOSE: &str = "-->";

/// Control markers the model emits to select an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMarker {
    /// Persist the turn's last fenced code block to the working file.
    Write,
    /// Execute the working file and feed back its output.
    Run,
    /// Task finished; terminate the loop.
    Done,
}

impl ControlMarker {
    /// All markers, used for detection.
    pub fn all() -> &'static [ControlMarker] {
        &[ControlMarker::Write, ControlMarker::Run, ControlMarker::Done]
    }

    /// The open form, as cut off by the backend stop sequence.
    pub fn open_token(self) -> &'static str {
        match self {
            ControlMarker::Write => "<!--WRITE",
            ControlMarker::Run => "<!--RUN",
            ControlMarker::Done => "<!--DONE",
        }
    }

    /// The canonical closed form.
    pub fn token(self) -> &'static str {
        match self {
            ControlMarker::Write => "<!--WRITE-->",
            ControlMarker::Run => "<!--RUN-->",
            ControlMarker::Done => "<!--DONE-->",
        }
    }
}

/// Longest candidate is `<!--WRITE-->` (12 bytes); the buffer keeps a little
/// slack so boundary trimming never clips a live candidate.
const MAX_TAIL_BYTES: usize = 16;

/// Incremental trailing-marker matcher.
///
/// Holds only a bounded suffix of the accumulated text; `push` after every
/// fragment, then ask for [`MarkerScanner::trailing_marker`] once the stream
/// ends. A marker is only ever reported when it is the absolute suffix of
/// everything pushed so far.
#[derive(Debug, Default)]
pub struct MarkerScanner {
    tail: String,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment, keeping only the bytes a trailing match could span.
    pub fn push(&mut self, fragment: &str) {
        self.tail.push_str(fragment);
        if self.tail.len() > MAX_TAIL_BYTES {
            let mut cut = self.tail.len() - MAX_TAIL_BYTES;
            while !self.tail.is_char_boundary(cut) {
                cut += 1;
            }
            self.tail.drain(..cut);
        }
    }

    /// Returns the marker the accumulated text currently ends with, plus the
    /// matched suffix length in bytes. Closed form beats open form; among
    /// candidates the longest match wins.
    pub fn trailing_marker(&self) -> Option<(ControlMarker, usize)> {
        let mut best: Option<(ControlMarker, usize)> = None;
        for &marker in ControlMarker::all() {
            for token in [marker.token(), marker.open_token()] {
                if self.tail.ends_with(token)
                    && best.is_none_or(|(_, len)| token.len() > len)
                {
                    best = Some((marker, token.len()));
                }
            }
        }
        best
    }
}

/// Strips a detected trailing marker from the full accumulated text and trims
/// surrounding whitespace. `matched_len` must come from the scanner fed with
/// exactly this text.
pub fn strip_trailing_marker(text: &str, matched_len: usize) -> String {
    text[..text.len() - matched_len].trim().to_string()
}
