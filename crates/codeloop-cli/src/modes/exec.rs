//! Streamed stdout/stderr rendering and exec wrapper.
//!
//! This module provides:
//! - `ExecRenderer` + `spawn_exec_renderer_task` for loop events
//! - `run_exec` wiring the control loop to the renderer

use std::io::{Stderr, Stdout, Write, stderr, stdout};

use anyhow::Result;
use codeloop_core::config::Config;
use codeloop_core::core::agent::{self, LoopOptions};
use codeloop_core::core::events::{self, LoopEvent, LoopEventRx};
use tokio::task::JoinHandle;

/// Runs the control loop for a task, streaming generation to stdout.
///
/// # Output contract
/// - assistant deltas → stdout (live, unbuffered)
/// - side-effect status, nudges, errors → stderr
pub async fn run_exec(task: &str, config: &Config, options: &LoopOptions) -> Result<()> {
    let (tx, rx) = events::create_event_channel();
    let renderer_handle = spawn_exec_renderer_task(rx);

    let result = agent::run_loop(task, config, options, tx).await;

    // The loop dropped its sender; wait for the renderer to flush all events
    // (including the error event on failure) before propagating.
    let _ = renderer_handle.await;

    result.map(|_final_text| ())
}

/// CLI renderer that writes loop events to stdout/stderr.
pub struct ExecRenderer {
    stdout: Stdout,
    stderr: Stderr,
    /// Whether assistant output still needs a terminating newline.
    needs_final_newline: bool,
}

impl Default for ExecRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecRenderer {
    pub fn new() -> Self {
        Self {
            stdout: stdout(),
            stderr: stderr(),
            needs_final_newline: false,
        }
    }

    /// Handles a single loop event by writing to the appropriate stream.
    pub fn handle_event(&mut self, event: &LoopEvent) {
        match event {
            LoopEvent::AssistantDelta { text } => {
                if !text.is_empty() {
                    let _ = write!(self.stdout, "{text}");
                    let _ = self.stdout.flush();
                    self.needs_final_newline = true;
                }
            }
            LoopEvent::TurnCompleted { .. } => {
                // Separate this turn's text from whatever follows.
                self.finish();
            }
            LoopEvent::FileWritten { path, bytes } => {
                let _ = writeln!(self.stderr, "⚙ Wrote {path} ({bytes} bytes).");
            }
            LoopEvent::RunStarted { path } => {
                let _ = write!(self.stderr, "⚙ Running {path}...");
                let _ = self.stderr.flush();
            }
            LoopEvent::RunFinished {
                exit_code,
                timed_out,
            } => {
                if *timed_out {
                    let _ = writeln!(self.stderr, " Timed out.");
                } else {
                    let _ = writeln!(self.stderr, " Done (exit {exit_code}).");
                }
            }
            LoopEvent::Nudged => {
                let _ = writeln!(self.stderr, "No control marker in reply; nudging the model.");
            }
            LoopEvent::Error {
                kind,
                message,
                details,
            } => {
                let _ = writeln!(self.stderr, "Error [{kind}]: {message}");
                if let Some(detail_text) = details {
                    let _ = writeln!(self.stderr, "  Details: {detail_text}");
                }
            }
            // Turn start and successful completion need no extra output; the
            // final text was already streamed via deltas.
            LoopEvent::TurnStarted | LoopEvent::Completed { .. } => {}
        }
    }

    /// Prints a final newline to stdout if assistant output needs one.
    pub fn finish(&mut self) {
        if self.needs_final_newline {
            let _ = writeln!(self.stdout);
            self.needs_final_newline = false;
        }
    }
}

/// Spawns a renderer task that consumes events from a channel.
///
/// The task owns the `ExecRenderer` and processes events until the channel
/// closes.
pub fn spawn_exec_renderer_task(mut rx: LoopEventRx) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = ExecRenderer::new();

        while let Some(event) = rx.recv().await {
            renderer.handle_event(&event);
        }

        renderer.finish();
    })
}
