//! Control loop: conversation state, marker dispatch, synthetic feedback.
//!
//! The loop owns the conversation, interprets the marker returned by the
//! turn executor, performs the side effect, folds its outcome back into the
//! conversation as a synthetic `[SYSTEM]` user message, and starts the next
//! turn. It emits `LoopEvent`s via an async channel; no direct stdout/stderr
//! writes occur in this module.
//!
//! State machine: GENERATING is re-entered after every side effect; WRITE and
//! RUN pass through their pending states inside one loop iteration; DONE
//! returns, and the two unrecoverable faults (missing artifact, persistence
//! failure) abort. A turn without a marker nudges and continues, so the loop
//! can only ever leave through DONE or an error.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;

use crate::config::Config;
use crate::core::artifact::extract_last_code_block;
use crate::core::events::{ErrorKind, EventSender, LoopEvent, LoopEventTx};
use crate::core::marker::ControlMarker;
use crate::core::turn::TurnExecutor;
use crate::prompts::PROTOCOL_PROMPT;
use crate::providers::ChatMessage;
use crate::tools::run::{RunOutput, run_working_file};
use crate::tools::write::persist_artifact;

/// Options for loop execution.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Directory the working file is written to and executed from.
    pub root: PathBuf,
}

/// WRITE marker arrived with no extractable fenced code block.
///
/// Fatal: there is nothing to persist and the protocol has no way to ask the
/// model to re-send only the block.
#[derive(Debug)]
pub struct MissingArtifactError;

impl fmt::Display for MissingArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WRITE marker with no fenced code block to persist")
    }
}

impl std::error::Error for MissingArtifactError {}

const WRITE_FEEDBACK: &str =
    "[SYSTEM] Wrote {file}. The file was saved but not executed; continue with the next step.";

const NUDGE_FEEDBACK: &str = "[SYSTEM] Your reply did not end with a control marker. Continue, \
     and end your reply with <!--WRITE-->, <!--RUN--> or <!--DONE-->.";

/// Runs the control loop for an initial task until the model declares DONE.
///
/// Returns the final assistant text.
///
/// # Errors
/// Returns an error on backend failure, a WRITE turn without a code block,
/// or a working-file write failure. Subprocess faults are not errors; they
/// are fed back to the model.
pub async fn run_loop(
    task: &str,
    config: &Config,
    options: &LoopOptions,
    tx: LoopEventTx,
) -> Result<String> {
    let sender = EventSender::new(tx);
    let executor = TurnExecutor::from_config(config)?;

    let mut messages = vec![
        ChatMessage::system(PROTOCOL_PROMPT),
        ChatMessage::user(task),
    ];

    loop {
        sender.send_important(LoopEvent::TurnStarted).await;
        let turn = executor.execute_turn(&messages, &sender).await?;

        // The model's explanation is preserved in history regardless of
        // which branch executes next.
        messages.push(ChatMessage::assistant(turn.text.clone()));

        match turn.marker {
            Some(ControlMarker::Write) => {
                handle_write(&turn.text, config, options, &mut messages, &sender).await?;
            }
            Some(ControlMarker::Run) => {
                handle_run(config, options, &mut messages, &sender).await;
            }
            Some(ControlMarker::Done) => {
                sender
                    .send_important(LoopEvent::Completed {
                        final_text: turn.text.clone(),
                    })
                    .await;
                return Ok(turn.text);
            }
            None => {
                tracing::debug!("turn ended without a control marker, nudging");
                sender.send_important(LoopEvent::Nudged).await;
                messages.push(ChatMessage::user(NUDGE_FEEDBACK));
            }
        }
    }
}

/// Persists the turn's last fenced code block and appends the confirmation
/// message. Missing block and write failure are both fatal.
async fn handle_write(
    turn_text: &str,
    config: &Config,
    options: &LoopOptions,
    messages: &mut Vec<ChatMessage>,
    sender: &EventSender,
) -> Result<()> {
    let Some(code) = extract_last_code_block(turn_text) else {
        sender
            .send_important(LoopEvent::Error {
                kind: ErrorKind::MissingArtifact,
                message: MissingArtifactError.to_string(),
                details: None,
            })
            .await;
        return Err(MissingArtifactError.into());
    };

    let path = match persist_artifact(&options.root, &config.working_file, &code) {
        Ok(path) => path,
        Err(err) => {
            sender
                .send_important(LoopEvent::Error {
                    kind: ErrorKind::Persistence,
                    message: err.to_string(),
                    details: None,
                })
                .await;
            return Err(err);
        }
    };

    sender
        .send_important(LoopEvent::FileWritten {
            path: path.display().to_string(),
            bytes: code.len(),
        })
        .await;
    messages.push(ChatMessage::user(
        WRITE_FEEDBACK.replace("{file}", &config.working_file),
    ));
    Ok(())
}

/// Runs the working file and appends the captured-output feedback message.
/// Execution faults are conversation content, never errors.
async fn handle_run(
    config: &Config,
    options: &LoopOptions,
    messages: &mut Vec<ChatMessage>,
    sender: &EventSender,
) {
    let path = options.root.join(&config.working_file);
    sender
        .send_important(LoopEvent::RunStarted {
            path: path.display().to_string(),
        })
        .await;

    let output = run_working_file(&config.interpreter, &path, &options.root, config.run_timeout()).await;

    sender
        .send_important(LoopEvent::RunFinished {
            exit_code: output.exit_code,
            timed_out: output.timed_out,
        })
        .await;
    messages.push(ChatMessage::user(run_feedback(
        &config.working_file,
        &output,
    )));
}

/// Formats captured run output for the model, stdout and stderr labeled
/// separately, with explicit placeholders for empty streams.
fn run_feedback(working_file: &str, output: &RunOutput) -> String {
    let stdout = stream_section(&output.stdout, output.stdout_truncated, "<no stdout>");
    let stderr = stream_section(&output.stderr, output.stderr_truncated, "<no stderr>");
    format!(
        "[SYSTEM] Run results for {working_file} (exit code {}):\n\
         === STDOUT ===\n{stdout}\n\
         === STDERR ===\n{stderr}",
        output.exit_code
    )
}

fn stream_section(content: &str, truncated: bool, placeholder: &str) -> String {
    if content.is_empty() {
        return placeholder.to_string();
    }
    let mut section = content.trim_end().to_string();
    if truncated {
        section.push_str("\n[output truncated]");
    }
    section
}
