//! Executes the working file through the configured interpreter.
//!
//! Every failure mode — non-zero exit, interpreter missing, timeout — is
//! folded into [`RunOutput`] so the loop can feed it back to the model;
//! nothing here is fatal to the run.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

/// Maximum bytes per output stream (stdout/stderr) before truncation.
const MAX_OUTPUT_BYTES: usize = 40 * 1024; // 40KB

/// Captured output from running the working file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl RunOutput {
    fn from_fault(stderr: String) -> Self {
        Self {
            stdout: String::new(),
            stderr,
            exit_code: -1,
            timed_out: false,
            stdout_truncated: false,
            stderr_truncated: false,
        }
    }
}

/// Runs `{interpreter} {file}` in `root` with the given wall-clock timeout.
///
/// The child gets no stdin; stdout and stderr are captured independently and
/// truncated at a UTF-8 boundary past [`MAX_OUTPUT_BYTES`]. On timeout the
/// child is killed (`kill_on_drop`) and the timeout is reported as stderr
/// content.
pub async fn run_working_file(
    interpreter: &str,
    file: &Path,
    root: &Path,
    timeout: Option<Duration>,
) -> RunOutput {
    tracing::debug!(interpreter, file = %file.display(), "running working file");

    let child = match tokio::process::Command::new(interpreter)
        .arg(file)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return RunOutput::from_fault(format!(
                "Failed to launch interpreter '{interpreter}': {e}"
            ));
        }
    };

    let output_fut = child.wait_with_output();
    let output = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, output_fut).await {
            Ok(result) => result,
            Err(_) => {
                return RunOutput {
                    stdout: String::new(),
                    stderr: format!("Command timed out after {} seconds", timeout.as_secs()),
                    exit_code: -1,
                    timed_out: true,
                    stdout_truncated: false,
                    stderr_truncated: false,
                };
            }
        },
        None => output_fut.await,
    };

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            return RunOutput::from_fault(format!("Failed to collect process output: {e}"));
        }
    };

    let (stdout, stdout_truncated) = truncate_at_utf8_boundary(&output.stdout, MAX_OUTPUT_BYTES);
    let (stderr, stderr_truncated) = truncate_at_utf8_boundary(&output.stderr, MAX_OUTPUT_BYTES);

    RunOutput {
        stdout,
        stderr,
        exit_code: output.status.code().unwrap_or(-1),
        timed_out: false,
        stdout_truncated,
        stderr_truncated,
    }
}

/// Lossily decodes bytes and truncates at a valid character boundary.
///
/// Returns the (possibly truncated) string and whether truncation occurred.
fn truncate_at_utf8_boundary(bytes: &[u8], max_bytes: usize) -> (String, bool) {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() <= max_bytes {
        return (text, false);
    }

    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    (text, true)
}
