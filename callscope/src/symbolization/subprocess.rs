//! Bounded runs of external tools.
//!
//! Every tool invocation (line tables, disassembly) goes through
//! [`run_with_deadline`]: stdin is fed and stdout drained on their own
//! threads, and the child is killed once the timeout expires.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::warn;

use crate::domain::ResolveError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run `command`, optionally feeding `input` on stdin, and return its stdout.
///
/// Output that is not valid UTF-8 is converted lossily. A non-zero exit
/// status is logged but the output still counts.
///
/// # Errors
/// Returns an error if the tool cannot be started or is killed by the
/// timeout.
pub fn run_with_deadline(
    command: &mut Command,
    input: Option<String>,
    timeout: Duration,
) -> Result<String, ResolveError> {
    let tool = PathBuf::from(command.get_program());
    let mut child = command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ResolveError::ToolSpawn { tool: tool.clone(), source })?;

    let mut stdout = child.stdout.take().ok_or_else(|| io::Error::other("stdout not piped"))?;

    // The tool may start answering before it has read everything, so
    // feeding and draining happen on their own threads
    let writer = match (input, child.stdin.take()) {
        (Some(input), Some(mut stdin)) => Some(thread::spawn(move || {
            // A tool that exits early closes the pipe; its output still counts
            let _ = stdin.write_all(input.as_bytes());
        })),
        _ => None,
    };
    let reader = thread::spawn(move || {
        let mut output = Vec::new();
        stdout.read_to_end(&mut output).map(|_| output)
    });

    if !wait_with_deadline(&tool, &mut child, timeout)? {
        // Detached: both threads finish once the pipes close
        return Err(ResolveError::ToolTimeout { tool, timeout });
    }
    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let output = reader.join().map_err(|_| io::Error::other("output reader panicked"))??;
    Ok(String::from_utf8_lossy(&output).into_owned())
}

/// Wait for `child`, killing it once `timeout` expires.
///
/// Returns `false` if the child had to be killed.
fn wait_with_deadline(tool: &Path, child: &mut Child, timeout: Duration) -> io::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            if !status.success() {
                warn!("{} exited with {status}", tool.display());
            }
            return Ok(true);
        }
        if Instant::now() >= deadline {
            warn!("{} timed out after {timeout:?}, killing it", tool.display());
            child.kill()?;
            child.wait()?;
            return Ok(false);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
