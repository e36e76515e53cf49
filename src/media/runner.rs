use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::MediaConfig;
use crate::context::RunLog;
use crate::error::{Result, ForgeError};
use super::{ExecutionOutcome, MediaCommand, MediaCommandBuilder, ProcessRunner};

/// Concrete runner spawning ffmpeg subprocesses
pub struct FfmpegRunner {
    command_builder: MediaCommandBuilder,
}

impl FfmpegRunner {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(&config.binary_path),
        }
    }
}

/// Forward every line of one pipe into the shared channel
fn pump_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Execute a command under a hard deadline.
///
/// Output lines are delivered to the log in the order they are read; the
/// child is killed when the deadline elapses.
pub async fn run_with_deadline(command: &MediaCommand, deadline: Duration, log: &RunLog) -> ExecutionOutcome {
    log.line(format!("$ {}", command));
    debug!("Description: {}", command.description);

    let mut child = match Command::new(&command.binary_path)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let message = format!("Failed to execute {}: {}", command.binary_path, e);
            log.line(&message);
            return ExecutionOutcome::ToolFailure(message);
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        pump_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        pump_lines(stderr, tx);
    } else {
        drop(tx);
    }

    let mut combined = String::new();
    let finished = tokio::time::timeout(deadline, async {
        while let Some(line) = rx.recv().await {
            log.line(&line);
            combined.push_str(&line);
            combined.push('\n');
        }
        child.wait().await
    })
    .await;

    match finished {
        Ok(Ok(status)) if status.success() => {
            ExecutionOutcome::Success(command.output_path.clone().unwrap_or_else(|| PathBuf::from("-")))
        }
        Ok(Ok(status)) => {
            combined.push_str(&format!("{} exited with {}\n", command.binary_path, status));
            ExecutionOutcome::ToolFailure(combined)
        }
        Ok(Err(e)) => ExecutionOutcome::ToolFailure(format!("Failed to wait for {}: {}", command.binary_path, e)),
        Err(_) => {
            warn!("{} exceeded its {}s deadline, killing", command.description, deadline.as_secs());
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed out process: {}", e);
            }
            ExecutionOutcome::TimedOut(deadline)
        }
    }
}

#[async_trait]
impl ProcessRunner for FfmpegRunner {
    async fn run(&self, command: &MediaCommand, deadline: Duration, log: &RunLog) -> ExecutionOutcome {
        run_with_deadline(command, deadline, log).await
    }

    async fn capabilities(&self) -> Result<String> {
        let command = self.command_builder.list_encoders();
        let output = Command::new(&command.binary_path)
            .args(&command.args)
            .output()
            .await
            .map_err(|e| ForgeError::Media(format!("Failed to execute media processor: {}", e)))?;

        // The listing is passed through even when the tool complains
        let mut listing = String::from_utf8_lossy(&output.stdout).to_string();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(listing)
    }
}
