// External encoder plumbing
//
// - Commands: argument-list builder for one encoder invocation
// - Runner: bounded execution of a command with line-streamed output

pub mod commands;
pub mod runner;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use commands::*;
pub use runner::*;

use crate::config::MediaConfig;
use crate::context::RunLog;
use crate::error::Result;

/// Broad class of an upload, decided once from its filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    AnimatedImage,
}

impl MediaKind {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let is_gif = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("gif"))
            .unwrap_or(false);

        if is_gif {
            MediaKind::AnimatedImage
        } else {
            MediaKind::Video
        }
    }
}

/// How a single encoder invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Zero exit; carries the declared output path (not checked for existence)
    Success(PathBuf),
    /// Non-zero exit or spawn failure, with the diagnostic text
    ToolFailure(String),
    /// Killed after the deadline elapsed
    TimedOut(Duration),
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Success(path) => write!(f, "success ({})", path.display()),
            ExecutionOutcome::ToolFailure(message) => {
                let last = message.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("no output");
                write!(f, "tool failure: {}", last.trim())
            }
            ExecutionOutcome::TimedOut(deadline) => {
                write!(f, "timed out after {}s", deadline.as_secs())
            }
        }
    }
}

/// Executes encoder commands on behalf of the orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run one command, streaming every output line into the run log
    async fn run(&self, command: &MediaCommand, deadline: Duration, log: &RunLog) -> ExecutionOutcome;

    /// The encoder's self-reported capability listing, verbatim
    async fn capabilities(&self) -> Result<String>;
}

/// Factory for creating runner instances
pub struct RunnerFactory;

impl RunnerFactory {
    /// Create the default runner (ffmpeg subprocesses)
    pub fn create_runner(config: MediaConfig) -> Arc<dyn ProcessRunner> {
        Arc::new(runner::FfmpegRunner::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::from_path("clip.GIF"), MediaKind::AnimatedImage);
        assert_eq!(MediaKind::from_path("/tmp/x/loop.gif"), MediaKind::AnimatedImage);
        assert_eq!(MediaKind::from_path("movie.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_path("noext"), MediaKind::Video);
    }

    #[test]
    fn test_outcome_display_uses_last_diagnostic_line() {
        let outcome = ExecutionOutcome::ToolFailure("frame=1\nUnknown encoder 'libsvtav1'\n\n".to_string());
        assert_eq!(outcome.to_string(), "tool failure: Unknown encoder 'libsvtav1'");
        assert_eq!(
            ExecutionOutcome::TimedOut(Duration::from_secs(300)).to_string(),
            "timed out after 300s"
        );
    }
}
