use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;

/// File name of the run log inside the working directory
pub const RUN_LOG_NAME: &str = "process.log";

/// Append-only, line-oriented log of one request.
///
/// Every line goes through a single callback; the default sink fans it out
/// to tracing and to the log file that ships with bundled responses.
#[derive(Clone)]
pub struct RunLog {
    sink: Arc<dyn Fn(&str) + Send + Sync>,
}

impl RunLog {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self { sink: Arc::new(sink) }
    }

    /// Sink writing to `path` (flushed per line) and to tracing
    pub fn to_file<P: AsRef<Path>>(path: P, request_id: Uuid) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        let writer = Mutex::new(BufWriter::new(file));

        Ok(Self::new(move |line: &str| {
            info!(request = %request_id, "{}", line);
            let Ok(mut out) = writer.lock() else {
                return;
            };
            if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
                warn!("Failed to append to run log: {}", e);
            }
        }))
    }

    pub fn line<S: AsRef<str>>(&self, line: S) {
        (self.sink)(line.as_ref());
    }
}

/// Request-scoped working directory plus its run log.
///
/// Everything the request produces lives under `dir`; dropping the context
/// removes the directory recursively.
pub struct RunContext {
    pub log: RunLog,
    log_path: PathBuf,
    request_id: Uuid,
    dir: TempDir,
}

impl RunContext {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("vp_")
            .tempdir()?;
        let request_id = Uuid::new_v4();
        let log_path = dir.path().join(RUN_LOG_NAME);
        let log = RunLog::to_file(&log_path, request_id)?;

        log.line(format!(
            "run {} started {}",
            request_id,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));

        Ok(Self {
            log,
            log_path,
            request_id,
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}
