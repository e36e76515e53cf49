use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, ForgeError};
use crate::media::MediaKind;

/// Extensions accepted as-is; anything else is renamed to `.mp4`
const ACCEPTED_EXTENSIONS: [&str; 8] = ["mp4", "avi", "mov", "mkv", "webm", "gif", "webp", "m4v"];

/// Make an uploaded filename safe to use inside the working directory
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = name
        .replace("..", "")
        .replace(['/', '\\', ':'], "_")
        .trim()
        .to_string();

    if cleaned.is_empty() {
        return "video.mp4".to_string();
    }

    let path = Path::new(&cleaned);
    let accepted = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);

    if accepted {
        return cleaned;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string());
    format!("{}.mp4", stem)
}

/// An upload persisted into the request's working directory
#[derive(Debug, Clone)]
pub struct Upload {
    pub path: PathBuf,
    pub kind: MediaKind,
}

impl Upload {
    /// Classify by the declared filename and place the file under `dir`
    pub fn prepare(dir: &Path, declared_name: &str) -> Self {
        Self {
            path: dir.join(sanitize_filename(declared_name)),
            kind: MediaKind::from_path(declared_name),
        }
    }

    /// File stem used to name every artifact
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string())
    }
}

/// Incremental writer for an upload arriving in chunks
pub struct UploadWriter {
    file: File,
    written: u64,
}

impl UploadWriter {
    pub async fn create(upload: &Upload) -> Result<Self> {
        let file = File::create(&upload.path)
            .await
            .map_err(|e| ForgeError::Io(std::io::Error::new(e.kind(), format!("save error: {}", e))))?;
        Ok(Self { file, written: 0 })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and report the number of bytes stored
    pub async fn finish(mut self) -> Result<u64> {
        self.file.flush().await?;
        Ok(self.written)
    }
}
