use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::context::RunContext;
use crate::error::{Result, ForgeError};
use crate::pipeline::OutputFormat;

/// A produced output file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub format: OutputFormat,
    pub path: PathBuf,
    pub content_type: &'static str,
}

impl Artifact {
    pub fn new(format: OutputFormat, path: PathBuf) -> Self {
        let content_type = content_type_for(&path);
        Self {
            format,
            path,
            content_type,
        }
    }

    pub fn file_name(&self) -> String {
        base_name(&self.path)
    }
}

/// Extension-based MIME type, falling back to a generic binary type
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "webm" => "video/webm",
        "mp4" | "m4v" => "video/mp4",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "log" | "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// What goes back to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// One artifact, shown inline
    Single { path: PathBuf, content_type: &'static str },
    /// Several artifacts plus the run log in one archive
    Bundle { path: PathBuf, members: Vec<String> },
}

impl Delivery {
    pub fn path(&self) -> &Path {
        match self {
            Delivery::Single { path, .. } | Delivery::Bundle { path, .. } => path,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Delivery::Single { content_type, .. } => *content_type,
            Delivery::Bundle { .. } => "application/zip",
        }
    }

    /// `Content-Disposition` value carrying the delivered file's base name
    pub fn disposition(&self) -> String {
        let name = base_name(self.path());
        match self {
            Delivery::Single { .. } => format!("inline; filename={:?}", name),
            Delivery::Bundle { .. } => format!("attachment; filename={:?}", name),
        }
    }
}

/// Write `files` into a new archive at `zip_path`, in order.
///
/// Members are stored under their base names; files that vanished are
/// skipped. Returns the member names written.
pub fn build_zip(zip_path: &Path, files: &[PathBuf]) -> Result<Vec<String>> {
    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut members = Vec::with_capacity(files.len());

    for file in files {
        let source = match File::open(file) {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        let name = base_name(file);
        zip.start_file(name.as_str(), options)?;
        io::copy(&mut BufReader::new(source), &mut zip)?;
        members.push(name);
    }

    zip.finish()?;
    Ok(members)
}

/// Turn the collected artifacts into the response payload.
///
/// One artifact is delivered as-is; two or more are zipped together with
/// the run log appended as the last member.
pub async fn aggregate(ctx: &RunContext, stem: &str, artifacts: &[Artifact]) -> Result<Delivery> {
    match artifacts {
        [] => Err(ForgeError::NoOutputs),
        [single] => {
            ctx.log.line(format!("delivering {}", single.file_name()));
            Ok(Delivery::Single {
                path: single.path.clone(),
                content_type: single.content_type,
            })
        }
        _ => {
            let mut files: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
            let zip_path = ctx.path().join(format!("{}_processed.zip", stem));
            ctx.log.line(format!(
                "bundling {} artifacts into {}",
                artifacts.len(),
                base_name(&zip_path)
            ));
            files.push(ctx.log_path().to_path_buf());

            let target = zip_path.clone();
            let members = tokio::task::spawn_blocking(move || build_zip(&target, &files))
                .await
                .map_err(|e| ForgeError::Aggregation(format!("zip task failed: {}", e)))?
                .map_err(|e| ForgeError::Aggregation(e.to_string()))?;

            info!("Bundle {} written with {} members", zip_path.display(), members.len());
            Ok(Delivery::Bundle { path: zip_path, members })
        }
    }
}
