use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, ForgeError};
use crate::media::MediaKind;

fn default_static_dir() -> String {
    "./static".to_string()
}

fn default_edge_blur() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the HTTP service
    pub bind: String,
    /// Upper bound for the request body, checked before any processing
    pub max_upload_bytes: usize,
    /// Directory served for every path not handled by the API
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Deadline for jobs touching animated images (GIF input or output)
    pub short_deadline_secs: u64,
    /// Deadline for general video jobs
    pub long_deadline_secs: u64,
}

/// Fallback values for every form field of the upload endpoint.
///
/// Values sent by the client replace these only when they parse and are
/// positive; everything else falls back here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub height: u32,
    pub fps: u32,
    pub similarity: f64,
    pub blend: f64,
    pub white_threshold: f64,
    pub luma_fallback: bool,
    #[serde(default = "default_edge_blur")]
    pub edge_blur: bool,
    pub max_width: u32,
    pub crf: u32,
    /// Encoder speed tier (ultrafast, veryfast, fast, medium, slow, veryslow)
    pub speed: String,
    /// Audio bitrate for WebM/MP4 outputs
    pub audio_quality: String,
    pub webp_quality: u32,
    pub out_webp: bool,
    pub out_av1: bool,
    pub out_h264: bool,
    pub out_webm: bool,
    pub out_gif: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "0.0.0.0:8080".to_string(),
                max_upload_bytes: 1 << 30,
                static_dir: default_static_dir(),
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                short_deadline_secs: 5 * 60,
                long_deadline_secs: 30 * 60,
            },
            defaults: DefaultsConfig {
                height: 720,
                fps: 24,
                similarity: 0.12,
                blend: 0.03,
                white_threshold: 0.95,
                luma_fallback: true,
                edge_blur: true,
                max_width: 1280,
                crf: 23,
                speed: "slow".to_string(),
                audio_quality: "96k".to_string(),
                webp_quality: 80,
                out_webp: true,
                // Video-only containers stay off unless asked for
                out_av1: false,
                out_h264: false,
                out_webm: false,
                out_gif: true,
            },
        }
    }
}

impl MediaConfig {
    /// Pick the deadline class for one invocation.
    ///
    /// Anything that reads or writes an animated image gets the short class.
    pub fn deadline_for(&self, input: MediaKind, output: &Path) -> Duration {
        let output_kind = MediaKind::from_path(output);
        if input == MediaKind::AnimatedImage || output_kind == MediaKind::AnimatedImage {
            Duration::from_secs(self.short_deadline_secs)
        } else {
            Duration::from_secs(self.long_deadline_secs)
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ForgeError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ForgeError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ForgeError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ForgeError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
