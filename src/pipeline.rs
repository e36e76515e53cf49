//! Output formats and the encode strategies that can produce them.
//!
//! A format owns an ordered strategy chain; the orchestrator tries the chain
//! front to back and stops at the first usable artifact. Adding a fallback
//! means appending a [`Strategy`] variant to a chain, not new control flow.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::filters::{self, FilterGraph};
use crate::media::MediaKind;
use crate::request::ProcessingRequest;

/// Keyframe interval for the WebM encoders
const GOP_SIZE: &str = "240";

/// Fixed quality for WebP re-encodes of animated images
const GIF_WEBP_QUALITY: &str = "50";

/// Deliverable output formats, declared in bundle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    OptimizedWebp,
    CompressedGif,
    TransparentWebp,
    Webm,
    Mp4,
}

impl OutputFormat {
    /// Attempt order; it is also the member order of bundles
    pub const ORDER: [OutputFormat; 5] = [
        OutputFormat::OptimizedWebp,
        OutputFormat::CompressedGif,
        OutputFormat::TransparentWebp,
        OutputFormat::Webm,
        OutputFormat::Mp4,
    ];

    pub fn applies_to(self, kind: MediaKind) -> bool {
        match self {
            OutputFormat::OptimizedWebp | OutputFormat::CompressedGif => kind == MediaKind::AnimatedImage,
            OutputFormat::TransparentWebp | OutputFormat::Webm | OutputFormat::Mp4 => kind == MediaKind::Video,
        }
    }

    pub fn requested(self, request: &ProcessingRequest) -> bool {
        let outputs = &request.outputs;
        match self {
            OutputFormat::OptimizedWebp | OutputFormat::TransparentWebp => outputs.webp,
            OutputFormat::CompressedGif => outputs.gif,
            OutputFormat::Webm => outputs.av1 || outputs.webm,
            OutputFormat::Mp4 => outputs.h264,
        }
    }

    /// File name suffix appended to the upload's stem
    pub fn suffix(self) -> &'static str {
        match self {
            OutputFormat::OptimizedWebp => "_optimized.webp",
            OutputFormat::CompressedGif => "_compressed.gif",
            OutputFormat::TransparentWebp => "_transparent.webp",
            OutputFormat::Webm => "_clean.webm",
            OutputFormat::Mp4 => "_clean.mp4",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            OutputFormat::OptimizedWebp => "optimized-webp",
            OutputFormat::CompressedGif => "compressed-gif",
            OutputFormat::TransparentWebp => "transparent-webp",
            OutputFormat::Webm => "webm",
            OutputFormat::Mp4 => "mp4",
        }
    }

    /// Ordered strategies for this format under the given request
    pub fn strategies(self, request: &ProcessingRequest) -> Vec<Strategy> {
        match self {
            OutputFormat::OptimizedWebp => vec![Strategy::GifOptimize],
            OutputFormat::CompressedGif => vec![Strategy::GifCompress],
            OutputFormat::TransparentWebp => {
                if request.luma_fallback {
                    vec![Strategy::ColorKey, Strategy::LumaKey]
                } else {
                    vec![Strategy::ColorKey]
                }
            }
            OutputFormat::Webm => {
                if request.outputs.av1 {
                    vec![Strategy::SvtAv1, Strategy::AomAv1, Strategy::Vp9]
                } else {
                    vec![Strategy::Vp9]
                }
            }
            OutputFormat::Mp4 => vec![Strategy::H264],
        }
    }
}

/// One concrete way of producing a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    GifOptimize,
    GifCompress,
    ColorKey,
    LumaKey,
    SvtAv1,
    AomAv1,
    Vp9,
    H264,
}

fn clamp_crf(crf: u32, offset: i64, min: i64, max: i64) -> String {
    (crf as i64 + offset).clamp(min, max).to_string()
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

impl Strategy {
    pub fn label(self) -> &'static str {
        match self {
            Strategy::GifOptimize => "gif palette optimization",
            Strategy::GifCompress => "gif compression",
            Strategy::ColorKey => "color key",
            Strategy::LumaKey => "luma key",
            Strategy::SvtAv1 => "libsvtav1",
            Strategy::AomAv1 => "libaom-av1",
            Strategy::Vp9 => "libvpx-vp9",
            Strategy::H264 => "libx264",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Strategy::GifOptimize => "gifopt",
            Strategy::GifCompress => "gifcomp",
            Strategy::ColorKey => "colorkey",
            Strategy::LumaKey => "lumakey",
            Strategy::SvtAv1 => "svtav1",
            Strategy::AomAv1 => "aomav1",
            Strategy::Vp9 => "vp9",
            Strategy::H264 => "x264",
        }
    }

    /// Encoders run in two passes when requested.
    ///
    /// x264 rejects CRF with multi-pass and SVT-AV1 has no two-pass CRF mode
    /// through ffmpeg, so only the constrained-quality encoders qualify.
    pub fn supports_two_pass(self) -> bool {
        matches!(self, Strategy::AomAv1 | Strategy::Vp9)
    }

    pub fn filter_graph(self, request: &ProcessingRequest) -> FilterGraph {
        let r = request;
        match self {
            Strategy::GifOptimize => filters::gif_optimization_graph(r.target_height, r.fps),
            Strategy::GifCompress => filters::gif_compression_graph(r.target_height, r.fps, r.gif_compression),
            Strategy::ColorKey => {
                filters::color_key_graph(r.target_height, r.fps, r.similarity, r.blend, r.edge_blur)
            }
            Strategy::LumaKey => filters::luma_key_graph(r.target_height, r.fps, r.white_threshold, r.edge_blur),
            Strategy::SvtAv1 | Strategy::AomAv1 => filters::transcode_graph(
                r.resolution_mode,
                r.target_height,
                r.max_width,
                r.fps,
                Some("yuv420p10le"),
            ),
            Strategy::Vp9 => filters::transcode_graph(r.resolution_mode, r.target_height, r.max_width, r.fps, None),
            Strategy::H264 => filters::transcode_graph(
                r.resolution_mode,
                r.target_height,
                r.max_width,
                r.fps,
                Some("yuv420p"),
            ),
        }
    }

    /// Codec/container arguments placed between the graph and the output
    pub fn codec_args(self, request: &ProcessingRequest) -> Vec<String> {
        let speed = request.speed;
        let audio = request.audio_quality.as_str();
        let webm_audio = ["-map", "0:a?", "-c:a", "libopus", "-b:a", audio, "-ac", "1"];

        match self {
            Strategy::GifOptimize => to_args(&[
                "-c:v", "libwebp", "-q:v", GIF_WEBP_QUALITY, "-loop", "0", "-an",
                "-preset", "default", "-lossless", "0",
            ]),
            Strategy::GifCompress => to_args(&["-gifflags", "+transdiff", "-loop", "0", "-an", "-f", "gif"]),
            Strategy::ColorKey | Strategy::LumaKey => {
                let quality = request.webp_quality.to_string();
                let method = speed.webp_method().to_string();
                to_args(&[
                    "-c:v", "libwebp", "-quality", &quality, "-compression_level", "6",
                    "-loop", "0", "-an", "-preset", "default", "-method", &method, "-lossless", "0",
                ])
            }
            Strategy::SvtAv1 => {
                let crf = clamp_crf(request.crf, 5, 1, 63);
                let preset = speed.svt_av1_preset().to_string();
                let mut args = to_args(&[
                    "-c:v", "libsvtav1", "-crf", &crf, "-preset", &preset,
                    "-g", GOP_SIZE, "-pix_fmt", "yuv420p10le",
                ]);
                args.extend(to_args(&webm_audio));
                args
            }
            Strategy::AomAv1 => {
                let crf = clamp_crf(request.crf, 7, 0, 63);
                let cpu_used = speed.aom_cpu_used().to_string();
                let mut args = to_args(&[
                    "-c:v", "libaom-av1", "-crf", &crf, "-b:v", "0", "-cpu-used", &cpu_used,
                    "-row-mt", "1", "-tiles", "2x1", "-g", GOP_SIZE, "-lag-in-frames", "25",
                ]);
                args.extend(to_args(&webm_audio));
                args
            }
            Strategy::Vp9 => {
                let crf = clamp_crf(request.crf, 7, 0, 63);
                let cpu_used = speed.vpx_cpu_used().to_string();
                let mut args = to_args(&[
                    "-c:v", "libvpx-vp9", "-b:v", "0", "-crf", &crf, "-cpu-used", &cpu_used,
                    "-row-mt", "1", "-tile-columns", "2", "-g", GOP_SIZE,
                ]);
                args.extend(to_args(&webm_audio));
                args
            }
            Strategy::H264 => {
                let crf = clamp_crf(request.crf, -3, 0, 51);
                to_args(&[
                    "-c:v", "libx264", "-crf", &crf, "-preset", speed.x264_preset(),
                    "-profile:v", "high", "-pix_fmt", "yuv420p",
                    "-map", "0:a?", "-c:a", "aac", "-b:a", audio, "-ac", "1",
                    "-movflags", "+faststart",
                ])
            }
        }
    }
}

/// A requested format bound to its output path and strategy chain
#[derive(Debug, Clone, PartialEq)]
pub struct FormatPlan {
    pub format: OutputFormat,
    pub output: PathBuf,
    pub strategies: Vec<Strategy>,
}

/// Decide which formats to attempt for this upload, in attempt order
pub fn plan(kind: MediaKind, request: &ProcessingRequest, work_dir: &Path, stem: &str) -> Vec<FormatPlan> {
    OutputFormat::ORDER
        .iter()
        .copied()
        .filter(|format| format.applies_to(kind) && format.requested(request))
        .map(|format| FormatPlan {
            format,
            output: work_dir.join(format!("{}{}", stem, format.suffix())),
            strategies: format.strategies(request),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashMap;

    fn request(pairs: &[(&str, &str)]) -> ProcessingRequest {
        let fields: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ProcessingRequest::from_fields(&fields, &Config::default().defaults)
    }

    fn formats(plans: &[FormatPlan]) -> Vec<OutputFormat> {
        plans.iter().map(|p| p.format).collect()
    }

    #[test]
    fn test_gif_plan_order() {
        let req = request(&[("outAv1", "1"), ("outH264", "1")]);
        let plans = plan(MediaKind::AnimatedImage, &req, Path::new("/w"), "loop");

        assert_eq!(formats(&plans), vec![OutputFormat::OptimizedWebp, OutputFormat::CompressedGif]);
        assert_eq!(plans[0].output, PathBuf::from("/w/loop_optimized.webp"));
        assert_eq!(plans[1].output, PathBuf::from("/w/loop_compressed.gif"));
    }

    #[test]
    fn test_video_plan_order() {
        let req = request(&[("outAv1", "true"), ("outH264", "true")]);
        let plans = plan(MediaKind::Video, &req, Path::new("/w"), "clip");

        assert_eq!(
            formats(&plans),
            vec![OutputFormat::TransparentWebp, OutputFormat::Webm, OutputFormat::Mp4]
        );
        assert_eq!(plans[1].strategies, vec![Strategy::SvtAv1, Strategy::AomAv1, Strategy::Vp9]);
        assert_eq!(plans[2].strategies, vec![Strategy::H264]);
    }

    #[test]
    fn test_luma_fallback_toggle() {
        let with = request(&[]);
        assert_eq!(
            OutputFormat::TransparentWebp.strategies(&with),
            vec![Strategy::ColorKey, Strategy::LumaKey]
        );
        let without = request(&[("lumaFallback", "off")]);
        assert_eq!(OutputFormat::TransparentWebp.strategies(&without), vec![Strategy::ColorKey]);
    }

    #[test]
    fn test_webm_without_av1_is_vp9_only() {
        let req = request(&[("outWebm", "yes"), ("outWebp", "no")]);
        let plans = plan(MediaKind::Video, &req, Path::new("/w"), "clip");
        assert_eq!(formats(&plans), vec![OutputFormat::Webm]);
        assert_eq!(plans[0].strategies, vec![Strategy::Vp9]);
    }

    #[test]
    fn test_default_crf_maps_per_encoder() {
        let req = request(&[]);
        let has = |args: Vec<String>, pair: [&str; 2]| args.windows(2).any(|w| w[0] == pair[0] && w[1] == pair[1]);

        assert!(has(Strategy::SvtAv1.codec_args(&req), ["-crf", "28"]));
        assert!(has(Strategy::SvtAv1.codec_args(&req), ["-preset", "7"]));
        assert!(has(Strategy::AomAv1.codec_args(&req), ["-crf", "30"]));
        assert!(has(Strategy::AomAv1.codec_args(&req), ["-cpu-used", "4"]));
        assert!(has(Strategy::Vp9.codec_args(&req), ["-crf", "30"]));
        assert!(has(Strategy::H264.codec_args(&req), ["-crf", "20"]));
        assert!(has(Strategy::H264.codec_args(&req), ["-preset", "slow"]));
        assert!(has(Strategy::ColorKey.codec_args(&req), ["-quality", "80"]));
    }

    #[test]
    fn test_crf_is_clamped() {
        let req = request(&[("crf", "60")]);
        let args = Strategy::H264.codec_args(&req);
        let pos = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[pos + 1], "51");
    }

    #[test]
    fn test_two_pass_capability() {
        assert!(Strategy::AomAv1.supports_two_pass());
        assert!(Strategy::Vp9.supports_two_pass());
        assert!(!Strategy::SvtAv1.supports_two_pass());
        assert!(!Strategy::H264.supports_two_pass());
        assert!(!Strategy::ColorKey.supports_two_pass());
    }
}
