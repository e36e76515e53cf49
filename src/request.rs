use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::DefaultsConfig;

/// Encoder speed/quality tier shared by all codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderSpeed {
    UltraFast,
    VeryFast,
    Fast,
    Medium,
    Slow,
    VerySlow,
}

impl FromStr for EncoderSpeed {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ultrafast" => Ok(EncoderSpeed::UltraFast),
            "veryfast" => Ok(EncoderSpeed::VeryFast),
            "fast" => Ok(EncoderSpeed::Fast),
            "medium" => Ok(EncoderSpeed::Medium),
            "slow" => Ok(EncoderSpeed::Slow),
            "veryslow" => Ok(EncoderSpeed::VerySlow),
            _ => Err(()),
        }
    }
}

impl EncoderSpeed {
    pub fn x264_preset(self) -> &'static str {
        match self {
            EncoderSpeed::UltraFast => "ultrafast",
            EncoderSpeed::VeryFast => "veryfast",
            EncoderSpeed::Fast => "fast",
            EncoderSpeed::Medium => "medium",
            EncoderSpeed::Slow => "slow",
            EncoderSpeed::VerySlow => "veryslow",
        }
    }

    pub fn svt_av1_preset(self) -> u32 {
        match self {
            EncoderSpeed::UltraFast => 12,
            EncoderSpeed::VeryFast => 10,
            EncoderSpeed::Fast => 9,
            EncoderSpeed::Medium => 8,
            EncoderSpeed::Slow => 7,
            EncoderSpeed::VerySlow => 4,
        }
    }

    pub fn aom_cpu_used(self) -> u32 {
        match self {
            EncoderSpeed::UltraFast => 8,
            EncoderSpeed::VeryFast => 7,
            EncoderSpeed::Fast => 6,
            EncoderSpeed::Medium => 5,
            EncoderSpeed::Slow => 4,
            EncoderSpeed::VerySlow => 2,
        }
    }

    pub fn vpx_cpu_used(self) -> u32 {
        match self {
            EncoderSpeed::UltraFast => 8,
            EncoderSpeed::VeryFast => 6,
            EncoderSpeed::Fast => 5,
            EncoderSpeed::Medium => 4,
            EncoderSpeed::Slow => 3,
            EncoderSpeed::VerySlow => 1,
        }
    }

    pub fn webp_method(self) -> u32 {
        match self {
            EncoderSpeed::UltraFast | EncoderSpeed::VeryFast => 2,
            EncoderSpeed::Fast => 4,
            EncoderSpeed::Medium | EncoderSpeed::Slow | EncoderSpeed::VerySlow => 6,
        }
    }
}

/// Whether and how video outputs are rescaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Keep source dimensions, only normalize frame rate
    Preserve,
    /// Scale down within max width x target height
    Scale,
}

/// GIF compression aggressiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GifCompression {
    Light,
    Balanced,
    Aggressive,
}

impl GifCompression {
    /// Palette size shrinks as compression gets more aggressive
    pub fn max_colors(self) -> u32 {
        match self {
            GifCompression::Light => 128,
            GifCompression::Balanced => 64,
            GifCompression::Aggressive => 32,
        }
    }

    pub fn dither(self) -> &'static str {
        match self {
            GifCompression::Light => "bayer:bayer_scale=3",
            GifCompression::Balanced | GifCompression::Aggressive => "none",
        }
    }

    pub fn scale_flags(self) -> &'static str {
        match self {
            GifCompression::Light => "bicubic",
            GifCompression::Balanced | GifCompression::Aggressive => "neighbor",
        }
    }

    fn from_quality(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(GifCompression::Light),
            "medium" => Some(GifCompression::Balanced),
            "low" => Some(GifCompression::Aggressive),
            _ => None,
        }
    }
}

/// Named bundle overriding the quality/speed knobs as a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Custom,
    WebOptimized,
    SocialMedia,
    HighQuality,
    UltraCompress,
    GifOptimize,
}

struct PresetValues {
    crf: u32,
    speed: EncoderSpeed,
    audio_quality: &'static str,
    webp_quality: u32,
    gif: GifCompression,
}

impl Preset {
    /// Unknown names behave like `custom`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "web-optimized" => Preset::WebOptimized,
            "social-media" => Preset::SocialMedia,
            "high-quality" => Preset::HighQuality,
            "ultra-compress" => Preset::UltraCompress,
            "gif-optimize" => Preset::GifOptimize,
            _ => Preset::Custom,
        }
    }

    fn values(self) -> Option<PresetValues> {
        let values = match self {
            Preset::Custom => return None,
            Preset::WebOptimized => PresetValues {
                crf: 28,
                speed: EncoderSpeed::Medium,
                audio_quality: "128k",
                webp_quality: 75,
                gif: GifCompression::Balanced,
            },
            Preset::SocialMedia => PresetValues {
                crf: 30,
                speed: EncoderSpeed::Fast,
                audio_quality: "128k",
                webp_quality: 70,
                gif: GifCompression::Balanced,
            },
            Preset::HighQuality => PresetValues {
                crf: 18,
                speed: EncoderSpeed::Slow,
                audio_quality: "192k",
                webp_quality: 90,
                gif: GifCompression::Light,
            },
            Preset::UltraCompress => PresetValues {
                crf: 35,
                speed: EncoderSpeed::VeryFast,
                audio_quality: "64k",
                webp_quality: 50,
                gif: GifCompression::Aggressive,
            },
            Preset::GifOptimize => PresetValues {
                crf: 28,
                speed: EncoderSpeed::Medium,
                audio_quality: "96k",
                webp_quality: 60,
                gif: GifCompression::Aggressive,
            },
        };
        Some(values)
    }
}

/// Which output formats the caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputSelection {
    pub webp: bool,
    pub av1: bool,
    pub h264: bool,
    pub webm: bool,
    pub gif: bool,
}

/// Validated, immutable parameters of one processing request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingRequest {
    pub target_height: u32,
    pub fps: u32,
    pub similarity: f64,
    pub blend: f64,
    pub white_threshold: f64,
    pub luma_fallback: bool,
    pub edge_blur: bool,
    pub outputs: OutputSelection,
    pub preset: Preset,
    /// `None` keeps the denoising clean filter with a plain height rescale
    pub resolution_mode: Option<ResolutionMode>,
    pub max_width: u32,
    pub crf: u32,
    pub speed: EncoderSpeed,
    pub audio_quality: String,
    pub webp_quality: u32,
    pub gif_compression: GifCompression,
    pub two_pass: bool,
}

pub fn parse_u32_default(value: Option<&str>, default: u32) -> u32 {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or(default),
        None => default,
    }
}

pub fn parse_f64_default(value: Option<&str>, default: f64) -> f64 {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n > 0.0)
            .unwrap_or(default),
        None => default,
    }
}

pub fn parse_bool_default(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Bitrates look like `96k`, `1.5M` or a plain number of bits
fn is_bitrate(value: &str) -> bool {
    let digits = value.trim_end_matches(['k', 'K', 'm', 'M']);
    !digits.is_empty()
        && digits
            .parse::<f64>()
            .map(|n| n.is_finite() && n > 0.0)
            .unwrap_or(false)
}

/// Keep a unit-interval value when it is in range, else the default
fn unit_interval(value: f64, default: f64) -> f64 {
    if value <= 1.0 { value } else { default }
}

impl ProcessingRequest {
    /// Build a request from raw form fields, substituting defaults for
    /// anything absent or invalid.
    pub fn from_fields(fields: &HashMap<String, String>, defaults: &DefaultsConfig) -> Self {
        let get = |key: &str| fields.get(key).map(String::as_str);

        // `height` wins only when it is usable; otherwise the alias applies
        let height_field = get("height")
            .filter(|v| v.trim().parse::<u32>().is_ok_and(|n| n > 0))
            .or_else(|| get("targetHeight"));
        let default_speed = defaults.speed.parse().unwrap_or(EncoderSpeed::Slow);

        let audio_quality = get("audioQuality")
            .map(str::trim)
            .filter(|v| is_bitrate(v))
            .unwrap_or(defaults.audio_quality.as_str())
            .to_string();

        let mut request = Self {
            target_height: parse_u32_default(height_field, defaults.height),
            fps: parse_u32_default(get("fps"), defaults.fps),
            similarity: unit_interval(
                parse_f64_default(get("similarity"), defaults.similarity),
                defaults.similarity,
            ),
            blend: unit_interval(parse_f64_default(get("blend"), defaults.blend), defaults.blend),
            white_threshold: unit_interval(
                parse_f64_default(get("whiteThreshold"), defaults.white_threshold),
                defaults.white_threshold,
            ),
            luma_fallback: parse_bool_default(get("lumaFallback"), defaults.luma_fallback),
            edge_blur: parse_bool_default(get("edgeBlur"), defaults.edge_blur),
            outputs: OutputSelection {
                webp: parse_bool_default(get("outWebp"), defaults.out_webp),
                av1: parse_bool_default(get("outAv1"), defaults.out_av1),
                h264: parse_bool_default(get("outH264"), defaults.out_h264),
                webm: parse_bool_default(get("outWebm"), defaults.out_webm),
                gif: parse_bool_default(get("outGif"), defaults.out_gif),
            },
            preset: get("preset").map(Preset::parse).unwrap_or(Preset::Custom),
            resolution_mode: match get("resolutionMode").map(|v| v.trim().to_lowercase()).as_deref() {
                Some("preserve") => Some(ResolutionMode::Preserve),
                Some("scale") => Some(ResolutionMode::Scale),
                _ => None,
            },
            max_width: parse_u32_default(get("maxWidth"), defaults.max_width),
            crf: parse_u32_default(get("crf"), defaults.crf),
            speed: get("speed").and_then(|v| v.parse().ok()).unwrap_or(default_speed),
            audio_quality,
            webp_quality: defaults.webp_quality.clamp(1, 100),
            gif_compression: get("gifQuality")
                .and_then(GifCompression::from_quality)
                .unwrap_or(GifCompression::Balanced),
            two_pass: parse_bool_default(get("twopass"), false),
        };

        if let Some(values) = request.preset.values() {
            request.crf = values.crf;
            request.speed = values.speed;
            request.audio_quality = values.audio_quality.to_string();
            request.webp_quality = values.webp_quality;
            request.gif_compression = values.gif;
        }

        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn defaults() -> DefaultsConfig {
        Config::default().defaults
    }

    #[test]
    fn test_bool_parsing() {
        for truthy in ["1", "TRUE", "Yes", "on"] {
            assert!(parse_bool_default(Some(truthy), false), "{}", truthy);
        }
        for falsy in ["0", "false", "NO", "Off"] {
            assert!(!parse_bool_default(Some(falsy), true), "{}", falsy);
        }
        assert!(parse_bool_default(Some("maybe"), true));
        assert!(!parse_bool_default(Some(""), false));
        assert!(parse_bool_default(None, true));
    }

    #[test]
    fn test_numeric_defaults_for_absent_or_invalid() {
        assert_eq!(parse_u32_default(None, 720), 720);
        assert_eq!(parse_u32_default(Some("abc"), 720), 720);
        assert_eq!(parse_u32_default(Some("0"), 720), 720);
        assert_eq!(parse_u32_default(Some("-5"), 720), 720);
        assert_eq!(parse_u32_default(Some(" 480 "), 720), 480);
        assert_eq!(parse_f64_default(Some("-0.2"), 0.12), 0.12);
        assert_eq!(parse_f64_default(Some("NaN"), 0.12), 0.12);
        assert_eq!(parse_f64_default(Some("0.2"), 0.12), 0.2);
    }

    #[test]
    fn test_empty_form_yields_defaults() {
        let request = ProcessingRequest::from_fields(&HashMap::new(), &defaults());

        assert_eq!(request.target_height, 720);
        assert_eq!(request.fps, 24);
        assert_eq!(request.similarity, 0.12);
        assert_eq!(request.blend, 0.03);
        assert_eq!(request.white_threshold, 0.95);
        assert!(request.luma_fallback);
        assert!(request.outputs.webp && request.outputs.gif);
        assert!(!request.outputs.av1 && !request.outputs.h264 && !request.outputs.webm);
        assert_eq!(request.preset, Preset::Custom);
        assert_eq!(request.resolution_mode, None);
        assert_eq!(request.crf, 23);
        assert_eq!(request.speed, EncoderSpeed::Slow);
        assert_eq!(request.audio_quality, "96k");
        assert!(!request.two_pass);
    }

    #[test]
    fn test_height_alias_and_precedence() {
        let only_alias = fields(&[("targetHeight", "480")]);
        assert_eq!(ProcessingRequest::from_fields(&only_alias, &defaults()).target_height, 480);

        let both = fields(&[("height", "360"), ("targetHeight", "480")]);
        assert_eq!(ProcessingRequest::from_fields(&both, &defaults()).target_height, 360);
    }

    #[test]
    fn test_invalid_height_defers_to_alias() {
        let form = fields(&[("height", "abc"), ("targetHeight", "480")]);
        assert_eq!(ProcessingRequest::from_fields(&form, &defaults()).target_height, 480);

        let zero = fields(&[("height", "0"), ("targetHeight", "360")]);
        assert_eq!(ProcessingRequest::from_fields(&zero, &defaults()).target_height, 360);

        let neither = fields(&[("height", "abc"), ("targetHeight", "-1")]);
        assert_eq!(ProcessingRequest::from_fields(&neither, &defaults()).target_height, 720);
    }

    #[test]
    fn test_bitrate_validation() {
        assert!(is_bitrate("96k"));
        assert!(is_bitrate("1.5M"));
        assert!(is_bitrate("128000"));
        for bad in ["inf", "infk", "NaN", "0k", "k", "-64k", "loud"] {
            assert!(!is_bitrate(bad), "{}", bad);
        }

        let form = fields(&[("audioQuality", "inf")]);
        assert_eq!(ProcessingRequest::from_fields(&form, &defaults()).audio_quality, "96k");
    }

    #[test]
    fn test_out_of_range_thresholds_fall_back() {
        let form = fields(&[("similarity", "3.5"), ("blend", "0.1"), ("whiteThreshold", "2")]);
        let request = ProcessingRequest::from_fields(&form, &defaults());
        assert_eq!(request.similarity, 0.12);
        assert_eq!(request.blend, 0.1);
        assert_eq!(request.white_threshold, 0.95);
    }

    #[test]
    fn test_named_preset_overrides_knobs() {
        let form = fields(&[("preset", "ultra-compress"), ("crf", "20"), ("speed", "slow")]);
        let request = ProcessingRequest::from_fields(&form, &defaults());

        assert_eq!(request.preset, Preset::UltraCompress);
        assert_eq!(request.crf, 35);
        assert_eq!(request.speed, EncoderSpeed::VeryFast);
        assert_eq!(request.audio_quality, "64k");
        assert_eq!(request.gif_compression, GifCompression::Aggressive);
    }

    #[test]
    fn test_custom_or_unknown_preset_keeps_fields() {
        for name in ["custom", "cinematic"] {
            let form = fields(&[("preset", name), ("crf", "19"), ("speed", "fast"), ("audioQuality", "160k")]);
            let request = ProcessingRequest::from_fields(&form, &defaults());
            assert_eq!(request.preset, Preset::Custom);
            assert_eq!(request.crf, 19);
            assert_eq!(request.speed, EncoderSpeed::Fast);
            assert_eq!(request.audio_quality, "160k");
        }
    }

    #[test]
    fn test_invalid_strings_fall_back() {
        let form = fields(&[("speed", "warp"), ("audioQuality", "loud"), ("resolutionMode", "stretch")]);
        let request = ProcessingRequest::from_fields(&form, &defaults());
        assert_eq!(request.speed, EncoderSpeed::Slow);
        assert_eq!(request.audio_quality, "96k");
        assert_eq!(request.resolution_mode, None);
    }

    #[test]
    fn test_gif_palette_shrinks_with_aggressiveness() {
        assert!(GifCompression::Light.max_colors() > GifCompression::Balanced.max_colors());
        assert!(GifCompression::Balanced.max_colors() > GifCompression::Aggressive.max_colors());
    }
}
