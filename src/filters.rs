//! Filter-graph construction.
//!
//! Every function here is pure: parameters in, ffmpeg filter-graph text out.
//! Each complete graph reads `[0:v]` and ends in the single named pad
//! [`OUTPUT_PAD`], which the caller maps with `-map [v]`.

use crate::request::{GifCompression, ResolutionMode};

/// Terminal pad name shared by every graph
pub const OUTPUT_PAD: &str = "v";

/// Reference color removed by the color key
const KEY_COLOR: &str = "white";

/// A self-contained filter graph with an explicit terminal pad
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraph {
    expression: String,
}

impl FilterGraph {
    /// Wrap a complete expression; it must end in `[v]`
    pub fn new<S: Into<String>>(expression: S) -> Self {
        let expression = expression.into();
        debug_assert!(expression.ends_with(&format!("[{}]", OUTPUT_PAD)));
        Self { expression }
    }

    /// Build `[0:v]<chain>[v]` from a linear filter chain
    fn linear(chain: &str) -> Self {
        Self::new(format!("[0:v]{}[{}]", chain, OUTPUT_PAD))
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The `-map` target for this graph
    pub fn output_label(&self) -> String {
        format!("[{}]", OUTPUT_PAD)
    }
}

/// Denoise, deband, sharpen, normalize frame rate and Lanczos-rescale to
/// `height` keeping aspect ratio.
pub fn clean_chain(height: u32, fps: u32) -> String {
    format!(
        "hqdn3d=1.5:1.5:6:6,gradfun=12:16,unsharp=3:3:0.6:3:3:0.3,fps={},scale=-2:{}:flags=lanczos",
        fps, height
    )
}

/// Frame-rate and optional bounded scale-down chain
pub fn resolution_chain(mode: ResolutionMode, height: u32, max_width: u32, fps: u32) -> String {
    match mode {
        ResolutionMode::Preserve => format!("fps={}", fps),
        ResolutionMode::Scale => format!(
            "fps={},scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2:flags=lanczos",
            fps, max_width, height
        ),
    }
}

/// Graph for the plain transcode outputs (WebM/MP4).
///
/// Without an explicit resolution mode the clean chain is used.
pub fn transcode_graph(
    mode: Option<ResolutionMode>,
    height: u32,
    max_width: u32,
    fps: u32,
    pixel_format: Option<&str>,
) -> FilterGraph {
    let mut chain = match mode {
        Some(mode) => resolution_chain(mode, height, max_width, fps),
        None => clean_chain(height, fps),
    };
    if let Some(pix_fmt) = pixel_format {
        chain.push_str(&format!(",format={}", pix_fmt));
    }
    FilterGraph::linear(&chain)
}

/// Remove a white background with `colorkey`.
///
/// With `blur`, the keyed alpha is extracted, softened and merged back onto
/// an untouched copy of the color channels.
pub fn color_key_graph(height: u32, fps: u32, similarity: f64, blend: f64, blur: bool) -> FilterGraph {
    let base = clean_chain(height, fps);
    if blur {
        FilterGraph::new(format!(
            "[0:v]{base},format=rgba,split[c0][c1];\
             [c0]colorkey={KEY_COLOR}:{similarity:.3}:{blend:.3}[ck];\
             [ck]alphaextract[a];[a]boxblur=3:2[a2];\
             [c1][a2]alphamerge,format=yuva420p[{OUTPUT_PAD}]"
        ))
    } else {
        FilterGraph::new(format!(
            "[0:v]{base},format=rgba,colorkey={KEY_COLOR}:{similarity:.3}:{blend:.3},format=yuva420p[{OUTPUT_PAD}]"
        ))
    }
}

/// Derive alpha from brightness: pixels at or above the white threshold
/// become transparent.
pub fn luma_key_graph(height: u32, fps: u32, white_threshold: f64, blur: bool) -> FilterGraph {
    let base = clean_chain(height, fps);
    let cutoff = (white_threshold.clamp(0.0, 1.0) * 255.0).round() as u32;
    let matte = format!("lut=c0='if(gte(val,{cutoff}),0,255)'");
    if blur {
        FilterGraph::new(format!(
            "[0:v]{base},format=rgba,split[f0][f1];\
             [f0]format=gray,{matte}[matte];[matte]boxblur=2:1[matte2];\
             [f1][matte2]alphamerge,format=yuva420p[{OUTPUT_PAD}]"
        ))
    } else {
        FilterGraph::new(format!(
            "[0:v]{base},format=rgba,split[f0][f1];\
             [f0]format=gray,{matte}[matte];\
             [f1][matte]alphamerge,format=yuva420p[{OUTPUT_PAD}]"
        ))
    }
}

/// Speed-first GIF re-encode: nearest-neighbor scaling, 128-color palette
/// with a reserved transparent entry, Bayer dithering.
pub fn gif_optimization_graph(height: u32, fps: u32) -> FilterGraph {
    FilterGraph::new(format!(
        "[0:v]scale=-2:{height}:flags=neighbor,fps={fps},split[s0][s1];\
         [s0]palettegen=max_colors=128:reserve_transparent=1[p];\
         [s1][p]paletteuse=dither=bayer:bayer_scale=5:diff_mode=rectangle[{OUTPUT_PAD}]"
    ))
}

/// Size-first GIF re-encode tuned by the compression level
pub fn gif_compression_graph(height: u32, fps: u32, level: GifCompression) -> FilterGraph {
    let flags = level.scale_flags();
    let colors = level.max_colors();
    let dither = level.dither();
    FilterGraph::new(format!(
        "[0:v]scale=-2:{height}:flags={flags},fps={fps},split[s0][s1];\
         [s0]palettegen=max_colors={colors}:reserve_transparent=0[p];\
         [s1][p]paletteuse=dither={dither}:diff_mode=rectangle[{OUTPUT_PAD}]"
    ))
}
