//! Clipforge - HTTP media optimizer
//!
//! Accepts a video or animated GIF upload and drives ffmpeg through ordered
//! fallback chains to produce transparent WebP, WebM, MP4 and optimized GIF
//! outputs, delivered as one file or a ZIP bundle with the run log.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod filters;
pub mod logging;
pub mod media;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod request;
pub mod server;
pub mod upload;
