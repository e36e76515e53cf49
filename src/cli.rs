use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ForgeError, Result};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on (overrides the configuration file)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Process one local file the same way the HTTP endpoint would
    Process {
        /// Input video or animated GIF
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the delivered file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Request parameter, e.g. `--set outAv1=true --set crf=30`
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Print the encoder capability listing of the media tool
    Probe,
}

/// Turn repeated `key=value` flags into form-style fields
pub fn parse_fields(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| ForgeError::Validation(format!("expected KEY=VALUE, got '{}'", pair)))
        })
        .collect()
}
