use std::fmt;
use std::path::{Path, PathBuf};

use crate::filters::FilterGraph;

/// One encoder invocation: binary, argument list and declared output
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    pub output_path: Option<PathBuf>,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            output_path: None,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file; it must be the final argument
    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_path = Some(path.as_ref().to_path_buf());
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Discard the encoded stream (first pass of a two-pass encode)
    pub fn null_output(self) -> Self {
        self.arg("-f").arg("null").arg("-")
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn hide_banner(self) -> Self {
        self.arg("-hide_banner")
    }

    /// Attach a filter graph and map its terminal pad as the video stream
    pub fn filter_graph(self, graph: &FilterGraph) -> Self {
        self.arg("-filter_complex")
            .arg(graph.expression())
            .arg("-map")
            .arg(graph.output_label())
    }

    /// Disable audio
    pub fn no_audio(self) -> Self {
        self.arg("-an")
    }

    /// Select encoder pass and its statistics file
    pub fn pass<P: AsRef<Path>>(self, pass: u8, log_prefix: P) -> Self {
        self.arg("-pass")
            .arg(pass.to_string())
            .arg("-passlogfile")
            .arg(log_prefix.as_ref().to_string_lossy().to_string())
    }
}

impl fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary_path)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Builder for the commands this service issues
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Common head of every encode: overwrite, quiet banner, single input
    pub fn encode<P: AsRef<Path>, S: Into<String>>(&self, description: S, input: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, description)
            .overwrite()
            .hide_banner()
            .input(input)
    }

    /// Build encoder listing command
    pub fn list_encoders(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Encoder listing")
            .hide_banner()
            .arg("-encoders")
    }
}
