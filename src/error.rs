use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Bundling error: {0}")]
    Aggregation(String),

    #[error("No output could be produced (try relaxing the thresholds)")]
    NoOutputs,
}

impl ForgeError {
    /// Errors caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, ForgeError::Validation(_) | ForgeError::NoOutputs)
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;
