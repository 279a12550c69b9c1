//! Error types for fleet
//!
//! All errors are managed centrally here. Every library crate returns
//! [`Result`]; the binary decides what to do with fatal ones.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// fleet error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // Container engine / fleet lifecycle
    // ========================================================================
    #[error("Container engine error: {0}")]
    Engine(String),

    #[error("Image build failed: {0}")]
    ImageBuild(String),

    #[error("Launch failed for host port {port}: {message}")]
    Launch { port: u16, message: String },

    #[error("Liveness check failed: {0}")]
    Liveness(String),

    #[error("Stream error: {0}")]
    Stream(String),

    // ========================================================================
    // Execution
    // ========================================================================
    #[error("Task error: {0}")]
    Task(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // Conversions from external errors
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the fleet is left in a state the run cannot continue from.
    ///
    /// The top-level run aborts on these; everything else is reported and
    /// the run carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Engine(_) | Error::ImageBuild(_) | Error::Launch { .. } | Error::Liveness(_)
        )
    }

    /// Whether this is the "file or entry is absent" signal
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Launch error helper
    pub fn launch(port: u16, message: impl Into<String>) -> Self {
        Error::Launch {
            port,
            message: message.into(),
        }
    }
}
