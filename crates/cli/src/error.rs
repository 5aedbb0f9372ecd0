//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Output channel construction failed
    #[error("Failed to start output channels: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),

    /// Receiver construction or run failed
    #[error("Receiver failed: {0}")]
    Receiver(#[from] receiver::ReceiverError),

    /// The run did not finish in time
    #[error("Receiver did not finish within {secs}s")]
    Timeout { secs: u64 },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
