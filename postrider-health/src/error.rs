//! Error types for the health server

use thiserror::Error;

/// Errors from the health/stats HTTP server
#[derive(Debug, Error)]
pub enum HealthError {
    /// Failed to bind the listen address
    #[error("Failed to bind health server to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The server encountered a runtime error
    #[error("Health server error: {0}")]
    ServerError(String),
}
