//! Error types for the tunnel route engine
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the tunnel route engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (fatal to bring-up, detected before OS state is touched)
    #[error("configuration error: {0}")]
    Config(String),

    /// An OS networking API call failed
    #[error("OS state error: {0}")]
    OsState(String),

    /// I/O errors from the platform backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// IPv6 is not present on the host
    ///
    /// Treated as a non-fatal "skip" wherever IPv6 is optional, and as a
    /// real error only where IPv6 configuration was explicitly requested.
    #[error("IPv6 is not available on this host")]
    Ipv6Unavailable,

    /// Several independent operations were attempted and at least one failed
    #[error("{} operation(s) failed, first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Aggregate(Vec<Error>),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an OS state error
    pub fn os_state(msg: impl Into<String>) -> Self {
        Self::OsState(msg.into())
    }

    /// Fold a list of collected errors into a single result
    ///
    /// Used by operations that attempt every sub-step regardless of
    /// individual failures, so partial convergence still applies as much
    /// state as possible.
    pub fn collect(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate(errors)),
        }
    }
}
