//! Error types for the tiered cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tiered cache
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Key is absent from both tiers (a normal miss)
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Remote tier short-circuited by the breaker
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Remote store operation failed
    #[error("Remote {operation} failed: {reason}")]
    Remote { operation: String, reason: String },

    /// Stored bytes could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Domain-supplied resolver failed
    #[error("Resolver failed: {0:#}")]
    Resolver(anyhow::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// Config file could not be parsed
    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus registry error
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a remote-operation error
    pub fn remote(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Remote {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this is a plain miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if the breaker rejected the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }

    /// Check if the remote tier is unavailable (open circuit or failed call)
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. } | Error::Remote { .. })
    }
}
