//! Centralized error types for grouprl.
//!
//! Uses thiserror for ergonomic error handling with context.

use thiserror::Error;

/// Main error type for grouprl operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RlError {
    /// Invalid run configuration detected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A rollout batch does not line up with the configured grouping.
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// Training diverged (NaN or infinite loss).
    #[error("Training diverged at iteration {iteration}: loss={loss}")]
    TrainingDiverged { loss: f64, iteration: usize },

    /// Old policy and trainable policy parameter sets do not match.
    #[error("Policy parameter mismatch: {0}")]
    PolicyMismatch(String),

    /// Adapter saving failed.
    #[error("Failed to save adapter to {path}: {reason}")]
    AdapterSaveFailed { path: String, reason: String },

    /// Adapter loading failed.
    #[error("Failed to load adapter from {path}: {reason}")]
    AdapterLoadFailed { path: String, reason: String },

    /// Tokenization error.
    #[error("Tokenization error: {0}")]
    TokenizationError(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization/deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Candle tensor library error.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, RlError>;

impl RlError {
    /// Check if error is recoverable (can retry).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RlError::Io(_))
    }

    /// Check if error indicates training should stop.
    pub fn should_stop_training(&self) -> bool {
        matches!(
            self,
            RlError::TrainingDiverged { .. }
                | RlError::InvalidConfig(_)
                | RlError::PolicyMismatch(_)
        )
    }
}
