//! Error types for streamscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Feature extraction errors
    #[error("Feature extraction failed at sample {offset}: {message}")]
    FeatureDomain { offset: u64, message: String },

    // Incremental-decode contract violations
    #[error("Cache continuity violated: expected offset {expected}, got {got}")]
    CacheContinuity { expected: u64, got: u64 },

    // Inference runtime errors
    #[error("Inference failed: {message}")]
    Inference { message: String },

    #[error("Tensor accounting mismatch: {acquired} acquired, {released} released")]
    ResourceLeak { acquired: u64, released: u64 },

    // Session lifecycle errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Session already open: {id}")]
    SessionAlreadyOpen { id: String },

    #[error("Session closed: {id}")]
    SessionClosed { id: String },

    // Audio input errors
    #[error("Audio error: {message}")]
    Audio { message: String },

    // Transcript event delivery errors
    #[error("Event delivery failed: {message}")]
    EventDelivery { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for errors that terminate the owning session outright.
    ///
    /// Everything else leaves the session decodable once the caller fixes
    /// its input (resubmit the correct range, retry inference).
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::ResourceLeak { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;
