// src/utils/errors.rs
//! Engine error types

use thiserror::Error;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the policy engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// URL could not be turned into a feature vector
    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),

    /// No scoring model has been loaded
    #[error("scorer unavailable: {0}")]
    ScorerUnavailable(String),

    /// Bypass token did not match any issued token
    #[error("invalid bypass token: {0}")]
    InvalidToken(String),

    /// URL submitted for scanning or whitelisting is malformed
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Whitelist persistence failed
    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// Converting to or from the HTTP transport failed
    #[error("interception failed: {0}")]
    InterceptionFailed(String),

    /// Management service failure
    #[error("management error: {0}")]
    ManagementFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidToken("evil.test_100".to_string());
        assert_eq!(err.to_string(), "invalid bypass token: evil.test_100");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
