//! Error types for auditflow-core

use thiserror::Error;

/// Main error type for the auditflow-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Client-credentials exchange against UAA failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// Audit event API request failed (transport, status or decode)
    #[error("audit event API error: {0}")]
    Api(String),

    /// Log sink request failed
    #[error("shipper error: {0}")]
    Shipper(String),

    /// The downstream stage hung up
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Every attempt of a collection cycle failed
    #[error("collection failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    /// A pipeline stage returned while the others were still running
    #[error("pipeline stage '{0}' stopped unexpectedly")]
    StageStopped(&'static str),
}

impl Error {
    /// Whether a failed collection attempt is worth retrying.
    ///
    /// Transport, status and decode failures can clear up on their own;
    /// a closed channel or a bad configuration cannot.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Api(_) | Error::Json(_) | Error::Io(_))
    }
}

/// Result type alias for auditflow-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Api("HTTP request failed: connection reset".to_string()).is_transient());
        assert!(!Error::ChannelClosed("deduplicator").is_transient());
        assert!(!Error::Config("uaa.url is required".to_string()).is_transient());
        assert!(!Error::Auth("bad credentials".to_string()).is_transient());
    }

    #[test]
    fn test_retries_exhausted_message() {
        let err = Error::RetriesExhausted {
            attempts: 10,
            last: Box::new(Error::Api("API error (502 Bad Gateway)".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("10 attempts"));
        assert!(msg.contains("502"));
    }
}
