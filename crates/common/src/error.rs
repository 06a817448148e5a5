//! Error types shared across Retrace crates.
//!
//! Every failure is a typed variant carrying enough structured data for a
//! caller to render an actionable message: insufficient-space errors carry
//! the exact byte counts, capability errors carry the failing stream name.

use std::path::PathBuf;

/// Top-level error type for Retrace operations.
#[derive(Debug, thiserror::Error)]
pub enum RetraceError {
    /// Not enough free disk space to admit the write.
    ///
    /// `required_bytes` already includes the safety reserve, so the two
    /// counts can be surfaced to the user verbatim.
    #[error(
        "insufficient disk space: {available_bytes} bytes available, \
         {required_bytes} bytes required (including reserve)"
    )]
    InsufficientSpace {
        available_bytes: u64,
        required_bytes: u64,
    },

    /// A transaction commit was rejected before any byte was written.
    #[error("transaction aborted, no data was written: {source}")]
    TransactionAborted {
        #[source]
        source: Box<RetraceError>,
    },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// A capture capability failed to start. Names the stream, never a
    /// generic cause.
    #[error("capability failed to start: {capability}")]
    CapabilityStart { capability: String },

    /// A capture capability did not acknowledge stop within the deadline.
    #[error("capability did not acknowledge stop within {timeout_ms}ms: {capability}")]
    CapabilityTimeout { capability: String, timeout_ms: u64 },

    #[error("index inconsistency: {message}")]
    IndexInconsistency { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using RetraceError.
pub type RetraceResult<T> = Result<T, RetraceError>;

impl RetraceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    pub fn capability_start(capability: impl ToString) -> Self {
        Self::CapabilityStart {
            capability: capability.to_string(),
        }
    }

    pub fn capability_timeout(capability: impl ToString, timeout_ms: u64) -> Self {
        Self::CapabilityTimeout {
            capability: capability.to_string(),
            timeout_ms,
        }
    }

    pub fn index_inconsistency(msg: impl Into<String>) -> Self {
        Self::IndexInconsistency {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether the user can recover by freeing disk space and retrying.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InsufficientSpace { .. } => true,
            Self::TransactionAborted { source } => source.is_recoverable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_space_message_carries_byte_counts() {
        let err = RetraceError::InsufficientSpace {
            available_bytes: 1_000,
            required_bytes: 104_858_600,
        };
        let msg = err.to_string();
        assert!(msg.contains("1000 bytes available"));
        assert!(msg.contains("104858600 bytes required"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_transaction_aborted_states_no_data_written() {
        let err = RetraceError::TransactionAborted {
            source: Box::new(RetraceError::InsufficientSpace {
                available_bytes: 5,
                required_bytes: 10,
            }),
        };
        assert!(err.to_string().contains("no data was written"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_capability_errors_name_the_stream() {
        let err = RetraceError::capability_start("screenshot");
        assert!(err.to_string().contains("screenshot"));
        assert!(!err.is_recoverable());
    }
}
