//! Error types for the periodic runtime

use periodic_proto::{Command, ProtocolError};
use thiserror::Error;

/// Main error type for periodic operations
#[derive(Debug, Error)]
pub enum PeriodicError {
    /// Read or write failure on the connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection was closed while the call was pending, or before it started
    #[error("Connection closed")]
    ConnectionClosed,

    /// Grab answered with something other than a job assignment
    #[error("GrabJob failed: server answered {0}")]
    GrabJobFailed(Command),

    /// Response code does not match the call that was made
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Code the call expects
        expected: Command,
        /// Code the server sent
        actual: Command,
    },

    /// Server refused the request
    #[error("{op} rejected: {message}")]
    Rejected {
        /// Operation that was refused
        op: &'static str,
        /// Server-provided reason
        message: String,
    },

    /// Payload does not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Endpoint string could not be parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// I/O errors outside the connection (dump sinks, load sources)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol-level errors
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),
}

impl PeriodicError {
    /// Whether the connection behind the call is gone
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Transport(_))
    }
}

impl From<ProtocolError> for PeriodicError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Decode(msg) => Self::Decode(msg),
            err if err.is_io() => Self::Transport(err.to_string()),
            err => Self::Protocol(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_mapping() {
        let err: PeriodicError = ProtocolError::Decode("bad".to_string()).into();
        assert!(matches!(err, PeriodicError::Decode(msg) if msg == "bad"));

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: PeriodicError = ProtocolError::Io(io).into();
        assert!(err.is_connection_lost());

        let err: PeriodicError = ProtocolError::InvalidFrame("x").into();
        assert!(matches!(err, PeriodicError::Protocol(_)));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PeriodicError::GrabJobFailed(Command::NoJob).to_string(),
            "GrabJob failed: server answered NO_JOB"
        );
        let err = PeriodicError::Rejected { op: "SubmitJob", message: "exists".to_string() };
        assert_eq!(err.to_string(), "SubmitJob rejected: exists");
    }
}
