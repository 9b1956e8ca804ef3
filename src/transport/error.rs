// ABOUTME: SMPP transport error types for error handling across bind, submit and close
// ABOUTME: Provides structured error reporting with automatic conversion from I/O and framing errors

use crate::codec::CodecError;
use crate::connection::ConnectionError;
use crate::datatypes::CommandStatus;
use std::io;
use thiserror::Error;

/// Error type for SMPP transport operations
#[derive(Debug, Error)]
pub enum SmppError {
    /// I/O error during network operations (connection, read, write)
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// SMPP protocol error indicated by command_status field
    #[error("Protocol error: {0:?}")]
    Protocol(CommandStatus),

    /// PDU could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Data validation error (empty message, malformed settings, etc.)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Unexpected PDU received (wrong response type for request)
    #[error("Unexpected PDU: expected {expected}, got {actual}")]
    UnexpectedPdu { expected: String, actual: String },

    /// Connection closed unexpectedly
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Session not in correct state for operation
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

/// Result type alias for SMPP operations
pub type SmppResult<T> = Result<T, SmppError>;

impl From<ConnectionError> for SmppError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Io(e) => SmppError::Connection(e),
            ConnectionError::Codec(e) => SmppError::Codec(e),
            ConnectionError::Reset => SmppError::ConnectionClosed,
        }
    }
}

impl SmppError {
    /// True when the session itself is gone or unusable, as opposed to the
    /// SMSC having answered the request.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            SmppError::Connection(_) | SmppError::ConnectionClosed | SmppError::InvalidState(_)
        )
    }
}
