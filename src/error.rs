//! Error types for rpch.

use thiserror::Error;

/// Main error type for all rpch operations.
///
/// Only [`RpchError::Remote`] is recoverable: the peer answered with a
/// type-kind 3 response and the connection is still usable. Everything that
/// surfaces from a connection task ends that connection.
#[derive(Debug, Error)]
pub enum RpchError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol violation (bad magic, malformed request line, unencodable frame).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No service registered under this name.
    #[error("invalid service: {0}")]
    ServiceNotFound(String),

    /// The service exists but has no such method.
    #[error("invalid method: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    /// A handler failed with something other than a recoverable error.
    #[error("Handler fault: {0}")]
    HandlerFault(String),

    /// Recoverable error reported by the remote handler.
    #[error("{0}")]
    Remote(String),

    /// A value did not carry the expected type tag or payload length.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },

    /// Connection closed before the operation could complete.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl RpchError {
    /// Whether the connection that produced this error is still usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RpchError::Remote(_))
    }
}

/// Result type alias using RpchError.
pub type Result<T> = std::result::Result<T, RpchError>;
