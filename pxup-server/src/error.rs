//! Server error types.

use pxup_core::CoreError;
use pxup_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Server errors.
///
/// Every error tears down the active connection only; the accept loop keeps
/// running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("update buffer error: {0}")]
    Buffer(#[from] CoreError),

    #[error("connection closed after {received} of {expected} bytes")]
    ShortRead { expected: usize, received: usize },

    #[error("no data received for {0:?}")]
    Timeout(Duration),

    #[error("frame too large: {count} entries (max {max})")]
    Oversized { count: usize, max: usize },

    #[error("server shutting down")]
    ShuttingDown,
}

/// Error taxonomy used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Read failure, stall, or disconnect mid-frame.
    Transport,
    /// Bad magic or unsupported version.
    Protocol,
    /// Entry count over the frame limit.
    Bound,
    /// Update buffer could not grow.
    Resource,
    /// Local shutdown.
    Shutdown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transport => "transport",
            ErrorClass::Protocol => "protocol",
            ErrorClass::Bound => "bound",
            ErrorClass::Resource => "resource",
            ErrorClass::Shutdown => "shutdown",
        }
    }
}

impl ServerError {
    /// Classifies the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ServerError::Io(_) => ErrorClass::Transport,
            ServerError::ShortRead { .. } => ErrorClass::Transport,
            ServerError::Timeout(_) => ErrorClass::Transport,
            ServerError::Protocol(ProtocolError::Truncated { .. }) => ErrorClass::Transport,
            ServerError::Protocol(_) => ErrorClass::Protocol,
            ServerError::Oversized { .. } => ErrorClass::Bound,
            ServerError::Buffer(_) => ErrorClass::Resource,
            ServerError::ShuttingDown => ErrorClass::Shutdown,
        }
    }

    /// Returns whether the error was caused by what the peer sent or did.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Transport | ErrorClass::Protocol | ErrorClass::Bound
        )
    }
}
